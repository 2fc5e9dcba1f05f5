//! Stream-driven distance queries over a growing key set.
//!
//! Reads whitespace-separated operations from stdin:
//!
//! - `k INT` inserts a key;
//! - `q INT INT` reports how many stored keys lie in the closed-below,
//!   open-above interval between the two arguments, clamped at zero when
//!   the second sorts below the first.
//!
//! Results are printed space-separated on one line. Malformed input exits
//! non-zero with a diagnostic on stderr.

use std::io::{self, Read};
use std::process::ExitCode;

use ranktree::RankSet;

fn main() -> ExitCode {
    let mut input = String::new();
    if let Err(err) = io::stdin().read_to_string(&mut input) {
        eprintln!("rank_query: failed to read stdin: {err}");
        return ExitCode::FAILURE;
    }

    match run(&input) {
        Ok(results) => {
            let rendered: Vec<String> = results.iter().map(ToString::to_string).collect();
            println!("{}", rendered.join(" "));
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("rank_query: {message}");
            eprintln!("rank_query: expected a stream of `k INT` and `q INT INT` operations");
            ExitCode::FAILURE
        }
    }
}

fn run(input: &str) -> Result<Vec<isize>, String> {
    let mut tokens = input.split_whitespace();
    let mut set: RankSet<i64> = RankSet::new();
    let mut results = Vec::new();

    while let Some(op) = tokens.next() {
        match op {
            "k" => {
                let key = parse_arg(tokens.next(), "k")?;
                set.insert(key);
            }
            "q" => {
                let first = parse_arg(tokens.next(), "q")?;
                let second = parse_arg(tokens.next(), "q")?;
                results.push(set.distance(&first, &second).max(0));
            }
            other => return Err(format!("unknown operation {other:?}")),
        }
    }

    Ok(results)
}

fn parse_arg(token: Option<&str>, op: &str) -> Result<i64, String> {
    let token = token.ok_or_else(|| format!("missing argument for `{op}`"))?;
    token.parse().map_err(|_| format!("invalid integer {token:?} in `{op}` operation"))
}

#[cfg(test)]
mod tests {
    use super::run;

    #[test]
    fn queries_count_keys_between_probes() {
        let results = run("k 10 k 20 q 8 31 q 6 9 k 30 k 40 q 15 40").unwrap();
        assert_eq!(results, [2, 0, 2]);
    }

    #[test]
    fn reversed_probes_clamp_to_zero() {
        let results = run("k 1 k 2 k 3 q 3 1").unwrap();
        assert_eq!(results, [0]);
    }

    #[test]
    fn empty_input_is_fine() {
        assert!(run("").unwrap().is_empty());
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(run("x 1").is_err());
        assert!(run("k").is_err());
        assert!(run("q 1").is_err());
        assert!(run("k ten").is_err());
    }
}
