//! An ordered set with logarithmic rank and distance queries.
//!
//! This crate provides [`RankSet`], an ordered set of unique keys that keeps
//! the usual `BTreeSet`-style operations and adds two order-statistic
//! primitives, both O(log n):
//!
//! - [`count_less`](RankSet::count_less) - how many stored keys sort below a
//!   probe key (the probe need not be stored)
//! - [`distance`](RankSet::distance) - the signed number of stored keys in a
//!   half-open key interval
//!
//! # Example
//!
//! ```
//! use ranktree::RankSet;
//!
//! let mut set = RankSet::new();
//! for key in [10, 20, 30, 40] {
//!     set.insert(key);
//! }
//!
//! assert!(set.contains(&30));
//! assert_eq!(set.count_less(&25), 2);
//! assert_eq!(set.distance(&15, &40), 2); // 20 and 30
//! assert_eq!(set.iter().copied().collect::<Vec<_>>(), [10, 20, 30, 40]);
//! ```
//!
//! # Implementation
//!
//! The set is a red-black tree augmented two ways. Every node caches its
//! subtree size, which turns rank queries into a single root-to-leaf walk.
//! Every missing child slot carries a thread to the node's in-order
//! neighbor, so stepping an iterator never climbs back through parents and
//! a full traversal costs amortized constant time per element. Nodes live
//! in a slab arena and positions are exposed as plain [`Cursor`] tokens.
//!
//! Ordering is pluggable: by default keys order via [`Ord`], and any
//! [`compare::Compare`] comparator can be supplied with
//! [`RankSet::with_cmp`].

#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod raw;

pub mod rank_set;

pub use rank_set::{Cursor, IntoIter, Iter, RankSet};
