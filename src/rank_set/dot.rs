use core::fmt::{self, Write};

use compare::Compare;

use crate::raw::{Color, Link, Pointer};

use super::RankSet;

impl<T, C> RankSet<T, C>
where
    T: fmt::Display,
    C: Compare<T>,
{
    /// Renders the node graph in GraphViz DOT format, for debugging.
    ///
    /// Every node shows its key and cached subtree size and is filled with
    /// its color. Child edges are solid, parent edges dashed, threads
    /// dotted; missing children show as `nil` boxes and the past-the-end
    /// position as a diamond. Feed the output to `dot -Tpng` to get a
    /// picture.
    #[must_use]
    pub fn dot_graph(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph G {{\n rankdir = TB;\n node [ shape = doubleoctagon; style = filled ];\n edge [ arrowhead = vee ];");
        let _ = writeln!(out, "END [ label = \"PAST-END\" color = \"#00FFFF\" fontcolor = \"#000000\" fontsize = \"10\" shape = \"diamond\" width = 0.1 ];");

        if let Some(root) = self.raw.root() {
            let _ = writeln!(out, "END -> N{} [ label = \"L\" ];", root.index());
        }

        let mut at = self.raw.leftmost();
        while let Pointer::Node(handle) = at {
            self.write_node_dot(&mut out, handle);
            at = self.raw.advance(at);
        }

        out.push_str("}\n");
        out
    }

    fn write_node_dot(&self, out: &mut String, handle: crate::raw::Handle) {
        let node = self.raw.node(handle);
        let id = handle.index();
        let (fill, ink) = match node.color {
            Color::Red => ("#FD0000", "#000000"),
            Color::Black => ("#000000", "#FFFFFF"),
        };
        let _ = writeln!(
            out,
            "N{id} [ label = < {} <BR/> <FONT POINT-SIZE=\"10\"> size: {} </FONT> > color = \"{fill}\" fontcolor = \"{ink}\" ];",
            node.key, node.size
        );

        let parent = match node.parent {
            Pointer::Node(parent) => format!("N{}", parent.index()),
            Pointer::End => String::from("END"),
        };
        let _ = writeln!(out, "N{id} -> {parent} [ style = \"dashed\" label = \"P\" ];");

        Self::write_slot_dot(out, id, node.left, "L", "PREV");
        Self::write_slot_dot(out, id, node.right, "R", "NEXT");
    }

    fn write_slot_dot(out: &mut String, id: usize, slot: Link, side: &str, thread_label: &str) {
        match slot {
            Link::Child(child) => {
                let _ = writeln!(out, "N{id} -> N{} [ label = \"{side}\" ];", child.index());
            }
            Link::Thread(target) => {
                let _ = writeln!(
                    out,
                    "NIL{id}{side} [ label = \"nil\" color = \"#000000\" fontcolor = \"#FFFFFF\" fontsize = \"10\" shape = \"oval\" width = 0.1 ];"
                );
                let _ = writeln!(out, "N{id} -> NIL{id}{side} [ label = \"{side}\" ];");
                let target = match target {
                    Pointer::Node(target) => format!("N{}", target.index()),
                    Pointer::End => String::from("END"),
                };
                let _ = writeln!(
                    out,
                    "N{id} -> {target} [ label = \"{thread_label}\" style = \"dotted\" color = \"#a3a3c2\" fontcolor = \"#a3a3c2\" ];"
                );
            }
            Link::Vacant => {}
        }
    }
}
