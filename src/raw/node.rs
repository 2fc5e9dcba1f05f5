use super::link::{Link, Pointer};

/// Node color. Freshly spliced nodes are red; absent children count as
/// black everywhere colors are inspected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Color {
    Red,
    Black,
}

/// A linked tree node.
///
/// `size` counts the nodes of the subtree rooted here, itself included.
/// `parent` is `Pointer::End` exactly for the root. Each child slot either
/// descends into a real subtree or threads to the in-order neighbor on
/// that side, which is what makes iterator steps cheap.
pub(crate) struct Node<K> {
    pub(crate) key: K,
    pub(crate) color: Color,
    pub(crate) size: usize,
    pub(crate) parent: Pointer,
    pub(crate) left: Link,
    pub(crate) right: Link,
}

impl<K> Node<K> {
    pub(crate) fn new(key: K) -> Self {
        Self {
            key,
            color: Color::Red,
            size: 1,
            parent: Pointer::End,
            left: Link::Vacant,
            right: Link::Vacant,
        }
    }

    #[inline]
    pub(crate) fn is_red(&self) -> bool {
        self.color == Color::Red
    }
}
