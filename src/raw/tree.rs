use core::cmp::Ordering;

use smallvec::SmallVec;

use super::arena::Arena;
use super::link::{Handle, Link, Pointer};
use super::node::{Color, Node};

/// The threaded order-statistic red-black tree backing `RankSet`.
///
/// This layer works purely in handles and caller-supplied three-way
/// orderings; keys, comparators, and the public contract live in the
/// wrapper. Every mutating operation leaves the tree with:
///
/// - strict BST order over the live keys,
/// - the red-black coloring rules (black root, no red-red edge, equal
///   black counts on every root-to-nil path),
/// - `size` equal to the subtree cardinality on every node,
/// - every missing child slot threaded to the in-order neighbor on that
///   side (the leftmost and rightmost nodes thread outward to the end
///   sentinel),
/// - `leftmost`/`rightmost` tracking the current minimum and maximum.
pub(crate) struct RawTree<K> {
    nodes: Arena<Node<K>>,
    root: Option<Handle>,
    leftmost: Option<Handle>,
    rightmost: Option<Handle>,
}

impl<K> RawTree<K> {
    pub(crate) const fn new() -> Self {
        Self {
            nodes: Arena::new(),
            root: None,
            leftmost: None,
            rightmost: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.root.map_or(0, |root| self.nodes.get(root).size)
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.leftmost = None;
        self.rightmost = None;
    }

    pub(crate) fn root(&self) -> Option<Handle> {
        self.root
    }

    pub(crate) fn leftmost(&self) -> Pointer {
        Pointer::from(self.leftmost)
    }

    pub(crate) fn rightmost(&self) -> Pointer {
        Pointer::from(self.rightmost)
    }

    pub(crate) fn node(&self, handle: Handle) -> &Node<K> {
        self.nodes.get(handle)
    }

    pub(crate) fn key(&self, handle: Handle) -> &K {
        &self.nodes.get(handle).key
    }

    fn node_mut(&mut self, handle: Handle) -> &mut Node<K> {
        self.nodes.get_mut(handle)
    }

    fn subtree_size(&self, link: Link) -> usize {
        link.child().map_or(0, |handle| self.node(handle).size)
    }

    fn is_red(&self, node: Option<Handle>) -> bool {
        node.is_some_and(|handle| self.node(handle).is_red())
    }

    fn is_black(&self, node: Option<Handle>) -> bool {
        !self.is_red(node)
    }

    fn on_left(&self, child: Handle, parent: Handle) -> bool {
        self.node(parent).left.child() == Some(child)
    }

    fn leftmost_desc(&self, mut handle: Handle) -> Handle {
        while let Some(left) = self.node(handle).left.child() {
            handle = left;
        }
        handle
    }

    fn rightmost_desc(&self, mut handle: Handle) -> Handle {
        while let Some(right) = self.node(handle).right.child() {
            handle = right;
        }
        handle
    }

    /// In-order successor by structure alone. Threads are not consulted,
    /// so this stays correct in the middle of a splice.
    fn successor(&self, handle: Handle) -> Pointer {
        if let Some(right) = self.node(handle).right.child() {
            return Pointer::Node(self.leftmost_desc(right));
        }
        let mut child = handle;
        let mut parent = self.node(handle).parent;
        while let Pointer::Node(above) = parent {
            if self.node(above).left.child() == Some(child) {
                return parent;
            }
            child = above;
            parent = self.node(above).parent;
        }
        Pointer::End
    }

    /// In-order predecessor by structure alone.
    fn predecessor(&self, handle: Handle) -> Pointer {
        if let Some(left) = self.node(handle).left.child() {
            return Pointer::Node(self.rightmost_desc(left));
        }
        let mut child = handle;
        let mut parent = self.node(handle).parent;
        while let Pointer::Node(above) = parent {
            if self.node(above).right.child() == Some(child) {
                return parent;
            }
            child = above;
            parent = self.node(above).parent;
        }
        Pointer::End
    }

    /// One iterator step forward: follow the right thread when there is
    /// one, else descend to the smallest node of the right subtree.
    pub(crate) fn advance(&self, at: Pointer) -> Pointer {
        match at {
            Pointer::End => Pointer::End,
            Pointer::Node(handle) => match self.node(handle).right {
                Link::Thread(next) => next,
                Link::Child(right) => Pointer::Node(self.leftmost_desc(right)),
                Link::Vacant => Pointer::End,
            },
        }
    }

    /// One iterator step backward; stepping back from the end lands on the
    /// rightmost node.
    pub(crate) fn retreat(&self, at: Pointer) -> Pointer {
        match at {
            Pointer::End => Pointer::from(self.rightmost),
            Pointer::Node(handle) => match self.node(handle).left {
                Link::Thread(prev) => prev,
                Link::Child(left) => Pointer::Node(self.rightmost_desc(left)),
                Link::Vacant => Pointer::End,
            },
        }
    }

    /// Fill any missing child slot of `handle` with a thread to the
    /// in-order neighbor on that side.
    fn stitch(&mut self, handle: Handle) {
        if !self.node(handle).left.is_child() {
            let prev = self.predecessor(handle);
            self.node_mut(handle).left = Link::Thread(prev);
        }
        if !self.node(handle).right.is_child() {
            let next = self.successor(handle);
            self.node_mut(handle).right = Link::Thread(next);
        }
    }

    /// After a splice changed what sits between `prev` and `next`, refresh
    /// the threads facing the gap.
    fn restitch_neighbors(&mut self, prev: Pointer, next: Pointer) {
        if let Pointer::Node(before) = prev {
            if !self.node(before).right.is_child() {
                let target = self.successor(before);
                self.node_mut(before).right = Link::Thread(target);
            }
        }
        if let Pointer::Node(after) = next {
            if !self.node(after).left.is_child() {
                let target = self.predecessor(after);
                self.node_mut(after).left = Link::Thread(target);
            }
        }
    }

    fn add_sizes_up(&mut self, from: Pointer) {
        let mut current = from;
        while let Pointer::Node(handle) = current {
            self.node_mut(handle).size += 1;
            current = self.node(handle).parent;
        }
    }

    fn sub_sizes_up(&mut self, from: Pointer) {
        let mut current = from;
        while let Pointer::Node(handle) = current {
            self.node_mut(handle).size -= 1;
            current = self.node(handle).parent;
        }
    }

    /// Point whatever held `u` (the parent slot or the root anchor) at
    /// `v`, fixing `v`'s parent pointer. `u` itself is left dangling.
    fn transplant(&mut self, u: Handle, v: Option<Handle>) {
        let parent = self.node(u).parent;
        if let Some(v) = v {
            self.node_mut(v).parent = parent;
        }
        let link = match v {
            Some(v) => Link::Child(v),
            None => Link::Vacant,
        };
        match parent {
            Pointer::End => self.root = v,
            Pointer::Node(above) => {
                if self.on_left(u, above) {
                    self.node_mut(above).left = link;
                } else {
                    self.node_mut(above).right = link;
                }
            }
        }
    }

    /// Rotate the edge between `x` and its left child, which must exist.
    /// Subtree sizes and any vacated thread are repaired locally.
    fn rotate_right(&mut self, x: Handle) {
        let Some(pivot) = self.node(x).left.child() else {
            return;
        };

        // The pivot takes x's place under x's parent or as the root.
        let parent = self.node(x).parent;
        self.node_mut(pivot).parent = parent;
        match parent {
            Pointer::End => self.root = Some(pivot),
            Pointer::Node(above) => {
                if self.on_left(x, above) {
                    self.node_mut(above).left = Link::Child(pivot);
                } else {
                    self.node_mut(above).right = Link::Child(pivot);
                }
            }
        }

        // The pivot's right subtree moves under x. Without one, x's left
        // slot threads to the pivot, its predecessor after the turn.
        match self.node(pivot).right {
            Link::Child(moved) => {
                self.node_mut(x).left = Link::Child(moved);
                self.node_mut(moved).parent = Pointer::Node(x);
            }
            Link::Thread(_) | Link::Vacant => self.node_mut(x).left = Link::Thread(Pointer::Node(pivot)),
        }

        self.node_mut(pivot).right = Link::Child(x);
        self.node_mut(x).parent = Pointer::Node(pivot);

        let x_shrinks = 1 + self.subtree_size(self.node(pivot).left);
        self.node_mut(x).size -= x_shrinks;
        let pivot_grows = 1 + self.subtree_size(self.node(x).right);
        self.node_mut(pivot).size += pivot_grows;
    }

    /// Mirror of [`Self::rotate_right`].
    fn rotate_left(&mut self, x: Handle) {
        let Some(pivot) = self.node(x).right.child() else {
            return;
        };

        let parent = self.node(x).parent;
        self.node_mut(pivot).parent = parent;
        match parent {
            Pointer::End => self.root = Some(pivot),
            Pointer::Node(above) => {
                if self.on_left(x, above) {
                    self.node_mut(above).left = Link::Child(pivot);
                } else {
                    self.node_mut(above).right = Link::Child(pivot);
                }
            }
        }

        match self.node(pivot).left {
            Link::Child(moved) => {
                self.node_mut(x).right = Link::Child(moved);
                self.node_mut(moved).parent = Pointer::Node(x);
            }
            Link::Thread(_) | Link::Vacant => self.node_mut(x).right = Link::Thread(Pointer::Node(pivot)),
        }

        self.node_mut(pivot).left = Link::Child(x);
        self.node_mut(x).parent = Pointer::Node(pivot);

        let x_shrinks = 1 + self.subtree_size(self.node(pivot).right);
        self.node_mut(x).size -= x_shrinks;
        let pivot_grows = 1 + self.subtree_size(self.node(x).left);
        self.node_mut(pivot).size += pivot_grows;
    }

    /// Locates the node equivalent to the probe. `ord` reports the probe's
    /// ordering relative to a resident key.
    pub(crate) fn find(&self, mut ord: impl FnMut(&K) -> Ordering) -> Pointer {
        let mut current = self.root;
        while let Some(handle) = current {
            match ord(&self.node(handle).key) {
                Ordering::Less => current = self.node(handle).left.child(),
                Ordering::Greater => current = self.node(handle).right.child(),
                Ordering::Equal => return Pointer::Node(handle),
            }
        }
        Pointer::End
    }

    /// First node whose key is not less than the probe.
    pub(crate) fn lower_bound(&self, mut ord: impl FnMut(&K) -> Ordering) -> Pointer {
        let mut best = Pointer::End;
        let mut current = self.root;
        while let Some(handle) = current {
            if ord(&self.node(handle).key) == Ordering::Greater {
                current = self.node(handle).right.child();
            } else {
                best = Pointer::Node(handle);
                current = self.node(handle).left.child();
            }
        }
        best
    }

    /// First node whose key is greater than the probe.
    pub(crate) fn upper_bound(&self, mut ord: impl FnMut(&K) -> Ordering) -> Pointer {
        let mut best = Pointer::End;
        let mut current = self.root;
        while let Some(handle) = current {
            if ord(&self.node(handle).key) == Ordering::Less {
                best = Pointer::Node(handle);
                current = self.node(handle).left.child();
            } else {
                current = self.node(handle).right.child();
            }
        }
        best
    }

    /// Number of keys strictly below the probe.
    ///
    /// Starts at the lower bound and climbs to the root, banking the left
    /// sibling subtree (plus the parent) each time the climb comes up from
    /// a right child. The banked nodes are exactly those preceding the
    /// lower bound in order.
    pub(crate) fn count_less(&self, ord: impl FnMut(&K) -> Ordering) -> usize {
        let Pointer::Node(bound) = self.lower_bound(ord) else {
            return self.len();
        };
        let mut count = self.subtree_size(self.node(bound).left);
        let mut current = bound;
        while let Pointer::Node(parent) = self.node(current).parent {
            if self.node(parent).right.child() == Some(current) {
                count += 1 + self.subtree_size(self.node(parent).left);
            }
            current = parent;
        }
        count
    }

    /// Splices `key` in and rebalances. Returns the new node and `true`,
    /// or the end pointer and `false` when an equivalent key is already
    /// present; in that case nothing was allocated and the tree is
    /// untouched. `ord` orders the probe (first argument) against a
    /// resident key.
    pub(crate) fn insert(&mut self, key: K, mut ord: impl FnMut(&K, &K) -> Ordering) -> (Pointer, bool) {
        let Some(root) = self.root else {
            let handle = self.nodes.alloc(Node::new(key));
            let node = self.nodes.get_mut(handle);
            node.color = Color::Black;
            node.left = Link::Thread(Pointer::End);
            node.right = Link::Thread(Pointer::End);
            self.root = Some(handle);
            self.leftmost = Some(handle);
            self.rightmost = Some(handle);
            return (Pointer::Node(handle), true);
        };

        let mut current = root;
        let (parent, went_right) = loop {
            let node = self.node(current);
            match ord(&key, &node.key) {
                Ordering::Less => match node.left.child() {
                    Some(left) => current = left,
                    None => break (current, false),
                },
                Ordering::Greater => match node.right.child() {
                    Some(right) => current = right,
                    None => break (current, true),
                },
                Ordering::Equal => return (Pointer::End, false),
            }
        };

        let handle = self.nodes.alloc(Node::new(key));
        self.nodes.get_mut(handle).parent = Pointer::Node(parent);
        if went_right {
            self.node_mut(parent).right = Link::Child(handle);
            if self.rightmost == Some(parent) {
                self.rightmost = Some(handle);
            }
        } else {
            self.node_mut(parent).left = Link::Child(handle);
            if self.leftmost == Some(parent) {
                self.leftmost = Some(handle);
            }
        }
        self.add_sizes_up(Pointer::Node(parent));

        // Thread the new node outward, then re-aim the neighbors' threads
        // at it; they previously shortcut across this spot.
        let prev = self.predecessor(handle);
        let next = self.successor(handle);
        self.stitch(handle);
        self.restitch_neighbors(prev, next);

        self.insert_fixup(handle);
        (Pointer::Node(handle), true)
    }

    fn insert_fixup(&mut self, inserted: Handle) {
        let mut x = inserted;
        while let Pointer::Node(parent) = self.node(x).parent {
            if !self.node(parent).is_red() {
                break;
            }
            // A red parent is never the root, so the grandparent exists.
            let Pointer::Node(grand) = self.node(parent).parent else {
                break;
            };
            if self.on_left(parent, grand) {
                match self.node(grand).right.child() {
                    Some(uncle) if self.node(uncle).is_red() => {
                        self.node_mut(uncle).color = Color::Black;
                        self.node_mut(parent).color = Color::Black;
                        self.node_mut(grand).color = Color::Red;
                        x = grand;
                    }
                    _ => {
                        let pivot = if self.on_left(x, parent) {
                            parent
                        } else {
                            self.rotate_left(parent);
                            x
                        };
                        self.node_mut(pivot).color = Color::Black;
                        self.node_mut(grand).color = Color::Red;
                        self.rotate_right(grand);
                        break;
                    }
                }
            } else {
                match self.node(grand).left.child() {
                    Some(uncle) if self.node(uncle).is_red() => {
                        self.node_mut(uncle).color = Color::Black;
                        self.node_mut(parent).color = Color::Black;
                        self.node_mut(grand).color = Color::Red;
                        x = grand;
                    }
                    _ => {
                        let pivot = if self.on_left(x, parent) {
                            self.rotate_right(parent);
                            x
                        } else {
                            parent
                        };
                        self.node_mut(pivot).color = Color::Black;
                        self.node_mut(grand).color = Color::Red;
                        self.rotate_left(grand);
                        break;
                    }
                }
            }
        }
        if let Some(root) = self.root {
            self.node_mut(root).color = Color::Black;
        }
    }

    /// Unlinks the node at `z`, restores every invariant, and frees it.
    /// Returns the pointer to `z`'s former in-order successor.
    pub(crate) fn remove(&mut self, z: Handle) -> Pointer {
        let prev = self.predecessor(z);
        let next = self.successor(z);

        let z_left = self.node(z).left.child();
        let z_right = self.node(z).right.child();

        // `x` is the subtree (possibly empty) that takes over the position
        // actually vacated; `parent_of_x` is where rebalancing starts and
        // where the size decrements begin.
        let x;
        let parent_of_x;
        let removed_color;

        if let (Some(z_left), Some(z_right)) = (z_left, z_right) {
            // Two children: the successor y is unlinked from its own spot
            // and grafted into z's, inheriting z's color and subtree size.
            let y = self.leftmost_desc(z_right);
            x = self.node(y).right.child();

            self.node_mut(z_left).parent = Pointer::Node(y);
            self.node_mut(y).left = Link::Child(z_left);

            if y == z_right {
                parent_of_x = Pointer::Node(y);
            } else {
                let y_parent = self.node(y).parent;
                parent_of_x = y_parent;
                if let Some(x) = x {
                    self.node_mut(x).parent = y_parent;
                }
                if let Pointer::Node(y_parent) = y_parent {
                    // y was its parent's left child.
                    self.node_mut(y_parent).left = match x {
                        Some(x) => Link::Child(x),
                        None => Link::Vacant,
                    };
                }
                self.node_mut(y).right = Link::Child(z_right);
                self.node_mut(z_right).parent = Pointer::Node(y);
            }

            self.transplant(z, Some(y));

            removed_color = self.node(y).color;
            let z_color = self.node(z).color;
            let z_size = self.node(z).size;
            let y_node = self.node_mut(y);
            y_node.color = z_color;
            y_node.size = z_size;

            if let Pointer::Node(below) = parent_of_x {
                self.stitch(below);
            }
        } else {
            // At most one child: that child (or nothing) replaces z.
            x = z_left.or(z_right);
            parent_of_x = self.node(z).parent;
            removed_color = self.node(z).color;
            if let Some(x) = x {
                self.node_mut(x).parent = parent_of_x;
            }
            self.transplant(z, x);
            if let Pointer::Node(below) = parent_of_x {
                self.stitch(below);
            }
            if self.leftmost == Some(z) {
                self.leftmost = match z_right {
                    Some(right) => Some(self.leftmost_desc(right)),
                    None => parent_of_x.node(),
                };
            }
            if self.rightmost == Some(z) {
                self.rightmost = match z_left {
                    Some(left) => Some(self.rightmost_desc(left)),
                    None => parent_of_x.node(),
                };
            }
        }

        self.restitch_neighbors(prev, next);
        self.sub_sizes_up(parent_of_x);

        if removed_color == Color::Black {
            self.remove_rebalance(x, parent_of_x);
        }

        self.nodes.free(z);
        next
    }

    fn remove_rebalance(&mut self, mut x: Option<Handle>, mut parent: Pointer) {
        while x != self.root && self.is_black(x) {
            let Pointer::Node(above) = parent else {
                break;
            };
            let x_on_left = self.node(above).left.child() == x;

            let mut sibling = if x_on_left {
                self.node(above).right.child()
            } else {
                self.node(above).left.child()
            };

            // A red sibling rotates over so the new sibling is black.
            if let Some(w) = sibling {
                if self.node(w).is_red() {
                    self.node_mut(w).color = Color::Black;
                    self.node_mut(above).color = Color::Red;
                    if x_on_left {
                        self.rotate_left(above);
                        sibling = self.node(above).right.child();
                    } else {
                        self.rotate_right(above);
                        sibling = self.node(above).left.child();
                    }
                }
            }
            let Some(mut w) = sibling else {
                break;
            };

            let w_left = self.node(w).left.child();
            let w_right = self.node(w).right.child();
            if self.is_black(w_left) && self.is_black(w_right) {
                // Both nephews black: push the deficit up one level.
                self.node_mut(w).color = Color::Red;
                x = Some(above);
                parent = self.node(above).parent;
                continue;
            }

            if x_on_left {
                if self.is_black(w_right) {
                    // Near nephew red, far one black: turn it outward.
                    if let Some(near) = w_left {
                        self.node_mut(near).color = Color::Black;
                    }
                    self.node_mut(w).color = Color::Red;
                    self.rotate_right(w);
                    match self.node(above).right.child() {
                        Some(new_sibling) => w = new_sibling,
                        None => break,
                    }
                }
                let above_color = self.node(above).color;
                self.node_mut(w).color = above_color;
                self.node_mut(above).color = Color::Black;
                if let Some(far) = self.node(w).right.child() {
                    self.node_mut(far).color = Color::Black;
                }
                self.rotate_left(above);
            } else {
                if self.is_black(w_left) {
                    if let Some(near) = w_right {
                        self.node_mut(near).color = Color::Black;
                    }
                    self.node_mut(w).color = Color::Red;
                    self.rotate_left(w);
                    match self.node(above).left.child() {
                        Some(new_sibling) => w = new_sibling,
                        None => break,
                    }
                }
                let above_color = self.node(above).color;
                self.node_mut(w).color = above_color;
                self.node_mut(above).color = Color::Black;
                if let Some(far) = self.node(w).left.child() {
                    self.node_mut(far).color = Color::Black;
                }
                self.rotate_right(above);
            }
            break;
        }

        if let Some(x) = x {
            self.node_mut(x).color = Color::Black;
        }
    }

    /// Empties the tree into a sorted vector of keys.
    ///
    /// The walk reads each node's links before taking it, so a single
    /// forward pass never touches a freed slot.
    pub(crate) fn drain_to_vec(&mut self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.len());
        let mut at = Pointer::from(self.leftmost);
        while let Pointer::Node(handle) = at {
            at = self.advance(at);
            keys.push(self.nodes.take(handle).key);
        }
        self.nodes.clear();
        self.root = None;
        self.leftmost = None;
        self.rightmost = None;
        keys
    }
}

impl<K: Clone> RawTree<K> {
    /// Structural copy: the node graph is rebuilt by parent-chasing (no
    /// recursion, no auxiliary state per level), then a second pass lays
    /// the copy's threads. Colors and sizes carry over verbatim.
    pub(crate) fn clone_tree(&self) -> Self {
        let Some(src_root) = self.root else {
            return Self::new();
        };

        let mut copy = Self::new();
        let root_copy = copy.nodes.alloc(self.detached_clone_of(src_root));
        copy.root = Some(root_copy);

        let mut src = src_root;
        let mut dst = root_copy;
        loop {
            if let (Some(src_left), false) = (self.node(src).left.child(), copy.node(dst).left.is_child()) {
                let child = copy.nodes.alloc(self.detached_clone_of(src_left));
                copy.node_mut(child).parent = Pointer::Node(dst);
                copy.node_mut(dst).left = Link::Child(child);
                src = src_left;
                dst = child;
            } else if let (Some(src_right), false) = (self.node(src).right.child(), copy.node(dst).right.is_child()) {
                let child = copy.nodes.alloc(self.detached_clone_of(src_right));
                copy.node_mut(child).parent = Pointer::Node(dst);
                copy.node_mut(dst).right = Link::Child(child);
                src = src_right;
                dst = child;
            } else {
                // Both sides copied: note cursor positions on the way out.
                if self.leftmost == Some(src) {
                    copy.leftmost = Some(dst);
                }
                if self.rightmost == Some(src) {
                    copy.rightmost = Some(dst);
                }
                let (Pointer::Node(src_up), Pointer::Node(dst_up)) = (self.node(src).parent, copy.node(dst).parent)
                else {
                    break;
                };
                src = src_up;
                dst = dst_up;
            }
        }

        copy.stitch_subtree(root_copy);
        copy
    }

    fn detached_clone_of(&self, handle: Handle) -> Node<K> {
        let node = self.node(handle);
        Node {
            key: node.key.clone(),
            color: node.color,
            size: node.size,
            parent: Pointer::End,
            left: Link::Vacant,
            right: Link::Vacant,
        }
    }

    /// Lay threads on every node of the subtree, preorder with an explicit
    /// stack.
    fn stitch_subtree(&mut self, root: Handle) {
        let mut stack: SmallVec<[Handle; 32]> = SmallVec::new();
        let mut current = Some(root);
        loop {
            while let Some(handle) = current {
                self.stitch(handle);
                if let Some(right) = self.node(handle).right.child() {
                    stack.push(right);
                }
                current = self.node(handle).left.child();
            }
            match stack.pop() {
                Some(handle) => current = Some(handle),
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn natural(a: &i32, b: &i32) -> Ordering {
        a.cmp(b)
    }

    impl<K: Ord + core::fmt::Debug> RawTree<K> {
        /// Asserts every structural invariant; used after each mutation in
        /// the tests below.
        fn check_invariants(&self) {
            assert_eq!(self.nodes.len(), self.len(), "arena and tree disagree on node count");

            let Some(root) = self.root else {
                assert_eq!(self.leftmost, None);
                assert_eq!(self.rightmost, None);
                return;
            };

            assert_eq!(self.node(root).parent, Pointer::End, "root parent must be the sentinel");
            assert_eq!(self.node(root).color, Color::Black, "root must be black");
            assert_eq!(self.leftmost, Some(self.leftmost_desc(root)));
            assert_eq!(self.rightmost, Some(self.rightmost_desc(root)));
            self.check_subtree(root);

            // A full thread walk visits every key once, in order, and ends
            // on the sentinel.
            let mut count = 0;
            let mut previous: Option<&K> = None;
            let mut at = self.leftmost();
            while let Pointer::Node(handle) = at {
                let key = &self.node(handle).key;
                if let Some(previous) = previous {
                    assert!(previous < key, "thread walk out of order");
                }
                previous = Some(key);
                count += 1;
                at = self.advance(at);
            }
            assert_eq!(count, self.len(), "thread walk misses or repeats nodes");

            // And the reverse walk agrees.
            let mut count = 0;
            let mut at = self.retreat(Pointer::End);
            while let Pointer::Node(_) = at {
                count += 1;
                at = self.retreat(at);
            }
            assert_eq!(count, self.len(), "reverse thread walk misses or repeats nodes");
        }

        /// Returns the subtree's black height.
        fn check_subtree(&self, handle: Handle) -> usize {
            let node = self.node(handle);
            if node.is_red() {
                assert!(
                    self.is_black(node.left.child()) && self.is_black(node.right.child()),
                    "red node {:?} has a red child",
                    node.key
                );
            }

            let mut size = 1;
            let left_height = match node.left {
                Link::Child(left) => {
                    assert_eq!(self.node(left).parent, Pointer::Node(handle), "left child parent link broken");
                    size += self.node(left).size;
                    self.check_subtree(left)
                }
                Link::Thread(target) => {
                    assert_eq!(target, self.predecessor(handle), "left thread must aim at the predecessor");
                    0
                }
                Link::Vacant => panic!("left slot of {:?} left vacant", node.key),
            };
            let right_height = match node.right {
                Link::Child(right) => {
                    assert_eq!(self.node(right).parent, Pointer::Node(handle), "right child parent link broken");
                    size += self.node(right).size;
                    self.check_subtree(right)
                }
                Link::Thread(target) => {
                    assert_eq!(target, self.successor(handle), "right thread must aim at the successor");
                    0
                }
                Link::Vacant => panic!("right slot of {:?} left vacant", node.key),
            };

            assert_eq!(left_height, right_height, "black height mismatch under {:?}", node.key);
            assert_eq!(node.size, size, "subtree size of {:?} out of date", node.key);
            left_height + usize::from(!node.is_red())
        }
    }

    fn build(keys: &[i32]) -> RawTree<i32> {
        let mut tree = RawTree::new();
        for &key in keys {
            tree.insert(key, natural);
        }
        tree
    }

    #[test]
    fn insert_basics() {
        let mut tree = RawTree::new();
        tree.check_invariants();

        for (index, key) in [5, 3, 8, 1, 4, 7, 9, 2, 6].into_iter().enumerate() {
            let (at, inserted) = tree.insert(key, natural);
            assert!(inserted);
            assert!(!at.is_end());
            assert_eq!(tree.len(), index + 1);
            tree.check_invariants();
        }

        let (at, inserted) = tree.insert(5, natural);
        assert!(at.is_end());
        assert!(!inserted);
        assert_eq!(tree.len(), 9);
        tree.check_invariants();
    }

    #[test]
    fn remove_two_child_nodes_keeps_sizes() {
        // Erasing a node with two children splices its successor in; the
        // successor path sizes must follow.
        let mut tree = build(&[2, 1, 4, 3, 5]);
        let root = tree.root().unwrap();
        assert_eq!(tree.key(root), &2);

        tree.remove(root);
        tree.check_invariants();
        assert_eq!(tree.count_less(|k| 10.cmp(k)), 4);

        let root = tree.root().unwrap();
        tree.remove(root);
        tree.check_invariants();
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn remove_returns_successor() {
        let mut tree = build(&[10, 20, 30]);
        let Pointer::Node(handle) = tree.find(|k| 20.cmp(k)) else {
            panic!("20 not found");
        };
        let next = tree.remove(handle);
        let Pointer::Node(next) = next else {
            panic!("successor of 20 should be 30");
        };
        assert_eq!(tree.key(next), &30);

        let next = tree.remove(next);
        assert_eq!(next, Pointer::End);
        tree.check_invariants();
    }

    #[test]
    fn count_less_is_a_rank() {
        let tree = build(&[1, 3, 4, 5, 6, 8, 10]);
        for (probe, expected) in [(0, 0), (1, 0), (2, 1), (5, 3), (6, 4), (7, 5), (10, 6), (11, 7)] {
            assert_eq!(tree.count_less(|k| probe.cmp(k)), expected, "count_less({probe})");
        }
    }

    #[test]
    fn bounds_land_on_candidates() {
        let tree = build(&[1, 3, 5, 7, 9]);

        let Pointer::Node(lb) = tree.lower_bound(|k| 4.cmp(k)) else {
            panic!("lower_bound(4) should exist");
        };
        assert_eq!(tree.key(lb), &5);

        let Pointer::Node(ub) = tree.upper_bound(|k| 5.cmp(k)) else {
            panic!("upper_bound(5) should exist");
        };
        assert_eq!(tree.key(ub), &7);

        assert!(tree.lower_bound(|k| 10.cmp(k)).is_end());
        assert!(tree.upper_bound(|k| 9.cmp(k)).is_end());
    }

    #[test]
    fn clone_tree_matches_source() {
        let tree = build(&[8, 4, 12, 2, 6, 10, 14, 1, 3]);
        let copy = tree.clone_tree();
        copy.check_invariants();
        assert_eq!(copy.len(), tree.len());

        let mut at = tree.leftmost();
        let mut at_copy = copy.leftmost();
        while let (Pointer::Node(a), Pointer::Node(b)) = (at, at_copy) {
            assert_eq!(tree.key(a), copy.key(b));
            at = tree.advance(at);
            at_copy = copy.advance(at_copy);
        }
        assert!(at.is_end() && at_copy.is_end());
    }

    #[test]
    fn drain_yields_sorted_keys() {
        let mut tree = build(&[5, 1, 4, 2, 3]);
        assert_eq!(tree.drain_to_vec(), vec![1, 2, 3, 4, 5]);
        assert!(tree.is_empty());
        tree.check_invariants();
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(i16),
        Remove(i16),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => any::<i16>().prop_map(|k| Op::Insert(k % 200)),
            2 => any::<i16>().prop_map(|k| Op::Remove(k % 200)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Every invariant holds after every single mutation of a random
        /// insert/remove sequence.
        #[test]
        fn random_ops_preserve_invariants(ops in prop::collection::vec(op_strategy(), 1..300)) {
            let mut tree: RawTree<i32> = RawTree::new();
            let mut model = std::collections::BTreeSet::new();

            for op in ops {
                match op {
                    Op::Insert(key) => {
                        let key = i32::from(key);
                        let (_, inserted) = tree.insert(key, natural);
                        prop_assert_eq!(inserted, model.insert(key));
                    }
                    Op::Remove(key) => {
                        let key = i32::from(key);
                        match tree.find(|k| key.cmp(k)) {
                            Pointer::Node(handle) => {
                                tree.remove(handle);
                                prop_assert!(model.remove(&key));
                            }
                            Pointer::End => prop_assert!(!model.remove(&key)),
                        }
                    }
                }
                tree.check_invariants();
                prop_assert_eq!(tree.len(), model.len());
            }

            // Rank oracle over the survivors.
            for probe in [-250, -3, 0, 3, 50, 199, 250] {
                let expected = model.iter().filter(|&&k| k < probe).count();
                prop_assert_eq!(tree.count_less(|k| probe.cmp(k)), expected);
            }
        }
    }
}
