mod arena;
mod link;
mod node;
mod tree;

pub(crate) use link::{Handle, Link, Pointer};
pub(crate) use node::Color;
pub(crate) use tree::RawTree;
