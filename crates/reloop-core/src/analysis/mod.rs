//! CFG analyses: predecessor/successor maps, dominators, natural loops.
//!
//! All read-only; transforms recompute them after mutating a function.

pub mod cfg;
pub mod dom;
pub mod loops;

pub use cfg::{branch_targets, Cfg};
pub use dom::Dominators;
pub use loops::{find_loops, NaturalLoop};
