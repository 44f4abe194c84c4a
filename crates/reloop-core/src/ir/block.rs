//! Basic blocks.

use serde::{Deserialize, Serialize};

use crate::define_entity;

use super::inst::InstId;
use super::ty::Type;
use super::value::ValueId;

define_entity!(BlockId);

/// A block parameter — the branch-argument replacement for phi nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockParam {
    pub value: ValueId,
    pub ty: Type,
}

/// A basic block: parameters plus an ordered instruction list ending in
/// exactly one terminator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub params: Vec<BlockParam>,
    pub insts: Vec<InstId>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }
}
