//! Predecessor/successor maps for a function's CFG.

use std::collections::HashMap;

use crate::ir::{BlockId, Function, Op};

/// Successor blocks of a terminator, in successor order.
pub fn branch_targets(op: &Op) -> Vec<BlockId> {
    match op {
        Op::Br { target, .. } => vec![*target],
        Op::BrIf {
            then_target,
            else_target,
            ..
        } => vec![*then_target, *else_target],
        _ => Vec::new(),
    }
}

/// Predecessor and successor maps over a function's attached blocks.
pub struct Cfg {
    succs: HashMap<BlockId, Vec<BlockId>>,
    preds: HashMap<BlockId, Vec<BlockId>>,
}

impl Cfg {
    /// Build the maps from the function's layout. Edge order follows layout
    /// and successor order, so iteration is deterministic.
    pub fn compute(func: &Function) -> Cfg {
        let mut succs: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();

        for block in func.layout_blocks() {
            succs.entry(block).or_default();
            preds.entry(block).or_default();
        }

        for block in func.layout_blocks() {
            if let Some(term) = func.terminator(block) {
                for target in branch_targets(&func.insts[term].op) {
                    succs.entry(block).or_default().push(target);
                    preds.entry(target).or_default().push(block);
                }
            }
        }

        Cfg { succs, preds }
    }

    pub fn succs(&self, block: BlockId) -> &[BlockId] {
        self.succs.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn preds(&self, block: BlockId) -> &[BlockId] {
        self.preds.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }
}
