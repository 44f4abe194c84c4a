//! Functions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::define_entity;
use crate::entity::{EntityRef, PrimaryMap};

use super::block::{Block, BlockId};
use super::inst::{Inst, InstId, Op};
use super::ty::{FunctionSig, Type};
use super::value::ValueId;

define_entity!(FuncId);

/// Visibility of a function or global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

/// A function in the IR.
///
/// Blocks, instructions, and value types live in arenas; `layout` is the
/// ordered list of *attached* blocks. A block present in the arena but not
/// in the layout is detached: constructed but not (or no longer) part of
/// this function's body. Detach/retarget operations are plain table edits;
/// arena storage is reclaimed only by the `compact_*` rebuilds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub sig: FunctionSig,
    pub visibility: Visibility,
    pub blocks: PrimaryMap<BlockId, Block>,
    pub insts: PrimaryMap<InstId, Inst>,
    pub value_types: PrimaryMap<ValueId, Type>,
    /// Entry block — always first in the layout.
    pub entry: BlockId,
    /// Attached blocks, in body order.
    pub layout: Vec<BlockId>,
    /// Optional debug names for values. Display-only; value identity is
    /// always the `ValueId`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub value_names: HashMap<ValueId, String>,
}

impl Function {
    /// Create a function with an empty entry block whose params mirror the
    /// signature params.
    pub fn new(name: impl Into<String>, sig: FunctionSig, visibility: Visibility) -> Self {
        let mut func = Function {
            name: name.into(),
            sig,
            visibility,
            blocks: PrimaryMap::new(),
            insts: PrimaryMap::new(),
            value_types: PrimaryMap::new(),
            entry: BlockId::new(0),
            layout: Vec::new(),
            value_names: HashMap::new(),
        };
        let entry = func.create_block();
        func.layout.push(entry);
        func.entry = entry;
        for ty in func.sig.params.clone() {
            let value = func.new_value(ty.clone());
            func.blocks[entry]
                .params
                .push(super::block::BlockParam { value, ty });
        }
        func
    }

    /// Allocate a fresh value of the given type.
    pub fn new_value(&mut self, ty: Type) -> ValueId {
        self.value_types.push(ty)
    }

    /// Create a detached empty block.
    pub fn create_block(&mut self) -> BlockId {
        self.blocks.push(Block::new())
    }

    /// Append a detached block to the layout.
    pub fn attach_block(&mut self, block: BlockId) {
        debug_assert!(!self.layout.contains(&block));
        self.layout.push(block);
    }

    /// Remove a block from the layout. The arena entry survives until
    /// `compact_blocks`.
    pub fn detach_block(&mut self, block: BlockId) {
        self.layout.retain(|&b| b != block);
    }

    /// Allocate an instruction in the arena without placing it in a block.
    pub fn make_inst(&mut self, op: Op, result: Option<ValueId>) -> InstId {
        self.insts.push(Inst { op, result })
    }

    /// The i-th function parameter (entry block param).
    pub fn param(&self, i: usize) -> ValueId {
        self.blocks[self.entry].params[i].value
    }

    /// The terminator instruction of `block`, if its last instruction is one.
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let &last = self.blocks[block].insts.last()?;
        self.insts[last].op.is_terminator().then_some(last)
    }

    /// Iterate attached blocks in layout order.
    pub fn layout_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.layout.iter().copied()
    }

    /// Rebuild the instruction arena, dropping entries no attached block
    /// references. Transforms leave dead arena entries behind; run this
    /// before handing the module to downstream consumers.
    pub fn compact_insts(&mut self) {
        let mut new_insts: PrimaryMap<InstId, Inst> = PrimaryMap::new();
        let mut remap: HashMap<InstId, InstId> = HashMap::new();
        for &block in &self.layout {
            for &inst in &self.blocks[block].insts {
                let new_id = new_insts.push(self.insts[inst].clone());
                remap.insert(inst, new_id);
            }
        }
        for block in self.blocks.values_mut() {
            for inst in &mut block.insts {
                if let Some(&new_id) = remap.get(inst) {
                    *inst = new_id;
                }
            }
        }
        self.insts = new_insts;
    }

    /// Rebuild the block arena, dropping detached entries and renumbering
    /// branch targets. Layout order is preserved.
    pub fn compact_blocks(&mut self) {
        let mut new_blocks: PrimaryMap<BlockId, Block> = PrimaryMap::new();
        let mut remap: HashMap<BlockId, BlockId> = HashMap::new();
        for &block in &self.layout {
            let new_id = new_blocks.push(self.blocks[block].clone());
            remap.insert(block, new_id);
        }
        for block in new_blocks.values() {
            for &inst in &block.insts {
                self.insts[inst].op.retarget(&mut |b| remap[&b]);
            }
        }
        self.layout = self.layout.iter().map(|b| remap[b]).collect();
        self.entry = remap[&self.entry];
        self.blocks = new_blocks;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;

    #[test]
    fn new_function_mirrors_sig_params_on_entry() {
        let sig = FunctionSig {
            params: vec![Type::Int(64), Type::Bool],
            return_ty: Type::Void,
            ..Default::default()
        };
        let func = Function::new("f", sig, Visibility::Public);
        assert_eq!(func.blocks[func.entry].params.len(), 2);
        assert_eq!(func.value_types[func.param(1)], Type::Bool);
    }

    #[test]
    fn detach_removes_from_layout_only() {
        let mut func = Function::new("f", FunctionSig::default(), Visibility::Private);
        let b = func.create_block();
        func.attach_block(b);
        assert_eq!(func.layout.len(), 2);
        func.detach_block(b);
        assert_eq!(func.layout.len(), 1);
        assert_eq!(func.blocks.len(), 2); // arena entry survives
    }

    #[test]
    fn compact_blocks_renumbers_targets() {
        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Void,
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("f", sig, Visibility::Private);
        let dead = fb.create_block();
        let live = fb.create_block();
        fb.br(live, &[]);
        fb.switch_to_block(live);
        fb.ret(None);
        let mut func = fb.build();

        func.detach_block(dead);
        func.compact_insts();
        func.compact_blocks();

        assert_eq!(func.blocks.len(), 2);
        let term = func.terminator(func.entry).unwrap();
        match &func.insts[term].op {
            Op::Br { target, .. } => assert!(func.layout.contains(target)),
            other => panic!("expected Br, got {other:?}"),
        }
    }
}
