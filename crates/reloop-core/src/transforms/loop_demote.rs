//! Loop state demotion.
//!
//! `loop-extract` moves a loop body into its own function and re-enters it
//! once per iteration, so no SSA value may cross the loop boundary in
//! either direction: loop-carried state must round-trip through memory the
//! extracted body can reach via a captured pointer, and values the rest of
//! the function reads after the loop must land in memory before the loop's
//! blocks disappear. This pass establishes that shape:
//!
//! - block params of loop headers (the loop-carried values) are demoted to
//!   entry-block `Alloc` slots: every predecessor stores its branch arg,
//!   the header reloads at its top;
//! - block params of loop exit blocks are demoted the same way, emptying
//!   the exit edge's argument list;
//! - any other value defined inside a loop and used outside it is stored
//!   right after its definition and reloaded in each using block.
//!
//! Params of blocks strictly inside a loop (merge points in the body) are
//! left alone — they relocate with the loop.

use std::collections::{HashMap, HashSet};

use crate::analysis::{find_loops, Cfg, Dominators};
use crate::error::CoreError;
use crate::ir::{BlockId, Function, Module, Op, Type, ValueId};
use crate::pipeline::{Transform, TransformResult};

pub struct LoopDemote;

impl Transform for LoopDemote {
    fn name(&self) -> &str {
        "loop-demote"
    }

    fn apply(&self, mut module: Module) -> Result<TransformResult, CoreError> {
        let mut changed = false;
        for func in module.functions.values_mut() {
            while demote_one(func) {
                changed = true;
            }
        }
        Ok(TransformResult { module, changed })
    }
}

/// Perform the first applicable demotion. Returns whether anything changed.
fn demote_one(func: &mut Function) -> bool {
    let cfg = Cfg::compute(func);
    let dom = Dominators::compute(func, &cfg);
    let loops = find_loops(func, &cfg, &dom);

    for l in &loops {
        // Loop-carried values. Headers that are still the function entry are
        // left for loop-simplify to rehome first.
        if l.header != func.entry && !func.blocks[l.header].params.is_empty() {
            demote_block_params(func, l.header, &cfg);
            return true;
        }

        // Exit-edge arguments.
        for exit in l.exit_blocks(func, &cfg) {
            if !func.blocks[exit].params.is_empty() {
                demote_block_params(func, exit, &cfg);
                return true;
            }
        }

        // Remaining live-outs.
        if let Some((value, def)) = find_live_out(func, l) {
            demote_live_out(func, value, def);
            return true;
        }
    }
    false
}

/// Where a live-out value is defined.
enum DefSite {
    Inst { block: BlockId, index: usize },
    Param { block: BlockId },
}

/// First value defined inside `l` and used by an instruction outside it,
/// scanning in layout order.
fn find_live_out(func: &Function, l: &crate::analysis::NaturalLoop) -> Option<(ValueId, DefSite)> {
    let mut defs: Vec<(ValueId, DefSite)> = Vec::new();
    let mut inside: HashSet<ValueId> = HashSet::new();
    for block in l.blocks_in_layout_order(func) {
        for param in &func.blocks[block].params {
            inside.insert(param.value);
            defs.push((param.value, DefSite::Param { block }));
        }
        for (index, &inst) in func.blocks[block].insts.iter().enumerate() {
            if let Some(result) = func.insts[inst].result {
                inside.insert(result);
                defs.push((result, DefSite::Inst { block, index }));
            }
        }
    }

    let mut used_outside: HashSet<ValueId> = HashSet::new();
    for block in func.layout_blocks().filter(|b| !l.contains(*b)) {
        for &inst in &func.blocks[block].insts {
            for operand in func.insts[inst].op.operands() {
                if inside.contains(&operand) {
                    used_outside.insert(operand);
                }
            }
        }
    }

    defs.into_iter().find(|(v, _)| used_outside.contains(v))
}

/// Demote every param of `block` to an entry-block slot: predecessors store
/// their branch args, the block reloads at its top.
fn demote_block_params(func: &mut Function, block: BlockId, cfg: &Cfg) {
    let params = func.blocks[block].params.clone();

    // One slot per param, allocated at the top of the entry block so it
    // dominates every store and load.
    let mut slots = Vec::with_capacity(params.len());
    for (i, param) in params.iter().enumerate() {
        let slot = func.new_value(Type::ptr(param.ty.clone()));
        let alloc = func.make_inst(Op::Alloc(param.ty.clone()), Some(slot));
        let entry = func.entry;
        func.blocks[entry].insts.insert(i, alloc);
        slots.push(slot);
    }

    // Each predecessor stores its args, then drops them from the edge.
    let mut preds: Vec<BlockId> = cfg.preds(block).to_vec();
    preds.dedup();
    for pred in preds {
        let Some(term) = func.terminator(pred) else {
            continue;
        };
        let args = edge_args(&func.insts[term].op, block);
        let mut stores = Vec::with_capacity(args.len());
        for (&slot, &arg) in slots.iter().zip(&args) {
            stores.push(func.make_inst(Op::Store { ptr: slot, value: arg }, None));
        }
        let pos = func.blocks[pred].insts.len() - 1;
        for (i, store) in stores.into_iter().enumerate() {
            func.blocks[pred].insts.insert(pos + i, store);
        }
        clear_edge_args(&mut func.insts[term].op, block);
    }

    // Reload at the top of the block and route old uses to the loads.
    let mut replacement: HashMap<ValueId, ValueId> = HashMap::new();
    let mut loads = Vec::with_capacity(params.len());
    for (param, &slot) in params.iter().zip(&slots) {
        let value = func.new_value(param.ty.clone());
        loads.push(func.make_inst(Op::Load(slot), Some(value)));
        replacement.insert(param.value, value);
    }
    func.blocks[block].insts.splice(0..0, loads);
    func.blocks[block].params.clear();

    for b in func.layout.clone() {
        for inst in func.blocks[b].insts.clone() {
            func.insts[inst]
                .op
                .map_operands(&mut |v| *replacement.get(&v).unwrap_or(&v));
        }
    }
}

/// Branch args flowing from this terminator into `target`.
fn edge_args(op: &Op, target: BlockId) -> Vec<ValueId> {
    match op {
        Op::Br { target: t, args } if *t == target => args.clone(),
        Op::BrIf {
            then_target,
            then_args,
            else_target,
            else_args,
            ..
        } => {
            if *then_target == target {
                debug_assert!(*else_target != target || then_args == else_args);
                then_args.clone()
            } else if *else_target == target {
                else_args.clone()
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

/// Remove branch args on every edge from this terminator into `target`.
fn clear_edge_args(op: &mut Op, target: BlockId) {
    match op {
        Op::Br { target: t, args } if *t == target => args.clear(),
        Op::BrIf {
            then_target,
            then_args,
            else_target,
            else_args,
            ..
        } => {
            if *then_target == target {
                then_args.clear();
            }
            if *else_target == target {
                else_args.clear();
            }
        }
        _ => {}
    }
}

/// Store `value` to a fresh slot right after its definition and reload it
/// in every block outside the defining loop that uses it.
fn demote_live_out(func: &mut Function, value: ValueId, def: DefSite) {
    let ty = func.value_types[value].clone();
    let slot = func.new_value(Type::ptr(ty.clone()));

    // Store before alloc insertion: the def index must not shift under us.
    let store = func.make_inst(Op::Store { ptr: slot, value }, None);
    match def {
        DefSite::Inst { block, index } => {
            func.blocks[block].insts.insert(index + 1, store);
        }
        DefSite::Param { block } => {
            func.blocks[block].insts.insert(0, store);
        }
    }

    let alloc = func.make_inst(Op::Alloc(ty.clone()), Some(slot));
    let entry = func.entry;
    func.blocks[entry].insts.insert(0, alloc);

    // Every using block other than the defining one reloads. Each original
    // use was dominated by the definition, so the store has always executed
    // by the time a reload runs; reloads inside the loop read what the
    // current iteration just stored.
    let def_block = match def {
        DefSite::Inst { block, .. } | DefSite::Param { block } => block,
    };
    for b in func.layout.clone() {
        if b == def_block {
            continue;
        }
        let uses_value = func.blocks[b]
            .insts
            .iter()
            .any(|&i| func.insts[i].op.operands().contains(&value));
        if !uses_value {
            continue;
        }
        let reload = func.new_value(ty.clone());
        let load = func.make_inst(Op::Load(slot), Some(reload));
        let first_use = func.blocks[b]
            .insts
            .iter()
            .position(|&i| func.insts[i].op.operands().contains(&value))
            .unwrap();
        func.blocks[b].insts.insert(first_use, load);
        for inst in func.blocks[b].insts.clone() {
            func.insts[inst]
                .op
                .map_operands(&mut |v| if v == value { reload } else { v });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::ir::builder::{FunctionBuilder, ModuleBuilder};
    use crate::ir::{CmpKind, FuncId, FunctionSig, Visibility};
    use crate::transforms::util::test_helpers::assert_well_formed;

    fn apply(func: Function) -> (Module, bool) {
        let mut mb = ModuleBuilder::new("test");
        mb.add_function(func);
        let result = LoopDemote.apply(mb.build()).unwrap();
        (result.module, result.changed)
    }

    /// Counter loop carried through a header param, result used after the
    /// loop: both the param and the live-out must end up in memory.
    fn counter_loop() -> Function {
        let sig = FunctionSig {
            params: vec![Type::Int(64)],
            return_ty: Type::Int(64),
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("count", sig, Visibility::Public);
        let limit = fb.param(0);
        let (head, head_vals) = fb.create_block_with_params(&[Type::Int(64)]);
        let body = fb.create_block();
        let done = fb.create_block();

        let zero = fb.const_int(0);
        fb.br(head, &[zero]);

        fb.switch_to_block(head);
        let i = head_vals[0];
        let c = fb.cmp(CmpKind::Lt, i, limit);
        fb.br_if(c, body, &[], done, &[]);

        fb.switch_to_block(body);
        let one = fb.const_int(1);
        let next = fb.add(i, one);
        fb.br(head, &[next]);

        fb.switch_to_block(done);
        fb.ret(Some(i));
        fb.build()
    }

    #[test]
    fn header_params_and_live_outs_go_through_memory() {
        let (module, changed) = apply(counter_loop());
        assert!(changed);
        let func = &module.functions[FuncId::new(0)];
        assert_well_formed(func);

        let cfg = Cfg::compute(func);
        let dom = Dominators::compute(func, &cfg);
        let loops = find_loops(func, &cfg, &dom);
        assert_eq!(loops.len(), 1);
        let l = &loops[0];

        assert!(func.blocks[l.header].params.is_empty());
        assert!(find_live_out(func, l).is_none());
        // The loop now reaches its state through a captured pointer: the
        // entry block allocates, the header reloads.
        let entry_has_alloc = func.blocks[func.entry]
            .insts
            .iter()
            .any(|&i| matches!(func.insts[i].op, Op::Alloc(_)));
        assert!(entry_has_alloc);
        let header_starts_with_load = func.blocks[l.header]
            .insts
            .first()
            .map(|&i| matches!(func.insts[i].op, Op::Load(_)))
            .unwrap_or(false);
        assert!(header_starts_with_load);
    }

    #[test]
    fn demotion_is_idempotent() {
        let (module, _) = apply(counter_loop());
        let result = LoopDemote.apply(module).unwrap();
        assert!(!result.changed);
    }

    #[test]
    fn exit_edge_args_are_eliminated() {
        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Int(64),
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("f", sig, Visibility::Private);
        let head = fb.create_block();
        let (done, done_vals) = fb.create_block_with_params(&[Type::Int(64)]);

        fb.br(head, &[]);

        fb.switch_to_block(head);
        let x = fb.const_int(7);
        let c = fb.const_bool(false);
        fb.br_if(c, head, &[], done, &[x]);

        fb.switch_to_block(done);
        fb.ret(Some(done_vals[0]));

        let (module, changed) = apply(fb.build());
        assert!(changed);
        let func = &module.functions[FuncId::new(0)];
        assert_well_formed(func);

        let cfg = Cfg::compute(func);
        let dom = Dominators::compute(func, &cfg);
        let loops = find_loops(func, &cfg, &dom);
        let exit = loops[0].exit_blocks(func, &cfg)[0];
        assert!(func.blocks[exit].params.is_empty());
        let term = func.terminator(loops[0].header).unwrap();
        match &func.insts[term].op {
            Op::BrIf { else_args, .. } => assert!(else_args.is_empty()),
            other => panic!("expected BrIf, got {other:?}"),
        }
    }

    #[test]
    fn loop_local_block_params_are_left_alone() {
        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Void,
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("f", sig, Visibility::Private);
        let head = fb.create_block();
        let a = fb.create_block();
        let b = fb.create_block();
        let (merge, merge_vals) = fb.create_block_with_params(&[Type::Int(64)]);
        let exit = fb.create_block();

        fb.br(head, &[]);

        fb.switch_to_block(head);
        let c = fb.const_bool(true);
        fb.br_if(c, a, &[], exit, &[]);

        fb.switch_to_block(a);
        let c2 = fb.const_bool(false);
        let one = fb.const_int(1);
        let two = fb.const_int(2);
        fb.br_if(c2, merge, &[one], b, &[]);

        fb.switch_to_block(b);
        fb.br(merge, &[two]);

        fb.switch_to_block(merge);
        let p = fb.global_ref("sink", Type::Int(64));
        fb.store(p, merge_vals[0]);
        fb.br(head, &[]);

        fb.switch_to_block(exit);
        fb.ret(None);

        let mut mb = ModuleBuilder::new("test");
        mb.add_global("sink", Type::Int(64), crate::ir::Constant::Int(0));
        mb.add_function(fb.build());
        let result = LoopDemote.apply(mb.build()).unwrap();

        // The merge block's param never leaves the loop — nothing to demote.
        assert!(!result.changed);
        let func = &result.module.functions[FuncId::new(0)];
        assert_eq!(func.blocks[merge].params.len(), 1);
    }
}
