//! Loop outlining.
//!
//! Moves an eligible natural loop out of its host function into a private
//! function that runs one iteration per call and returns whether another
//! iteration is due. The loop itself is replaced by a call to the external
//! `looper` dispatcher, which re-invokes the extracted body — handing it the
//! captured values as an opaque handle each time — until it returns false.
//!
//! Per loop, four steps run in strict sequence: the eligibility filter, the
//! capture-set analyzer, the outliner, and the call-site rewriter. A loop
//! failing eligibility is skipped without touching the IR; a loop whose
//! required shape is missing (no dedicated preheader, undemoted state) means
//! the canonicalization passes did not run, and that aborts the module —
//! extracting anyway would miscompile it.

use std::collections::{HashMap, HashSet};

use crate::analysis::{find_loops, Cfg, Dominators, NaturalLoop};
use crate::error::CoreError;
use crate::ir::builder::FunctionBuilder;
use crate::ir::{
    BlockId, BlockParam, FuncId, Function, FunctionSig, Module, Op, Type, ValueId, Visibility,
};
use crate::pipeline::{CapturePassing, Transform, TransformResult};
use crate::transforms::util::insert_before_terminator;

/// Name of the external dispatcher: `looper(f, captures...)` re-invokes `f`
/// with a fresh handle over the packaged captures until `f` returns false.
pub const LOOPER: &str = "looper";

/// Name of the external capture accessor: each call reads the next packaged
/// value out of a handle; the call site's result type selects the
/// interpretation.
pub const CAPTURE_NEXT: &str = "capture_next";

pub struct LoopExtract {
    capture_passing: CapturePassing,
}

impl LoopExtract {
    pub fn new(capture_passing: CapturePassing) -> Self {
        Self { capture_passing }
    }
}

impl Transform for LoopExtract {
    fn name(&self) -> &str {
        "loop-extract"
    }

    fn apply(&self, mut module: Module) -> Result<TransformResult, CoreError> {
        let mut changed = false;
        // New functions are appended while we iterate; they contain no back
        // edges, so only the original functions need visiting.
        let func_ids: Vec<FuncId> = module.functions.keys().collect();
        for func_id in func_ids {
            // Extracting one loop can make its parent innermost, so keep
            // going until no eligible loop remains.
            while try_extract_one(&mut module, func_id, self.capture_passing)? {
                changed = true;
            }
        }
        Ok(TransformResult { module, changed })
    }
}

/// Everything the outliner and call-site rewriter need, gathered while the
/// host function is still intact.
struct ExtractionPlan {
    /// Loop blocks: header first, the rest in layout order.
    blocks: Vec<BlockId>,
    header: BlockId,
    preheader: BlockId,
    exit: BlockId,
    /// Condition of the exiting block's branch.
    cond: ValueId,
    /// Whether the branch's then-target stays inside the loop. Decides the
    /// synthetic exit's polarity: then-inside returns the condition as-is,
    /// else-inside returns its negation.
    then_inside: bool,
    /// Values defined outside the loop and read inside it, in first-use
    /// order.
    captures: Vec<(ValueId, Type)>,
}

fn try_extract_one(
    module: &mut Module,
    func_id: FuncId,
    capture_passing: CapturePassing,
) -> Result<bool, CoreError> {
    let Some(plan) = plan_extraction(&module.functions[func_id])? else {
        return Ok(false);
    };

    let host_name = module.functions[func_id].name.clone();
    let (extracted_name, adapter_name) = pick_names(module, &host_name, capture_passing);

    let extracted = build_extracted(
        &module.functions[func_id],
        &plan,
        capture_passing,
        &extracted_name,
    );
    module.functions.push(extracted);
    if capture_passing == CapturePassing::Adapter {
        let adapter = build_adapter(&extracted_name, &adapter_name, &plan.captures);
        module.functions.push(adapter);
    }

    module.declare_extern(
        LOOPER,
        FunctionSig {
            params: vec![Type::FuncRef],
            return_ty: Type::Void,
            variadic: true,
        },
    );
    if !plan.captures.is_empty() {
        // The declared result type is nominal: each call site's result type
        // picks the interpretation of the value read out of the handle.
        module.declare_extern(
            CAPTURE_NEXT,
            FunctionSig {
                params: vec![Type::Captures],
                return_ty: Type::Void,
                variadic: false,
            },
        );
    }

    let callee = match capture_passing {
        CapturePassing::SelfConverting => extracted_name,
        CapturePassing::Adapter => adapter_name,
    };
    rewrite_call_site(&mut module.functions[func_id], &plan, &callee);
    Ok(true)
}

/// Run the eligibility filter and capture-set analyzer over the function's
/// loops. Returns the plan for the first eligible loop, `None` when every
/// loop is ineligible, or an error when an eligible loop is missing its
/// canonical shape.
fn plan_extraction(func: &Function) -> Result<Option<ExtractionPlan>, CoreError> {
    let cfg = Cfg::compute(func);
    let dom = Dominators::compute(func, &cfg);
    let loops = find_loops(func, &cfg, &dom);

    for l in &loops {
        // Eligibility: innermost, one exiting block, one exit block, and the
        // exiting block must dominate every latch — the synthetic exit
        // returns the exiting branch's condition, which otherwise could be
        // stale (or unset) when a back edge reaches it.
        if !l.is_innermost(&loops) {
            continue;
        }
        let exiting_blocks = l.exiting_blocks(func, &cfg);
        if exiting_blocks.len() != 1 {
            continue;
        }
        let exiting = exiting_blocks[0];
        let exits = l.exit_blocks(func, &cfg);
        if exits.len() != 1 {
            continue;
        }
        let exit = exits[0];
        if !l.latches.iter().all(|&latch| dom.dominates(exiting, latch)) {
            continue;
        }

        // Shape preconditions: loop-simplify and loop-demote must have run.
        let Some(preheader) = l.preheader(&cfg) else {
            return Err(CoreError::precondition(
                &func.name,
                "loop header has no dedicated preheader (run loop-simplify)",
            ));
        };
        if exit == preheader {
            // The exit edge re-enters the loop's entry edge; bypassing the
            // preheader would turn it into a self-loop.
            continue;
        }
        match func.terminator(preheader).map(|t| &func.insts[t].op) {
            Some(Op::Br { .. }) => {}
            _ => {
                return Err(CoreError::precondition(
                    &func.name,
                    "loop preheader does not end in an unconditional branch (run loop-simplify)",
                ));
            }
        }
        let (cond, then_inside) = match func.terminator(exiting).map(|t| &func.insts[t].op) {
            Some(Op::BrIf {
                cond,
                then_target,
                else_target,
                ..
            }) => {
                let then_inside = l.contains(*then_target);
                debug_assert!(then_inside || l.contains(*else_target));
                (*cond, then_inside)
            }
            _ => {
                return Err(CoreError::precondition(
                    &func.name,
                    "exiting block does not end in a conditional branch",
                ));
            }
        };
        if !func.blocks[l.header].params.is_empty() {
            return Err(CoreError::precondition(
                &func.name,
                "loop-carried block params present (run loop-demote)",
            ));
        }
        if !func.blocks[exit].params.is_empty() {
            return Err(CoreError::precondition(
                &func.name,
                "exit block has block params (run loop-demote)",
            ));
        }
        if has_live_outs(func, l) {
            return Err(CoreError::precondition(
                &func.name,
                "value defined in the loop is used outside it (run loop-demote)",
            ));
        }

        let captures = capture_set(func, l);
        let mut blocks = vec![l.header];
        blocks.extend(
            l.blocks_in_layout_order(func)
                .into_iter()
                .filter(|&b| b != l.header),
        );
        return Ok(Some(ExtractionPlan {
            blocks,
            header: l.header,
            preheader,
            exit,
            cond,
            then_inside,
            captures,
        }));
    }
    Ok(None)
}

/// The ordered, deduplicated set of values read inside the loop but defined
/// outside it. Declarations are collected up front — layout order is not
/// dominance order, so a use can precede its definition in the scan.
fn capture_set(func: &Function, l: &NaturalLoop) -> Vec<(ValueId, Type)> {
    let mut declared: HashSet<ValueId> = HashSet::new();
    for block in l.blocks_in_layout_order(func) {
        for param in &func.blocks[block].params {
            declared.insert(param.value);
        }
        for &inst in &func.blocks[block].insts {
            if let Some(result) = func.insts[inst].result {
                declared.insert(result);
            }
        }
    }

    let mut seen: HashSet<ValueId> = HashSet::new();
    let mut captures = Vec::new();
    for block in l.blocks_in_layout_order(func) {
        for &inst in &func.blocks[block].insts {
            for operand in func.insts[inst].op.operands() {
                if !declared.contains(&operand) && seen.insert(operand) {
                    captures.push((operand, func.value_types[operand].clone()));
                }
            }
        }
    }
    captures
}

fn has_live_outs(func: &Function, l: &NaturalLoop) -> bool {
    let mut inside: HashSet<ValueId> = HashSet::new();
    for block in l.blocks_in_layout_order(func) {
        for param in &func.blocks[block].params {
            inside.insert(param.value);
        }
        for &inst in &func.blocks[block].insts {
            if let Some(result) = func.insts[inst].result {
                inside.insert(result);
            }
        }
    }
    func.layout_blocks()
        .filter(|b| !l.contains(*b))
        .any(|block| {
            func.blocks[block].insts.iter().any(|&inst| {
                func.insts[inst]
                    .op
                    .operands()
                    .iter()
                    .any(|v| inside.contains(v))
            })
        })
}

/// Deterministic, collision-free names for the new functions.
fn pick_names(
    module: &Module,
    host_name: &str,
    capture_passing: CapturePassing,
) -> (String, String) {
    let mut n = 0;
    loop {
        let extracted = format!("{host_name}_loop_{n}");
        let adapter = format!("{extracted}_unpack");
        let taken = module.symbol_exists(&extracted)
            || (capture_passing == CapturePassing::Adapter && module.symbol_exists(&adapter));
        if !taken {
            return (extracted, adapter);
        }
        n += 1;
    }
}

/// The outliner: build the extracted function from the loop's blocks.
///
/// The relocated header becomes the entry block; the remaining loop blocks
/// keep their relative order; the synthetic exit block comes last. Every
/// edge that returned to the header or left for the exit block is redirected
/// to the synthetic exit, so one call runs exactly one iteration-then-branch
/// of the original loop.
fn build_extracted(
    host: &Function,
    plan: &ExtractionPlan,
    capture_passing: CapturePassing,
    name: &str,
) -> Function {
    let sig = match capture_passing {
        CapturePassing::SelfConverting => FunctionSig {
            params: vec![Type::Captures],
            return_ty: Type::Bool,
            variadic: false,
        },
        CapturePassing::Adapter => FunctionSig {
            params: plan.captures.iter().map(|(_, ty)| ty.clone()).collect(),
            return_ty: Type::Bool,
            variadic: false,
        },
    };
    let mut ext = Function::new(name, sig, Visibility::Private);
    let entry = ext.entry;

    // Old value → new value. Captures map to their access values; everything
    // else is filled in before instructions are copied.
    let mut vmap: HashMap<ValueId, ValueId> = HashMap::new();
    match capture_passing {
        CapturePassing::SelfConverting => {
            // Unpack the handle at the top of the entry block, one accessor
            // call per capture, before the relocated header's instructions.
            let handle = ext.param(0);
            for (old, ty) in &plan.captures {
                let value = ext.new_value(ty.clone());
                let call = ext.make_inst(
                    Op::Call {
                        callee: CAPTURE_NEXT.to_string(),
                        args: vec![handle],
                    },
                    Some(value),
                );
                ext.blocks[entry].insts.push(call);
                vmap.insert(*old, value);
            }
        }
        CapturePassing::Adapter => {
            for (i, (old, _)) in plan.captures.iter().enumerate() {
                vmap.insert(*old, ext.param(i));
            }
        }
    }

    let mut bmap: HashMap<BlockId, BlockId> = HashMap::new();
    bmap.insert(plan.header, entry);
    for &block in plan.blocks.iter().skip(1) {
        let nb = ext.create_block();
        ext.attach_block(nb);
        bmap.insert(block, nb);
    }
    let ret_block = ext.create_block();
    ext.attach_block(ret_block);

    // Fresh values for every definition the loop carries over. The map must
    // be complete before operands are rewritten — layout order is not
    // dominance order.
    for &block in plan.blocks.iter().skip(1) {
        for param in &host.blocks[block].params {
            let value = ext.new_value(param.ty.clone());
            ext.blocks[bmap[&block]].params.push(BlockParam {
                value,
                ty: param.ty.clone(),
            });
            vmap.insert(param.value, value);
        }
    }
    for &block in &plan.blocks {
        for &inst in &host.blocks[block].insts {
            if let Some(result) = host.insts[inst].result {
                let value = ext.new_value(host.value_types[result].clone());
                vmap.insert(result, value);
            }
        }
    }

    for &block in &plan.blocks {
        let nb = bmap[&block];
        for &inst in &host.blocks[block].insts {
            let mut op = host.insts[inst].op.clone();
            op.map_operands(&mut |v| vmap[&v]);
            op.retarget(&mut |t| {
                if t == plan.header || t == plan.exit {
                    ret_block
                } else {
                    bmap[&t]
                }
            });
            let result = host.insts[inst].result.map(|r| vmap[&r]);
            let new_inst = ext.make_inst(op, result);
            ext.blocks[nb].insts.push(new_inst);
        }
    }

    // Synthetic exit: the returned boolean uniformly means "run another
    // iteration".
    let cond = vmap[&plan.cond];
    if plan.then_inside {
        let ret = ext.make_inst(Op::Return(Some(cond)), None);
        ext.blocks[ret_block].insts.push(ret);
    } else {
        let negated = ext.new_value(Type::Bool);
        let not = ext.make_inst(Op::Not(cond), Some(negated));
        let ret = ext.make_inst(Op::Return(Some(negated)), None);
        ext.blocks[ret_block].insts.push(not);
        ext.blocks[ret_block].insts.push(ret);
    }

    ext
}

/// Under the adapter convention the extracted function takes typed params,
/// but the dispatcher only hands out a capture handle — this shim unpacks
/// the handle and forwards.
fn build_adapter(extracted_name: &str, name: &str, captures: &[(ValueId, Type)]) -> Function {
    let sig = FunctionSig {
        params: vec![Type::Captures],
        return_ty: Type::Bool,
        variadic: false,
    };
    let mut fb = FunctionBuilder::new(name, sig, Visibility::Private);
    let handle = fb.param(0);
    let mut args = Vec::with_capacity(captures.len());
    for (_, ty) in captures {
        args.push(fb.call(CAPTURE_NEXT, &[handle], ty.clone()).unwrap());
    }
    let result = fb.call(extracted_name, &args, Type::Bool).unwrap();
    fb.ret(Some(result));
    fb.build()
}

/// The call-site rewriter: bypass the loop's entry edge and hand the
/// captures to the dispatcher.
fn rewrite_call_site(func: &mut Function, plan: &ExtractionPlan, callee: &str) {
    let func_ref = func.new_value(Type::FuncRef);
    let func_ref_inst = func.make_inst(Op::FuncRef(callee.to_string()), Some(func_ref));
    let mut args = vec![func_ref];
    args.extend(plan.captures.iter().map(|(v, _)| *v));
    let call = func.make_inst(
        Op::Call {
            callee: LOOPER.to_string(),
            args,
        },
        None,
    );
    insert_before_terminator(func, plan.preheader, func_ref_inst);
    insert_before_terminator(func, plan.preheader, call);

    let term = func.terminator(plan.preheader).unwrap();
    if let Op::Br { target, .. } = &mut func.insts[term].op {
        *target = plan.exit;
    }

    for &block in &plan.blocks {
        func.detach_block(block);
    }
}
