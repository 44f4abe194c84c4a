//! Loop canonicalization: dedicated preheaders.
//!
//! After this pass every loop header has exactly one predecessor outside
//! the loop, and that predecessor ends in an unconditional branch to the
//! header. `loop-extract` requires this shape; so does `loop-demote`'s
//! placement of initial stores.

use std::collections::HashMap;

use crate::analysis::{find_loops, Cfg, Dominators};
use crate::error::CoreError;
use crate::ir::{BlockId, BlockParam, Function, Module, Op};
use crate::pipeline::{Transform, TransformResult};

pub struct LoopSimplify;

impl Transform for LoopSimplify {
    fn name(&self) -> &str {
        "loop-simplify"
    }

    fn apply(&self, mut module: Module) -> Result<TransformResult, CoreError> {
        let mut changed = false;
        for func in module.functions.values_mut() {
            while insert_one_preheader(func) {
                changed = true;
            }
        }
        Ok(TransformResult { module, changed })
    }
}

/// Find the first loop lacking a dedicated preheader and give it one.
/// Returns whether anything was changed.
fn insert_one_preheader(func: &mut Function) -> bool {
    let cfg = Cfg::compute(func);
    let dom = Dominators::compute(func, &cfg);
    let loops = find_loops(func, &cfg, &dom);

    for l in &loops {
        if has_dedicated_preheader(func, l.preheader(&cfg)) {
            continue;
        }

        // Collect the outside predecessors before mutating.
        let outside_preds: Vec<BlockId> = cfg
            .preds(l.header)
            .iter()
            .copied()
            .filter(|p| !l.contains(*p))
            .collect();

        let header = l.header;
        let preheader = func.create_block();

        // The preheader mirrors the header's params and forwards them.
        let header_params = func.blocks[header].params.clone();
        let mut forwarded = Vec::with_capacity(header_params.len());
        for param in &header_params {
            let value = func.new_value(param.ty.clone());
            func.blocks[preheader].params.push(BlockParam {
                value,
                ty: param.ty.clone(),
            });
            forwarded.push(value);
        }
        let br = func.make_inst(
            Op::Br {
                target: header,
                args: forwarded,
            },
            None,
        );
        func.blocks[preheader].insts.push(br);

        // Outside edges now enter through the preheader; back edges stay on
        // the header. Branch args carry over unchanged since the param lists
        // match.
        let mut remap: HashMap<BlockId, BlockId> = HashMap::new();
        remap.insert(header, preheader);
        for &pred in &outside_preds {
            if let Some(term) = func.terminator(pred) {
                func.insts[term].op.retarget(&mut |b| *remap.get(&b).unwrap_or(&b));
            }
        }

        let pos = func.layout.iter().position(|&b| b == header).unwrap();
        func.layout.insert(pos, preheader);
        if header == func.entry {
            // The header was the function entry: the preheader takes over as
            // entry, and with it the signature params. The header keeps its
            // own params for the back edges.
            func.entry = preheader;
        }
        return true;
    }
    false
}

fn has_dedicated_preheader(func: &Function, preheader: Option<BlockId>) -> bool {
    let Some(preheader) = preheader else {
        return false;
    };
    let Some(term) = func.terminator(preheader) else {
        return false;
    };
    matches!(func.insts[term].op, Op::Br { .. })
}
