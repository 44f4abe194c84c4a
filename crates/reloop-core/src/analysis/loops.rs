//! Natural loop detection.
//!
//! A back edge is an edge `latch → header` where the header dominates the
//! latch; the loop body is everything that can reach the latch without
//! passing through the header. Loops sharing a header are merged.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::ir::{BlockId, Function};

use super::cfg::Cfg;
use super::dom::Dominators;

/// One natural loop: header plus body block set.
#[derive(Debug)]
pub struct NaturalLoop {
    pub header: BlockId,
    /// All blocks in the loop, header included.
    pub blocks: HashSet<BlockId>,
    /// Back-edge sources, in deterministic discovery order.
    pub latches: Vec<BlockId>,
}

impl NaturalLoop {
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    /// Loop body blocks in the function's layout order.
    pub fn blocks_in_layout_order(&self, func: &Function) -> Vec<BlockId> {
        func.layout_blocks().filter(|b| self.contains(*b)).collect()
    }

    /// Innermost means no other loop's header sits inside this loop.
    pub fn is_innermost(&self, all: &[NaturalLoop]) -> bool {
        !all.iter()
            .any(|other| other.header != self.header && self.contains(other.header))
    }

    /// The unique predecessor of the header outside the loop, if there is
    /// exactly one.
    pub fn preheader(&self, cfg: &Cfg) -> Option<BlockId> {
        let mut outside = cfg
            .preds(self.header)
            .iter()
            .copied()
            .filter(|p| !self.contains(*p));
        let first = outside.next()?;
        outside.next().is_none().then_some(first)
    }

    /// Blocks inside the loop with at least one successor outside, in
    /// layout order.
    pub fn exiting_blocks(&self, func: &Function, cfg: &Cfg) -> Vec<BlockId> {
        self.blocks_in_layout_order(func)
            .into_iter()
            .filter(|&b| cfg.succs(b).iter().any(|s| !self.contains(*s)))
            .collect()
    }

    /// Outside successors of loop blocks, deduplicated, in layout-scan
    /// order.
    pub fn exit_blocks(&self, func: &Function, cfg: &Cfg) -> Vec<BlockId> {
        let mut seen = HashSet::new();
        let mut exits = Vec::new();
        for block in self.blocks_in_layout_order(func) {
            for &succ in cfg.succs(block) {
                if !self.contains(succ) && seen.insert(succ) {
                    exits.push(succ);
                }
            }
        }
        exits
    }
}

/// Find all natural loops in `func`, ordered by header layout position.
pub fn find_loops(func: &Function, cfg: &Cfg, dom: &Dominators) -> Vec<NaturalLoop> {
    let mut by_header: HashMap<BlockId, (HashSet<BlockId>, Vec<BlockId>)> = HashMap::new();

    for block in func.layout_blocks() {
        for &target in cfg.succs(block) {
            if !dom.dominates(target, block) {
                continue;
            }
            // Back edge: block → target.
            let (body, latches) = by_header.entry(target).or_default();
            latches.push(block);
            body.insert(target);
            let mut queue = VecDeque::new();
            if block != target && body.insert(block) {
                queue.push_back(block);
            }
            while let Some(cur) = queue.pop_front() {
                for &pred in cfg.preds(cur) {
                    if pred != target && body.insert(pred) {
                        queue.push_back(pred);
                    }
                }
            }
        }
    }

    let mut loops: Vec<NaturalLoop> = by_header
        .into_iter()
        .map(|(header, (blocks, latches))| NaturalLoop {
            header,
            blocks,
            latches,
        })
        .collect();
    let position: HashMap<BlockId, usize> = func
        .layout_blocks()
        .enumerate()
        .map(|(i, b)| (b, i))
        .collect();
    loops.sort_by_key(|l| position[&l.header]);
    loops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::{FunctionSig, Type, Visibility};

    /// entry → head; head → body | exit; body → head.
    fn simple_loop() -> (Function, BlockId, BlockId, BlockId) {
        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Void,
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("f", sig, Visibility::Private);
        let head = fb.create_block();
        let body = fb.create_block();
        let exit = fb.create_block();
        fb.br(head, &[]);
        fb.switch_to_block(head);
        let c = fb.const_bool(true);
        fb.br_if(c, body, &[], exit, &[]);
        fb.switch_to_block(body);
        fb.br(head, &[]);
        fb.switch_to_block(exit);
        fb.ret(None);
        (fb.build(), head, body, exit)
    }

    #[test]
    fn detects_simple_loop() {
        let (func, head, body, exit) = simple_loop();
        let cfg = Cfg::compute(&func);
        let dom = Dominators::compute(&func, &cfg);
        let loops = find_loops(&func, &cfg, &dom);

        assert_eq!(loops.len(), 1);
        let l = &loops[0];
        assert_eq!(l.header, head);
        assert!(l.contains(body));
        assert!(!l.contains(exit));
        assert_eq!(l.latches, vec![body]);
        assert_eq!(l.preheader(&cfg), Some(func.entry));
        assert_eq!(l.exiting_blocks(&func, &cfg), vec![head]);
        assert_eq!(l.exit_blocks(&func, &cfg), vec![exit]);
        assert!(l.is_innermost(&loops));
    }

    #[test]
    fn nested_loops_report_innermost() {
        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Void,
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("f", sig, Visibility::Private);
        let outer_head = fb.create_block();
        let inner_head = fb.create_block();
        let inner_body = fb.create_block();
        let outer_latch = fb.create_block();
        let exit = fb.create_block();

        fb.br(outer_head, &[]);
        fb.switch_to_block(outer_head);
        let c1 = fb.const_bool(true);
        fb.br_if(c1, inner_head, &[], exit, &[]);
        fb.switch_to_block(inner_head);
        let c2 = fb.const_bool(true);
        fb.br_if(c2, inner_body, &[], outer_latch, &[]);
        fb.switch_to_block(inner_body);
        fb.br(inner_head, &[]);
        fb.switch_to_block(outer_latch);
        fb.br(outer_head, &[]);
        fb.switch_to_block(exit);
        fb.ret(None);
        let func = fb.build();

        let cfg = Cfg::compute(&func);
        let dom = Dominators::compute(&func, &cfg);
        let loops = find_loops(&func, &cfg, &dom);

        assert_eq!(loops.len(), 2);
        let outer = loops.iter().find(|l| l.header == outer_head).unwrap();
        let inner = loops.iter().find(|l| l.header == inner_head).unwrap();
        assert!(inner.is_innermost(&loops));
        assert!(!outer.is_innermost(&loops));
        assert!(outer.contains(inner_head));
    }

    #[test]
    fn two_latches_merge_into_one_loop() {
        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Void,
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("f", sig, Visibility::Private);
        let head = fb.create_block();
        let a = fb.create_block();
        let b = fb.create_block();
        let exit = fb.create_block();
        fb.br(head, &[]);
        fb.switch_to_block(head);
        let c = fb.const_bool(true);
        fb.br_if(c, a, &[], exit, &[]);
        fb.switch_to_block(a);
        let c2 = fb.const_bool(false);
        fb.br_if(c2, head, &[], b, &[]);
        fb.switch_to_block(b);
        fb.br(head, &[]);
        fb.switch_to_block(exit);
        fb.ret(None);
        let func = fb.build();

        let cfg = Cfg::compute(&func);
        let dom = Dominators::compute(&func, &cfg);
        let loops = find_loops(&func, &cfg, &dom);

        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].latches, vec![a, b]);
    }
}
