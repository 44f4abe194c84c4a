//! Dominator tree computation.
//!
//! Iterative algorithm over reverse postorder (Cooper–Harvey–Kennedy).
//! Function CFGs here are small enough that the simple fixpoint beats the
//! bookkeeping of the near-linear alternatives.

use std::collections::HashMap;

use crate::ir::{BlockId, Function};

use super::cfg::Cfg;

/// Immediate-dominator tree for a function's attached blocks.
pub struct Dominators {
    idom: HashMap<BlockId, BlockId>,
    /// Reverse-postorder index per reachable block.
    order: HashMap<BlockId, usize>,
}

impl Dominators {
    pub fn compute(func: &Function, cfg: &Cfg) -> Dominators {
        let rpo = reverse_postorder(func.entry, cfg);
        let order: HashMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
        idom.insert(func.entry, func.entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &pred in cfg.preds(block) {
                    if !idom.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(cur) => intersect(pred, cur, &idom, &order),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom.get(&block) != Some(&new_idom) {
                        idom.insert(block, new_idom);
                        changed = true;
                    }
                }
            }
        }

        Dominators { idom, order }
    }

    /// Does `a` dominate `b`? Every block dominates itself. Unreachable
    /// blocks dominate nothing and are dominated by nothing.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.order.contains_key(&b) {
            return false;
        }
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom.get(&cur) {
                Some(&parent) if parent != cur => cur = parent,
                _ => return false,
            }
        }
    }

}

fn intersect(
    mut a: BlockId,
    mut b: BlockId,
    idom: &HashMap<BlockId, BlockId>,
    order: &HashMap<BlockId, usize>,
) -> BlockId {
    while a != b {
        while order[&a] > order[&b] {
            a = idom[&a];
        }
        while order[&b] > order[&a] {
            b = idom[&b];
        }
    }
    a
}

fn reverse_postorder(entry: BlockId, cfg: &Cfg) -> Vec<BlockId> {
    let mut postorder = Vec::new();
    let mut visited = std::collections::HashSet::new();
    // Iterative DFS; the second stack element tracks how many successors
    // have been pushed already.
    let mut stack = vec![(entry, 0usize)];
    visited.insert(entry);
    while let Some((block, next)) = stack.last().copied() {
        let succs = cfg.succs(block);
        if next < succs.len() {
            stack.last_mut().unwrap().1 += 1;
            let succ = succs[next];
            if visited.insert(succ) {
                stack.push((succ, 0));
            }
        } else {
            postorder.push(block);
            stack.pop();
        }
    }
    postorder.reverse();
    postorder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::{CmpKind, FunctionSig, Type, Visibility};

    #[test]
    fn diamond_dominance() {
        let sig = FunctionSig {
            params: vec![Type::Int(64)],
            return_ty: Type::Void,
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("f", sig, Visibility::Private);
        let p = fb.param(0);
        let zero = fb.const_int(0);
        let c = fb.cmp(CmpKind::Eq, p, zero);
        let then_b = fb.create_block();
        let else_b = fb.create_block();
        let merge = fb.create_block();
        fb.br_if(c, then_b, &[], else_b, &[]);
        fb.switch_to_block(then_b);
        fb.br(merge, &[]);
        fb.switch_to_block(else_b);
        fb.br(merge, &[]);
        fb.switch_to_block(merge);
        fb.ret(None);
        let func = fb.build();

        let cfg = Cfg::compute(&func);
        let dom = Dominators::compute(&func, &cfg);
        assert!(dom.dominates(func.entry, merge));
        assert!(dom.dominates(func.entry, func.entry));
        assert!(!dom.dominates(then_b, merge));
        assert!(!dom.dominates(merge, then_b));
    }

    #[test]
    fn loop_header_dominates_latch() {
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
        let func = fb.build();

        let cfg = Cfg::compute(&func);
        let dom = Dominators::compute(&func, &cfg);
        assert!(dom.dominates(head, body));
        assert!(dom.dominates(head, exit));
        assert!(!dom.dominates(body, head));
    }
}
