//! Shared helpers for transform passes.

use crate::ir::{BlockId, Function, InstId};

/// Insert `inst` immediately before the terminator of `block` (at the end
/// if the block has no terminator yet).
pub fn insert_before_terminator(func: &mut Function, block: BlockId, inst: InstId) {
    let len = func.blocks[block].insts.len();
    let pos = match func.blocks[block].insts.last() {
        Some(&last) if func.insts[last].op.is_terminator() => len - 1,
        _ => len,
    };
    func.blocks[block].insts.insert(pos, inst);
}

#[cfg(test)]
pub mod test_helpers {
    use crate::analysis::{branch_targets, Cfg};
    use crate::ir::Function;

    /// Structural sanity checks shared by pass tests: every attached block
    /// ends in exactly one terminator, branch targets are attached and their
    /// argument counts match the target's params, the entry block leads the
    /// layout and has no predecessors, and entry params mirror the signature.
    pub fn assert_well_formed(func: &Function) {
        assert!(!func.layout.is_empty(), "{}: empty layout", func.name);
        assert_eq!(
            func.layout[0], func.entry,
            "{}: entry is not first in layout",
            func.name
        );

        let entry_params = &func.blocks[func.entry].params;
        assert_eq!(
            entry_params.len(),
            func.sig.params.len(),
            "{}: entry params do not mirror signature",
            func.name
        );
        for (param, ty) in entry_params.iter().zip(&func.sig.params) {
            assert_eq!(&param.ty, ty, "{}: entry param type mismatch", func.name);
        }

        for block in func.layout_blocks() {
            let insts = &func.blocks[block].insts;
            assert!(!insts.is_empty(), "{}: {block} has no instructions", func.name);
            for (i, &inst) in insts.iter().enumerate() {
                let is_last = i + 1 == insts.len();
                assert_eq!(
                    func.insts[inst].op.is_terminator(),
                    is_last,
                    "{}: {block} terminator misplaced",
                    func.name
                );
            }

            let term = *insts.last().unwrap();
            for target in branch_targets(&func.insts[term].op) {
                assert!(
                    func.layout.contains(&target),
                    "{}: {block} branches to detached {target}",
                    func.name
                );
            }
            match &func.insts[term].op {
                crate::ir::Op::Br { target, args } => {
                    assert_eq!(
                        args.len(),
                        func.blocks[*target].params.len(),
                        "{}: branch arg count mismatch at {block}",
                        func.name
                    );
                }
                crate::ir::Op::BrIf {
                    then_target,
                    then_args,
                    else_target,
                    else_args,
                    ..
                } => {
                    assert_eq!(
                        then_args.len(),
                        func.blocks[*then_target].params.len(),
                        "{}: then-arg count mismatch at {block}",
                        func.name
                    );
                    assert_eq!(
                        else_args.len(),
                        func.blocks[*else_target].params.len(),
                        "{}: else-arg count mismatch at {block}",
                        func.name
                    );
                }
                _ => {}
            }
        }

        let cfg = Cfg::compute(func);
        assert!(
            cfg.preds(func.entry).is_empty(),
            "{}: entry block has predecessors",
            func.name
        );
    }
}
