//! Instructions and operations.

use serde::{Deserialize, Serialize};

use crate::define_entity;

use super::block::BlockId;
use super::ty::Type;
use super::value::{Constant, ValueId};

define_entity!(InstId);

/// Binary arithmetic kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
}

/// Comparison kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpKind {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// An operation.
///
/// Branch targets are `BlockId`s, not values — a block is only ever named
/// structurally, so it can never leak into a capture set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Const(Constant),
    Binary {
        kind: BinaryKind,
        lhs: ValueId,
        rhs: ValueId,
    },
    Cmp {
        kind: CmpKind,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// Logical negation of a boolean value.
    Not(ValueId),
    /// Stack slot holding one value of the given type.
    Alloc(Type),
    Load(ValueId),
    Store {
        ptr: ValueId,
        value: ValueId,
    },
    /// Address of a module global.
    GlobalRef(String),
    /// Reference to a function, usable as a call argument.
    FuncRef(String),
    /// Direct call by symbol name. Unresolved names are runtime-provided.
    Call {
        callee: String,
        args: Vec<ValueId>,
    },
    Br {
        target: BlockId,
        args: Vec<ValueId>,
    },
    BrIf {
        cond: ValueId,
        then_target: BlockId,
        then_args: Vec<ValueId>,
        else_target: BlockId,
        else_args: Vec<ValueId>,
    },
    Return(Option<ValueId>),
}

impl Op {
    /// Is this a control-transfer instruction?
    pub fn is_terminator(&self) -> bool {
        matches!(self, Op::Br { .. } | Op::BrIf { .. } | Op::Return(_))
    }

    /// Value operands of this op, in operand order. Branch args included;
    /// branch targets are not operands.
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Op::Const(_) | Op::Alloc(_) | Op::GlobalRef(_) | Op::FuncRef(_) => Vec::new(),
            Op::Binary { lhs, rhs, .. } | Op::Cmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            Op::Not(v) | Op::Load(v) => vec![*v],
            Op::Store { ptr, value } => vec![*ptr, *value],
            Op::Call { args, .. } => args.clone(),
            Op::Br { args, .. } => args.clone(),
            Op::BrIf {
                cond,
                then_args,
                else_args,
                ..
            } => {
                let mut ops = vec![*cond];
                ops.extend_from_slice(then_args);
                ops.extend_from_slice(else_args);
                ops
            }
            Op::Return(v) => v.iter().copied().collect(),
        }
    }

    /// Rewrite every value operand through `map`. Branch targets are left
    /// alone; use [`Op::retarget`] for those.
    pub fn map_operands(&mut self, map: &mut impl FnMut(ValueId) -> ValueId) {
        match self {
            Op::Const(_) | Op::Alloc(_) | Op::GlobalRef(_) | Op::FuncRef(_) => {}
            Op::Binary { lhs, rhs, .. } | Op::Cmp { lhs, rhs, .. } => {
                *lhs = map(*lhs);
                *rhs = map(*rhs);
            }
            Op::Not(v) | Op::Load(v) => *v = map(*v),
            Op::Store { ptr, value } => {
                *ptr = map(*ptr);
                *value = map(*value);
            }
            Op::Call { args, .. } => {
                for a in args {
                    *a = map(*a);
                }
            }
            Op::Br { args, .. } => {
                for a in args {
                    *a = map(*a);
                }
            }
            Op::BrIf {
                cond,
                then_args,
                else_args,
                ..
            } => {
                *cond = map(*cond);
                for a in then_args.iter_mut().chain(else_args.iter_mut()) {
                    *a = map(*a);
                }
            }
            Op::Return(v) => {
                if let Some(v) = v {
                    *v = map(*v);
                }
            }
        }
    }

    /// Rewrite every branch target through `map`.
    pub fn retarget(&mut self, map: &mut impl FnMut(BlockId) -> BlockId) {
        match self {
            Op::Br { target, .. } => *target = map(*target),
            Op::BrIf {
                then_target,
                else_target,
                ..
            } => {
                *then_target = map(*then_target);
                *else_target = map(*else_target);
            }
            _ => {}
        }
    }
}

/// An instruction: an operation plus its optional result value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inst {
    pub op: Op,
    pub result: Option<ValueId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;

    #[test]
    fn operands_cover_branch_args_not_targets() {
        let op = Op::BrIf {
            cond: ValueId::new(0),
            then_target: BlockId::new(1),
            then_args: vec![ValueId::new(2)],
            else_target: BlockId::new(3),
            else_args: vec![],
        };
        assert_eq!(op.operands(), vec![ValueId::new(0), ValueId::new(2)]);
    }

    #[test]
    fn retarget_rewrites_both_successors() {
        let mut op = Op::BrIf {
            cond: ValueId::new(0),
            then_target: BlockId::new(1),
            then_args: vec![],
            else_target: BlockId::new(2),
            else_args: vec![],
        };
        op.retarget(&mut |b| if b == BlockId::new(2) { BlockId::new(9) } else { b });
        match op {
            Op::BrIf {
                then_target,
                else_target,
                ..
            } => {
                assert_eq!(then_target, BlockId::new(1));
                assert_eq!(else_target, BlockId::new(9));
            }
            _ => unreachable!(),
        }
    }
}
