//! Builders for functions and modules.

use super::block::{BlockId, BlockParam};
use super::func::{FuncId, Function, Visibility};
use super::inst::{BinaryKind, CmpKind, Op};
use super::module::{Global, Module};
use super::ty::{FunctionSig, Type};
use super::value::{Constant, ValueId};

/// Builds one function, appending instructions to a current block.
pub struct FunctionBuilder {
    func: Function,
    current: BlockId,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, sig: FunctionSig, visibility: Visibility) -> Self {
        let func = Function::new(name, sig, visibility);
        let current = func.entry;
        Self { func, current }
    }

    /// The i-th function parameter.
    pub fn param(&self, i: usize) -> ValueId {
        self.func.param(i)
    }

    /// The entry block.
    pub fn entry_block(&self) -> BlockId {
        self.func.entry
    }

    /// Create an attached empty block.
    pub fn create_block(&mut self) -> BlockId {
        let block = self.func.create_block();
        self.func.attach_block(block);
        block
    }

    /// Create an attached block with params of the given types.
    pub fn create_block_with_params(&mut self, tys: &[Type]) -> (BlockId, Vec<ValueId>) {
        let block = self.create_block();
        let mut values = Vec::with_capacity(tys.len());
        for ty in tys {
            let value = self.func.new_value(ty.clone());
            self.func.blocks[block].params.push(BlockParam {
                value,
                ty: ty.clone(),
            });
            values.push(value);
        }
        (block, values)
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current = block;
    }

    fn push(&mut self, op: Op, result_ty: Option<Type>) -> Option<ValueId> {
        let result = result_ty.map(|ty| self.func.new_value(ty));
        let inst = self.func.make_inst(op, result);
        let current = self.current;
        self.func.blocks[current].insts.push(inst);
        result
    }

    pub fn const_int(&mut self, value: i64) -> ValueId {
        self.push(Op::Const(Constant::Int(value)), Some(Type::Int(64)))
            .unwrap()
    }

    pub fn const_bool(&mut self, value: bool) -> ValueId {
        self.push(Op::Const(Constant::Bool(value)), Some(Type::Bool))
            .unwrap()
    }

    pub fn const_float(&mut self, value: f64) -> ValueId {
        self.push(Op::Const(Constant::Float(value)), Some(Type::Float(64)))
            .unwrap()
    }

    pub fn binary(&mut self, kind: BinaryKind, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = self.func.value_types[lhs].clone();
        self.push(Op::Binary { kind, lhs, rhs }, Some(ty)).unwrap()
    }

    pub fn add(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinaryKind::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinaryKind::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinaryKind::Mul, lhs, rhs)
    }

    pub fn cmp(&mut self, kind: CmpKind, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(Op::Cmp { kind, lhs, rhs }, Some(Type::Bool))
            .unwrap()
    }

    /// Stack slot for one value of `ty`; yields `ptr ty`.
    pub fn alloc(&mut self, ty: Type) -> ValueId {
        self.push(Op::Alloc(ty.clone()), Some(Type::ptr(ty)))
            .unwrap()
    }

    pub fn load(&mut self, ptr: ValueId, ty: Type) -> ValueId {
        self.push(Op::Load(ptr), Some(ty)).unwrap()
    }

    pub fn store(&mut self, ptr: ValueId, value: ValueId) {
        self.push(Op::Store { ptr, value }, None);
    }

    /// Address of the module global `name` holding a `ty`; yields `ptr ty`.
    pub fn global_ref(&mut self, name: &str, ty: Type) -> ValueId {
        self.push(Op::GlobalRef(name.to_string()), Some(Type::ptr(ty)))
            .unwrap()
    }

    pub fn func_ref(&mut self, name: &str) -> ValueId {
        self.push(Op::FuncRef(name.to_string()), Some(Type::FuncRef))
            .unwrap()
    }

    /// Call by symbol name. Returns the result value unless `ret_ty` is void.
    pub fn call(&mut self, callee: &str, args: &[ValueId], ret_ty: Type) -> Option<ValueId> {
        let result_ty = (ret_ty != Type::Void).then_some(ret_ty);
        self.push(
            Op::Call {
                callee: callee.to_string(),
                args: args.to_vec(),
            },
            result_ty,
        )
    }

    pub fn br(&mut self, target: BlockId, args: &[ValueId]) {
        self.push(
            Op::Br {
                target,
                args: args.to_vec(),
            },
            None,
        );
    }

    pub fn br_if(
        &mut self,
        cond: ValueId,
        then_target: BlockId,
        then_args: &[ValueId],
        else_target: BlockId,
        else_args: &[ValueId],
    ) {
        self.push(
            Op::BrIf {
                cond,
                then_target,
                then_args: then_args.to_vec(),
                else_target,
                else_args: else_args.to_vec(),
            },
            None,
        );
    }

    pub fn ret(&mut self, value: Option<ValueId>) {
        self.push(Op::Return(value), None);
    }

    pub fn build(self) -> Function {
        self.func
    }
}

/// Builds a module.
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            module: Module::new(name.to_string()),
        }
    }

    pub fn add_function(&mut self, func: Function) -> FuncId {
        self.module.functions.push(func)
    }

    pub fn add_global(&mut self, name: &str, ty: Type, init: Constant) {
        self.module.globals.push(Global {
            name: name.to_string(),
            ty,
            init,
            visibility: Visibility::Private,
            mutable: true,
        });
    }

    pub fn build(self) -> Module {
        self.module
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_function() {
        let sig = FunctionSig {
            params: vec![Type::Int(64), Type::Int(64)],
            return_ty: Type::Int(64),
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("add", sig, Visibility::Public);
        let a = fb.param(0);
        let b = fb.param(1);
        let sum = fb.add(a, b);
        fb.ret(Some(sum));
        let func = fb.build();

        assert_eq!(func.layout.len(), 1);
        assert_eq!(func.blocks[func.entry].insts.len(), 2);
        assert_eq!(func.value_types[sum], Type::Int(64));
    }

    #[test]
    fn void_call_has_no_result() {
        let mut fb = FunctionBuilder::new("f", FunctionSig::default(), Visibility::Private);
        assert!(fb.call("sink", &[], Type::Void).is_none());
        let v = fb.call("source", &[], Type::Int(64));
        assert!(v.is_some());
        fb.ret(None);
    }

    #[test]
    fn block_params_get_fresh_values() {
        let mut fb = FunctionBuilder::new("f", FunctionSig::default(), Visibility::Private);
        let (block, values) = fb.create_block_with_params(&[Type::Int(64), Type::Bool]);
        assert_eq!(values.len(), 2);
        let func = fb.build();
        assert_eq!(func.blocks[block].params[1].value, values[1]);
        assert_eq!(func.value_types[values[1]], Type::Bool);
    }
}
