//! Reference interpreter.
//!
//! Executes a module directly so transformed and untransformed modules can
//! be compared on concrete inputs. The two routines the loop extractor only
//! declares — the `looper` dispatcher and the `capture_next` accessor — are
//! implemented natively here, which makes the dispatcher's re-invocation
//! contract executable: captures are packaged once per call site, and every
//! invocation of the extracted body gets a fresh handle over those packaged
//! values.
//!
//! A `record` builtin appends its argument to an observable trace, giving
//! tests a side-effect sequence to compare.

use std::collections::HashMap;

use crate::entity::EntityRef;
use crate::error::CoreError;
use crate::ir::{BinaryKind, BlockId, CmpKind, Constant, FuncId, Module, Op, ValueId};
use crate::transforms::{CAPTURE_NEXT, LOOPER};

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Index of a heap cell.
    Ptr(usize),
    /// A function reference, by symbol name.
    Func(String),
    /// Index of a capture handle.
    Captures(usize),
}

impl Value {
    fn as_bool(&self) -> Result<bool, CoreError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(CoreError::eval(format!("expected bool, got {other:?}"))),
        }
    }

    fn as_ptr(&self) -> Result<usize, CoreError> {
        match self {
            Value::Ptr(p) => Ok(*p),
            other => Err(CoreError::eval(format!("expected pointer, got {other:?}"))),
        }
    }
}

impl From<&Constant> for Value {
    fn from(c: &Constant) -> Value {
        match c {
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(n) => Value::Int(*n),
            Constant::Float(x) => Value::Float(*x),
        }
    }
}

/// An in-flight capture handle: the packaged values plus a read cursor.
struct Handle {
    values: Vec<Value>,
    cursor: usize,
}

const DEFAULT_FUEL: u64 = 1_000_000;

/// Interpreter state for one module.
pub struct Interp<'a> {
    module: &'a Module,
    heap: Vec<Value>,
    globals: HashMap<String, usize>,
    handles: Vec<Handle>,
    trace: Vec<Value>,
    fuel: u64,
}

impl<'a> Interp<'a> {
    pub fn new(module: &'a Module) -> Self {
        let mut heap = Vec::new();
        let mut globals = HashMap::new();
        for global in &module.globals {
            globals.insert(global.name.clone(), heap.len());
            heap.push(Value::from(&global.init));
        }
        Self {
            module,
            heap,
            globals,
            handles: Vec::new(),
            trace: Vec::new(),
            fuel: DEFAULT_FUEL,
        }
    }

    /// Cap the number of instructions executed (guards divergent loops in
    /// tests).
    pub fn set_fuel(&mut self, fuel: u64) {
        self.fuel = fuel;
    }

    /// Values recorded through the `record` builtin, in call order.
    pub fn trace(&self) -> &[Value] {
        &self.trace
    }

    /// Current value of a global.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name).map(|&slot| &self.heap[slot])
    }

    /// Call a function by name.
    pub fn run(&mut self, name: &str, args: &[Value]) -> Result<Value, CoreError> {
        self.call(name, args.to_vec())
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, CoreError> {
        if let Some(id) = self.module.function_by_name(name) {
            return self.exec_function(id, args);
        }
        match name {
            LOOPER => self.run_looper(args),
            CAPTURE_NEXT => self.capture_next(args),
            "record" => {
                let [value] = <[Value; 1]>::try_from(args)
                    .map_err(|_| CoreError::eval("record takes one argument"))?;
                self.trace.push(value);
                Ok(Value::Unit)
            }
            _ => Err(CoreError::UnknownFunction {
                name: name.to_string(),
            }),
        }
    }

    /// The dispatcher: package the captures once, then re-invoke the callable
    /// with a fresh handle over them until it reports no further iteration.
    fn run_looper(&mut self, args: Vec<Value>) -> Result<Value, CoreError> {
        let Some((callee, captures)) = args.split_first() else {
            return Err(CoreError::eval("looper needs a callable"));
        };
        let Value::Func(callee) = callee.clone() else {
            return Err(CoreError::eval("looper's first argument must be a function"));
        };
        let captures = captures.to_vec();
        loop {
            let handle = self.handles.len();
            self.handles.push(Handle {
                values: captures.clone(),
                cursor: 0,
            });
            let keep_going = self
                .call(&callee, vec![Value::Captures(handle)])?
                .as_bool()?;
            if !keep_going {
                return Ok(Value::Unit);
            }
        }
    }

    fn capture_next(&mut self, args: Vec<Value>) -> Result<Value, CoreError> {
        let handle = match args.as_slice() {
            [Value::Captures(handle)] => *handle,
            _ => return Err(CoreError::eval("capture_next takes one capture handle")),
        };
        let handle = self
            .handles
            .get_mut(handle)
            .ok_or_else(|| CoreError::eval("dangling capture handle"))?;
        let value = handle
            .values
            .get(handle.cursor)
            .cloned()
            .ok_or_else(|| CoreError::eval("capture handle read past its end"))?;
        handle.cursor += 1;
        Ok(value)
    }

    fn exec_function(&mut self, id: FuncId, args: Vec<Value>) -> Result<Value, CoreError> {
        let module = self.module;
        let func = &module.functions[id];
        if args.len() != func.sig.params.len() {
            return Err(CoreError::eval(format!(
                "{} expects {} arguments, got {}",
                func.name,
                func.sig.params.len(),
                args.len()
            )));
        }

        let mut frame: HashMap<ValueId, Value> = HashMap::new();
        for (param, arg) in func.blocks[func.entry].params.iter().zip(args) {
            frame.insert(param.value, arg);
        }

        let mut block = func.entry;
        loop {
            let mut next: Option<(BlockId, Vec<(ValueId, Value)>)> = None;
            for &inst_id in &func.blocks[block].insts {
                if self.fuel == 0 {
                    return Err(CoreError::eval("fuel exhausted"));
                }
                self.fuel -= 1;

                let inst = &func.insts[inst_id];
                let read = |frame: &HashMap<ValueId, Value>, v: ValueId| {
                    frame.get(&v).cloned().ok_or_else(|| {
                        CoreError::eval(format!("{}: v{} read before set", func.name, v.index()))
                    })
                };
                match &inst.op {
                    Op::Const(c) => {
                        frame.insert(inst.result.unwrap(), Value::from(c));
                    }
                    Op::Binary { kind, lhs, rhs } => {
                        let value =
                            eval_binary(*kind, read(&frame, *lhs)?, read(&frame, *rhs)?)?;
                        frame.insert(inst.result.unwrap(), value);
                    }
                    Op::Cmp { kind, lhs, rhs } => {
                        let value = eval_cmp(*kind, read(&frame, *lhs)?, read(&frame, *rhs)?)?;
                        frame.insert(inst.result.unwrap(), value);
                    }
                    Op::Not(v) => {
                        let value = Value::Bool(!read(&frame, *v)?.as_bool()?);
                        frame.insert(inst.result.unwrap(), value);
                    }
                    Op::Alloc(_) => {
                        let slot = self.heap.len();
                        self.heap.push(Value::Unit);
                        frame.insert(inst.result.unwrap(), Value::Ptr(slot));
                    }
                    Op::Load(ptr) => {
                        let slot = read(&frame, *ptr)?.as_ptr()?;
                        frame.insert(inst.result.unwrap(), self.heap[slot].clone());
                    }
                    Op::Store { ptr, value } => {
                        let slot = read(&frame, *ptr)?.as_ptr()?;
                        self.heap[slot] = read(&frame, *value)?;
                    }
                    Op::GlobalRef(name) => {
                        let slot = *self.globals.get(name).ok_or_else(|| {
                            CoreError::eval(format!("unknown global `{name}`"))
                        })?;
                        frame.insert(inst.result.unwrap(), Value::Ptr(slot));
                    }
                    Op::FuncRef(name) => {
                        frame.insert(inst.result.unwrap(), Value::Func(name.clone()));
                    }
                    Op::Call { callee, args } => {
                        let mut values = Vec::with_capacity(args.len());
                        for &arg in args {
                            values.push(read(&frame, arg)?);
                        }
                        let value = self.call(callee, values)?;
                        if let Some(result) = inst.result {
                            frame.insert(result, value);
                        }
                    }
                    Op::Br { target, args } => {
                        let mut bindings = Vec::with_capacity(args.len());
                        for (param, &arg) in func.blocks[*target].params.iter().zip(args) {
                            bindings.push((param.value, read(&frame, arg)?));
                        }
                        next = Some((*target, bindings));
                    }
                    Op::BrIf {
                        cond,
                        then_target,
                        then_args,
                        else_target,
                        else_args,
                    } => {
                        let (target, args) = if read(&frame, *cond)?.as_bool()? {
                            (*then_target, then_args)
                        } else {
                            (*else_target, else_args)
                        };
                        let mut bindings = Vec::with_capacity(args.len());
                        for (param, &arg) in func.blocks[target].params.iter().zip(args) {
                            bindings.push((param.value, read(&frame, arg)?));
                        }
                        next = Some((target, bindings));
                    }
                    Op::Return(v) => {
                        return match v {
                            Some(v) => read(&frame, *v),
                            None => Ok(Value::Unit),
                        };
                    }
                }
            }
            let Some((target, bindings)) = next else {
                return Err(CoreError::eval(format!(
                    "{}: block fell through without a terminator",
                    func.name
                )));
            };
            for (value, bound) in bindings {
                frame.insert(value, bound);
            }
            block = target;
        }
    }
}

fn eval_binary(kind: BinaryKind, lhs: Value, rhs: Value) -> Result<Value, CoreError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(match kind {
            BinaryKind::Add => Value::Int(a.wrapping_add(b)),
            BinaryKind::Sub => Value::Int(a.wrapping_sub(b)),
            BinaryKind::Mul => Value::Int(a.wrapping_mul(b)),
            BinaryKind::Div => {
                if b == 0 {
                    return Err(CoreError::eval("integer division by zero"));
                }
                Value::Int(a.wrapping_div(b))
            }
        }),
        (Value::Float(a), Value::Float(b)) => Ok(match kind {
            BinaryKind::Add => Value::Float(a + b),
            BinaryKind::Sub => Value::Float(a - b),
            BinaryKind::Mul => Value::Float(a * b),
            BinaryKind::Div => Value::Float(a / b),
        }),
        (lhs, rhs) => Err(CoreError::eval(format!(
            "type mismatch in arithmetic: {lhs:?} vs {rhs:?}"
        ))),
    }
}

fn eval_cmp(kind: CmpKind, lhs: Value, rhs: Value) -> Result<Value, CoreError> {
    let result = match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => match kind {
            CmpKind::Eq => a == b,
            CmpKind::Ne => a != b,
            CmpKind::Lt => a < b,
            CmpKind::Le => a <= b,
            CmpKind::Gt => a > b,
            CmpKind::Ge => a >= b,
        },
        (Value::Float(a), Value::Float(b)) => match kind {
            CmpKind::Eq => a == b,
            CmpKind::Ne => a != b,
            CmpKind::Lt => a < b,
            CmpKind::Le => a <= b,
            CmpKind::Gt => a > b,
            CmpKind::Ge => a >= b,
        },
        (Value::Bool(a), Value::Bool(b)) => match kind {
            CmpKind::Eq => a == b,
            CmpKind::Ne => a != b,
            _ => {
                return Err(CoreError::eval("ordering comparison on bools"));
            }
        },
        _ => {
            return Err(CoreError::eval(format!(
                "type mismatch in comparison: {lhs:?} vs {rhs:?}"
            )));
        }
    };
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::{FunctionBuilder, ModuleBuilder};
    use crate::ir::{FunctionSig, Type, Visibility};

    #[test]
    fn arithmetic_and_calls() {
        let mut mb = ModuleBuilder::new("test");

        let sig = FunctionSig {
            params: vec![Type::Int(64), Type::Int(64)],
            return_ty: Type::Int(64),
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("mul_add", sig, Visibility::Public);
        let a = fb.param(0);
        let b = fb.param(1);
        let prod = fb.mul(a, b);
        let one = fb.const_int(1);
        let sum = fb.add(prod, one);
        fb.ret(Some(sum));
        mb.add_function(fb.build());

        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Int(64),
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("main", sig, Visibility::Public);
        let x = fb.const_int(6);
        let y = fb.const_int(7);
        let r = fb.call("mul_add", &[x, y], Type::Int(64)).unwrap();
        fb.ret(Some(r));
        mb.add_function(fb.build());

        let module = mb.build();
        let mut interp = Interp::new(&module);
        assert_eq!(interp.run("main", &[]).unwrap(), Value::Int(43));
    }

    #[test]
    fn block_args_carry_loop_state() {
        let sig = FunctionSig {
            params: vec![Type::Int(64)],
            return_ty: Type::Int(64),
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("sum_to", sig, Visibility::Public);
        let n = fb.param(0);
        let (head, head_vals) = fb.create_block_with_params(&[Type::Int(64), Type::Int(64)]);
        let body = fb.create_block();
        let done = fb.create_block();

        let zero = fb.const_int(0);
        let one = fb.const_int(1);
        fb.br(head, &[one, zero]);

        fb.switch_to_block(head);
        let (i, acc) = (head_vals[0], head_vals[1]);
        let c = fb.cmp(crate::ir::CmpKind::Le, i, n);
        fb.br_if(c, body, &[], done, &[]);

        fb.switch_to_block(body);
        let acc2 = fb.add(acc, i);
        let i2 = fb.add(i, one);
        fb.br(head, &[i2, acc2]);

        fb.switch_to_block(done);
        fb.ret(Some(acc));

        let mut mb = ModuleBuilder::new("test");
        mb.add_function(fb.build());
        let module = mb.build();
        let mut interp = Interp::new(&module);
        assert_eq!(interp.run("sum_to", &[Value::Int(10)]).unwrap(), Value::Int(55));
    }

    #[test]
    fn float_arithmetic() {
        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Float(64),
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("f", sig, Visibility::Public);
        let a = fb.const_float(1.5);
        let b = fb.const_float(2.25);
        let sum = fb.add(a, b);
        fb.ret(Some(sum));
        let mut mb = ModuleBuilder::new("test");
        mb.add_function(fb.build());

        let module = mb.build();
        let mut interp = Interp::new(&module);
        assert_eq!(interp.run("f", &[]).unwrap(), Value::Float(3.75));
    }

    #[test]
    fn globals_persist_across_calls() {
        let mut mb = ModuleBuilder::new("test");
        mb.add_global("n", Type::Int(64), Constant::Int(40));

        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Void,
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("bump", sig, Visibility::Public);
        let p = fb.global_ref("n", Type::Int(64));
        let v = fb.load(p, Type::Int(64));
        let one = fb.const_int(1);
        let v2 = fb.add(v, one);
        fb.store(p, v2);
        fb.ret(None);
        mb.add_function(fb.build());

        let module = mb.build();
        let mut interp = Interp::new(&module);
        interp.run("bump", &[]).unwrap();
        interp.run("bump", &[]).unwrap();
        assert_eq!(interp.global("n"), Some(&Value::Int(42)));
    }

    #[test]
    fn looper_repackages_captures_each_invocation() {
        // A callable that reads both captures every call and keeps a count
        // in a global: if the handle were shared across invocations, the
        // second call's reads would run past the end.
        let mut mb = ModuleBuilder::new("test");
        mb.add_global("left", Type::Int(64), Constant::Int(3));

        let sig = FunctionSig {
            params: vec![Type::Captures],
            return_ty: Type::Bool,
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("step", sig, Visibility::Private);
        let h = fb.param(0);
        let a = fb.call("capture_next", &[h], Type::Int(64)).unwrap();
        let b = fb.call("capture_next", &[h], Type::Int(64)).unwrap();
        let sum = fb.add(a, b);
        fb.call("record", &[sum], Type::Void);
        let p = fb.global_ref("left", Type::Int(64));
        let v = fb.load(p, Type::Int(64));
        let one = fb.const_int(1);
        let v2 = fb.sub(v, one);
        fb.store(p, v2);
        let zero = fb.const_int(0);
        let c = fb.cmp(crate::ir::CmpKind::Gt, v2, zero);
        fb.ret(Some(c));
        mb.add_function(fb.build());

        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Void,
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("main", sig, Visibility::Public);
        let f = fb.func_ref("step");
        let x = fb.const_int(20);
        let y = fb.const_int(22);
        fb.call("looper", &[f, x, y], Type::Void);
        fb.ret(None);
        mb.add_function(fb.build());

        let module = mb.build();
        let mut interp = Interp::new(&module);
        interp.run("main", &[]).unwrap();
        assert_eq!(
            interp.trace(),
            &[Value::Int(42), Value::Int(42), Value::Int(42)]
        );
        assert_eq!(interp.global("left"), Some(&Value::Int(0)));
    }

    #[test]
    fn fuel_guards_divergence() {
        let sig = FunctionSig {
            params: vec![],
            return_ty: Type::Void,
            ..Default::default()
        };
        let mut fb = FunctionBuilder::new("spin", sig, Visibility::Public);
        let head = fb.create_block();
        fb.br(head, &[]);
        fb.switch_to_block(head);
        fb.br(head, &[]);
        let mut mb = ModuleBuilder::new("test");
        mb.add_function(fb.build());

        let module = mb.build();
        let mut interp = Interp::new(&module);
        interp.set_fuel(1_000);
        let err = interp.run("spin", &[]).unwrap_err();
        assert!(matches!(err, CoreError::Eval { .. }));
    }

    #[test]
    fn unknown_function_is_reported() {
        let module = Module::new("test".into());
        let mut interp = Interp::new(&module);
        let err = interp.run("absent", &[]).unwrap_err();
        assert!(matches!(err, CoreError::UnknownFunction { .. }));
    }
}
