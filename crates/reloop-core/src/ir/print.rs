//! Text rendering of the IR, used by debug dumps and tests.

use std::fmt;

use super::func::{Function, Visibility};
use super::inst::{BinaryKind, CmpKind, Op};
use super::module::Module;
use super::value::ValueId;

struct ValueName<'a>(&'a Function, ValueId);

impl fmt::Display for ValueName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.value_names.get(&self.1) {
            Some(name) => write!(f, "%{name}"),
            None => write!(f, "{}", self.1),
        }
    }
}

fn binary_mnemonic(kind: BinaryKind) -> &'static str {
    match kind {
        BinaryKind::Add => "add",
        BinaryKind::Sub => "sub",
        BinaryKind::Mul => "mul",
        BinaryKind::Div => "div",
    }
}

fn cmp_mnemonic(kind: CmpKind) -> &'static str {
    match kind {
        CmpKind::Eq => "eq",
        CmpKind::Ne => "ne",
        CmpKind::Lt => "lt",
        CmpKind::Le => "le",
        CmpKind::Gt => "gt",
        CmpKind::Ge => "ge",
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, func: &Function, args: &[ValueId]) -> fmt::Result {
    for (i, &arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", ValueName(func, arg))?;
    }
    Ok(())
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vis = match self.visibility {
            Visibility::Public => "",
            Visibility::Private => "private ",
        };
        write!(f, "{vis}fn {}(", self.name)?;
        for (i, param) in self.blocks[self.entry].params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", ValueName(self, param.value), param.ty)?;
        }
        writeln!(f, ") -> {} {{", self.sig.return_ty)?;

        for block in self.layout_blocks() {
            write!(f, "{block}(")?;
            for (i, param) in self.blocks[block].params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", ValueName(self, param.value), param.ty)?;
            }
            writeln!(f, "):")?;

            for &inst_id in &self.blocks[block].insts {
                let inst = &self.insts[inst_id];
                write!(f, "  ")?;
                if let Some(result) = inst.result {
                    write!(f, "{} = ", ValueName(self, result))?;
                }
                match &inst.op {
                    Op::Const(c) => {
                        let ty = &self.value_types[inst.result.unwrap()];
                        write!(f, "const.{ty} {c}")?;
                    }
                    Op::Binary { kind, lhs, rhs } => {
                        write!(
                            f,
                            "{} {}, {}",
                            binary_mnemonic(*kind),
                            ValueName(self, *lhs),
                            ValueName(self, *rhs)
                        )?;
                    }
                    Op::Cmp { kind, lhs, rhs } => {
                        write!(
                            f,
                            "cmp.{} {}, {}",
                            cmp_mnemonic(*kind),
                            ValueName(self, *lhs),
                            ValueName(self, *rhs)
                        )?;
                    }
                    Op::Not(v) => write!(f, "not {}", ValueName(self, *v))?,
                    Op::Alloc(ty) => write!(f, "alloc {ty}")?,
                    Op::Load(ptr) => write!(f, "load {}", ValueName(self, *ptr))?,
                    Op::Store { ptr, value } => {
                        write!(
                            f,
                            "store {}, {}",
                            ValueName(self, *ptr),
                            ValueName(self, *value)
                        )?;
                    }
                    Op::GlobalRef(name) => write!(f, "global_ref @{name}")?,
                    Op::FuncRef(name) => write!(f, "func_ref @{name}")?,
                    Op::Call { callee, args } => {
                        write!(f, "call {callee}(")?;
                        write_args(f, self, args)?;
                        write!(f, ")")?;
                    }
                    Op::Br { target, args } => {
                        write!(f, "br {target}(")?;
                        write_args(f, self, args)?;
                        write!(f, ")")?;
                    }
                    Op::BrIf {
                        cond,
                        then_target,
                        then_args,
                        else_target,
                        else_args,
                    } => {
                        write!(f, "br_if {}, {then_target}(", ValueName(self, *cond))?;
                        write_args(f, self, then_args)?;
                        write!(f, "), {else_target}(")?;
                        write_args(f, self, else_args)?;
                        write!(f, ")")?;
                    }
                    Op::Return(v) => match v {
                        Some(v) => write!(f, "ret {}", ValueName(self, *v))?,
                        None => write!(f, "ret")?,
                    },
                }
                writeln!(f)?;
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.name)?;
        for global in &self.globals {
            writeln!(f, "global @{}: {} = {}", global.name, global.ty, global.init)?;
        }
        for ext in &self.externs {
            let dots = if ext.sig.variadic { "..." } else { "" };
            write!(f, "extern {}(", ext.name)?;
            for (i, ty) in ext.sig.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{ty}")?;
            }
            if ext.sig.variadic && !ext.sig.params.is_empty() {
                write!(f, ", ")?;
            }
            writeln!(f, "{dots}) -> {}", ext.sig.return_ty)?;
        }
        for func in self.functions.values() {
            writeln!(f)?;
            write!(f, "{func}")?;
        }
        Ok(())
    }
}
