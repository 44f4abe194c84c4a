pub mod block;
pub mod builder;
pub mod func;
pub mod inst;
pub mod module;
mod print;
pub mod ty;
pub mod value;

pub use block::{Block, BlockId, BlockParam};
pub use func::{FuncId, Function, Visibility};
pub use inst::{BinaryKind, CmpKind, Inst, InstId, Op};
pub use module::{ExternFunc, Global, Module};
pub use ty::{FunctionSig, Type};
pub use value::{Constant, ValueId};
