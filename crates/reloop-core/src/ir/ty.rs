//! Types and function signatures.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A value type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Void,
    Bool,
    /// Integer of the given bit width.
    Int(u16),
    /// Float of the given bit width.
    Float(u16),
    /// Pointer to a value of the inner type.
    Ptr(Box<Type>),
    /// Opaque capture-handle passed to an extracted loop body.
    Captures,
    /// Reference to a function, passable as a call argument.
    FuncRef,
}

impl Type {
    /// Shorthand for `Ptr(inner)`.
    pub fn ptr(inner: Type) -> Type {
        Type::Ptr(Box::new(inner))
    }

    /// The pointee type, if this is a pointer.
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Float(bits) => write!(f, "f{bits}"),
            Type::Ptr(inner) => write!(f, "ptr {inner}"),
            Type::Captures => write!(f, "captures"),
            Type::FuncRef => write!(f, "funcref"),
        }
    }
}

/// A function signature.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FunctionSig {
    pub params: Vec<Type>,
    #[serde(default = "FunctionSig::default_return_ty")]
    pub return_ty: Type,
    /// Variadic tail after the fixed params (extern declarations only).
    #[serde(default)]
    pub variadic: bool,
}

impl FunctionSig {
    fn default_return_ty() -> Type {
        Type::Void
    }
}

impl Default for Type {
    fn default() -> Self {
        Type::Void
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(Type::Int(64).to_string(), "i64");
        assert_eq!(Type::ptr(Type::Float(64)).to_string(), "ptr f64");
        assert_eq!(Type::Captures.to_string(), "captures");
    }

    #[test]
    fn pointee_only_on_pointers() {
        assert_eq!(Type::ptr(Type::Bool).pointee(), Some(&Type::Bool));
        assert_eq!(Type::Bool.pointee(), None);
    }
}
