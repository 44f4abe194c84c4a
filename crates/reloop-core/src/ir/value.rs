//! Values and constants.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::define_entity;

define_entity!(ValueId);

/// A constant operand, materialized by `Op::Const`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Bool(b) => write!(f, "{b}"),
            Constant::Int(n) => write!(f, "{n}"),
            Constant::Float(x) => write!(f, "{x}"),
        }
    }
}
