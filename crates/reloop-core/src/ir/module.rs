//! Modules — the top-level compilation unit.

use serde::{Deserialize, Serialize};

use crate::entity::PrimaryMap;

use super::func::{FuncId, Function, Visibility};
use super::ty::{FunctionSig, Type};
use super::value::Constant;

/// A global variable: a named, initialized memory cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub init: Constant,
    pub visibility: Visibility,
    pub mutable: bool,
}

/// A routine declared but not defined in this module. The definition is
/// expected to be provided at link time (or natively by the interpreter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternFunc {
    pub name: String,
    pub sig: FunctionSig,
}

/// A module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub functions: PrimaryMap<FuncId, Function>,
    #[serde(default)]
    pub globals: Vec<Global>,
    #[serde(default)]
    pub externs: Vec<ExternFunc>,
}

impl Module {
    pub fn new(name: String) -> Self {
        Self {
            name,
            functions: PrimaryMap::new(),
            globals: Vec::new(),
            externs: Vec::new(),
        }
    }

    /// Declare an external routine. Idempotent, keyed by name: re-declaring
    /// an existing name is a no-op.
    pub fn declare_extern(&mut self, name: &str, sig: FunctionSig) {
        if self.externs.iter().any(|e| e.name == name) {
            return;
        }
        self.externs.push(ExternFunc {
            name: name.to_string(),
            sig,
        });
    }

    /// Look up a defined function by name.
    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| id)
    }

    /// Is `name` taken by a function, global, or extern?
    pub fn symbol_exists(&self, name: &str) -> bool {
        self.functions.values().any(|f| f.name == name)
            || self.globals.iter().any(|g| g.name == name)
            || self.externs.iter().any(|e| e.name == name)
    }

    /// Check that every symbol in the module is a valid identifier.
    ///
    /// Modules arrive from JSON, so names are untrusted input at this
    /// boundary.
    pub fn validate_symbols(&self) -> Result<(), crate::error::CoreError> {
        let all = self
            .functions
            .values()
            .map(|f| f.name.as_str())
            .chain(self.globals.iter().map(|g| g.name.as_str()))
            .chain(self.externs.iter().map(|e| e.name.as_str()));
        for name in all {
            if !is_valid_symbol(name) {
                return Err(crate::error::CoreError::InvalidSymbol {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A symbol is a Unicode identifier (XID rules, with `_` allowed anywhere).
pub fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (unicode_ident::is_xid_start(first) || first == '_')
        && chars.all(|c| unicode_ident::is_xid_continue(c))
}
