//! Debug-name assignment.
//!
//! Gives every value a printable name: entry params become `arg{i}`, all
//! other values `v{index}`. Names are display-only — value identity is the
//! `ValueId` everywhere — but dumps of multi-pass pipelines read much better
//! with stable names.

use crate::entity::EntityRef;
use crate::error::CoreError;
use crate::ir::Module;
use crate::pipeline::{Transform, TransformResult};

pub struct ValueNamer;

impl Transform for ValueNamer {
    fn name(&self) -> &str {
        "value-namer"
    }

    fn apply(&self, mut module: Module) -> Result<TransformResult, CoreError> {
        let mut changed = false;
        for func in module.functions.values_mut() {
            let params: Vec<_> = func.blocks[func.entry]
                .params
                .iter()
                .map(|p| p.value)
                .collect();
            for (i, value) in params.into_iter().enumerate() {
                if !func.value_names.contains_key(&value) {
                    func.value_names.insert(value, format!("arg{i}"));
                    changed = true;
                }
            }
            let values: Vec<_> = func.value_types.keys().collect();
            for value in values {
                if !func.value_names.contains_key(&value) {
                    func.value_names.insert(value, format!("v{}", value.index()));
                    changed = true;
                }
            }
        }
        Ok(TransformResult { module, changed })
    }
}
