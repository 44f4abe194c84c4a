use crate::error::CoreError;
use crate::ir::Module;

use super::config::DebugConfig;

/// Result of applying a transform pass.
#[derive(Debug)]
pub struct TransformResult {
    pub module: Module,
    /// Whether the pass modified the module.
    pub changed: bool,
}

/// Output of the transform pipeline.
pub struct PipelineOutput {
    pub module: Module,
    /// `true` when the pipeline was stopped early by `--dump-ir-after`.
    pub stopped_early: bool,
}

/// Transform trait — a pass that transforms IR modules.
pub trait Transform {
    /// Name of this transform pass.
    fn name(&self) -> &str;

    /// Apply this transform to a module, returning the transformed module
    /// and whether any changes were made.
    fn apply(&self, module: Module) -> Result<TransformResult, CoreError>;

    /// If true, the pipeline skips this pass on fixpoint iterations after
    /// the first.
    fn run_once(&self) -> bool {
        false
    }
}

/// Maximum number of fixpoint iterations before giving up.
const MAX_FIXPOINT_ITERATIONS: usize = 100;

/// Valid pass names for `--dump-ir-after`, in pipeline order.
pub const VALID_PASS_NAMES: &[&str] = &[
    "input",
    "value-namer",
    "loop-simplify",
    "loop-demote",
    "loop-extract",
];

/// An ordered sequence of transforms to apply.
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
    fixpoint: bool,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
            fixpoint: false,
        }
    }

    pub fn add(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Enable fixpoint iteration: re-run the entire pipeline until no pass
    /// reports changes, or until the iteration cap is reached.
    ///
    /// Useful when a later pass exposes work for an earlier one — e.g. an
    /// extraction leaves a call-site shape a canonicalization pass would
    /// clean up on the next round.
    pub fn set_fixpoint(&mut self, enabled: bool) {
        self.fixpoint = enabled;
    }

    /// Run all transforms in order on the given module.
    pub fn run(&self, module: Module) -> Result<Module, CoreError> {
        Ok(self.run_with_debug(module, &DebugConfig::default())?.module)
    }

    /// Run the pipeline, honouring debug configuration.
    ///
    /// When `debug.dump_ir_after` is `Some(pass_name)`:
    /// - The special value `"input"` dumps the module before any transforms
    ///   and returns immediately.
    /// - Otherwise, the pipeline runs transforms one-by-one and stops after
    ///   the named pass, dumping IR (filtered by `debug.function_filter`)
    ///   and returning with `stopped_early = true`.
    /// - If the named pass is not in the pipeline (e.g. disabled via
    ///   `--skip-pass`), the pipeline runs to completion and returns
    ///   `stopped_early = false` — the caller can emit a warning.
    pub fn run_with_debug(
        &self,
        mut module: Module,
        debug: &DebugConfig,
    ) -> Result<PipelineOutput, CoreError> {
        if debug.dump_ir_after.as_deref() == Some("input") {
            dump_ir_functions(&module, debug);
            return Ok(PipelineOutput {
                module,
                stopped_early: true,
            });
        }

        let stop_after = debug.dump_ir_after.as_deref();

        if self.fixpoint {
            // Stopping mid-iteration is not meaningful in fixpoint mode, so
            // `dump_ir_after` is ignored here; the single-pass path below
            // covers the interactive debug workflow.
            for iteration in 0..MAX_FIXPOINT_ITERATIONS {
                let mut any_changed = false;
                for transform in &self.transforms {
                    if iteration > 0 && transform.run_once() {
                        continue;
                    }
                    let result = transform.apply(module)?;
                    any_changed |= result.changed;
                    module = result.module;
                }
                if !any_changed {
                    break;
                }
            }
        } else {
            for transform in &self.transforms {
                module = transform.apply(module)?.module;
                if stop_after == Some(transform.name()) {
                    dump_ir_functions(&module, debug);
                    return Ok(PipelineOutput {
                        module,
                        stopped_early: true,
                    });
                }
            }
        }

        // Compact arenas: transforms leave detached blocks and dead
        // instructions behind, and downstream consumers iterate the arenas.
        for func in module.functions.values_mut() {
            func.compact_insts();
            func.compact_blocks();
        }

        Ok(PipelineOutput {
            module,
            stopped_early: false,
        })
    }
}

/// Dump IR for all functions in `module` that pass the debug filter.
fn dump_ir_functions(module: &Module, debug: &DebugConfig) {
    for func in module.functions.values() {
        if debug.should_dump(&func.name) {
            eprintln!("=== IR: {} ===\n{}\n=== end IR ===\n", func.name, func);
        }
    }
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new()
    }
}
