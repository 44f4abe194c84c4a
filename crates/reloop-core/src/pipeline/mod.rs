pub mod config;
pub mod transform;

pub use config::{CapturePassing, DebugConfig, PassConfig};
pub use transform::{
    PipelineOutput, Transform, TransformPipeline, TransformResult, VALID_PASS_NAMES,
};

use crate::transforms::{LoopDemote, LoopExtract, LoopSimplify, ValueNamer};

/// Build the standard pipeline from a pass config.
///
/// Order matters: `loop-simplify` and `loop-demote` establish the loop shape
/// `loop-extract` demands.
pub fn default_pipeline(config: &PassConfig) -> TransformPipeline {
    let mut pipeline = TransformPipeline::new();
    if config.value_namer {
        pipeline.add(Box::new(ValueNamer));
    }
    if config.loop_simplify {
        pipeline.add(Box::new(LoopSimplify));
    }
    if config.loop_demote {
        pipeline.add(Box::new(LoopDemote));
    }
    if config.loop_extract {
        pipeline.add(Box::new(LoopExtract::new(config.capture_passing)));
    }
    pipeline.set_fixpoint(config.fixpoint);
    pipeline
}
