//! Pipeline document composition and execution.

mod metrics;
mod scheduler;
mod stages;

pub use metrics::{MetricsSnapshot, RunMetrics};
pub use scheduler::{
    ExecutionReport, ExecutionResult, PdalRunner, PipelineRunner, ProcessOutput, Scheduler,
    SchedulerConfig,
};
pub use stages::{
    compose, substitute_placeholder, tile_dimension, BuiltinStage, CallerPipeline,
    PipelineDocument, Stage, NAME_PLACEHOLDER,
};
