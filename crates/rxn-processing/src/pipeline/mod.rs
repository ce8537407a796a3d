//! Pipeline module.
//!
//! This module provides the stage orchestrator, its execution plan and the
//! progress/cancellation plumbing.

mod builder;
pub mod plan;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder, run_pipeline};
pub use plan::{ExecutionPlan, PlannedStage};
pub use progress::{
    CancellationToken, ClosureProgressReporter, ProgressReporter, ProgressState, ProgressUpdate,
};
