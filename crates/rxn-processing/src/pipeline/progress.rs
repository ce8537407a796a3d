//! Progress reporting and cancellation support for the preprocessing pipeline.
//!
//! Progress is coarse: one update when the run is planned, one when each stage
//! starts and finishes, and one terminal update. The cancellation token is
//! checked before every stage, so a cancelled run stops at the next stage
//! boundary and never leaves a half-written stage output behind.
//!
//! # Example
//!
//! ```rust,ignore
//! use rxn_processing::{CancellationToken, Pipeline};
//!
//! let token = CancellationToken::new();
//! let token_clone = token.clone();
//!
//! // In another thread
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(5));
//!     token_clone.cancel();
//! });
//!
//! let result = Pipeline::builder()
//!     .config(config)
//!     .cancellation_token(token)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run();
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::stages::StageKind;

/// Where the run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    /// Resolving paths and checking the execution plan
    Planning,
    /// A stage has started
    Running,
    /// A stage has written its outputs
    StageFinished,
    /// Pipeline completed successfully
    Complete,
    /// Pipeline was cancelled by user
    Cancelled,
    /// Pipeline failed with an error
    Failed,
}

/// One progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub state: ProgressState,

    /// Stage the update refers to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageKind>,

    /// Overall progress (0.0 - 1.0), the fraction of stages finished
    pub progress: f32,

    /// Human-readable message describing current activity
    pub message: String,

    /// Records written by the stage (finished stages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_out: Option<usize>,
}

fn fraction(done: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        (done as f32 / total as f32).clamp(0.0, 1.0)
    }
}

impl ProgressUpdate {
    pub fn planning(stage_count: usize) -> Self {
        Self {
            state: ProgressState::Planning,
            stage: None,
            progress: 0.0,
            message: format!("Planning {} stages", stage_count),
            rows_out: None,
        }
    }

    /// Stage `index` (0-based) of `total` is starting.
    pub fn stage_started(stage: StageKind, index: usize, total: usize) -> Self {
        Self {
            state: ProgressState::Running,
            stage: Some(stage),
            progress: fraction(index, total),
            message: format!("{} ({}/{})", stage.display_name(), index + 1, total),
            rows_out: None,
        }
    }

    /// Stage `index` (0-based) of `total` wrote `rows_out` records.
    pub fn stage_finished(stage: StageKind, index: usize, total: usize, rows_out: usize) -> Self {
        Self {
            state: ProgressState::StageFinished,
            stage: Some(stage),
            progress: fraction(index + 1, total),
            message: format!("{} done: {} records", stage.display_name(), rows_out),
            rows_out: Some(rows_out),
        }
    }

    /// Creates a completion progress update.
    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            state: ProgressState::Complete,
            stage: None,
            progress: 1.0,
            message: message.into(),
            rows_out: None,
        }
    }

    /// Creates a cancelled progress update.
    pub fn cancelled(stage: StageKind) -> Self {
        Self {
            state: ProgressState::Cancelled,
            stage: Some(stage),
            progress: 0.0,
            message: "Pipeline cancelled by user".to_string(),
            rows_out: None,
        }
    }

    /// Creates a failed progress update.
    pub fn failed(stage: Option<StageKind>, message: impl Into<String>) -> Self {
        Self {
            state: ProgressState::Failed,
            stage,
            progress: 0.0,
            message: message.into(),
            rows_out: None,
        }
    }
}

/// Trait for receiving progress updates during preprocessing.
///
/// Implementations must be `Send + Sync` so that a pipeline running on a
/// background thread can report to the thread that started it.
pub trait ProgressReporter: Send + Sync {
    /// Called at every stage boundary. Should not block.
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    /// Creates a new closure-based progress reporter.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Token for cancelling a running pipeline.
///
/// Cheap to clone; all clones share one flag. The pipeline checks it before
/// starting each stage and fails that stage with
/// [`PreprocessingError::Cancelled`](crate::error::PreprocessingError::Cancelled).
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

impl CancellationToken {
    /// Creates a new cancellation token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation of the pipeline. Callable from any thread.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
