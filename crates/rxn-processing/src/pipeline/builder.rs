//! Main preprocessing pipeline module.
//!
//! This module provides the core `Pipeline` struct and builder for running
//! the configured stage sequence.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::config::{ConfigValidationError, PipelineConfig, SAVED_CONFIG_FILE_NAME};
use crate::error::{PreprocessingError, Result, ResultExt};
use crate::pipeline::plan::ExecutionPlan;
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, ProgressReporter, ProgressUpdate,
};
use crate::stages::{StageContext, StageKind, StageReport};
use crate::toolkit::{BasicToolkit, ChemistryToolkit};
use crate::types::{PipelineOutcome, PipelineResult};

/// The main preprocessing pipeline.
///
/// Use [`Pipeline::builder()`] to create a new pipeline with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// use rxn_processing::{Pipeline, PipelineConfig, CancellationToken};
/// use std::sync::Arc;
///
/// let token = CancellationToken::new();
///
/// let result = Pipeline::builder()
///     .config(PipelineConfig::builder().data_path("uspto.csv").proc_dir("out").build()?)
///     .toolkit(Arc::new(MyToolkit::new()))
///     .cancellation_token(token.clone())
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .run()?;
///
/// if let Some(stage) = result.failed_stage() {
///     eprintln!("stage {} failed", stage);
/// }
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    toolkit: Arc<dyn ChemistryToolkit>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
    save_config: bool,
}

// Ensure Pipeline is Send (can be moved to another thread)
static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// The resolved configuration the pipeline runs with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run `common.sequence`.
    ///
    /// Returns `Err` only when the run cannot start: the execution plan is
    /// invalid or the resolved configuration cannot be saved. Once stages
    /// run, the first failing stage stops the run and is reported in
    /// [`PipelineResult::outcome`].
    pub fn run(&self) -> Result<PipelineResult> {
        let started_at = Utc::now();
        let start_time = Instant::now();

        info!("Starting preprocessing pipeline...");
        self.report_progress(ProgressUpdate::planning(self.config.common.sequence.len()));

        let plan = match ExecutionPlan::build(&self.config) {
            Ok(plan) => plan,
            Err(e) => {
                error!("Invalid execution plan: {}", e);
                self.report_progress(ProgressUpdate::failed(None, e.to_string()));
                return Err(e);
            }
        };
        let config_path = self.save_config()?;

        let mut reports = Vec::with_capacity(plan.len());
        let outcome = match self.run_stages(&plan, &mut reports) {
            Ok(()) => {
                info!("Pipeline completed: {} stages", plan.len());
                self.report_progress(ProgressUpdate::complete("Pipeline completed successfully"));
                PipelineOutcome::Completed {
                    stages: plan.kinds(),
                }
            }
            Err((stage, e)) => {
                if e.is_cancelled() {
                    self.report_progress(ProgressUpdate::cancelled(stage));
                } else {
                    self.report_progress(ProgressUpdate::failed(Some(stage), e.to_string()));
                }
                error!("Pipeline error: {}", e);
                PipelineOutcome::Failed { stage, error: e }
            }
        };

        Ok(PipelineResult {
            outcome,
            reports,
            started_at: started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            duration_ms: start_time.elapsed().as_millis() as u64,
            config_path,
        })
    }

    fn run_stages(
        &self,
        plan: &ExecutionPlan,
        reports: &mut Vec<StageReport>,
    ) -> std::result::Result<(), (StageKind, PreprocessingError)> {
        let ctx = StageContext::new(&self.config, self.toolkit.as_ref());
        let total = plan.len();

        for (index, planned) in plan.stages.iter().enumerate() {
            let kind = planned.kind;
            self.check_cancelled()
                .map_err(|e| (kind, e.in_stage(kind.as_str())))?;

            info!("Step {}/{}: {}", index + 1, total, kind.display_name());
            self.report_progress(ProgressUpdate::stage_started(kind, index, total));

            let report = kind
                .stage()
                .run(&ctx)
                .map_err(|e| (kind, e.in_stage(kind.as_str())))?;

            self.report_progress(ProgressUpdate::stage_finished(
                kind,
                index,
                total,
                report.rows_out,
            ));
            reports.push(report);
        }
        Ok(())
    }

    /// Write the resolved configuration next to the outputs.
    fn save_config(&self) -> Result<Option<PathBuf>> {
        if !self.save_config {
            return Ok(None);
        }
        let Some(proc_dir) = self.config.proc_dir() else {
            return Ok(None);
        };
        fs::create_dir_all(proc_dir)
            .context(format!("Failed to create directory '{}'", proc_dir.display()))?;
        let path = proc_dir.join(SAVED_CONFIG_FILE_NAME);
        let json = serde_json::to_string_pretty(&self.config)?;
        fs::write(&path, json).context(format!("Failed to write '{}'", path.display()))?;
        info!("Saved configuration to {}", path.display());
        Ok(Some(path))
    }

    /// Check if cancellation has been requested.
    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(PreprocessingError::Cancelled);
        }
        Ok(())
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }
}

/// Builder for creating a [`Pipeline`] instance.
///
/// Use [`Pipeline::builder()`] to get started.
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    toolkit: Option<Arc<dyn ChemistryToolkit>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
    save_config: bool,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            config: None,
            toolkit: None,
            progress_reporter: None,
            cancellation_token: None,
            save_config: true,
        }
    }
}

// Ensure PipelineBuilder is Send (can be moved to another thread during construction)
static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the chemistry toolkit; defaults to [`BasicToolkit`].
    ///
    /// Use `Arc` to share one toolkit handle across several pipelines.
    pub fn toolkit(mut self, toolkit: Arc<dyn ChemistryToolkit>) -> Self {
        self.toolkit = Some(toolkit);
        self
    }

    /// Set a progress reporter for receiving updates during processing.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// This is a convenience method for simple progress handling.
    /// For more complex scenarios, use [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Set a cancellation token for stopping the pipeline between stages.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Whether to write `preprocessing_config.json` into `data.proc_dir`
    /// before running. Default: true
    pub fn save_config(mut self, save: bool) -> Self {
        self.save_config = save;
        self
    }

    /// Build the pipeline.
    ///
    /// Validates the configuration and fills in every derived path.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Pipeline {
            config: config.resolved(),
            toolkit: self.toolkit.unwrap_or_else(|| Arc::new(BasicToolkit::new())),
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
            save_config: self.save_config,
        })
    }
}

/// Run a configuration with the default toolkit.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineResult> {
    Pipeline::builder().config(config.clone()).build()?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::progress::ProgressState;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn config(dir: &TempDir, sequence: &[StageKind]) -> PipelineConfig {
        std::fs::write(dir.path().join("raw.csv"), "rxn\nCC.O>>CCO\nCCN.O>>CCO\n").unwrap();
        PipelineConfig::builder()
            .data_path(dir.path().join("raw.csv"))
            .proc_dir(dir.path())
            .sequence(sequence.iter().copied())
            .build()
            .unwrap()
    }

    #[test]
    fn test_pipeline_builder_default() {
        let pipeline = Pipeline::builder().build().unwrap();
        assert_eq!(pipeline.config().split.split_ratio, 0.05);
        assert_eq!(pipeline.toolkit.name(), "basic");
    }

    #[test]
    fn test_pipeline_builder_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.split.split_ratio = 0.6;
        assert!(Pipeline::builder().config(config).build().is_err());
    }

    #[test]
    fn test_run_saves_config_and_reports_progress() {
        let dir = TempDir::new().unwrap();
        let states = Arc::new(Mutex::new(Vec::new()));
        let states_clone = states.clone();

        let result = Pipeline::builder()
            .config(config(&dir, &[StageKind::Import, StageKind::Standardize]))
            .on_progress(move |update| states_clone.lock().unwrap().push(update.state))
            .build()
            .unwrap()
            .run()
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.reports.len(), 2);
        assert_eq!(result.report(StageKind::Standardize).unwrap().rows_out, 2);

        let saved = dir.path().join(SAVED_CONFIG_FILE_NAME);
        assert_eq!(result.config_path.as_deref(), Some(saved.as_path()));
        let saved: PipelineConfig =
            serde_json::from_str(&std::fs::read_to_string(saved).unwrap()).unwrap();
        assert!(saved.standardize.output_file_path.is_some());

        assert_eq!(
            *states.lock().unwrap(),
            vec![
                ProgressState::Planning,
                ProgressState::Running,
                ProgressState::StageFinished,
                ProgressState::Running,
                ProgressState::StageFinished,
                ProgressState::Complete,
            ]
        );
    }

    #[test]
    fn test_cancelled_before_first_stage() {
        let dir = TempDir::new().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = Pipeline::builder()
            .config(config(&dir, &[StageKind::Import]))
            .cancellation_token(token)
            .save_config(false)
            .build()
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(result.failed_stage(), Some(StageKind::Import));
        assert!(result.error().unwrap().is_cancelled());
        assert!(result.reports.is_empty());
        assert!(!dir.path().join("raw.imported.csv").exists());
        assert!(!dir.path().join(SAVED_CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_invalid_plan_is_an_error() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let err = Pipeline::builder()
            .config(config(&dir, &[StageKind::Split]))
            .on_progress(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap()
            .run()
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
        // Planning and failure updates only.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_run_pipeline_helper() {
        let dir = TempDir::new().unwrap();
        let result = run_pipeline(&config(&dir, &[StageKind::Import])).unwrap();
        assert!(result.is_success());
        assert!(dir.path().join("raw.imported.csv").exists());
    }
}
