use serde::Serialize;
use std::path::PathBuf;

use crate::error::PreprocessingError;
use crate::stages::{StageKind, StageReport};

/// Terminal state of a pipeline run.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Every stage of the sequence ran, in this order.
    Completed { stages: Vec<StageKind> },
    /// `stage` failed; no later stage ran.
    Failed {
        stage: StageKind,
        error: PreprocessingError,
    },
}

/// What a pipeline run did.
///
/// Serializes to JSON for the run summary written by the CLI.
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub outcome: PipelineOutcome,
    /// Reports of the stages that finished, in run order.
    pub reports: Vec<StageReport>,
    /// RFC 3339 start time.
    pub started_at: String,
    /// RFC 3339 end time.
    pub finished_at: String,
    /// Total execution time in milliseconds.
    pub duration_ms: u64,
    /// Where the resolved configuration was saved, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PipelineOutcome::Completed { .. })
    }

    /// The failing stage, if any.
    pub fn failed_stage(&self) -> Option<StageKind> {
        match &self.outcome {
            PipelineOutcome::Failed { stage, .. } => Some(*stage),
            PipelineOutcome::Completed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&PreprocessingError> {
        match &self.outcome {
            PipelineOutcome::Failed { error, .. } => Some(error),
            PipelineOutcome::Completed { .. } => None,
        }
    }

    /// Report of one stage, if it finished.
    pub fn report(&self, stage: StageKind) -> Option<&StageReport> {
        self.reports.iter().find(|r| r.stage == stage)
    }

    /// Convert into a `Result`, keeping the reports on success.
    pub fn into_result(self) -> Result<Vec<StageReport>, PreprocessingError> {
        match self.outcome {
            PipelineOutcome::Completed { .. } => Ok(self.reports),
            PipelineOutcome::Failed { error, .. } => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: PipelineOutcome) -> PipelineResult {
        PipelineResult {
            outcome,
            reports: vec![StageReport::new(StageKind::Import).with_rows(3, 2)],
            started_at: "2024-01-01T00:00:00+00:00".to_string(),
            finished_at: "2024-01-01T00:00:01+00:00".to_string(),
            duration_ms: 1000,
            config_path: None,
        }
    }

    #[test]
    fn test_failed_outcome_accessors() {
        let failed = result(PipelineOutcome::Failed {
            stage: StageKind::Standardize,
            error: PreprocessingError::Cancelled.in_stage("standardize"),
        });
        assert!(!failed.is_success());
        assert_eq!(failed.failed_stage(), Some(StageKind::Standardize));
        assert!(failed.error().is_some_and(|e| e.is_cancelled()));
        assert!(failed.report(StageKind::Import).is_some());
        assert!(failed.into_result().is_err());
    }

    #[test]
    fn test_outcome_serialization() {
        let completed = result(PipelineOutcome::Completed {
            stages: vec![StageKind::Import],
        });
        let json = serde_json::to_value(&completed).unwrap();
        assert_eq!(json["outcome"]["status"], "completed");
        assert_eq!(json["outcome"]["stages"][0], "import");
        assert!(json.get("config_path").is_none());

        let failed = result(PipelineOutcome::Failed {
            stage: StageKind::Split,
            error: PreprocessingError::ColumnNotFound("rxn".to_string()).in_stage("split"),
        });
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["error"]["code"], "STAGE_EXECUTION");
    }
}
