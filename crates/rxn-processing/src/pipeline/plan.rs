//! Execution plan: the resolved file wiring of a run, checked before any
//! stage starts.

use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

use crate::config::{PipelineConfig, StageIo};
use crate::error::{PreprocessingError, Result};
use crate::stages::StageKind;

/// One stage of the plan with its resolved files.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStage {
    pub kind: StageKind,
    pub io: StageIo,
}

/// Ordered stages whose inputs are all accounted for.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionPlan {
    pub stages: Vec<PlannedStage>,
}

impl ExecutionPlan {
    /// Plan `common.sequence` of a resolved configuration.
    ///
    /// Every input must be written by an earlier stage of the sequence or
    /// already exist on disk.
    pub fn build(config: &PipelineConfig) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut produced: HashSet<PathBuf> = HashSet::new();
        let mut stages = Vec::with_capacity(config.common.sequence.len());

        for &kind in &config.common.sequence {
            if !seen.insert(kind) {
                return Err(PreprocessingError::InvalidConfiguration(format!(
                    "stage '{}' appears more than once in common.sequence",
                    kind
                )));
            }
        }

        for &kind in &config.common.sequence {
            let io = config.stage_io(kind)?;
            for input in &io.inputs {
                if !produced.contains(input) && !input.exists() {
                    return Err(PreprocessingError::InvalidConfiguration(format!(
                        "input '{}' of stage '{}' is not produced by an earlier stage and does not exist",
                        input.display(),
                        kind
                    )));
                }
            }
            debug!("Planned {}: {:?} -> {:?}", kind, io.inputs, io.outputs);
            produced.extend(io.outputs.iter().cloned());
            stages.push(PlannedStage { kind, io });
        }

        Ok(Self { stages })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn config(dir: &TempDir, sequence: &[StageKind]) -> PipelineConfig {
        PipelineConfig::builder()
            .data_path(dir.path().join("raw.csv"))
            .proc_dir(dir.path())
            .sequence(sequence.iter().copied())
            .build()
            .unwrap()
            .resolved()
    }

    #[test]
    fn test_plan_chains_outputs_to_inputs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("raw.csv"), "rxn\nCC.O>>CCO\n").unwrap();
        let config = config(&dir, &[StageKind::Import, StageKind::Standardize, StageKind::Split]);
        // Split reads the processed file, which nothing in this sequence writes.
        let err = ExecutionPlan::build(&config).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
        assert!(err.to_string().contains("raw.processed.csv"));

        let mut config = config;
        config.split.input_file_path = config.standardize.output_file_path.clone();
        let plan = ExecutionPlan::build(&config).unwrap();
        assert_eq!(
            plan.kinds(),
            vec![StageKind::Import, StageKind::Standardize, StageKind::Split]
        );
        assert_eq!(plan.stages[2].io.outputs.len(), 3);
    }

    #[test]
    fn test_plan_accepts_existing_inputs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("raw.processed.csv"), "rxn\nCC.O>>CCO\n").unwrap();
        let config = config(&dir, &[StageKind::Split, StageKind::Tokenize]);
        let plan = ExecutionPlan::build(&config).unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_plan_rejects_missing_raw_input() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &[StageKind::Import]);
        assert!(ExecutionPlan::build(&config).is_err());
    }

    #[test]
    fn test_plan_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &[StageKind::Import]);
        config.common.sequence = vec![StageKind::Tokenize, StageKind::Tokenize];
        let err = ExecutionPlan::build(&config).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
