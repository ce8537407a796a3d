//! Pipeline stages.
//!
//! Every stage reads its input file(s), transforms the records and writes its
//! output file(s). Stages are idempotent: the same input and configuration
//! give byte-identical output, since all randomness is seeded from the
//! configuration.
//!
//! # Stages
//!
//! - [`ImportStage`]: raw TXT/CSV/TSV to reaction CSV
//! - [`StandardizeStage`]: molecule canonicalization
//! - [`PreprocessStage`]: deduplication, reaction standardization, filtering
//! - [`SplitStage`]: content-addressed train/validation/test split
//! - [`AugmentStage`]: randomized SMILES renderings
//! - [`TokenizeStage`]: space-separated token files

mod augment;
pub mod filter;
mod import;
mod preprocess;
mod split;
mod standardize;
mod tokenize;

pub use augment::{AugmentStage, Augmenter, Variants};
pub use filter::{FilterReason, MixedReactionFilter};
pub use import::{ImportStage, import_reaction};
pub use preprocess::PreprocessStage;
pub use split::SplitStage;
pub use standardize::{StandardizeStage, StandardizedReaction, standardize_equation};
pub use tokenize::{TokenizeStage, tokenize_reaction};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::error::{PreprocessingError, Result};
use crate::toolkit::ChemistryToolkit;

/// Names of the pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    #[serde(alias = "IMPORT")]
    Import,
    #[serde(alias = "STANDARDIZE")]
    Standardize,
    #[serde(alias = "PREPROCESS")]
    Preprocess,
    #[serde(alias = "AUGMENT")]
    Augment,
    #[serde(alias = "SPLIT")]
    Split,
    #[serde(alias = "TOKENIZE")]
    Tokenize,
}

impl StageKind {
    pub const ALL: [StageKind; 6] = [
        StageKind::Import,
        StageKind::Standardize,
        StageKind::Preprocess,
        StageKind::Augment,
        StageKind::Split,
        StageKind::Tokenize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Standardize => "standardize",
            Self::Preprocess => "preprocess",
            Self::Augment => "augment",
            Self::Split => "split",
            Self::Tokenize => "tokenize",
        }
    }

    /// Human-readable name used in progress messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Import => "Importing Reactions",
            Self::Standardize => "Standardizing Molecules",
            Self::Preprocess => "Filtering Reactions",
            Self::Augment => "Augmenting Reactions",
            Self::Split => "Splitting Dataset",
            Self::Tokenize => "Tokenizing Reactions",
        }
    }

    /// The stage implementation for this name.
    pub fn stage(&self) -> Box<dyn Stage> {
        match self {
            Self::Import => Box::new(ImportStage),
            Self::Standardize => Box::new(StandardizeStage),
            Self::Preprocess => Box::new(PreprocessStage),
            Self::Augment => Box::new(AugmentStage),
            Self::Split => Box::new(SplitStage),
            Self::Tokenize => Box::new(TokenizeStage),
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = PreprocessingError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        StageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| PreprocessingError::InvalidConfiguration(format!("unknown stage '{}'", s)))
    }
}

/// Everything a stage needs to run.
pub struct StageContext<'a> {
    pub config: &'a PipelineConfig,
    pub toolkit: &'a dyn ChemistryToolkit,
}

impl<'a> StageContext<'a> {
    pub fn new(config: &'a PipelineConfig, toolkit: &'a dyn ChemistryToolkit) -> Self {
        Self { config, toolkit }
    }

    pub fn reaction_column(&self) -> &str {
        &self.config.common.reaction_column_name
    }

    /// Fail when the malformed-record count exceeds the configured limit.
    pub fn check_malformed(&self, count: usize) -> Result<()> {
        match self.config.common.max_malformed_records {
            Some(limit) if count > limit => {
                Err(PreprocessingError::MalformedThresholdExceeded { count, limit })
            }
            _ => {
                if count > 0 {
                    warn!("Dropped {} malformed reactions", count);
                }
                Ok(())
            }
        }
    }
}

/// A single transformation step of the pipeline.
pub trait Stage {
    fn kind(&self) -> StageKind;

    /// Run the stage; reads and writes files named by the configuration.
    fn run(&self, ctx: &StageContext<'_>) -> Result<StageReport>;
}

/// What a stage did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageKind,
    pub rows_in: usize,
    pub rows_out: usize,
    /// Records dropped because they could not be parsed.
    pub malformed: usize,
    /// Records removed per filter reason.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filtered: BTreeMap<String, usize>,
    /// Requested augmentation variants that could not be produced.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub shortfall: usize,
    pub outputs: Vec<PathBuf>,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

impl StageReport {
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            rows_in: 0,
            rows_out: 0,
            malformed: 0,
            filtered: BTreeMap::new(),
            shortfall: 0,
            outputs: Vec::new(),
        }
    }

    pub fn with_rows(mut self, rows_in: usize, rows_out: usize) -> Self {
        self.rows_in = rows_in;
        self.rows_out = rows_out;
        self
    }

    pub fn with_malformed(mut self, malformed: usize) -> Self {
        self.malformed = malformed;
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    /// Count one removed record under `reason`.
    pub fn count_filtered(&mut self, reason: impl Into<String>) {
        *self.filtered.entry(reason.into()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::BasicToolkit;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stage_kind_parsing() {
        assert_eq!("split".parse::<StageKind>().unwrap(), StageKind::Split);
        assert_eq!("TOKENIZE".parse::<StageKind>().unwrap(), StageKind::Tokenize);
        assert!("clean".parse::<StageKind>().is_err());
    }

    #[test]
    fn test_stage_kind_serde_accepts_upper_case() {
        let kinds: Vec<StageKind> = serde_json::from_str(r#"["IMPORT", "split"]"#).unwrap();
        assert_eq!(kinds, vec![StageKind::Import, StageKind::Split]);
        assert_eq!(serde_json::to_string(&StageKind::Preprocess).unwrap(), "\"preprocess\"");
    }

    #[test]
    fn test_stage_for_kind() {
        for kind in StageKind::ALL {
            assert_eq!(kind.stage().kind(), kind);
        }
    }

    #[test]
    fn test_check_malformed_threshold() {
        let toolkit = BasicToolkit::new();
        let mut config = PipelineConfig::default();
        let ctx = StageContext::new(&config, &toolkit);
        assert!(ctx.check_malformed(100).is_ok());

        config.common.max_malformed_records = Some(2);
        let ctx = StageContext::new(&config, &toolkit);
        assert!(ctx.check_malformed(2).is_ok());
        let err = ctx.check_malformed(3).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_THRESHOLD_EXCEEDED");
    }

    #[test]
    fn test_report_counts_reasons() {
        let mut report = StageReport::new(StageKind::Preprocess).with_rows(3, 1);
        report.count_filtered("max_products_exceeded");
        report.count_filtered("max_products_exceeded");
        report.count_filtered("products_single_atoms");
        assert_eq!(report.filtered["max_products_exceeded"], 2);
        assert_eq!(report.filtered.len(), 2);
    }
}
