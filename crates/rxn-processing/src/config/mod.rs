//! Configuration types for the reaction preprocessing pipeline.
//!
//! The configuration is one nested structure with a section per stage plus
//! the shared `data` and `common` sections. Paths left unset are derived from
//! `data.proc_dir` and `data.name` by [`PipelineConfig::resolved`], so that
//! each stage reads what the previous one wrote.
//!
//! Configurations are built once (see [`layers`] for file and override
//! loading), validated eagerly and read-only afterwards.

pub mod layers;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::dataset::{DEFAULT_REACTION_COLUMN, InputFormat};
use crate::error::PreprocessingError;
use crate::fingerprint::DEFAULT_HASH_SEED;
use crate::reaction::{FragmentBond, ReactionSection};
use crate::split::{SplitKey, SplitLabel};
use crate::stages::StageKind;
use crate::toolkit::RandomType;

pub use layers::load_config;

/// Name of the resolved configuration file written next to the outputs.
pub const SAVED_CONFIG_FILE_NAME: &str = "preprocessing_config.json";

/// What to do with a reaction containing a molecule the toolkit cannot parse,
/// a rejected molecule or a molecule missing an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvalidMoleculePolicy {
    /// Remove the whole reaction.
    #[default]
    DropReaction,
    /// Keep the reaction and list the offending molecules in extra columns.
    Flag,
}

/// Input data and intermediate storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// Raw input file.
    pub path: Option<PathBuf>,
    /// Base name of derived files; defaults to the stem of `path`.
    pub name: Option<String>,
    /// Directory for intermediate and final files.
    pub proc_dir: Option<PathBuf>,
}

/// Settings shared by several stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommonConfig {
    /// Stages to run, in order.
    pub sequence: Vec<StageKind>,
    pub fragment_bond: FragmentBond,
    pub reaction_column_name: String,
    /// Keep helper columns such as `<rxn>_before_std`.
    pub keep_intermediate_columns: bool,
    /// Fail a stage when more records than this are malformed.
    /// Default: None (malformed records are dropped and counted)
    pub max_malformed_records: Option<usize>,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            sequence: vec![
                StageKind::Import,
                StageKind::Standardize,
                StageKind::Preprocess,
                StageKind::Split,
                StageKind::Tokenize,
            ],
            fragment_bond: FragmentBond::Dot,
            reaction_column_name: DEFAULT_REACTION_COLUMN.to_string(),
            keep_intermediate_columns: false,
            max_malformed_records: None,
        }
    }
}

/// Initial import of the raw reaction data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    pub input_file: Option<PathBuf>,
    pub output_csv: Option<PathBuf>,
    /// Guessed from the file extension when unset.
    pub data_format: Option<InputFormat>,
    /// Column holding the raw reactions; defaults to the common reaction column.
    pub input_csv_column_name: Option<String>,
    pub remove_atom_mapping: bool,
    /// Boolean column; adds the light token to the precursors when true.
    pub column_for_light: Option<String>,
    /// Boolean column; adds the heat token to the precursors when true.
    pub column_for_heat: Option<String>,
    /// Keep the raw reactions in `<rxn>_original`.
    pub keep_original_rxn_column: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            input_file: None,
            output_csv: None,
            data_format: None,
            input_csv_column_name: None,
            remove_atom_mapping: true,
            column_for_light: None,
            column_for_heat: None,
            keep_original_rxn_column: false,
        }
    }
}

/// Molecule standardization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct StandardizeConfig {
    pub input_file_path: Option<PathBuf>,
    pub output_file_path: Option<PathBuf>,
    pub invalid_molecule_policy: InvalidMoleculePolicy,
    /// Strip chiral markers from products when no precursor has any.
    pub remove_stereo_if_not_defined_in_precursors: bool,
    /// JSON files of molecule annotations, see [`crate::annotations`].
    pub annotation_file_paths: Vec<PathBuf>,
    /// Treat metal-containing molecules without an annotation as invalid.
    pub discard_unannotated_metals: bool,
}

impl StandardizeConfig {
    /// Whether annotation lookups can change the outcome of the stage.
    pub fn uses_annotations(&self) -> bool {
        !self.annotation_file_paths.is_empty() || self.discard_unannotated_metals
    }
}

/// Reaction-level standardization and filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessConfig {
    pub input_file_path: Option<PathBuf>,
    pub output_file_path: Option<PathBuf>,
    pub min_reactants: usize,
    pub max_reactants: usize,
    pub max_reactants_tokens: usize,
    pub min_agents: usize,
    pub max_agents: usize,
    pub max_agents_tokens: usize,
    pub min_products: usize,
    pub max_products: usize,
    pub max_products_tokens: usize,
    pub max_absolute_formal_charge: i32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            input_file_path: None,
            output_file_path: None,
            min_reactants: 2,
            max_reactants: 10,
            max_reactants_tokens: 300,
            min_agents: 0,
            max_agents: 0,
            max_agents_tokens: 0,
            min_products: 1,
            max_products: 1,
            max_products_tokens: 200,
            max_absolute_formal_charge: 2,
        }
    }
}

impl PreprocessConfig {
    /// Agents are kept as a separate group only when some are allowed.
    pub fn keeps_agents(&self) -> bool {
        self.max_agents > 0
    }
}

/// Augmentation with randomized SMILES.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AugmentConfig {
    pub input_file_path: Option<PathBuf>,
    pub output_file_path: Option<PathBuf>,
    pub random_type: RandomType,
    /// Variants requested per reaction.
    pub permutations: usize,
    pub rxn_section_to_augment: ReactionSection,
    pub seed: u64,
    /// At most `permutations * max_attempts_factor` draws per reaction.
    pub max_attempts_factor: usize,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            input_file_path: None,
            output_file_path: None,
            random_type: RandomType::Unrestricted,
            permutations: 1,
            rxn_section_to_augment: ReactionSection::Precursors,
            seed: 42,
            max_attempts_factor: 10,
        }
    }
}

/// Content-addressed dataset split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    pub input_file_path: Option<PathBuf>,
    pub output_directory: Option<PathBuf>,
    /// Fraction of records for each of validation and test.
    pub split_ratio: f64,
    pub index_column: SplitKey,
    pub hash_seed: u64,
    pub shuffle_seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            input_file_path: None,
            output_directory: None,
            split_ratio: 0.05,
            index_column: SplitKey::Reaction,
            hash_seed: DEFAULT_HASH_SEED,
            shuffle_seed: 42,
        }
    }
}

impl SplitConfig {
    /// `<output_directory>/<input stem>.<label>.csv`
    pub fn output_path(&self, label: SplitLabel) -> Option<PathBuf> {
        let input = self.input_file_path.as_ref()?;
        let directory = self.output_directory.as_ref()?;
        let stem = input.file_stem()?.to_string_lossy();
        Some(directory.join(format!("{}.{}.csv", stem, label)))
    }
}

/// One tokenization job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputOutputPair {
    pub inp: PathBuf,
    /// Output prefix; `.precursors_tokens` and `.products_tokens` are appended.
    pub out: PathBuf,
}

impl InputOutputPair {
    pub fn precursors_output(&self) -> PathBuf {
        with_suffix(&self.out, "precursors_tokens")
    }

    pub fn products_output(&self) -> PathBuf {
        with_suffix(&self.out, "products_tokens")
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Tokenization for sequence models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TokenizeConfig {
    /// Defaults to the three split files when empty.
    pub input_output_pairs: Vec<InputOutputPair>,
}

/// Input and output files of one stage; the main data file comes first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageIo {
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

/// Configuration for the preprocessing pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use rxn_processing::config::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .data_path("data/uspto.csv")
///     .proc_dir("processed")
///     .split_ratio(0.1)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub common: CommonConfig,
    pub rxn_import: ImportConfig,
    pub standardize: StandardizeConfig,
    pub preprocess: PreprocessConfig,
    pub augment: AugmentConfig,
    pub split: SplitConfig,
    pub tokenize: TokenizeConfig,
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let ratio = self.split.split_ratio;
        if !(0.0..=0.5).contains(&ratio) {
            return Err(ConfigValidationError::InvalidRatio {
                field: "split.split_ratio".to_string(),
                value: ratio,
            });
        }

        if self.common.reaction_column_name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyValue(
                "common.reaction_column_name".to_string(),
            ));
        }

        if let SplitKey::Column(name) = &self.split.index_column
            && name.trim().is_empty()
        {
            return Err(ConfigValidationError::EmptyValue("split.index_column".to_string()));
        }

        let p = &self.preprocess;
        for (group, min, max) in [
            ("reactants", p.min_reactants, p.max_reactants),
            ("agents", p.min_agents, p.max_agents),
            ("products", p.min_products, p.max_products),
        ] {
            if min > max {
                return Err(ConfigValidationError::InvalidRange {
                    field: format!("preprocess.{}", group),
                    min,
                    max,
                });
            }
        }

        if p.max_absolute_formal_charge < 0 {
            return Err(ConfigValidationError::NegativeValue {
                field: "preprocess.max_absolute_formal_charge".to_string(),
                value: i64::from(p.max_absolute_formal_charge),
            });
        }

        if self.augment.permutations == 0 {
            return Err(ConfigValidationError::ZeroValue("augment.permutations".to_string()));
        }
        if self.augment.max_attempts_factor == 0 {
            return Err(ConfigValidationError::ZeroValue(
                "augment.max_attempts_factor".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for stage in &self.common.sequence {
            if !seen.insert(stage) {
                return Err(ConfigValidationError::DuplicateStage(stage.to_string()));
            }
        }

        Ok(())
    }

    /// Base name of derived files.
    pub fn data_name(&self) -> Option<String> {
        self.data.name.clone().or_else(|| {
            self.data
                .path
                .as_ref()
                .and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().into_owned())
        })
    }

    fn derived(&self, suffix: &str) -> Option<PathBuf> {
        let name = self.data_name()?;
        let proc_dir = self.data.proc_dir.as_ref()?;
        Some(proc_dir.join(format!("{}.{}", name, suffix)))
    }

    /// A copy with every unset path filled in from `data`.
    ///
    /// Paths that cannot be derived (no `data.proc_dir`, no name) stay unset;
    /// [`stage_io`](Self::stage_io) reports them when a stage needs them.
    pub fn resolved(&self) -> Self {
        let mut c = self.clone();
        c.data.name = c.data_name();

        fill(&mut c.rxn_import.input_file, c.data.path.clone());
        fill(&mut c.rxn_import.output_csv, self.derived("imported.csv"));

        fill(&mut c.standardize.input_file_path, c.rxn_import.output_csv.clone());
        fill(&mut c.standardize.output_file_path, self.derived("standardized.csv"));

        fill(&mut c.preprocess.input_file_path, c.standardize.output_file_path.clone());
        fill(&mut c.preprocess.output_file_path, self.derived("processed.csv"));

        fill(&mut c.split.input_file_path, c.preprocess.output_file_path.clone());
        fill(&mut c.split.output_directory, c.data.proc_dir.clone());

        fill(&mut c.augment.input_file_path, c.split.output_path(SplitLabel::Train));
        if c.augment.output_file_path.is_none() {
            c.augment.output_file_path = c
                .augment
                .input_file_path
                .as_ref()
                .map(|input| input.with_extension("augmented.csv"));
        }

        if c.tokenize.input_output_pairs.is_empty() {
            c.tokenize.input_output_pairs = SplitLabel::ALL
                .iter()
                .filter_map(|&label| {
                    let inp = c.split.output_path(label)?;
                    let out = inp.with_extension("");
                    Some(InputOutputPair { inp, out })
                })
                .collect();
        }

        c
    }

    /// Files read and written by a stage of a resolved configuration.
    pub fn stage_io(&self, stage: StageKind) -> Result<StageIo, PreprocessingError> {
        let io = match stage {
            StageKind::Import => StageIo {
                inputs: vec![required(&self.rxn_import.input_file, "rxn_import.input_file")?],
                outputs: vec![required(&self.rxn_import.output_csv, "rxn_import.output_csv")?],
            },
            StageKind::Standardize => {
                let mut inputs =
                    vec![required(&self.standardize.input_file_path, "standardize.input_file_path")?];
                inputs.extend(self.standardize.annotation_file_paths.iter().cloned());
                StageIo {
                    inputs,
                    outputs: vec![required(&self.standardize.output_file_path, "standardize.output_file_path")?],
                }
            }
            StageKind::Preprocess => StageIo {
                inputs: vec![required(&self.preprocess.input_file_path, "preprocess.input_file_path")?],
                outputs: vec![required(&self.preprocess.output_file_path, "preprocess.output_file_path")?],
            },
            StageKind::Augment => StageIo {
                inputs: vec![required(&self.augment.input_file_path, "augment.input_file_path")?],
                outputs: vec![required(&self.augment.output_file_path, "augment.output_file_path")?],
            },
            StageKind::Split => {
                let input = required(&self.split.input_file_path, "split.input_file_path")?;
                required(&self.split.output_directory, "split.output_directory")?;
                let outputs = SplitLabel::ALL
                    .iter()
                    .filter_map(|&label| self.split.output_path(label))
                    .collect::<Vec<_>>();
                if outputs.len() != SplitLabel::ALL.len() {
                    return Err(PreprocessingError::InvalidConfiguration(format!(
                        "cannot derive split file names from '{}'",
                        input.display()
                    )));
                }
                StageIo {
                    inputs: vec![input],
                    outputs,
                }
            }
            StageKind::Tokenize => {
                let pairs = &self.tokenize.input_output_pairs;
                if pairs.is_empty() {
                    return Err(PreprocessingError::InvalidConfiguration(
                        "tokenize.input_output_pairs is empty".to_string(),
                    ));
                }
                StageIo {
                    inputs: pairs.iter().map(|p| p.inp.clone()).collect(),
                    outputs: pairs
                        .iter()
                        .flat_map(|p| [p.precursors_output(), p.products_output()])
                        .collect(),
                }
            }
        };
        Ok(io)
    }

    /// Directory where the resolved configuration is saved.
    pub fn proc_dir(&self) -> Option<&Path> {
        self.data.proc_dir.as_deref()
    }
}

fn fill(slot: &mut Option<PathBuf>, value: Option<PathBuf>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn required(path: &Option<PathBuf>, field: &str) -> Result<PathBuf, PreprocessingError> {
    path.clone().ok_or_else(|| {
        PreprocessingError::InvalidConfiguration(format!(
            "'{}' is not set and cannot be derived (set data.path and data.proc_dir)",
            field
        ))
    })
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid ratio for '{field}': {value} (must be between 0.0 and 0.5)")]
    InvalidRatio { field: String, value: f64 },

    #[error("Invalid range for '{field}': min {min} is greater than max {max}")]
    InvalidRange { field: String, min: usize, max: usize },

    #[error("Invalid value for '{field}': {value} (must not be negative)")]
    NegativeValue { field: String, value: i64 },

    #[error("'{0}' must be at least 1")]
    ZeroValue(String),

    #[error("'{0}' must not be empty")]
    EmptyValue(String),

    #[error("Stage '{0}' appears more than once in common.sequence")]
    DuplicateStage(String),
}

impl From<ConfigValidationError> for PreprocessingError {
    fn from(error: ConfigValidationError) -> Self {
        PreprocessingError::InvalidConfiguration(error.to_string())
    }
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the raw input file.
    pub fn data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data.path = Some(path.into());
        self
    }

    /// Set the base name of derived files.
    pub fn data_name(mut self, name: impl Into<String>) -> Self {
        self.config.data.name = Some(name.into());
        self
    }

    /// Set the directory for intermediate and final files.
    pub fn proc_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data.proc_dir = Some(path.into());
        self
    }

    /// Set the stages to run, in order.
    pub fn sequence(mut self, sequence: impl IntoIterator<Item = StageKind>) -> Self {
        self.config.common.sequence = sequence.into_iter().collect();
        self
    }

    pub fn fragment_bond(mut self, fragment_bond: FragmentBond) -> Self {
        self.config.common.fragment_bond = fragment_bond;
        self
    }

    pub fn reaction_column_name(mut self, name: impl Into<String>) -> Self {
        self.config.common.reaction_column_name = name.into();
        self
    }

    pub fn keep_intermediate_columns(mut self, keep: bool) -> Self {
        self.config.common.keep_intermediate_columns = keep;
        self
    }

    /// Fail stages that drop more than `limit` malformed records.
    pub fn max_malformed_records(mut self, limit: usize) -> Self {
        self.config.common.max_malformed_records = Some(limit);
        self
    }

    /// Set the fraction of records for each of validation and test.
    ///
    /// # Arguments
    /// * `ratio` - Value between 0.0 and 0.5 (e.g., 0.05 = 5% test, 5% validation)
    pub fn split_ratio(mut self, ratio: f64) -> Self {
        self.config.split.split_ratio = ratio;
        self
    }

    pub fn split_key(mut self, key: SplitKey) -> Self {
        self.config.split.index_column = key;
        self
    }

    pub fn hash_seed(mut self, seed: u64) -> Self {
        self.config.split.hash_seed = seed;
        self
    }

    pub fn permutations(mut self, permutations: usize) -> Self {
        self.config.augment.permutations = permutations;
        self
    }

    pub fn random_type(mut self, random_type: RandomType) -> Self {
        self.config.augment.random_type = random_type;
        self
    }

    /// Set the minimum number of reactants a reaction must have.
    pub fn min_reactants(mut self, min: usize) -> Self {
        self.config.preprocess.min_reactants = min;
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.split.split_ratio, 0.05);
        assert_eq!(config.split.hash_seed, 42);
        assert_eq!(config.common.reaction_column_name, "rxn");
        assert_eq!(config.preprocess.min_reactants, 2);
        assert_eq!(config.preprocess.max_products, 1);
        assert_eq!(config.augment.max_attempts_factor, 10);
        assert!(config.rxn_import.remove_atom_mapping);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = PipelineConfig::builder()
            .data_path("/data/uspto.csv")
            .proc_dir("/tmp/out")
            .split_ratio(0.1)
            .permutations(5)
            .build()
            .unwrap();
        assert_eq!(config.split.split_ratio, 0.1);
        assert_eq!(config.augment.permutations, 5);
        assert_eq!(config.data_name().as_deref(), Some("uspto"));
    }

    #[test]
    fn test_validation_invalid_ratio() {
        let result = PipelineConfig::builder().split_ratio(0.6).build();
        assert!(matches!(result, Err(ConfigValidationError::InvalidRatio { .. })));
        let result = PipelineConfig::builder().split_ratio(f64::NAN).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_duplicate_stage() {
        let result = PipelineConfig::builder()
            .sequence([StageKind::Import, StageKind::Split, StageKind::Import])
            .build();
        assert!(matches!(result, Err(ConfigValidationError::DuplicateStage(_))));
    }

    #[test]
    fn test_validation_min_greater_than_max() {
        let result = PipelineConfig::builder().min_reactants(20).build();
        assert!(matches!(result, Err(ConfigValidationError::InvalidRange { .. })));
    }

    #[test]
    fn test_resolved_paths() {
        let config = PipelineConfig::builder()
            .data_path("/data/uspto.csv")
            .proc_dir("/out")
            .build()
            .unwrap()
            .resolved();

        assert_eq!(config.data.name.as_deref(), Some("uspto"));
        assert_eq!(
            config.rxn_import.output_csv,
            Some(PathBuf::from("/out/uspto.imported.csv"))
        );
        assert_eq!(
            config.standardize.input_file_path,
            Some(PathBuf::from("/out/uspto.imported.csv"))
        );
        assert_eq!(
            config.split.output_path(SplitLabel::Validation),
            Some(PathBuf::from("/out/uspto.processed.validation.csv"))
        );
        assert_eq!(
            config.augment.output_file_path,
            Some(PathBuf::from("/out/uspto.processed.train.augmented.csv"))
        );
        assert_eq!(config.tokenize.input_output_pairs.len(), 3);
        assert_eq!(
            config.tokenize.input_output_pairs[2].products_output(),
            PathBuf::from("/out/uspto.processed.test.products_tokens")
        );
    }

    #[test]
    fn test_explicit_paths_are_kept() {
        let mut config = PipelineConfig::default();
        config.data.proc_dir = Some(PathBuf::from("/out"));
        config.data.name = Some("x".to_string());
        config.preprocess.output_file_path = Some(PathBuf::from("/elsewhere/clean.csv"));
        let config = config.resolved();
        assert_eq!(
            config.split.input_file_path,
            Some(PathBuf::from("/elsewhere/clean.csv"))
        );
        assert_eq!(
            config.split.output_path(SplitLabel::Train),
            Some(PathBuf::from("/out/clean.train.csv"))
        );
    }

    #[test]
    fn test_stage_io_reports_missing_paths() {
        let config = PipelineConfig::default().resolved();
        let err = config.stage_io(StageKind::Import).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
        assert!(err.to_string().contains("rxn_import.input_file"));
    }

    #[test]
    fn test_annotation_files_are_standardize_inputs() {
        let mut config = PipelineConfig::builder()
            .data_path("/data/uspto.csv")
            .proc_dir("/out")
            .build()
            .unwrap();
        assert!(!config.standardize.uses_annotations());
        config.standardize.annotation_file_paths = vec![PathBuf::from("/ann/catalysts.json")];
        assert!(config.standardize.uses_annotations());

        let io = config.resolved().stage_io(StageKind::Standardize).unwrap();
        assert_eq!(
            io.inputs,
            vec![
                PathBuf::from("/out/uspto.imported.csv"),
                PathBuf::from("/ann/catalysts.json"),
            ]
        );
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = PipelineConfig::builder()
            .data_path("a.csv")
            .split_key(SplitKey::Products)
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
