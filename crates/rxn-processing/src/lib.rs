//! Reaction Dataset Preprocessing Library
//!
//! A reproducible preprocessing pipeline for chemical reaction datasets,
//! built with Rust and Polars.
//!
//! # Overview
//!
//! This library turns raw reaction SMILES (`reactants>agents>products`) into
//! machine-learning ready files:
//!
//! - **Import**: CSV/TSV/TXT input, atom-map removal, light/heat tokens
//! - **Standardize**: Per-molecule canonicalization, molecule annotations and
//!   invalid-molecule policies
//! - **Preprocess**: Deduplication and the mixed reaction filter
//! - **Split**: Content-addressed train/validation/test assignment
//! - **Augment**: Distinct randomized SMILES renderings per reaction
//! - **Tokenize**: Space-separated token files for sequence models
//! - **Progress Reporting**: Stage-level progress updates with cancellation support
//!
//! Molecule-level work is delegated to a [`ChemistryToolkit`]. The crate
//! ships [`BasicToolkit`], a syntactic SMILES implementation.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rxn_processing::{Pipeline, PipelineConfig, StageKind};
//!
//! let config = PipelineConfig::builder()
//!     .data_path("data/uspto.csv")
//!     .proc_dir("data/processed")
//!     .sequence([StageKind::Import, StageKind::Standardize, StageKind::Preprocess, StageKind::Split])
//!     .split_ratio(0.05)
//!     .build()?;
//!
//! let result = Pipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run()?;
//!
//! for report in &result.reports {
//!     println!("{}: {} -> {}", report.stage, report.rows_in, report.rows_out);
//! }
//! ```
//!
//! # Splitting
//!
//! Every record is fingerprinted from its sorted, deduplicated molecule sets
//! (see [`fingerprint`]), and the fingerprint alone decides the split (see
//! [`split`]). Reordered duplicates therefore always share a split, and a
//! record keeps its split when the corpus grows.
//!
//! # Configuration
//!
//! [`PipelineConfig`] holds one section per stage. Files and dotted
//! overrides are layered on top of the defaults by [`config::load_config`]:
//!
//! ```rust,ignore
//! use rxn_processing::config::load_config;
//!
//! let config = load_config(
//!     Some(Path::new("preprocess.json")),
//!     &["split.split_ratio=0.1".to_string()],
//! )?;
//! ```

pub mod annotations;
pub mod config;
pub mod dataset;
pub mod error;
pub mod fingerprint;
pub mod pipeline;
pub mod reaction;
pub mod split;
pub mod stages;
pub mod toolkit;
pub mod types;

// Re-exports for convenient access
pub use config::{
    ConfigValidationError, InvalidMoleculePolicy, PipelineConfig, PipelineConfigBuilder,
};
pub use error::{PreprocessingError, Result as PreprocessingResult, ResultExt};
pub use fingerprint::Fingerprint;
pub use pipeline::{
    CancellationToken, ClosureProgressReporter, ExecutionPlan, Pipeline, PipelineBuilder,
    ProgressReporter, ProgressState, ProgressUpdate, run_pipeline,
};
pub use reaction::{FragmentBond, ReactionEquation, ReactionSection};
pub use split::{SplitKey, SplitLabel, SplitRatio};
pub use stages::{StageKind, StageReport};
pub use toolkit::{BasicToolkit, ChemistryToolkit, RandomType};
pub use types::{PipelineOutcome, PipelineResult};
