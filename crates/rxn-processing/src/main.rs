//! CLI entry point for the reaction preprocessing pipeline.

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rxn_processing::config::{InputOutputPair, load_config};
use rxn_processing::dataset::InputFormat;
use rxn_processing::{
    FragmentBond, InvalidMoleculePolicy, Pipeline, PipelineResult, RandomType, ReactionSection,
    StageKind,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};

/// CLI-compatible stage names
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliStage {
    Import,
    Standardize,
    Preprocess,
    Augment,
    Split,
    Tokenize,
}

impl From<CliStage> for StageKind {
    fn from(cli: CliStage) -> Self {
        match cli {
            CliStage::Import => StageKind::Import,
            CliStage::Standardize => StageKind::Standardize,
            CliStage::Preprocess => StageKind::Preprocess,
            CliStage::Augment => StageKind::Augment,
            CliStage::Split => StageKind::Split,
            CliStage::Tokenize => StageKind::Tokenize,
        }
    }
}

/// CLI-compatible fragment bond enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFragmentBond {
    /// Fragments joined with '.'
    Dot,
    /// Fragments joined with '~'
    Tilde,
}

impl From<CliFragmentBond> for FragmentBond {
    fn from(cli: CliFragmentBond) -> Self {
        match cli {
            CliFragmentBond::Dot => FragmentBond::Dot,
            CliFragmentBond::Tilde => FragmentBond::Tilde,
        }
    }
}

/// CLI-compatible input format enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliInputFormat {
    /// One reaction per line, no header
    Txt,
    /// Comma-separated with header
    Csv,
    /// Tab-separated with header
    Tsv,
}

impl From<CliInputFormat> for InputFormat {
    fn from(cli: CliInputFormat) -> Self {
        match cli {
            CliInputFormat::Txt => InputFormat::Txt,
            CliInputFormat::Csv => InputFormat::Csv,
            CliInputFormat::Tsv => InputFormat::Tsv,
        }
    }
}

/// CLI-compatible invalid molecule policy enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliInvalidMoleculePolicy {
    /// Remove reactions containing an invalid or rejected molecule
    Drop,
    /// Keep them and list the offending molecules in extra columns
    Flag,
}

impl From<CliInvalidMoleculePolicy> for InvalidMoleculePolicy {
    fn from(cli: CliInvalidMoleculePolicy) -> Self {
        match cli {
            CliInvalidMoleculePolicy::Drop => InvalidMoleculePolicy::DropReaction,
            CliInvalidMoleculePolicy::Flag => InvalidMoleculePolicy::Flag,
        }
    }
}

/// CLI-compatible randomization enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliRandomType {
    /// Shuffle molecule order only
    Molecules,
    /// Random root atom and branch order
    Unrestricted,
    /// Random root atom, canonical branch order
    Restricted,
    /// Rotated atom order
    Rotated,
}

impl From<CliRandomType> for RandomType {
    fn from(cli: CliRandomType) -> Self {
        match cli {
            CliRandomType::Molecules => RandomType::Molecules,
            CliRandomType::Unrestricted => RandomType::Unrestricted,
            CliRandomType::Restricted => RandomType::Restricted,
            CliRandomType::Rotated => RandomType::Rotated,
        }
    }
}

/// CLI-compatible reaction section enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliSection {
    /// Reactants and agents
    Precursors,
    /// Products
    Products,
}

impl From<CliSection> for ReactionSection {
    fn from(cli: CliSection) -> Self {
        match cli {
            CliSection::Precursors => ReactionSection::Precursors,
            CliSection::Products => ReactionSection::Products,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Reproducible preprocessing pipeline for chemical reaction datasets",
    long_about = "Imports, standardizes, filters, splits, augments and tokenizes reaction SMILES.\n\n\
                  EXAMPLES:\n  \
                  # Full pipeline from a configuration file\n  \
                  rxn-processing run --config preprocess.json\n\n  \
                  # Override single values\n  \
                  rxn-processing run --config preprocess.json --set split.split_ratio=0.1\n\n  \
                  # Run selected stages only\n  \
                  rxn-processing run --set data.path=uspto.csv --set data.proc_dir=out --sequence import,standardize,preprocess,split\n\n  \
                  # One stage on explicit files\n  \
                  rxn-processing split -i data.processed.csv -o splits/ --split-ratio 0.05"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON configuration file applied on top of the defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override a configuration value (dotted key, e.g. split.split_ratio=0.1)
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output the run summary as JSON to stdout instead of human-readable text
    ///
    /// Disables all progress logs.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the configured stage sequence
    Run {
        /// Stages to run, in order (defaults to common.sequence)
        #[arg(long, value_enum, value_delimiter = ',')]
        sequence: Vec<CliStage>,
    },
    /// Import raw reactions into the reaction CSV format
    Import {
        #[command(flatten)]
        io: StageFiles,

        /// Column holding the raw reactions
        #[arg(long)]
        column: Option<String>,

        /// Input layout (guessed from the extension when omitted)
        #[arg(long, value_enum)]
        format: Option<CliInputFormat>,

        /// Keep atom-map numbers
        #[arg(long)]
        keep_atom_mapping: bool,

        /// Boolean column adding the light token when true
        #[arg(long)]
        light_column: Option<String>,

        /// Boolean column adding the heat token when true
        #[arg(long)]
        heat_column: Option<String>,

        /// Keep the raw reactions in an extra column
        #[arg(long)]
        keep_original: bool,
    },
    /// Canonicalize every molecule
    Standardize {
        #[command(flatten)]
        io: StageFiles,

        /// What to do with reactions containing invalid molecules
        #[arg(long, value_enum)]
        invalid_molecules: Option<CliInvalidMoleculePolicy>,

        /// Strip product stereo when no precursor defines any
        #[arg(long)]
        remove_product_stereo: bool,

        /// JSON file of molecule annotations (repeatable)
        #[arg(long = "annotation-file", value_name = "FILE")]
        annotation_files: Vec<PathBuf>,

        /// Reject reactions with metal-containing molecules missing from the annotations
        #[arg(long)]
        discard_unannotated_metals: bool,
    },
    /// Deduplicate and filter reactions
    Preprocess {
        #[command(flatten)]
        io: StageFiles,

        #[command(flatten)]
        bounds: PreprocessBounds,
    },
    /// Split into train/validation/test files
    Split {
        /// Input reaction CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving the three split files
        #[arg(short, long)]
        output: PathBuf,

        /// Fraction of records in each of validation and test
        #[arg(long)]
        split_ratio: Option<f64>,

        /// Split key: reaction, products, precursors or a column name
        #[arg(long)]
        key: Option<String>,

        #[arg(long)]
        hash_seed: Option<u64>,

        #[arg(long)]
        shuffle_seed: Option<u64>,
    },
    /// Add randomized SMILES renderings
    Augment {
        #[command(flatten)]
        io: StageFiles,

        /// Variants per reaction
        #[arg(long)]
        permutations: Option<usize>,

        #[arg(long, value_enum)]
        random_type: Option<CliRandomType>,

        /// Part of the reaction to randomize
        #[arg(long, value_enum)]
        section: Option<CliSection>,

        #[arg(long)]
        seed: Option<u64>,
    },
    /// Write space-separated token files
    Tokenize {
        /// Input reaction CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Output prefix; .precursors_tokens and .products_tokens are appended
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Files of a single-input, single-output stage
#[derive(Args, Debug)]
struct StageFiles {
    /// Input file
    #[arg(short, long)]
    input: PathBuf,

    /// Output CSV file
    #[arg(short, long)]
    output: PathBuf,
}

/// Filter bounds of the preprocess stage
#[derive(Args, Debug, Default)]
struct PreprocessBounds {
    #[arg(long)]
    min_reactants: Option<usize>,

    #[arg(long)]
    max_reactants: Option<usize>,

    /// Maximum total token count of the reactants
    #[arg(long)]
    max_reactants_tokens: Option<usize>,

    #[arg(long)]
    min_agents: Option<usize>,

    /// Maximum number of agents; 0 merges agents into the reactants
    #[arg(long)]
    max_agents: Option<usize>,

    #[arg(long)]
    max_agents_tokens: Option<usize>,

    #[arg(long)]
    min_products: Option<usize>,

    #[arg(long)]
    max_products: Option<usize>,

    #[arg(long)]
    max_products_tokens: Option<usize>,

    /// Largest accepted absolute formal charge of each reaction group
    #[arg(long)]
    max_absolute_formal_charge: Option<i32>,
}

impl PreprocessBounds {
    fn apply(self, o: &mut Overrides) -> Result<()> {
        o.set_opt("preprocess.min_reactants", self.min_reactants)?;
        o.set_opt("preprocess.max_reactants", self.max_reactants)?;
        o.set_opt("preprocess.max_reactants_tokens", self.max_reactants_tokens)?;
        o.set_opt("preprocess.min_agents", self.min_agents)?;
        o.set_opt("preprocess.max_agents", self.max_agents)?;
        o.set_opt("preprocess.max_agents_tokens", self.max_agents_tokens)?;
        o.set_opt("preprocess.min_products", self.min_products)?;
        o.set_opt("preprocess.max_products", self.max_products)?;
        o.set_opt("preprocess.max_products_tokens", self.max_products_tokens)?;
        o.set_opt(
            "preprocess.max_absolute_formal_charge",
            self.max_absolute_formal_charge,
        )
    }
}

/// Dotted overrides derived from subcommand flags.
#[derive(Default)]
struct Overrides(Vec<String>);

impl Overrides {
    fn set(&mut self, key: &str, value: impl Serialize) -> Result<()> {
        self.0.push(format!("{}={}", key, serde_json::to_string(&value)?));
        Ok(())
    }

    fn set_opt<T: Serialize>(&mut self, key: &str, value: Option<T>) -> Result<()> {
        match value {
            Some(value) => self.set(key, value),
            None => Ok(()),
        }
    }

    fn stage(&mut self, stage: StageKind) -> Result<()> {
        self.set("common.sequence", [stage])
    }
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Translate the subcommand into configuration overrides.
///
/// Stage subcommands run exactly one stage on explicit files. Returns the
/// overrides and whether the resolved configuration should be saved.
fn subcommand_overrides(command: Command) -> Result<(Overrides, bool)> {
    let mut o = Overrides::default();
    let save_config = matches!(command, Command::Run { .. });

    match command {
        Command::Run { sequence } => {
            if !sequence.is_empty() {
                let stages: Vec<StageKind> = sequence.into_iter().map(StageKind::from).collect();
                o.set("common.sequence", stages)?;
            }
        }
        Command::Import {
            io,
            column,
            format,
            keep_atom_mapping,
            light_column,
            heat_column,
            keep_original,
        } => {
            o.stage(StageKind::Import)?;
            o.set("rxn_import.input_file", io.input)?;
            o.set("rxn_import.output_csv", io.output)?;
            o.set_opt("rxn_import.input_csv_column_name", column)?;
            o.set_opt("rxn_import.data_format", format.map(InputFormat::from))?;
            if keep_atom_mapping {
                o.set("rxn_import.remove_atom_mapping", false)?;
            }
            o.set_opt("rxn_import.column_for_light", light_column)?;
            o.set_opt("rxn_import.column_for_heat", heat_column)?;
            if keep_original {
                o.set("rxn_import.keep_original_rxn_column", true)?;
            }
        }
        Command::Standardize {
            io,
            invalid_molecules,
            remove_product_stereo,
            annotation_files,
            discard_unannotated_metals,
        } => {
            o.stage(StageKind::Standardize)?;
            o.set("standardize.input_file_path", io.input)?;
            o.set("standardize.output_file_path", io.output)?;
            o.set_opt(
                "standardize.invalid_molecule_policy",
                invalid_molecules.map(InvalidMoleculePolicy::from),
            )?;
            if remove_product_stereo {
                o.set("standardize.remove_stereo_if_not_defined_in_precursors", true)?;
            }
            if !annotation_files.is_empty() {
                o.set("standardize.annotation_file_paths", annotation_files)?;
            }
            if discard_unannotated_metals {
                o.set("standardize.discard_unannotated_metals", true)?;
            }
        }
        Command::Preprocess { io, bounds } => {
            o.stage(StageKind::Preprocess)?;
            o.set("preprocess.input_file_path", io.input)?;
            o.set("preprocess.output_file_path", io.output)?;
            bounds.apply(&mut o)?;
        }
        Command::Split {
            input,
            output,
            split_ratio,
            key,
            hash_seed,
            shuffle_seed,
        } => {
            o.stage(StageKind::Split)?;
            o.set("split.input_file_path", input)?;
            o.set("split.output_directory", output)?;
            o.set_opt("split.split_ratio", split_ratio)?;
            o.set_opt("split.index_column", key)?;
            o.set_opt("split.hash_seed", hash_seed)?;
            o.set_opt("split.shuffle_seed", shuffle_seed)?;
        }
        Command::Augment {
            io,
            permutations,
            random_type,
            section,
            seed,
        } => {
            o.stage(StageKind::Augment)?;
            o.set("augment.input_file_path", io.input)?;
            o.set("augment.output_file_path", io.output)?;
            o.set_opt("augment.permutations", permutations)?;
            o.set_opt("augment.random_type", random_type.map(RandomType::from))?;
            o.set_opt(
                "augment.rxn_section_to_augment",
                section.map(ReactionSection::from),
            )?;
            o.set_opt("augment.seed", seed)?;
        }
        Command::Tokenize { input, output } => {
            o.stage(StageKind::Tokenize)?;
            o.set(
                "tokenize.input_output_pairs",
                [InputOutputPair {
                    inp: input,
                    out: output,
                }],
            )?;
        }
    }

    Ok((o, save_config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.quiet, cli.json);

    let (subcommand, save_config) = subcommand_overrides(cli.command)?;
    // Explicit --set values win over subcommand flags.
    let mut overrides = subcommand.0;
    overrides.extend(cli.overrides);

    let config = load_config(cli.config.as_deref(), &overrides)?;

    let mut builder = Pipeline::builder().config(config).save_config(save_config);
    if !cli.quiet && !cli.json {
        builder = builder.on_progress(|update| {
            info!("[{:.0}%] {}", update.progress * 100.0, update.message);
        });
    }
    let pipeline = builder.build()?;

    let result = pipeline.run()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !cli.quiet {
        print_human_readable_summary(&result);
    }

    match (result.failed_stage(), result.error()) {
        (Some(stage), Some(e)) => {
            error!("Stage '{}' failed: {}", stage, e);
            Err(anyhow!("stage '{}' failed: {}", stage, e))
        }
        _ => Ok(()),
    }
}

/// Print a human-readable summary of the run.
fn print_human_readable_summary(result: &PipelineResult) {
    println!();
    println!("{}", "=".repeat(80));
    if result.is_success() {
        println!("PREPROCESSING COMPLETE");
    } else {
        println!("PREPROCESSING FAILED");
    }
    println!("{}", "=".repeat(80));
    println!();

    for report in &result.reports {
        println!(
            "{:<12} {:>10} -> {:<10}",
            report.stage.as_str(),
            report.rows_in,
            report.rows_out
        );
        if report.malformed > 0 {
            println!("  malformed records: {}", report.malformed);
        }
        for (reason, count) in &report.filtered {
            println!("  filtered ({}): {}", reason, count);
        }
        if report.shortfall > 0 {
            println!("  missing augmentation variants: {}", report.shortfall);
        }
        for output in &report.outputs {
            println!("  -> {}", output.display());
        }
    }

    if let Some(stage) = result.failed_stage() {
        println!("{:<12} FAILED", stage.as_str());
    }
    println!();
    println!("Duration: {}ms", result.duration_ms);
    if let Some(path) = &result.config_path {
        println!("Configuration: {}", path.display());
    }
    println!();
    println!("Use --json for machine-readable output");
    println!("{}", "=".repeat(80));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn overrides_for(args: &[&str]) -> Vec<String> {
        let cli = Cli::try_parse_from(args).unwrap();
        subcommand_overrides(cli.command).unwrap().0.0
    }

    #[test]
    fn test_preprocess_flags_cover_every_bound() {
        let overrides = overrides_for(&[
            "rxn-processing",
            "preprocess",
            "-i",
            "in.csv",
            "-o",
            "out.csv",
            "--min-agents",
            "1",
            "--max-agents",
            "3",
            "--min-products",
            "2",
            "--max-products",
            "4",
            "--max-reactants-tokens",
            "120",
            "--max-agents-tokens",
            "50",
            "--max-products-tokens",
            "80",
            "--max-absolute-formal-charge",
            "1",
        ]);
        let config = load_config(None, &overrides).unwrap();
        let p = &config.preprocess;

        assert_eq!(config.common.sequence, vec![StageKind::Preprocess]);
        assert_eq!(p.input_file_path, Some(PathBuf::from("in.csv")));
        assert_eq!((p.min_agents, p.max_agents), (1, 3));
        assert_eq!((p.min_products, p.max_products), (2, 4));
        assert_eq!(
            (p.max_reactants_tokens, p.max_agents_tokens, p.max_products_tokens),
            (120, 50, 80)
        );
        assert_eq!(p.max_absolute_formal_charge, 1);
        // Bounds without a flag keep their defaults.
        assert_eq!((p.min_reactants, p.max_reactants), (2, 10));
    }

    #[test]
    fn test_standardize_annotation_flags() {
        let overrides = overrides_for(&[
            "rxn-processing",
            "standardize",
            "-i",
            "in.csv",
            "-o",
            "out.csv",
            "--annotation-file",
            "a.json",
            "--annotation-file",
            "b.json",
            "--discard-unannotated-metals",
        ]);
        let config = load_config(None, &overrides).unwrap();

        assert_eq!(
            config.standardize.annotation_file_paths,
            vec![PathBuf::from("a.json"), PathBuf::from("b.json")]
        );
        assert!(config.standardize.discard_unannotated_metals);
    }
}
