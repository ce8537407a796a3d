//! Token files for sequence models.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::{Stage, StageContext, StageKind, StageReport};
use crate::dataset::Dataset;
use crate::error::{Result, ResultExt};
use crate::reaction::{FragmentBond, ReactionEquation};
use crate::toolkit::ChemistryToolkit;

/// Writes `<out>.precursors_tokens` and `<out>.products_tokens` per input file.
pub struct TokenizeStage;

impl Stage for TokenizeStage {
    fn kind(&self) -> StageKind {
        StageKind::Tokenize
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageReport> {
        // Surfaces an empty pair list as a configuration error.
        ctx.config.stage_io(StageKind::Tokenize)?;
        let fragment_bond = ctx.config.common.fragment_bond;

        let mut report = StageReport::new(StageKind::Tokenize);
        let (mut rows_in, mut rows_out, mut malformed) = (0, 0, 0);

        for pair in &ctx.config.tokenize.input_output_pairs {
            info!("Tokenizing {}", pair.inp.display());
            let dataset = Dataset::read_csv(&pair.inp, ctx.reaction_column())?;
            let reactions = dataset.reactions()?;

            let mut precursors = Vec::with_capacity(reactions.len());
            let mut products = Vec::with_capacity(reactions.len());
            for (i, reaction) in reactions.iter().enumerate() {
                match tokenize_reaction(reaction, fragment_bond, ctx.toolkit) {
                    Ok((p, q)) => {
                        precursors.push(p);
                        products.push(q);
                    }
                    Err(e) => {
                        debug!("Skipping row {} of {}: {}", i, pair.inp.display(), e);
                        malformed += 1;
                    }
                }
            }
            ctx.check_malformed(malformed)?;

            write_lines(&pair.precursors_output(), &precursors)?;
            write_lines(&pair.products_output(), &products)?;
            info!(
                "Wrote {} tokenized reactions to {}.*",
                precursors.len(),
                pair.out.display()
            );

            rows_in += reactions.len();
            rows_out += precursors.len();
            report = report
                .with_output(pair.precursors_output())
                .with_output(pair.products_output());
        }

        Ok(report.with_rows(rows_in, rows_out).with_malformed(malformed))
    }
}

/// Space-separated tokens of the precursors and of the products.
///
/// Precursors are reactants and agents written as one `.`-joined string, so
/// the tokens carry the molecule separators.
pub fn tokenize_reaction(
    reaction: &str,
    fragment_bond: FragmentBond,
    toolkit: &dyn ChemistryToolkit,
) -> Result<(String, String)> {
    let equation = ReactionEquation::parse(reaction, fragment_bond)?;
    let join = |molecules: Vec<&String>| -> String {
        molecules
            .iter()
            .map(|m| m.replace('.', fragment_bond.token()))
            .collect::<Vec<_>>()
            .join(".")
    };
    let precursors = join(equation.precursors().collect());
    let products = join(equation.products.iter().collect());
    Ok((
        toolkit.tokenize(&precursors)?.join(" "),
        toolkit.tokenize(&products)?.join(" "),
    ))
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .context(format!("Failed to create directory '{}'", parent.display()))?;
    }
    let file = File::create(path).context(format!("Failed to create '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    for line in lines {
        writeln!(writer, "{}", line).context(format!("Failed to write '{}'", path.display()))?;
    }
    writer
        .flush()
        .context(format!("Failed to write '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputOutputPair, PipelineConfig};
    use crate::toolkit::BasicToolkit;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_tokenize_reaction() {
        let toolkit = BasicToolkit::new();
        let (precursors, products) =
            tokenize_reaction("CC(=O)Cl.N>[Na+]>CC(N)=O", FragmentBond::Dot, &toolkit).unwrap();
        assert_eq!(precursors, "C C ( = O ) Cl . N . [Na+]");
        assert_eq!(products, "C C ( N ) = O");
    }

    #[test]
    fn test_tokenize_keeps_fragment_bond() {
        let toolkit = BasicToolkit::new();
        let (precursors, _) =
            tokenize_reaction("[Na+]~[Cl-].CC>>CC", FragmentBond::Tilde, &toolkit).unwrap();
        assert_eq!(precursors, "[Na+] ~ [Cl-] . C C");
    }

    #[test]
    fn test_stage_writes_token_files() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("data.train.csv");
        fs::write(&input, "rxn\nCC.O>>CCO\nbroken\nCN.O>>CO\n").unwrap();

        let mut config = PipelineConfig::default();
        config.tokenize.input_output_pairs = vec![InputOutputPair {
            inp: input,
            out: dir.path().join("tokens/data.train"),
        }];
        let toolkit = BasicToolkit::new();
        let report = TokenizeStage.run(&StageContext::new(&config, &toolkit)).unwrap();

        assert_eq!(report.rows_in, 3);
        assert_eq!(report.rows_out, 2);
        assert_eq!(report.malformed, 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("tokens/data.train.precursors_tokens")).unwrap(),
            "C C . O\nC N . O\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("tokens/data.train.products_tokens")).unwrap(),
            "C C O\nC O\n"
        );
    }

    #[test]
    fn test_stage_requires_pairs() {
        let config = PipelineConfig::default();
        let toolkit = BasicToolkit::new();
        let err = TokenizeStage.run(&StageContext::new(&config, &toolkit)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
    }
}
