//! Reaction-level standardization, deduplication and filtering.

use std::collections::HashSet;
use tracing::{debug, info};

use super::filter::MixedReactionFilter;
use super::{Stage, StageContext, StageKind, StageReport};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::reaction::ReactionEquation;

/// Deduplicates, standardizes and filters reactions.
pub struct PreprocessStage;

impl Stage for PreprocessStage {
    fn kind(&self) -> StageKind {
        StageKind::Preprocess
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageReport> {
        let io = ctx.config.stage_io(StageKind::Preprocess)?;
        let (input, output) = (&io.inputs[0], &io.outputs[0]);
        let cfg = &ctx.config.preprocess;
        let fragment_bond = ctx.config.common.fragment_bond;
        let filter = MixedReactionFilter::from_config(cfg);

        info!("Preprocessing {}", input.display());
        let dataset = Dataset::read_csv(input, ctx.reaction_column())?;
        let raw = dataset.reactions()?;
        let rows_in = raw.len();

        let mut report = StageReport::new(StageKind::Preprocess);
        let mut seen_raw = HashSet::new();
        let mut seen_standardized = HashSet::new();
        let mut keep = Vec::with_capacity(rows_in);
        let mut reactions = Vec::new();
        let mut duplicates = 0;
        let mut malformed = 0;

        for (i, reaction) in raw.iter().enumerate() {
            if !seen_raw.insert(reaction.as_str()) {
                duplicates += 1;
                keep.push(false);
                continue;
            }

            let equation = match ReactionEquation::parse(reaction, fragment_bond) {
                Ok(equation) => equation,
                Err(e) => {
                    debug!("Skipping row {}: {}", i, e);
                    malformed += 1;
                    keep.push(false);
                    continue;
                }
            };

            let standardized = if cfg.keeps_agents() {
                equation.standardized_keep_agents()
            } else {
                equation.standardized()
            };
            let text = standardized.to_reaction_string(fragment_bond);
            if !seen_standardized.insert(text.clone()) {
                duplicates += 1;
                keep.push(false);
                continue;
            }

            let reasons = filter.validate_reasons(&standardized, ctx.toolkit);
            if reasons.is_empty() {
                keep.push(true);
                reactions.push(text);
            } else {
                debug!("Filtered row {}: {:?}", i, reasons);
                for reason in reasons {
                    report.count_filtered(reason.as_str());
                }
                keep.push(false);
            }
        }

        ctx.check_malformed(malformed)?;

        let mut dataset = dataset.filter_rows(&keep)?;
        dataset.set_reactions(reactions)?;
        dataset.write_csv(output)?;

        if duplicates > 0 {
            info!("Removed {} duplicate reactions", duplicates);
        }
        for (reason, count) in &report.filtered {
            info!("Filtered {} reactions: {}", count, reason);
        }
        info!(
            "Kept {} of {} reactions in {}",
            dataset.height(),
            rows_in,
            output.display()
        );
        Ok(report
            .with_rows(rows_in, dataset.height())
            .with_malformed(malformed)
            .with_output(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::toolkit::BasicToolkit;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn run(dir: &TempDir, content: &str, configure: impl FnOnce(&mut PipelineConfig)) -> (StageReport, Dataset) {
        fs::write(dir.path().join("raw.standardized.csv"), content).unwrap();
        let mut config = PipelineConfig::builder()
            .data_path(dir.path().join("raw.csv"))
            .proc_dir(dir.path())
            .build()
            .unwrap();
        configure(&mut config);
        let config = config.resolved();
        let toolkit = BasicToolkit::new();
        let report = PreprocessStage.run(&StageContext::new(&config, &toolkit)).unwrap();
        let written = Dataset::read_csv(&dir.path().join("raw.processed.csv"), "rxn").unwrap();
        (report, written)
    }

    #[test]
    fn test_deduplicates_before_and_after_standardization() {
        let dir = TempDir::new().unwrap();
        let (report, written) = run(
            &dir,
            "rxn,id\nCC.O>>CCO,1\nCC.O>>CCO,2\nO.CC>>CCO,3\nCC>O>CCO,4\n",
            |_| {},
        );
        assert_eq!(report.rows_in, 4);
        assert_eq!(written.reactions().unwrap(), vec!["CC.O>>CCO"]);
        assert_eq!(written.string_column("id").unwrap(), vec![Some("1".to_string())]);
    }

    #[test]
    fn test_filter_reasons_are_counted() {
        let dir = TempDir::new().unwrap();
        let (report, written) = run(
            &dir,
            "rxn\nCC(=O)O.OCC>>CC(=O)OCC\nCCO>>CC=O\nCC.O>>CCN\nC1CC.O>>CCO\nnot a reaction\n",
            |_| {},
        );
        assert_eq!(written.reactions().unwrap(), vec!["CC(=O)O.OCC>>CC(=O)OCC"]);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.filtered["min_reactants_subceeded"], 1);
        assert_eq!(report.filtered["different_atom_types"], 1);
        assert_eq!(report.filtered["molecule_parsing_failed"], 1);
        assert_eq!(report.rows_out, 1);
    }

    #[test]
    fn test_agents_kept_when_allowed() {
        let dir = TempDir::new().unwrap();
        let (_, written) = run(&dir, "rxn\nCC.O>[Na+]~[Cl-]>CCO\n", |config| {
            config.common.fragment_bond = crate::reaction::FragmentBond::Tilde;
            config.preprocess.max_agents = 2;
            config.preprocess.max_agents_tokens = 10;
        });
        assert_eq!(written.reactions().unwrap(), vec!["CC.O>[Na+]~[Cl-]>CCO"]);
    }
}
