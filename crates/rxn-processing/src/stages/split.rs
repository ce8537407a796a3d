//! Content-addressed train/validation/test split.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{Stage, StageContext, StageKind, StageReport};
use crate::dataset::Dataset;
use crate::error::{PreprocessingError, Result};
use crate::fingerprint::fingerprint_key;
use crate::reaction::ReactionEquation;
use crate::split::{SplitLabel, SplitRatio, assign_split};

/// Writes `<stem>.train.csv`, `<stem>.validation.csv` and `<stem>.test.csv`.
///
/// Labels come from [`assign_split`]; only the train file is shuffled, with
/// `split.shuffle_seed`.
pub struct SplitStage;

impl Stage for SplitStage {
    fn kind(&self) -> StageKind {
        StageKind::Split
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageReport> {
        let io = ctx.config.stage_io(StageKind::Split)?;
        let input = &io.inputs[0];
        let cfg = &ctx.config.split;
        let ratio = SplitRatio::new(cfg.split_ratio)?;
        let fragment_bond = ctx.config.common.fragment_bond;

        info!(
            "Splitting {} (ratio {}, key {})",
            input.display(),
            ratio.value(),
            cfg.index_column
        );
        let dataset = Dataset::read_csv(input, ctx.reaction_column())?;
        let keys = match cfg.index_column.column() {
            Some(column) if !dataset.has_column(column) => {
                return Err(PreprocessingError::InvalidConfiguration(format!(
                    "split.index_column '{}' is not a column of '{}'",
                    column,
                    input.display()
                )));
            }
            Some(column) => Some(dataset.string_column(column)?),
            None => None,
        };

        let reactions = dataset.reactions()?;
        let rows_in = reactions.len();
        let mut rows: BTreeMap<SplitLabel, Vec<usize>> =
            SplitLabel::ALL.iter().map(|&label| (label, Vec::new())).collect();
        let mut malformed = 0;

        for (i, reaction) in reactions.iter().enumerate() {
            // A column key is hashed as is; the reaction is never parsed.
            let fingerprint = match &keys {
                Some(keys) => fingerprint_key(keys[i].as_deref().unwrap_or_default(), cfg.hash_seed),
                None => match ReactionEquation::parse(reaction, fragment_bond) {
                    Ok(equation) => cfg.index_column.fingerprint(&equation, None, cfg.hash_seed),
                    Err(e) => {
                        debug!("Skipping row {}: {}", i, e);
                        malformed += 1;
                        continue;
                    }
                },
            };
            let label = assign_split(fingerprint, ratio);
            rows.entry(label).or_default().push(i);
        }

        ctx.check_malformed(malformed)?;

        if let Some(train) = rows.get_mut(&SplitLabel::Train) {
            let mut rng = StdRng::seed_from_u64(cfg.shuffle_seed);
            train.shuffle(&mut rng);
        }

        let mut report = StageReport::new(StageKind::Split).with_malformed(malformed);
        let mut rows_out = 0;
        for (label, output) in SplitLabel::ALL.iter().zip(&io.outputs) {
            let indices = rows.get(label).map(Vec::as_slice).unwrap_or_default();
            let part = dataset.take_rows(indices)?;
            part.write_csv(output)?;
            info!("{}: {} reactions -> {}", label, part.height(), output.display());
            rows_out += part.height();
            report = report.with_output(output);
        }

        Ok(report.with_rows(rows_in, rows_out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::split::SplitKey;
    use crate::toolkit::BasicToolkit;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn config(dir: &TempDir, content: &str) -> PipelineConfig {
        fs::write(dir.path().join("raw.processed.csv"), content).unwrap();
        PipelineConfig::builder()
            .data_path(dir.path().join("raw.csv"))
            .proc_dir(dir.path())
            .build()
            .unwrap()
    }

    fn read_split(dir: &TempDir, label: SplitLabel) -> Vec<String> {
        let path = dir.path().join(format!("raw.processed.{}.csv", label));
        Dataset::read_csv(&path, "rxn").unwrap().reactions().unwrap()
    }

    fn corpus(n: usize) -> String {
        let mut content = String::from("rxn,id\n");
        for i in 0..n {
            content.push_str(&format!("{}.O>>C{}O,{}\n", "C".repeat(i % 7 + 1), "C".repeat(i), i));
        }
        content
    }

    #[test]
    fn test_split_writes_three_files() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &corpus(200));
        config.split.split_ratio = 0.2;
        let config = config.resolved();
        let toolkit = BasicToolkit::new();
        let report = SplitStage.run(&StageContext::new(&config, &toolkit)).unwrap();

        assert_eq!(report.rows_in, 200);
        assert_eq!(report.rows_out, 200);
        assert_eq!(report.outputs.len(), 3);
        let sizes: Vec<usize> = SplitLabel::ALL.iter().map(|&l| read_split(&dir, l).len()).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 200);
        assert!(sizes[0] > sizes[1] && sizes[0] > sizes[2]);
    }

    #[test]
    fn test_split_is_reproducible() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &corpus(50)).resolved();
        let toolkit = BasicToolkit::new();

        SplitStage.run(&StageContext::new(&config, &toolkit)).unwrap();
        let first: Vec<Vec<String>> = SplitLabel::ALL.iter().map(|&l| read_split(&dir, l)).collect();
        SplitStage.run(&StageContext::new(&config, &toolkit)).unwrap();
        let second: Vec<Vec<String>> = SplitLabel::ALL.iter().map(|&l| read_split(&dir, l)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_ratio_puts_everything_in_train() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &corpus(30));
        config.split.split_ratio = 0.0;
        let config = config.resolved();
        let toolkit = BasicToolkit::new();
        SplitStage.run(&StageContext::new(&config, &toolkit)).unwrap();

        assert_eq!(read_split(&dir, SplitLabel::Train).len(), 30);
        assert!(read_split(&dir, SplitLabel::Validation).is_empty());
        assert!(read_split(&dir, SplitLabel::Test).is_empty());
    }

    #[test]
    fn test_column_key_groups_records() {
        let dir = TempDir::new().unwrap();
        let mut content = String::from("rxn,patent\n");
        for i in 0..60 {
            content.push_str(&format!("C{}.O>>CCO,US{}\n", "C".repeat(i), i / 3));
        }
        let mut config = config(&dir, &content);
        config.split.split_ratio = 0.3;
        config.split.index_column = SplitKey::Column("patent".to_string());
        let config = config.resolved();
        let toolkit = BasicToolkit::new();
        SplitStage.run(&StageContext::new(&config, &toolkit)).unwrap();

        for label in SplitLabel::ALL {
            let path = dir.path().join(format!("raw.processed.{}.csv", label));
            let patents = Dataset::read_csv(&path, "rxn").unwrap().string_column("patent").unwrap();
            for patent in &patents {
                let count = patents.iter().filter(|p| *p == patent).count();
                assert_eq!(count, 3, "patent {:?} split across files", patent);
            }
        }
    }

    #[test]
    fn test_column_key_assigns_unparsable_reactions() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, "rxn,patent\nCC.O>>CCO,US1\nnot a reaction,US2\nCC>O,US1\n");
        config.split.index_column = SplitKey::Column("patent".to_string());
        let config = config.resolved();
        let toolkit = BasicToolkit::new();
        let report = SplitStage.run(&StageContext::new(&config, &toolkit)).unwrap();

        assert_eq!(report.malformed, 0);
        assert_eq!(report.rows_in, 3);
        assert_eq!(report.rows_out, 3);
        let mut written: Vec<String> = SplitLabel::ALL
            .iter()
            .flat_map(|&l| read_split(&dir, l))
            .collect();
        written.sort();
        assert_eq!(written, vec!["CC.O>>CCO", "CC>O", "not a reaction"]);
    }

    #[test]
    fn test_missing_key_column() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &corpus(5));
        config.split.index_column = SplitKey::Column("patent".to_string());
        let config = config.resolved();
        let toolkit = BasicToolkit::new();
        let err = SplitStage.run(&StageContext::new(&config, &toolkit)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
    }
}
