//! Initial import of raw reaction data.

use std::path::Path;
use tracing::{debug, info};

use super::{Stage, StageContext, StageKind, StageReport};
use crate::dataset::{Dataset, InputFormat};
use crate::error::{PreprocessingError, Result};
use crate::reaction::{FragmentBond, ReactionEquation, remove_atom_mapping};

/// Reads TXT/CSV/TSV input and writes reactions in the configured notation.
pub struct ImportStage;

impl Stage for ImportStage {
    fn kind(&self) -> StageKind {
        StageKind::Import
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageReport> {
        let io = ctx.config.stage_io(StageKind::Import)?;
        let (input, output) = (&io.inputs[0], &io.outputs[0]);
        let cfg = &ctx.config.rxn_import;
        let rxn_column = ctx.reaction_column();
        let original_column = format!("{}_original", rxn_column);

        let format = cfg.data_format.unwrap_or_else(|| InputFormat::from_path(input));
        info!("Importing {} ({:?})", input.display(), format);

        let source_column = match format {
            InputFormat::Txt => rxn_column.to_string(),
            _ => cfg
                .input_csv_column_name
                .clone()
                .unwrap_or_else(|| rxn_column.to_string()),
        };
        let mut dataset = Dataset::read(input, format, &source_column)?;
        let rows_in = dataset.height();

        let light = flag_column(&dataset, cfg.column_for_light.as_deref(), input)?;
        let heat = flag_column(&dataset, cfg.column_for_heat.as_deref(), input)?;

        let raw = dataset.reactions()?;
        let mut reactions = Vec::with_capacity(raw.len());
        let mut keep = Vec::with_capacity(raw.len());
        for (i, reaction) in raw.iter().enumerate() {
            let text = if cfg.remove_atom_mapping {
                remove_atom_mapping(reaction)
            } else {
                reaction.clone()
            };
            match import_reaction(
                &text,
                ctx.config.common.fragment_bond,
                flag_at(&light, i),
                flag_at(&heat, i),
            ) {
                Ok(imported) => {
                    reactions.push(imported);
                    keep.push(true);
                }
                Err(e) => {
                    debug!("Skipping row {}: {}", i, e);
                    keep.push(false);
                }
            }
        }

        let malformed = keep.iter().filter(|k| !**k).count();
        ctx.check_malformed(malformed)?;

        let mut dataset = dataset.filter_rows(&keep)?;
        if cfg.keep_original_rxn_column {
            dataset.rename_column(&source_column, &original_column)?;
        }
        dataset.set_column(rxn_column, reactions)?;
        let mut dataset = dataset.with_reaction_column(rxn_column)?;
        if !cfg.keep_original_rxn_column && source_column != rxn_column {
            dataset.drop_column(&source_column)?;
        }
        dataset.write_csv(output)?;

        info!(
            "Imported {} of {} reactions to {}",
            dataset.height(),
            rows_in,
            output.display()
        );
        Ok(StageReport::new(StageKind::Import)
            .with_rows(rows_in, dataset.height())
            .with_malformed(malformed)
            .with_output(output))
    }
}

/// Parse a raw reaction in any notation and write it with `fragment_bond`.
pub fn import_reaction(
    reaction: &str,
    fragment_bond: FragmentBond,
    light: bool,
    heat: bool,
) -> Result<String> {
    let mut equation = ReactionEquation::parse_any(reaction)?;
    if light {
        equation.add_light_token();
    }
    if heat {
        equation.add_heat_token();
    }
    Ok(equation.to_reaction_string(fragment_bond))
}

fn flag_column(dataset: &Dataset, column: Option<&str>, input: &Path) -> Result<Option<Vec<bool>>> {
    let Some(column) = column else {
        return Ok(None);
    };
    if !dataset.has_column(column) {
        return Err(PreprocessingError::ColumnNotFound(column.to_string())
            .with_context(format!("Reading '{}'", input.display())));
    }
    dataset
        .string_column(column)?
        .into_iter()
        .map(|value| parse_flag(column, value.as_deref()))
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn flag_at(flags: &Option<Vec<bool>>, index: usize) -> bool {
    flags.as_ref().is_some_and(|f| f[index])
}

fn parse_flag(column: &str, value: Option<&str>) -> Result<bool> {
    match value.map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
        Some(other) => Err(PreprocessingError::InvalidColumnValue {
            column: column.to_string(),
            expected: "boolean".to_string(),
            found: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::toolkit::BasicToolkit;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config_for(dir: &TempDir, input: &str, content: &str) -> PipelineConfig {
        let path = dir.path().join(input);
        fs::write(&path, content).unwrap();
        PipelineConfig::builder()
            .data_path(path)
            .proc_dir(dir.path())
            .build()
            .unwrap()
    }

    fn output(dir: &TempDir, name: &str) -> PathBuf {
        dir.path().join(format!("{}.imported.csv", name))
    }

    #[test]
    fn test_import_reaction_notations() {
        assert_eq!(
            import_reaction("[Na+].[Cl-].CC>>CCO |f:0.1|", FragmentBond::Tilde, false, false).unwrap(),
            "[Na+]~[Cl-].CC>>CCO"
        );
        assert_eq!(
            import_reaction("CC.O>>CCO", FragmentBond::Dot, true, true).unwrap(),
            "CC.O.[Lv].[Ts]>>CCO"
        );
        assert!(import_reaction("not a reaction", FragmentBond::Dot, false, false).is_err());
    }

    #[test]
    fn test_import_csv_drops_malformed_rows() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir, "raw.csv", "rxn,id\n[CH3:1][OH:2]>>CO,1\nbroken,2\nCC.O>>CCO,3\n")
            .resolved();
        let toolkit = BasicToolkit::new();
        let report = ImportStage.run(&StageContext::new(&config, &toolkit)).unwrap();

        assert_eq!(report.rows_in, 3);
        assert_eq!(report.rows_out, 2);
        assert_eq!(report.malformed, 1);

        let written = Dataset::read_csv(&output(&dir, "raw"), "rxn").unwrap();
        assert_eq!(written.reactions().unwrap(), vec!["[CH3][OH]>>CO", "CC.O>>CCO"]);
        assert_eq!(
            written.string_column("id").unwrap(),
            vec![Some("1".to_string()), Some("3".to_string())]
        );
        assert!(!written.has_column("rxn_original"));
    }

    #[test]
    fn test_import_txt_keeps_original() {
        let dir = TempDir::new().unwrap();
        let mut config = config_for(&dir, "raw.txt", "A~B.C>>D\nE>>F\n");
        config.rxn_import.keep_original_rxn_column = true;
        let config = config.resolved();
        let toolkit = BasicToolkit::new();
        ImportStage.run(&StageContext::new(&config, &toolkit)).unwrap();

        let written = Dataset::read_csv(&output(&dir, "raw"), "rxn").unwrap();
        assert_eq!(written.reactions().unwrap(), vec!["A.B.C>>D", "E>>F"]);
        assert_eq!(
            written.string_column("rxn_original").unwrap(),
            vec![Some("A~B.C>>D".to_string()), Some("E>>F".to_string())]
        );
    }

    #[test]
    fn test_import_light_and_heat_columns() {
        let dir = TempDir::new().unwrap();
        let mut config = config_for(&dir, "raw.csv", "rxn,light,heat\nA.B>>C,true,0\nD.E>>F,false,1\n");
        config.rxn_import.column_for_light = Some("light".to_string());
        config.rxn_import.column_for_heat = Some("heat".to_string());
        let config = config.resolved();
        let toolkit = BasicToolkit::new();
        ImportStage.run(&StageContext::new(&config, &toolkit)).unwrap();

        let written = Dataset::read_csv(&output(&dir, "raw"), "rxn").unwrap();
        assert_eq!(written.reactions().unwrap(), vec!["A.B.[Lv]>>C", "D.E.[Ts]>>F"]);
    }

    #[test]
    fn test_import_rejects_non_boolean_flags() {
        let dir = TempDir::new().unwrap();
        let mut config = config_for(&dir, "raw.csv", "rxn,light\nA.B>>C,maybe\n");
        config.rxn_import.column_for_light = Some("light".to_string());
        let config = config.resolved();
        let toolkit = BasicToolkit::new();
        let err = ImportStage.run(&StageContext::new(&config, &toolkit)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_COLUMN_VALUE");
    }

    #[test]
    fn test_import_custom_input_column() {
        let dir = TempDir::new().unwrap();
        let mut config = config_for(&dir, "raw.tsv", "smiles\tid\nA.B>>C\t7\n");
        config.rxn_import.input_csv_column_name = Some("smiles".to_string());
        let config = config.resolved();
        let toolkit = BasicToolkit::new();
        ImportStage.run(&StageContext::new(&config, &toolkit)).unwrap();

        let written = Dataset::read_csv(&output(&dir, "raw"), "rxn").unwrap();
        assert_eq!(written.reactions().unwrap(), vec!["A.B>>C"]);
        assert!(!written.has_column("smiles"));
        assert!(written.has_column("id"));
    }
}
