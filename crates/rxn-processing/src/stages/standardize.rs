//! Molecule-level standardization.

use tracing::{debug, info};

use super::{Stage, StageContext, StageKind, StageReport};
use crate::annotations::{AnnotationVerdict, MoleculeAnnotator};
use crate::config::InvalidMoleculePolicy;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::reaction::{FragmentBond, ReactionEquation, is_special_token};
use crate::toolkit::ChemistryToolkit;

/// Filter reasons recorded for dropped reactions, in order of precedence.
const INVALID_SMILES_REASON: &str = "invalid_smiles";
const REJECTED_SMILES_REASON: &str = "rejected_smiles";
const MISSING_ANNOTATIONS_REASON: &str = "missing_annotations";

/// Canonicalizes every molecule through the chemistry toolkit and applies
/// the molecule annotations.
pub struct StandardizeStage;

/// Result of standardizing one reaction.
///
/// Molecules listed in `invalid`, `rejected` or `missing_annotations` are
/// left in the equation as they were.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardizedReaction {
    pub equation: ReactionEquation,
    /// Molecules the toolkit could not parse.
    pub invalid: Vec<String>,
    /// Molecules an annotation rejects.
    pub rejected: Vec<String>,
    /// Metal-containing molecules without an annotation.
    pub missing_annotations: Vec<String>,
}

impl StandardizedReaction {
    /// Filter reason of the first problem found, if any.
    pub fn problem(&self) -> Option<&'static str> {
        if !self.invalid.is_empty() {
            Some(INVALID_SMILES_REASON)
        } else if !self.rejected.is_empty() {
            Some(REJECTED_SMILES_REASON)
        } else if !self.missing_annotations.is_empty() {
            Some(MISSING_ANNOTATIONS_REASON)
        } else {
            None
        }
    }
}

impl Stage for StandardizeStage {
    fn kind(&self) -> StageKind {
        StageKind::Standardize
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageReport> {
        let io = ctx.config.stage_io(StageKind::Standardize)?;
        let (input, output) = (&io.inputs[0], &io.outputs[0]);
        let cfg = &ctx.config.standardize;
        let fragment_bond = ctx.config.common.fragment_bond;
        let rxn_column = ctx.reaction_column();

        let annotator =
            MoleculeAnnotator::from_files(&cfg.annotation_file_paths, cfg.discard_unannotated_metals)?;

        info!("Standardizing {} with {}", input.display(), ctx.toolkit.name());
        let dataset = Dataset::read_csv(input, rxn_column)?;
        let raw = dataset.reactions()?;
        let rows_in = raw.len();

        let mut report = StageReport::new(StageKind::Standardize);
        let mut keep = Vec::with_capacity(rows_in);
        let mut reactions = Vec::with_capacity(rows_in);
        let mut before = Vec::with_capacity(rows_in);
        let mut invalid_column = Vec::with_capacity(rows_in);
        let mut rejected_column = Vec::with_capacity(rows_in);
        let mut missing_column = Vec::with_capacity(rows_in);
        let mut malformed = 0;

        for (i, reaction) in raw.iter().enumerate() {
            let equation = match ReactionEquation::parse(reaction, fragment_bond) {
                Ok(equation) => equation,
                Err(e) => {
                    debug!("Skipping row {}: {}", i, e);
                    malformed += 1;
                    keep.push(false);
                    continue;
                }
            };

            let standardized = standardize_equation(
                &equation,
                ctx.toolkit,
                &annotator,
                cfg.remove_stereo_if_not_defined_in_precursors,
            );
            if let Some(reason) = standardized.problem()
                && cfg.invalid_molecule_policy == InvalidMoleculePolicy::DropReaction
            {
                debug!("Dropping row {}: {}", i, reason);
                report.count_filtered(reason);
                keep.push(false);
                continue;
            }

            keep.push(true);
            reactions.push(standardized.equation.to_reaction_string(fragment_bond));
            before.push(reaction.clone());
            invalid_column.push(join_molecules(&standardized.invalid, fragment_bond));
            rejected_column.push(join_molecules(&standardized.rejected, fragment_bond));
            missing_column.push(join_molecules(&standardized.missing_annotations, fragment_bond));
        }

        ctx.check_malformed(malformed)?;

        let mut dataset = dataset.filter_rows(&keep)?;
        if ctx.config.common.keep_intermediate_columns {
            dataset.set_column(&format!("{}_before_std", rxn_column), before)?;
        }
        if cfg.invalid_molecule_policy == InvalidMoleculePolicy::Flag {
            dataset.set_column(&format!("{}_invalid_smiles", rxn_column), invalid_column)?;
            if cfg.uses_annotations() {
                dataset.set_column(&format!("{}_rejected_smiles", rxn_column), rejected_column)?;
                dataset.set_column(&format!("{}_missing_annotations", rxn_column), missing_column)?;
            }
        }
        dataset.set_reactions(reactions)?;
        dataset.write_csv(output)?;

        for (reason, count) in &report.filtered {
            info!("Removed {} reactions ({})", count, reason);
        }
        info!(
            "Standardized {} of {} reactions to {}",
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

/// Canonicalize every molecule of a reaction and apply the annotations.
///
/// Light and heat tokens pass through untouched. Molecules the toolkit
/// cannot parse are kept verbatim and listed in
/// [`StandardizedReaction::invalid`]; canonical molecules are then looked up
/// in `annotator`, which may reject them, flag them as missing an
/// annotation, or replace them. With `remove_product_stereo`, chiral markers
/// are stripped from the products when none of the precursors carries any.
pub fn standardize_equation(
    equation: &ReactionEquation,
    toolkit: &dyn ChemistryToolkit,
    annotator: &MoleculeAnnotator,
    remove_product_stereo: bool,
) -> StandardizedReaction {
    let mut invalid = Vec::new();
    let mut rejected = Vec::new();
    let mut missing_annotations = Vec::new();
    let mut canonical = |group: &[String]| -> Vec<String> {
        let mut out = Vec::with_capacity(group.len());
        for molecule in group {
            if is_special_token(molecule) {
                out.push(molecule.clone());
                continue;
            }
            let smiles = match toolkit.canonicalize(molecule) {
                Ok(smiles) => smiles,
                Err(e) => {
                    debug!("{}", e);
                    invalid.push(molecule.clone());
                    out.push(molecule.clone());
                    continue;
                }
            };
            match annotator.review(&smiles, toolkit) {
                AnnotationVerdict::Accepted(replacement) => out.extend(replacement),
                AnnotationVerdict::Rejected => {
                    rejected.push(molecule.clone());
                    out.push(molecule.clone());
                }
                AnnotationVerdict::MissingAnnotation => {
                    missing_annotations.push(molecule.clone());
                    out.push(molecule.clone());
                }
            }
        }
        out
    };

    let mut standardized = ReactionEquation::new(
        canonical(&equation.reactants),
        canonical(&equation.agents),
        canonical(&equation.products),
    );

    if remove_product_stereo
        && standardized.products.iter().any(|p| p.contains('@'))
        && !standardized.precursors().any(|p| p.contains('@'))
    {
        standardized.products = standardized
            .products
            .iter()
            .map(|p| toolkit.remove_chiral_centers(p))
            .collect();
    }

    StandardizedReaction {
        equation: standardized,
        invalid,
        rejected,
        missing_annotations,
    }
}

fn join_molecules(molecules: &[String], fragment_bond: FragmentBond) -> String {
    molecules
        .iter()
        .map(|m| m.replace('.', fragment_bond.token()))
        .collect::<Vec<_>>()
        .join(".")
}
