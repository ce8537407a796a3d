//! Data augmentation with randomized SMILES.
//!
//! For every reaction the [`Augmenter`] draws renderings of one section
//! (precursors or products) until the requested number of distinct variants
//! is reached or the attempt budget runs out. Short reactions often have
//! fewer distinct renderings than requested; the missing variants are counted
//! as a shortfall, not an error.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::{Stage, StageContext, StageKind, StageReport};
use crate::config::AugmentConfig;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::reaction::{FragmentBond, ReactionEquation, ReactionSection, is_special_token};
use crate::toolkit::{ChemistryToolkit, RandomType};

/// Generates distinct randomized renderings of reactions.
pub struct Augmenter<'a> {
    toolkit: &'a dyn ChemistryToolkit,
    mode: RandomType,
    section: ReactionSection,
    permutations: usize,
    max_attempts: usize,
    fragment_bond: FragmentBond,
}

impl<'a> Augmenter<'a> {
    pub fn new(
        toolkit: &'a dyn ChemistryToolkit,
        config: &AugmentConfig,
        fragment_bond: FragmentBond,
    ) -> Self {
        Self {
            toolkit,
            mode: config.random_type,
            section: config.rxn_section_to_augment,
            permutations: config.permutations,
            max_attempts: config.permutations.saturating_mul(config.max_attempts_factor),
            fragment_bond,
        }
    }

    /// Number of variants requested per reaction.
    pub fn permutations(&self) -> usize {
        self.permutations
    }

    /// Lazily yield up to `permutations` distinct variants of `equation`.
    ///
    /// The iterator stops after `permutations * max_attempts_factor` draws.
    /// A toolkit failure is yielded once and ends the iteration.
    pub fn variants<'r>(
        &'r self,
        equation: &'r ReactionEquation,
        rng: &'r mut StdRng,
    ) -> Variants<'r, 'a> {
        Variants {
            augmenter: self,
            equation,
            rng,
            seen: HashSet::new(),
            attempts: 0,
            failed: false,
        }
    }

    /// One random rendering of the configured section.
    fn draw(&self, equation: &ReactionEquation, rng: &mut StdRng) -> Result<String> {
        let mut variant = equation.clone();
        match self.section {
            ReactionSection::Precursors => {
                self.randomize_group(&mut variant.reactants, rng)?;
                self.randomize_group(&mut variant.agents, rng)?;
            }
            ReactionSection::Products => self.randomize_group(&mut variant.products, rng)?,
        }
        Ok(variant.to_reaction_string(self.fragment_bond))
    }

    fn randomize_group(&self, group: &mut [String], rng: &mut StdRng) -> Result<()> {
        if self.mode == RandomType::Molecules {
            group.shuffle(rng);
            return Ok(());
        }
        for molecule in group.iter_mut() {
            if is_special_token(molecule) {
                continue;
            }
            let fragments = molecule
                .split('.')
                .map(|fragment| self.toolkit.randomize(fragment, self.mode, &mut *rng))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            *molecule = fragments.join(".");
        }
        Ok(())
    }
}

/// Iterator over the distinct variants of one reaction.
pub struct Variants<'r, 'a> {
    augmenter: &'r Augmenter<'a>,
    equation: &'r ReactionEquation,
    rng: &'r mut StdRng,
    seen: HashSet<String>,
    attempts: usize,
    failed: bool,
}

impl Iterator for Variants<'_, '_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.failed
            && self.seen.len() < self.augmenter.permutations
            && self.attempts < self.augmenter.max_attempts
        {
            self.attempts += 1;
            match self.augmenter.draw(self.equation, self.rng) {
                Ok(variant) => {
                    if self.seen.insert(variant.clone()) {
                        return Some(Ok(variant));
                    }
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Writes every input row once per variant, with the variant in `rxn_<mode>`.
pub struct AugmentStage;

impl Stage for AugmentStage {
    fn kind(&self) -> StageKind {
        StageKind::Augment
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageReport> {
        let io = ctx.config.stage_io(StageKind::Augment)?;
        let (input, output) = (&io.inputs[0], &io.outputs[0]);
        let cfg = &ctx.config.augment;
        let fragment_bond = ctx.config.common.fragment_bond;
        let augmenter = Augmenter::new(ctx.toolkit, cfg, fragment_bond);
        let variant_column = format!("{}_{}", ctx.reaction_column(), cfg.random_type);

        info!(
            "Augmenting {} ({} x {}, {:?})",
            input.display(),
            cfg.permutations,
            cfg.random_type,
            cfg.rxn_section_to_augment
        );
        let dataset = Dataset::read_csv(input, ctx.reaction_column())?;
        let reactions = dataset.reactions()?;

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut indices = Vec::new();
        let mut variants = Vec::new();
        let mut malformed = 0;
        let mut shortfall = 0;

        for (i, reaction) in reactions.iter().enumerate() {
            let equation = match ReactionEquation::parse(reaction, fragment_bond) {
                Ok(equation) => equation,
                Err(e) => {
                    debug!("Skipping row {}: {}", i, e);
                    malformed += 1;
                    continue;
                }
            };

            let mut produced = Vec::new();
            let mut failed = false;
            for variant in augmenter.variants(&equation, &mut rng) {
                match variant {
                    Ok(variant) => produced.push(variant),
                    Err(e) => {
                        debug!("Skipping row {}: {}", i, e);
                        failed = true;
                    }
                }
            }
            if failed {
                malformed += 1;
                continue;
            }

            shortfall += augmenter.permutations() - produced.len();
            indices.extend(std::iter::repeat_n(i, produced.len()));
            variants.extend(produced);
        }

        ctx.check_malformed(malformed)?;
        if shortfall > 0 {
            warn!(
                "{} requested variants could not be generated (too few distinct renderings)",
                shortfall
            );
        }

        let mut augmented = dataset.take_rows(&indices)?;
        augmented.set_column(&variant_column, variants)?;
        augmented.write_csv(output)?;

        info!(
            "Wrote {} variants of {} reactions to {}",
            augmented.height(),
            reactions.len(),
            output.display()
        );
        let mut report = StageReport::new(StageKind::Augment)
            .with_rows(reactions.len(), augmented.height())
            .with_malformed(malformed)
            .with_output(output);
        report.shortfall = shortfall;
        Ok(report)
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

    fn augment_config(mode: RandomType, permutations: usize) -> AugmentConfig {
        AugmentConfig {
            random_type: mode,
            permutations,
            ..AugmentConfig::default()
        }
    }

    fn collect(augmenter: &Augmenter<'_>, reaction: &str, seed: u64) -> Vec<String> {
        let equation = ReactionEquation::parse(reaction, FragmentBond::Dot).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        augmenter
            .variants(&equation, &mut rng)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_molecule_permutations_are_distinct_and_bounded() {
        let toolkit = BasicToolkit::new();
        let augmenter = Augmenter::new(
            &toolkit,
            &augment_config(RandomType::Molecules, 10),
            FragmentBond::Dot,
        );
        let mut variants = collect(&augmenter, "CC.O>>CCO", 42);
        variants.sort();
        assert_eq!(variants, vec!["CC.O>>CCO", "O.CC>>CCO"]);
    }

    #[test]
    fn test_unrestricted_variants_keep_products() {
        let toolkit = BasicToolkit::new();
        let augmenter = Augmenter::new(
            &toolkit,
            &augment_config(RandomType::Unrestricted, 5),
            FragmentBond::Dot,
        );
        let variants = collect(&augmenter, "CC(C)Cc1ccccc1.OC(=O)CCl>>CCO", 7);
        assert!(!variants.is_empty() && variants.len() <= 5);
        let unique: HashSet<&String> = variants.iter().collect();
        assert_eq!(unique.len(), variants.len());
        for variant in &variants {
            let eq = ReactionEquation::parse(variant, FragmentBond::Dot).unwrap();
            assert_eq!(eq.products, vec!["CCO"]);
            assert_eq!(eq.reactants.len(), 2);
        }
    }

    #[test]
    fn test_products_section() {
        let toolkit = BasicToolkit::new();
        let mut config = augment_config(RandomType::Molecules, 4);
        config.rxn_section_to_augment = ReactionSection::Products;
        let augmenter = Augmenter::new(&toolkit, &config, FragmentBond::Dot);
        let variants = collect(&augmenter, "CC.O>>CCO.N", 1);
        assert_eq!(variants.len(), 2);
        assert!(variants.iter().all(|v| v.starts_with("CC.O>>")));
    }

    #[test]
    fn test_variants_are_seed_deterministic() {
        let toolkit = BasicToolkit::new();
        let augmenter = Augmenter::new(
            &toolkit,
            &augment_config(RandomType::Restricted, 3),
            FragmentBond::Dot,
        );
        let reaction = "OC(=O)c1ccccc1.CCN>>CCNC(=O)c1ccccc1";
        assert_eq!(collect(&augmenter, reaction, 11), collect(&augmenter, reaction, 11));
    }

    #[test]
    fn test_stage_repeats_rows_and_counts_shortfall() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("train.csv");
        fs::write(&input, "rxn,id\nCC.O>>CCO,1\nCCN>>CC,2\n").unwrap();

        let mut config = PipelineConfig::builder()
            .random_type(RandomType::Molecules)
            .permutations(2)
            .build()
            .unwrap();
        config.augment.input_file_path = Some(input);
        let config = config.resolved();

        let toolkit = BasicToolkit::new();
        let report = AugmentStage.run(&StageContext::new(&config, &toolkit)).unwrap();
        assert_eq!(report.rows_in, 2);
        assert_eq!(report.rows_out, 3);
        assert_eq!(report.shortfall, 1);

        let written = Dataset::read_csv(&dir.path().join("train.augmented.csv"), "rxn").unwrap();
        assert_eq!(
            written.string_column("id").unwrap(),
            vec![Some("1".to_string()), Some("1".to_string()), Some("2".to_string())]
        );
        let mut first_two: Vec<String> = written
            .string_column("rxn_molecules")
            .unwrap()
            .into_iter()
            .take(2)
            .flatten()
            .collect();
        first_two.sort();
        assert_eq!(first_two, vec!["CC.O>>CCO", "O.CC>>CCO"]);
        assert_eq!(written.reactions().unwrap()[2], "CCN>>CC");
    }
}
