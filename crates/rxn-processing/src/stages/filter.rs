//! Mixed reaction filter.
//!
//! Combines checks on the reaction string (molecule counts, token counts,
//! products already among the reactants) with checks that need parsed
//! molecules (atom types, formal charges). The filter fails closed: a record
//! whose molecules cannot be parsed is rejected with
//! [`FilterReason::MoleculeParsingFailed`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::config::PreprocessConfig;
use crate::reaction::ReactionEquation;
use crate::toolkit::{ChemistryToolkit, ToolkitError};

/// Atom types tolerated in products even when absent from the precursors:
/// hydrogen, usually implicit, and polymer head/tail placeholders.
const ATOM_TYPES_ALLOWED_IN_PRODUCT: &[&str] = &["H", "Kr", "Rn", "Xe"];

/// Why a reaction was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    MaxReactantsExceeded,
    MaxAgentsExceeded,
    MaxProductsExceeded,
    MinReactantsSubceeded,
    MinAgentsSubceeded,
    MinProductsSubceeded,
    ProductsSubsetOfReactants,
    MaxReactantTokensExceeded,
    MaxAgentTokensExceeded,
    MaxProductTokensExceeded,
    ProductsSingleAtoms,
    FormalChargeExceeded,
    InvalidAtomType,
    DifferentAtomTypes,
    MoleculeParsingFailed,
}

impl FilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxReactantsExceeded => "max_reactants_exceeded",
            Self::MaxAgentsExceeded => "max_agents_exceeded",
            Self::MaxProductsExceeded => "max_products_exceeded",
            Self::MinReactantsSubceeded => "min_reactants_subceeded",
            Self::MinAgentsSubceeded => "min_agents_subceeded",
            Self::MinProductsSubceeded => "min_products_subceeded",
            Self::ProductsSubsetOfReactants => "products_subset_of_reactants",
            Self::MaxReactantTokensExceeded => "max_reactant_tokens_exceeded",
            Self::MaxAgentTokensExceeded => "max_agent_tokens_exceeded",
            Self::MaxProductTokensExceeded => "max_product_tokens_exceeded",
            Self::ProductsSingleAtoms => "products_single_atoms",
            Self::FormalChargeExceeded => "formal_charge_exceeded",
            Self::InvalidAtomType => "invalid_atom_type",
            Self::DifferentAtomTypes => "different_atom_types",
            Self::MoleculeParsingFailed => "molecule_parsing_failed",
        }
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed view of one molecule group.
struct GroupAtoms {
    /// Atom symbols per molecule.
    molecules: Vec<Vec<String>>,
    formal_charge: i32,
}

impl GroupAtoms {
    fn parse(group: &[String], toolkit: &dyn ChemistryToolkit) -> Result<Self, ToolkitError> {
        let mut molecules = Vec::with_capacity(group.len());
        let mut formal_charge = 0;
        for molecule in group {
            molecules.push(toolkit.atom_symbols(molecule)?);
            formal_charge += toolkit.formal_charge(molecule)?;
        }
        Ok(Self {
            molecules,
            formal_charge,
        })
    }

    fn symbols(&self) -> HashSet<&str> {
        self.molecules
            .iter()
            .flat_map(|m| m.iter().map(String::as_str))
            .collect()
    }
}

/// Rule-based reaction filter.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedReactionFilter {
    pub max_reactants: usize,
    pub max_agents: usize,
    pub max_products: usize,
    pub min_reactants: usize,
    pub min_agents: usize,
    pub min_products: usize,
    pub max_reactants_tokens: usize,
    pub max_agents_tokens: usize,
    pub max_products_tokens: usize,
    pub max_absolute_formal_charge: i32,
}

impl Default for MixedReactionFilter {
    fn default() -> Self {
        Self::from_config(&PreprocessConfig::default())
    }
}

impl MixedReactionFilter {
    pub fn from_config(config: &PreprocessConfig) -> Self {
        Self {
            max_reactants: config.max_reactants,
            max_agents: config.max_agents,
            max_products: config.max_products,
            min_reactants: config.min_reactants,
            min_agents: config.min_agents,
            min_products: config.min_products,
            max_reactants_tokens: config.max_reactants_tokens,
            max_agents_tokens: config.max_agents_tokens,
            max_products_tokens: config.max_products_tokens,
            max_absolute_formal_charge: config.max_absolute_formal_charge,
        }
    }

    /// Whether the reaction passes every check.
    pub fn is_valid(&self, reaction: &ReactionEquation, toolkit: &dyn ChemistryToolkit) -> bool {
        self.validate_reasons(reaction, toolkit).is_empty()
    }

    /// Every check the reaction fails, in a fixed order.
    pub fn validate_reasons(
        &self,
        reaction: &ReactionEquation,
        toolkit: &dyn ChemistryToolkit,
    ) -> Vec<FilterReason> {
        let mut reasons = Vec::new();
        let r = reaction;

        let count_checks = [
            (r.reactants.len() > self.max_reactants, FilterReason::MaxReactantsExceeded),
            (r.agents.len() > self.max_agents, FilterReason::MaxAgentsExceeded),
            (r.products.len() > self.max_products, FilterReason::MaxProductsExceeded),
            (r.reactants.len() < self.min_reactants, FilterReason::MinReactantsSubceeded),
            (r.agents.len() < self.min_agents, FilterReason::MinAgentsSubceeded),
            (r.products.len() < self.min_products, FilterReason::MinProductsSubceeded),
            (products_subset_of_reactants(r), FilterReason::ProductsSubsetOfReactants),
        ];
        reasons.extend(count_checks.iter().filter(|(failed, _)| *failed).map(|(_, reason)| *reason));

        let token_checks = [
            (&r.reactants, self.max_reactants_tokens, FilterReason::MaxReactantTokensExceeded),
            (&r.agents, self.max_agents_tokens, FilterReason::MaxAgentTokensExceeded),
            (&r.products, self.max_products_tokens, FilterReason::MaxProductTokensExceeded),
        ];
        let mut tokenization_failed = false;
        for (group, limit, reason) in token_checks {
            match group_token_count(group, toolkit) {
                Ok(count) if count > limit => reasons.push(reason),
                Ok(_) => {}
                Err(_) => tokenization_failed = true,
            }
        }

        let parsed = (|| -> Result<_, ToolkitError> {
            Ok((
                GroupAtoms::parse(&r.reactants, toolkit)?,
                GroupAtoms::parse(&r.agents, toolkit)?,
                GroupAtoms::parse(&r.products, toolkit)?,
            ))
        })();

        let (reactants, agents, products) = match parsed {
            Ok(groups) if !tokenization_failed => groups,
            _ => {
                reasons.push(FilterReason::MoleculeParsingFailed);
                return reasons;
            }
        };

        if !products.molecules.is_empty() && products.molecules.iter().all(|m| m.len() == 1) {
            reasons.push(FilterReason::ProductsSingleAtoms);
        }

        let max_charge = self.max_absolute_formal_charge;
        if [&reactants, &agents, &products]
            .iter()
            .any(|g| g.formal_charge.abs() > max_charge)
        {
            reasons.push(FilterReason::FormalChargeExceeded);
        }

        let all_symbols: HashSet<&str> = reactants
            .symbols()
            .into_iter()
            .chain(agents.symbols())
            .chain(products.symbols())
            .collect();
        if all_symbols.contains("*") {
            reasons.push(FilterReason::InvalidAtomType);
        }

        let precursor_symbols: HashSet<&str> =
            reactants.symbols().into_iter().chain(agents.symbols()).collect();
        let unexplained = products
            .symbols()
            .into_iter()
            .filter(|s| !ATOM_TYPES_ALLOWED_IN_PRODUCT.contains(s))
            .any(|s| !precursor_symbols.contains(s));
        if unexplained {
            reasons.push(FilterReason::DifferentAtomTypes);
        }

        reasons
    }
}

fn products_subset_of_reactants(reaction: &ReactionEquation) -> bool {
    let reactants: HashSet<&String> = reaction.reactants.iter().collect();
    !reaction.products.is_empty() && reaction.products.iter().all(|p| reactants.contains(p))
}

fn group_token_count(group: &[String], toolkit: &dyn ChemistryToolkit) -> Result<usize, ToolkitError> {
    if group.is_empty() {
        return Ok(0);
    }
    Ok(toolkit.tokenize(&group.join("."))?.len())
}
