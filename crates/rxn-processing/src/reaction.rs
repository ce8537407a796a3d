//! Reaction strings and their molecule groups.
//!
//! A reaction string has the form `reactants>agents>products`. Molecules in a
//! group are separated by `.`; fragments of one molecule are joined by the
//! configured [`FragmentBond`]. Inside a [`ReactionEquation`] the fragments of a
//! molecule are always joined by `.`, so the same equation can be written out
//! with either fragment bond.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{PreprocessingError, Result};

/// Token added to the precursors of reactions run under light.
pub const LIGHT_TOKEN: &str = "[Lv]";

/// Token added to the precursors of reactions run under heat.
pub const HEAT_TOKEN: &str = "[Ts]";

static ATOM_MAP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]:]+):\d+\]").expect("atom map pattern is valid"));

/// Token joining disconnected fragments of one logical molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FragmentBond {
    /// `.`: fragments are indistinguishable from separate molecules.
    #[default]
    Dot,
    /// `~`: fragments stay grouped inside one molecule.
    Tilde,
}

impl FragmentBond {
    /// The literal token in reaction strings.
    pub fn token(&self) -> &'static str {
        match self {
            Self::Dot => ".",
            Self::Tilde => "~",
        }
    }
}

impl fmt::Display for FragmentBond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Part of a reaction that an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReactionSection {
    /// Reactants and agents.
    #[default]
    Precursors,
    /// Products.
    Products,
}

/// A reaction split into its three molecule groups.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReactionEquation {
    pub reactants: Vec<String>,
    pub agents: Vec<String>,
    pub products: Vec<String>,
}

impl ReactionEquation {
    pub fn new(reactants: Vec<String>, agents: Vec<String>, products: Vec<String>) -> Self {
        Self {
            reactants,
            agents,
            products,
        }
    }

    /// Parse a reaction string written with the given fragment bond.
    ///
    /// Fails when the string does not have exactly two role separators, when a
    /// molecule or fragment is empty, or when it uses `~` while the fragment
    /// bond is `.`.
    pub fn parse(reaction: &str, fragment_bond: FragmentBond) -> Result<Self> {
        let trimmed = reaction.trim();
        if trimmed.is_empty() {
            return Err(PreprocessingError::malformed(reaction, "empty reaction"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(PreprocessingError::malformed(reaction, "contains whitespace"));
        }
        if fragment_bond == FragmentBond::Dot && trimmed.contains('~') {
            return Err(PreprocessingError::malformed(
                reaction,
                "'~' found but the fragment bond is '.'",
            ));
        }

        let groups: Vec<&str> = trimmed.split('>').collect();
        if groups.len() != 3 {
            return Err(PreprocessingError::malformed(
                reaction,
                format!("expected 2 role separators, found {}", groups.len() - 1),
            ));
        }

        let parse_group = |group: &str| -> Result<Vec<String>> {
            if group.is_empty() {
                return Ok(Vec::new());
            }
            group
                .split('.')
                .map(|molecule| parse_molecule(reaction, molecule, fragment_bond))
                .collect()
        };

        Ok(Self {
            reactants: parse_group(groups[0])?,
            agents: parse_group(groups[1])?,
            products: parse_group(groups[2])?,
        })
    }

    /// Parse a reaction in any supported notation.
    ///
    /// Accepts `~` fragment bonds, plain `.`-separated reactions, and extended
    /// reaction SMILES whose `|f:i.j,...|` block lists the molecule indices
    /// that form one multi-fragment molecule.
    pub fn parse_any(reaction: &str) -> Result<Self> {
        let trimmed = reaction.trim();
        let (smiles, extension) = match trimmed.split_once(char::is_whitespace) {
            Some((smiles, rest)) => (smiles, Some(rest.trim())),
            None => (trimmed, None),
        };

        match extension {
            Some(ext) if !ext.is_empty() => {
                let equation = Self::parse(smiles, FragmentBond::Dot)?;
                let groups = parse_fragment_groups(reaction, ext)?;
                equation.merge_fragment_groups(reaction, &groups)
            }
            _ if smiles.contains('~') => Self::parse(smiles, FragmentBond::Tilde),
            _ => Self::parse(smiles, FragmentBond::Dot),
        }
    }

    /// Format the reaction with the given fragment bond.
    pub fn to_reaction_string(&self, fragment_bond: FragmentBond) -> String {
        let format_group = |group: &[String]| -> String {
            group
                .iter()
                .map(|m| m.replace('.', fragment_bond.token()))
                .collect::<Vec<_>>()
                .join(".")
        };
        format!(
            "{}>{}>{}",
            format_group(&self.reactants),
            format_group(&self.agents),
            format_group(&self.products)
        )
    }

    /// Reactants followed by agents.
    pub fn precursors(&self) -> impl Iterator<Item = &String> {
        self.reactants.iter().chain(self.agents.iter())
    }

    /// Every molecule of the reaction, in role order.
    pub fn iter_all(&self) -> impl Iterator<Item = &String> {
        self.precursors().chain(self.products.iter())
    }

    /// Molecules of one section.
    pub fn section(&self, section: ReactionSection) -> Vec<&String> {
        match section {
            ReactionSection::Precursors => self.precursors().collect(),
            ReactionSection::Products => self.products.iter().collect(),
        }
    }

    /// Reaction-level standardization.
    ///
    /// Agents are merged into the reactants, products that also appear among
    /// the precursors are removed, duplicates are dropped and every group is
    /// sorted. Only meaningful when the molecules are already canonical.
    pub fn standardized(&self) -> Self {
        let precursors: BTreeSet<String> = self.precursors().cloned().collect();
        let products: BTreeSet<String> = self
            .products
            .iter()
            .filter(|p| !precursors.contains(*p))
            .cloned()
            .collect();
        Self {
            reactants: precursors.into_iter().collect(),
            agents: Vec::new(),
            products: products.into_iter().collect(),
        }
    }

    /// Like [`standardized`](Self::standardized), but reactants and agents stay
    /// separate groups. Agents already present among the reactants are dropped.
    pub fn standardized_keep_agents(&self) -> Self {
        let reactants: BTreeSet<String> = self.reactants.iter().cloned().collect();
        let agents: BTreeSet<String> = self
            .agents
            .iter()
            .filter(|a| !reactants.contains(*a))
            .cloned()
            .collect();
        let products: BTreeSet<String> = self
            .products
            .iter()
            .filter(|p| !reactants.contains(*p) && !agents.contains(*p))
            .cloned()
            .collect();
        Self {
            reactants: reactants.into_iter().collect(),
            agents: agents.into_iter().collect(),
            products: products.into_iter().collect(),
        }
    }

    /// Add the light token to the reactants.
    pub fn add_light_token(&mut self) {
        self.reactants.push(LIGHT_TOKEN.to_string());
    }

    /// Add the heat token to the reactants.
    pub fn add_heat_token(&mut self) {
        self.reactants.push(HEAT_TOKEN.to_string());
    }

    /// Whether any molecule is a light or heat token.
    pub fn contains_special_token(&self) -> bool {
        self.iter_all().any(|m| is_special_token(m))
    }

    /// Apply `f` to every molecule, keeping the group structure.
    pub fn try_map_molecules<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let mut map_group = |group: &[String]| -> Result<Vec<String>> {
            group.iter().map(|m| f(m)).collect()
        };
        Ok(Self {
            reactants: map_group(&self.reactants)?,
            agents: map_group(&self.agents)?,
            products: map_group(&self.products)?,
        })
    }

    fn merge_fragment_groups(self, reaction: &str, groups: &[Vec<usize>]) -> Result<Self> {
        let counts = [self.reactants.len(), self.agents.len(), self.products.len()];
        let all: Vec<String> = self.iter_all().cloned().collect();

        // Molecule index -> index of the first member of its fragment group.
        let mut leader: Vec<usize> = (0..all.len()).collect();
        for group in groups {
            let Some(&first) = group.iter().min() else {
                continue;
            };
            for &index in group {
                if index >= all.len() {
                    return Err(PreprocessingError::malformed(
                        reaction,
                        format!("fragment index {index} out of range"),
                    ));
                }
                leader[index] = first;
            }
        }

        let mut merged: Vec<(usize, String)> = Vec::new();
        for (index, molecule) in all.iter().enumerate() {
            let lead = leader[index];
            if lead == index {
                merged.push((index, molecule.clone()));
            } else if let Some((_, existing)) = merged.iter_mut().find(|(i, _)| *i == lead) {
                existing.push('.');
                existing.push_str(molecule);
            }
        }

        let role_of = |index: usize| -> usize {
            if index < counts[0] {
                0
            } else if index < counts[0] + counts[1] {
                1
            } else {
                2
            }
        };

        let mut equation = ReactionEquation::default();
        for (index, molecule) in merged {
            match role_of(index) {
                0 => equation.reactants.push(molecule),
                1 => equation.agents.push(molecule),
                _ => equation.products.push(molecule),
            }
        }
        Ok(equation)
    }
}

impl fmt::Display for ReactionEquation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_reaction_string(FragmentBond::Tilde))
    }
}

/// Whether a molecule string is one of the special condition tokens.
pub fn is_special_token(molecule: &str) -> bool {
    molecule == LIGHT_TOKEN || molecule == HEAT_TOKEN
}

/// Remove atom-map numbers: `[CH3:1]` becomes `[CH3]`.
///
/// The bracket is kept; turning `[CH3]` into `C` is left to standardization.
pub fn remove_atom_mapping(smiles: &str) -> String {
    ATOM_MAP.replace_all(smiles, "[$1]").into_owned()
}

/// Split a reaction string into its precursor and product parts.
///
/// For `a>b>c` the precursor part is `a>b`.
pub fn split_precursors_products(reaction: &str) -> Result<(&str, &str)> {
    if let Some(parts) = reaction.split_once(">>") {
        return Ok(parts);
    }
    match reaction.rfind('>') {
        Some(idx) if reaction[..idx].contains('>') => {
            Ok((&reaction[..idx], &reaction[idx + 1..]))
        }
        _ => Err(PreprocessingError::malformed(
            reaction,
            "missing role separators",
        )),
    }
}

fn parse_molecule(reaction: &str, molecule: &str, fragment_bond: FragmentBond) -> Result<String> {
    if molecule.is_empty() {
        return Err(PreprocessingError::malformed(reaction, "empty molecule"));
    }
    match fragment_bond {
        FragmentBond::Dot => Ok(molecule.to_string()),
        FragmentBond::Tilde => {
            if molecule.split('~').any(str::is_empty) {
                return Err(PreprocessingError::malformed(reaction, "empty fragment"));
            }
            Ok(molecule.replace('~', "."))
        }
    }
}

/// Parse the `f:` entry of an extended reaction SMILES block such as `|f:0.1,3.4|`.
fn parse_fragment_groups(reaction: &str, extension: &str) -> Result<Vec<Vec<usize>>> {
    let inner = extension
        .strip_prefix('|')
        .and_then(|s| s.strip_suffix('|'))
        .ok_or_else(|| PreprocessingError::malformed(reaction, "unterminated extension block"))?;

    let mut groups = Vec::new();
    let mut in_fragment_entry = false;
    // Entries other than `f:` (coordinates, stereo groups, ...) are ignored.
    for entry in inner.split(',').map(str::trim) {
        let spec = if let Some(spec) = entry.strip_prefix("f:") {
            in_fragment_entry = true;
            spec
        } else if entry.contains(':') || entry.contains('|') {
            in_fragment_entry = false;
            continue;
        } else if in_fragment_entry {
            entry
        } else {
            continue;
        };
        let indices = spec
            .split('.')
            .map(|i| {
                i.parse::<usize>().map_err(|_| {
                    PreprocessingError::malformed(reaction, format!("invalid fragment index '{i}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        groups.push(indices);
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_groups() {
        let eq = ReactionEquation::parse("CC.O>[Pd]>CCO", FragmentBond::Dot).unwrap();
        assert_eq!(eq.reactants, vec!["CC", "O"]);
        assert_eq!(eq.agents, vec!["[Pd]"]);
        assert_eq!(eq.products, vec!["CCO"]);
    }

    #[test]
    fn test_parse_tilde_fragments() {
        let eq = ReactionEquation::parse("[Na+]~[Cl-].C>>C", FragmentBond::Tilde).unwrap();
        assert_eq!(eq.reactants, vec!["[Na+].[Cl-]", "C"]);
        assert_eq!(
            eq.to_reaction_string(FragmentBond::Tilde),
            "[Na+]~[Cl-].C>>C"
        );
        assert_eq!(
            eq.to_reaction_string(FragmentBond::Dot),
            "[Na+].[Cl-].C>>C"
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "CC>CC", "A>>B>C", "A..B>>C", "A>>B C", ".A>>B"] {
            let result = ReactionEquation::parse(bad, FragmentBond::Dot);
            assert!(result.is_err(), "'{bad}' should be rejected");
        }
        assert!(ReactionEquation::parse("A~~B>>C", FragmentBond::Tilde).is_err());
        assert!(ReactionEquation::parse("A~B>>C", FragmentBond::Dot).is_err());
    }

    #[test]
    fn test_parse_any_extended_smiles() {
        let eq = ReactionEquation::parse_any("[Na+].[Cl-].CC>>CCO |f:0.1|").unwrap();
        assert_eq!(eq.reactants, vec!["[Na+].[Cl-]", "CC"]);
        assert_eq!(eq.products, vec!["CCO"]);
    }

    #[test]
    fn test_parse_any_detects_tilde() {
        let eq = ReactionEquation::parse_any("A~B.C>>D").unwrap();
        assert_eq!(eq.reactants, vec!["A.B", "C"]);
    }

    #[test]
    fn test_standardized_merges_and_sorts() {
        let eq = ReactionEquation::parse("O.CC.O>N>CC.CCO", FragmentBond::Dot).unwrap();
        let std = eq.standardized();
        assert_eq!(std.reactants, vec!["CC", "N", "O"]);
        assert!(std.agents.is_empty());
        assert_eq!(std.products, vec!["CCO"]);
    }

    #[test]
    fn test_standardized_keep_agents() {
        let eq = ReactionEquation::parse("O.CC>N.O>CC.N.CCO", FragmentBond::Dot).unwrap();
        let std = eq.standardized_keep_agents();
        assert_eq!(std.reactants, vec!["CC", "O"]);
        assert_eq!(std.agents, vec!["N"]);
        assert_eq!(std.products, vec!["CCO"]);
    }

    #[test]
    fn test_special_tokens() {
        let mut eq = ReactionEquation::parse("CC>>C", FragmentBond::Dot).unwrap();
        assert!(!eq.contains_special_token());
        eq.add_light_token();
        eq.add_heat_token();
        assert_eq!(eq.to_reaction_string(FragmentBond::Dot), "CC.[Lv].[Ts]>>C");
        assert!(eq.contains_special_token());
    }

    #[test]
    fn test_remove_atom_mapping() {
        assert_eq!(remove_atom_mapping("[CH3:1][CH2:12]O"), "[CH3][CH2]O");
        assert_eq!(remove_atom_mapping("[Na+]"), "[Na+]");
    }

    #[test]
    fn test_split_precursors_products() {
        assert_eq!(split_precursors_products("A.B>>C").unwrap(), ("A.B", "C"));
        assert_eq!(split_precursors_products("A>B>C").unwrap(), ("A>B", "C"));
        assert!(split_precursors_products("ABC").is_err());
    }
}
