//! Content-addressed reaction fingerprints.
//!
//! A fingerprint is the xxh64 hash of a canonical text built from the set of
//! distinct precursor molecules and the set of distinct product molecules,
//! each sorted. Reordering molecules, repeating them, or moving a molecule
//! between reactants and agents leaves the fingerprint unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use xxhash_rust::xxh64::xxh64;

use crate::error::Result;
use crate::reaction::{FragmentBond, ReactionEquation, ReactionSection};

/// Default seed of the fingerprint hash.
pub const DEFAULT_HASH_SEED: u64 = 42;

/// Stable 64-bit identifier of a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Bucket in `[0, 2^16)` used by the split assigner.
    pub fn bucket(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Fingerprint of a whole reaction string.
///
/// Fails with [`MalformedReaction`](crate::error::PreprocessingError::MalformedReaction)
/// when the string cannot be parsed with `fragment_bond`.
pub fn fingerprint(reaction: &str, fragment_bond: FragmentBond, seed: u64) -> Result<Fingerprint> {
    let equation = ReactionEquation::parse(reaction, fragment_bond)?;
    Ok(fingerprint_equation(&equation, seed))
}

/// Fingerprint of an already parsed reaction.
pub fn fingerprint_equation(equation: &ReactionEquation, seed: u64) -> Fingerprint {
    let precursors = canonical_set(equation.precursors());
    let products = canonical_set(equation.products.iter());
    let key = format!("{}>>{}", precursors, products);
    Fingerprint(xxh64(key.as_bytes(), seed))
}

/// Fingerprint of the molecule set of one section only.
pub fn fingerprint_section(
    reaction: &str,
    section: ReactionSection,
    fragment_bond: FragmentBond,
    seed: u64,
) -> Result<Fingerprint> {
    let equation = ReactionEquation::parse(reaction, fragment_bond)?;
    Ok(fingerprint_equation_section(&equation, section, seed))
}

/// Section fingerprint of an already parsed reaction.
pub fn fingerprint_equation_section(
    equation: &ReactionEquation,
    section: ReactionSection,
    seed: u64,
) -> Fingerprint {
    let key = canonical_set(equation.section(section).into_iter());
    Fingerprint(xxh64(key.as_bytes(), seed))
}

/// Fingerprint of an arbitrary key, hashed as is.
pub fn fingerprint_key(value: &str, seed: u64) -> Fingerprint {
    Fingerprint(xxh64(value.as_bytes(), seed))
}

// Multi-fragment molecules are written with `~` so that they never collide
// with the same fragments listed as separate molecules.
fn canonical_set<'a>(molecules: impl Iterator<Item = &'a String>) -> String {
    molecules
        .map(|m| m.replace('.', "~"))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(".")
}
