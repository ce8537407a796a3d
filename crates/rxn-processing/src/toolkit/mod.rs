//! Chemistry toolkit abstraction.
//!
//! Stages never parse molecules themselves. They call a [`ChemistryToolkit`]
//! handle that is constructed once and passed into the pipeline. The only
//! contract the pipeline relies on is that the same input, the same
//! randomization mode and the same random draws give the same output.
//!
//! [`BasicToolkit`] is a pure-Rust implementation working on the SMILES
//! syntax alone. A binding to a full cheminformatics library can be plugged in
//! by implementing the trait.
//!
//! # Implementing a toolkit
//!
//! ```rust,ignore
//! use rxn_processing::toolkit::{ChemistryToolkit, RandomType, ToolkitError};
//! use rand::RngCore;
//!
//! struct MyToolkit;
//!
//! impl ChemistryToolkit for MyToolkit {
//!     fn name(&self) -> &str { "my-toolkit" }
//!     fn canonicalize(&self, smiles: &str) -> Result<String, ToolkitError> { todo!() }
//!     fn tokenize(&self, smiles: &str) -> Result<Vec<String>, ToolkitError> { todo!() }
//!     fn atom_symbols(&self, smiles: &str) -> Result<Vec<String>, ToolkitError> { todo!() }
//!     fn formal_charge(&self, smiles: &str) -> Result<i32, ToolkitError> { todo!() }
//!     fn randomize(
//!         &self,
//!         smiles: &str,
//!         mode: RandomType,
//!         rng: &mut dyn RngCore,
//!     ) -> Result<String, ToolkitError> { todo!() }
//! }
//! ```

mod basic;
pub mod smiles;

pub use basic::BasicToolkit;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors reported by a chemistry toolkit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolkitError {
    /// The molecule string could not be parsed.
    #[error("Invalid SMILES '{smiles}': {reason}")]
    InvalidSmiles { smiles: String, reason: String },

    /// The toolkit does not support the requested operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl ToolkitError {
    pub fn invalid(smiles: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolkitError::InvalidSmiles {
            smiles: smiles.into(),
            reason: reason.into(),
        }
    }
}

/// How alternate renderings of a molecule are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RandomType {
    /// Shuffle the order of molecules; molecule strings stay untouched.
    Molecules,
    /// Random root atom and random branch order.
    #[default]
    Unrestricted,
    /// Random root atom, branches in atom-index order.
    Restricted,
    /// Atom order rotated to a random root, optionally reversed.
    Rotated,
}

impl RandomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Molecules => "molecules",
            Self::Unrestricted => "unrestricted",
            Self::Restricted => "restricted",
            Self::Rotated => "rotated",
        }
    }
}

impl fmt::Display for RandomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Molecule-level operations the pipeline delegates.
///
/// All methods receive a single molecule fragment or a `.`-joined molecule,
/// never a reaction string, except [`tokenize`](Self::tokenize) which must
/// also accept reaction strings.
pub trait ChemistryToolkit: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Canonical form of a molecule; fails for invalid molecules.
    fn canonicalize(&self, smiles: &str) -> Result<String, ToolkitError>;

    /// Split a molecule or reaction string into atomic tokens.
    fn tokenize(&self, smiles: &str) -> Result<Vec<String>, ToolkitError>;

    /// Element symbols of every heavy atom, in atom order.
    fn atom_symbols(&self, smiles: &str) -> Result<Vec<String>, ToolkitError>;

    /// Total formal charge of the molecule.
    fn formal_charge(&self, smiles: &str) -> Result<i32, ToolkitError>;

    /// A randomized but equivalent rendering of the molecule.
    fn randomize(
        &self,
        smiles: &str,
        mode: RandomType,
        rng: &mut dyn RngCore,
    ) -> Result<String, ToolkitError>;

    /// Drop tetrahedral stereo markers.
    fn remove_chiral_centers(&self, smiles: &str) -> String {
        smiles.replace('@', "")
    }
}

// The toolkit handle is shared across stages and may be moved with the pipeline.
static_assertions::assert_obj_safe!(ChemistryToolkit);
static_assertions::assert_impl_all!(BasicToolkit: Send, Sync);
