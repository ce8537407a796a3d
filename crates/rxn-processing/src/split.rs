//! Deterministic train/validation/test assignment.
//!
//! The label of a record depends only on its fingerprint and the split ratio:
//! no seed, no state and no dependence on the size of the corpus. Adding
//! records to a dataset never moves existing records between splits.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PreprocessingError, Result};
use crate::fingerprint::{
    Fingerprint, fingerprint_equation, fingerprint_equation_section, fingerprint_key,
};
use crate::reaction::{ReactionEquation, ReactionSection};

/// Number of buckets fingerprints are reduced to.
pub const BUCKET_COUNT: u32 = 1 << 16;

/// Which split a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitLabel {
    Train,
    Validation,
    Test,
}

impl SplitLabel {
    pub const ALL: [SplitLabel; 3] = [SplitLabel::Train, SplitLabel::Validation, SplitLabel::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Validation => "validation",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for SplitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fraction of records that goes to each of validation and test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SplitRatio {
    ratio: f64,
    threshold: u32,
}

impl SplitRatio {
    /// Maximum ratio; validation and test together take at most everything.
    pub const MAX: f64 = 0.5;

    /// Validate the ratio; it must lie in `[0, 0.5]`.
    pub fn new(ratio: f64) -> Result<Self> {
        if !(0.0..=Self::MAX).contains(&ratio) {
            return Err(PreprocessingError::InvalidConfiguration(format!(
                "split_ratio must be between 0.0 and {} (got {})",
                Self::MAX,
                ratio
            )));
        }
        let threshold = (ratio * BUCKET_COUNT as f64).floor() as u32;
        Ok(Self { ratio, threshold })
    }

    pub fn value(&self) -> f64 {
        self.ratio
    }

    /// Number of buckets assigned to test (and to validation).
    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

/// Label a fingerprint.
///
/// Buckets `[0, t)` go to test, `[t, 2t)` to validation and the rest to train,
/// with `t = floor(ratio * 2^16)`.
pub fn assign_split(fingerprint: Fingerprint, ratio: SplitRatio) -> SplitLabel {
    let bucket = u32::from(fingerprint.bucket());
    let t = ratio.threshold();
    if bucket < t {
        SplitLabel::Test
    } else if bucket < 2 * t {
        SplitLabel::Validation
    } else {
        SplitLabel::Train
    }
}

/// What a record is identified by when assigning its split.
///
/// Records with equal keys always land in the same split.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum SplitKey {
    /// Whole-reaction fingerprint.
    #[default]
    Reaction,
    /// Fingerprint of the product molecules only.
    Products,
    /// Fingerprint of the precursor molecules only.
    Precursors,
    /// Raw value of an auxiliary column.
    Column(String),
}

impl SplitKey {
    /// Fingerprint of a parsed record under this key.
    ///
    /// `column_value` is only consulted for [`SplitKey::Column`].
    pub fn fingerprint(
        &self,
        equation: &ReactionEquation,
        column_value: Option<&str>,
        seed: u64,
    ) -> Fingerprint {
        match self {
            Self::Reaction => fingerprint_equation(equation, seed),
            Self::Products => {
                fingerprint_equation_section(equation, ReactionSection::Products, seed)
            }
            Self::Precursors => {
                fingerprint_equation_section(equation, ReactionSection::Precursors, seed)
            }
            Self::Column(_) => fingerprint_key(column_value.unwrap_or_default(), seed),
        }
    }

    /// Name of the auxiliary column, if the key is column based.
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::Column(name) => Some(name),
            _ => None,
        }
    }
}

impl From<String> for SplitKey {
    fn from(value: String) -> Self {
        match value.as_str() {
            "reaction" | "rxn" => Self::Reaction,
            "products" => Self::Products,
            "precursors" => Self::Precursors,
            _ => Self::Column(value),
        }
    }
}

impl From<SplitKey> for String {
    fn from(key: SplitKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for SplitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reaction => f.write_str("reaction"),
            Self::Products => f.write_str("products"),
            Self::Precursors => f.write_str("precursors"),
            Self::Column(name) => f.write_str(name),
        }
    }
}
