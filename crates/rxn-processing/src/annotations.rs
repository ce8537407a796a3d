//! Molecule annotations.
//!
//! An annotation file is a JSON array of records:
//!
//! ```json
//! [
//!   {"original_smiles": "[Pd+2]~[Cl-]~[Cl-]", "updated_smiles": "Cl[Pd]Cl",
//!    "decision": "accept", "categories": ["catalyst"]},
//!   {"original_smiles": "[Al]", "updated_smiles": null,
//!    "decision": "reject", "categories": [], "reason": "unclear"}
//! ]
//! ```
//!
//! `~` marks fragment bonds inside a molecule. In `updated_smiles`, `.`
//! separates independent molecules, so one annotated molecule may be
//! replaced by several. Fields other than the four above are kept in
//! [`MoleculeAnnotation::extra_info`].
//!
//! During standardization a molecule is looked up in the [`MoleculeAnnotator`]
//! built from all annotation files: rejected molecules invalidate their
//! reaction, accepted ones with an updated SMILES are replaced, and molecules
//! containing an extended transition metal that no annotation mentions can
//! optionally be treated as missing an annotation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PreprocessingError, Result, ResultExt};
use crate::toolkit::ChemistryToolkit;

/// Element symbols that make a molecule require an annotation: Al, the
/// transition metals, lanthanides and actinides, plus Ga, In, Tl, Pb, Bi
/// and Po.
pub const EXTENDED_TRANSITION_METALS: [&str; 75] = [
    "Al",
    "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga",
    "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb", "Dy", "Ho", "Er", "Tm", "Yb", "Lu",
    "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl", "Pb", "Bi", "Po",
    "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk", "Cf", "Es", "Fm", "Md", "No", "Lr",
    "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn",
];

/// Whether an annotated molecule may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationDecision {
    #[serde(alias = "ACCEPT", alias = "Accept")]
    Accept,
    #[serde(alias = "REJECT", alias = "Reject")]
    Reject,
}

/// One record of an annotation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoleculeAnnotation {
    pub original_smiles: String,
    #[serde(default)]
    pub updated_smiles: Option<String>,
    pub decision: AnnotationDecision,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(flatten)]
    pub extra_info: Map<String, Value>,
}

impl MoleculeAnnotation {
    /// The annotated molecule with `.` between its fragments.
    pub fn original_molecule(&self) -> String {
        self.original_smiles.replace('~', ".")
    }

    /// Molecules replacing the annotated one, fragments joined with `.`.
    pub fn updated_molecules(&self) -> Option<Vec<String>> {
        self.updated_smiles.as_ref().map(|smiles| {
            smiles
                .split('.')
                .filter(|m| !m.is_empty())
                .map(|m| m.replace('~', "."))
                .collect()
        })
    }
}

/// Read the annotations of one JSON file.
pub fn load_annotations(path: &Path) -> Result<Vec<MoleculeAnnotation>> {
    let content = fs::read_to_string(path)
        .context(format!("Failed to read annotation file '{}'", path.display()))?;
    serde_json::from_str(&content).map_err(|e| {
        PreprocessingError::Json(e)
            .with_context(format!("Invalid annotation file '{}'", path.display()))
    })
}

/// Read and concatenate the annotations of several files, in order.
pub fn load_annotations_multiple(paths: &[PathBuf]) -> Result<Vec<MoleculeAnnotation>> {
    let mut annotations = Vec::new();
    for path in paths {
        let loaded = load_annotations(path)?;
        debug!("Loaded {} annotations from {}", loaded.len(), path.display());
        annotations.extend(loaded);
    }
    Ok(annotations)
}

/// Whether an element symbol is one of [`EXTENDED_TRANSITION_METALS`].
pub fn is_extended_transition_metal(symbol: &str) -> bool {
    EXTENDED_TRANSITION_METALS.contains(&symbol)
}

/// Whether a molecule contains an element that calls for an annotation.
///
/// Molecules the toolkit cannot parse never require one.
pub fn requires_annotation(molecule: &str, toolkit: &dyn ChemistryToolkit) -> bool {
    toolkit
        .atom_symbols(molecule)
        .map(|symbols| symbols.iter().any(|s| is_extended_transition_metal(s)))
        .unwrap_or(false)
}

/// Outcome of looking up one molecule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationVerdict {
    /// The molecule may be used; holds its replacement (usually itself).
    Accepted(Vec<String>),
    /// An annotation rejects the molecule.
    Rejected,
    /// The molecule needs an annotation and has none.
    MissingAnnotation,
}

/// Lookup tables built from a set of annotations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoleculeAnnotator {
    rejected: HashSet<String>,
    annotated: HashSet<String>,
    replacements: HashMap<String, Vec<String>>,
    discard_unannotated_metals: bool,
}

impl MoleculeAnnotator {
    pub fn new(annotations: &[MoleculeAnnotation], discard_unannotated_metals: bool) -> Self {
        let mut annotator = Self {
            discard_unannotated_metals,
            ..Self::default()
        };

        for annotation in annotations {
            let original = annotation.original_molecule();
            let updated = annotation.updated_molecules();

            // A single-molecule replacement counts as annotated too.
            if let Some([single]) = updated.as_deref() {
                annotator.annotated.insert(single.clone());
            }
            annotator.annotated.insert(original.clone());

            match (annotation.decision, updated) {
                (AnnotationDecision::Reject, _) => {
                    annotator.rejected.insert(original);
                }
                (AnnotationDecision::Accept, Some(updated)) => {
                    annotator.replacements.insert(original, updated);
                }
                (AnnotationDecision::Accept, None) => {}
            }
        }
        annotator
    }

    /// Build from the annotation files of the standardize configuration.
    pub fn from_files(paths: &[PathBuf], discard_unannotated_metals: bool) -> Result<Self> {
        let annotations = load_annotations_multiple(paths)?;
        let annotator = Self::new(&annotations, discard_unannotated_metals);
        if !paths.is_empty() {
            info!(
                "Loaded {} annotations ({} rejected, {} replacements)",
                annotations.len(),
                annotator.rejected.len(),
                annotator.replacements.len()
            );
        }
        Ok(annotator)
    }

    /// True when lookups can only ever accept molecules unchanged.
    pub fn is_inactive(&self) -> bool {
        self.rejected.is_empty() && self.replacements.is_empty() && !self.discard_unannotated_metals
    }

    /// Whether the molecule requires an annotation that no record provides.
    pub fn needs_annotation(&self, molecule: &str, toolkit: &dyn ChemistryToolkit) -> bool {
        !self.annotated.contains(molecule) && requires_annotation(molecule, toolkit)
    }

    /// Look up a standardized molecule (fragments joined with `.`).
    pub fn review(&self, molecule: &str, toolkit: &dyn ChemistryToolkit) -> AnnotationVerdict {
        if self.rejected.contains(molecule) {
            return AnnotationVerdict::Rejected;
        }
        if self.discard_unannotated_metals && self.needs_annotation(molecule, toolkit) {
            return AnnotationVerdict::MissingAnnotation;
        }
        let replacement = self
            .replacements
            .get(molecule)
            .cloned()
            .unwrap_or_else(|| vec![molecule.to_string()]);
        AnnotationVerdict::Accepted(replacement)
    }
}
