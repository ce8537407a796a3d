//! Pure-Rust syntactic toolkit.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use super::smiles::{self, MolGraph};
use super::{ChemistryToolkit, RandomType, ToolkitError};

/// Toolkit working on SMILES syntax only.
///
/// Canonicalization validates the molecule and returns it unchanged; there is
/// no graph canonicalization. Randomization re-roots a depth-first traversal
/// of the parsed graph. Molecules carrying stereo markers are returned as
/// written since re-rooting would invert their meaning.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicToolkit;

impl BasicToolkit {
    pub fn new() -> Self {
        Self
    }
}

impl ChemistryToolkit for BasicToolkit {
    fn name(&self) -> &str {
        "basic"
    }

    fn canonicalize(&self, smiles: &str) -> Result<String, ToolkitError> {
        MolGraph::parse(smiles)?;
        Ok(smiles.to_string())
    }

    fn tokenize(&self, smiles: &str) -> Result<Vec<String>, ToolkitError> {
        smiles::tokenize(smiles)
    }

    fn atom_symbols(&self, smiles: &str) -> Result<Vec<String>, ToolkitError> {
        let graph = MolGraph::parse(smiles)?;
        Ok(graph.atoms.into_iter().map(|a| a.symbol).collect())
    }

    fn formal_charge(&self, smiles: &str) -> Result<i32, ToolkitError> {
        Ok(MolGraph::parse(smiles)?.formal_charge())
    }

    fn randomize(
        &self,
        smiles: &str,
        mode: RandomType,
        rng: &mut dyn RngCore,
    ) -> Result<String, ToolkitError> {
        let graph = MolGraph::parse(smiles)?;
        if mode == RandomType::Molecules || graph.has_stereo() {
            return Ok(smiles.to_string());
        }

        let rendered: Vec<String> = graph
            .components()
            .iter()
            .map(|component| RandomWriter::new(&graph, component, mode, rng).write())
            .collect::<Result<_, _>>()?;
        Ok(rendered.join("."))
    }
}

/// Depth-first SMILES writer for a single connected component.
struct RandomWriter<'g> {
    graph: &'g MolGraph,
    root: usize,
    /// Children of every atom as (bond, atom), in output order.
    children: Vec<Vec<(usize, usize)>>,
    /// Ring-closure bonds of every atom, in output order.
    ring_bonds: Vec<Vec<usize>>,
}

impl<'g> RandomWriter<'g> {
    fn new(
        graph: &'g MolGraph,
        component: &[usize],
        mode: RandomType,
        rng: &mut dyn RngCore,
    ) -> Self {
        let root = component[rng.gen_range(0..component.len())];
        let atom_count = graph.atoms.len();
        let reversed = mode == RandomType::Rotated && rng.gen_bool(0.5);

        let mut writer = Self {
            graph,
            root,
            children: vec![Vec::new(); atom_count],
            ring_bonds: vec![Vec::new(); atom_count],
        };

        let mut visited = vec![false; atom_count];
        let mut classified = vec![false; graph.bonds.len()];
        writer.traverse(root, None, mode, reversed, rng, &mut visited, &mut classified);
        writer
    }

    fn neighbours(
        &self,
        atom: usize,
        mode: RandomType,
        reversed: bool,
        rng: &mut dyn RngCore,
    ) -> Vec<(usize, usize)> {
        let mut neighbours: Vec<(usize, usize)> = self.graph.adjacency[atom]
            .iter()
            .map(|&bond| (bond, self.graph.bonds[bond].other(atom)))
            .collect();

        match mode {
            RandomType::Unrestricted => neighbours.shuffle(rng),
            RandomType::Rotated => {
                let n = self.graph.atoms.len();
                neighbours.sort_by_key(|&(_, next)| (next + n - self.root) % n);
                if reversed {
                    neighbours.reverse();
                }
            }
            RandomType::Restricted | RandomType::Molecules => {
                neighbours.sort_by_key(|&(_, next)| next);
            }
        }
        neighbours
    }

    #[allow(clippy::too_many_arguments)]
    fn traverse(
        &mut self,
        atom: usize,
        parent_bond: Option<usize>,
        mode: RandomType,
        reversed: bool,
        rng: &mut dyn RngCore,
        visited: &mut [bool],
        classified: &mut [bool],
    ) {
        visited[atom] = true;
        for (bond, next) in self.neighbours(atom, mode, reversed, rng) {
            if Some(bond) == parent_bond || classified[bond] {
                continue;
            }
            classified[bond] = true;
            if visited[next] {
                self.ring_bonds[atom].push(bond);
                self.ring_bonds[next].push(bond);
            } else {
                self.children[atom].push((bond, next));
                self.traverse(next, Some(bond), mode, reversed, rng, visited, classified);
            }
        }
    }

    fn write(&self) -> Result<String, ToolkitError> {
        let mut out = String::new();
        let mut open_rings: Vec<Option<usize>> = vec![None; self.graph.bonds.len()];
        let mut numbers_in_use: Vec<bool> = Vec::new();
        self.emit(self.root, None, &mut out, &mut open_rings, &mut numbers_in_use)?;
        Ok(out)
    }

    fn emit(
        &self,
        atom: usize,
        incoming: Option<usize>,
        out: &mut String,
        open_rings: &mut [Option<usize>],
        numbers_in_use: &mut Vec<bool>,
    ) -> Result<(), ToolkitError> {
        if let Some(bond) = incoming {
            out.push_str(self.graph.bonds[bond].symbol.as_deref().unwrap_or(""));
        }
        out.push_str(&self.graph.atoms[atom].token);

        for &bond in &self.ring_bonds[atom] {
            match open_rings[bond].take() {
                Some(number) => {
                    numbers_in_use[number] = false;
                    out.push_str(&ring_label(number));
                }
                None => {
                    let number = open_ring_number(numbers_in_use).ok_or_else(|| {
                        ToolkitError::Unsupported(format!(
                            "more than {} simultaneously open rings",
                            MAX_RING_NUMBER
                        ))
                    })?;
                    open_rings[bond] = Some(number);
                    out.push_str(self.graph.bonds[bond].symbol.as_deref().unwrap_or(""));
                    out.push_str(&ring_label(number));
                }
            }
        }

        let children = &self.children[atom];
        for (i, &(bond, next)) in children.iter().enumerate() {
            let last = i + 1 == children.len();
            if !last {
                out.push('(');
            }
            self.emit(next, Some(bond), out, open_rings, numbers_in_use)?;
            if !last {
                out.push(')');
            }
        }
        Ok(())
    }
}

/// Highest ring-closure number SMILES can express (`%99`).
const MAX_RING_NUMBER: usize = 99;

/// Claim the lowest free ring-closure number, reusing closed ones.
fn open_ring_number(numbers_in_use: &mut Vec<bool>) -> Option<usize> {
    let number = match numbers_in_use.iter().skip(1).position(|used| !used) {
        Some(offset) => offset + 1,
        None => numbers_in_use.len().max(1),
    };
    if number > MAX_RING_NUMBER {
        return None;
    }
    if number >= numbers_in_use.len() {
        numbers_in_use.resize(number + 1, false);
    }
    numbers_in_use[number] = true;
    Some(number)
}

fn ring_label(number: usize) -> String {
    if number < 10 {
        number.to_string()
    } else {
        format!("%{:02}", number)
    }
}
