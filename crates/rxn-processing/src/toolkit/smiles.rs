//! SMILES tokenization and syntactic graph parsing.
//!
//! The parser understands the organic subset, bracket atoms, bond symbols,
//! branches and ring closures (single digits, `%nn` and `%(nnn)`). It builds
//! the molecular graph without any valence or aromaticity perception.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::ToolkitError;

/// Tokenizer pattern for SMILES and reaction SMILES.
pub const SMILES_TOKENIZER_PATTERN: &str = r"(\%\([0-9]{3}\)|\[[^\]]+]|Br?|Cl?|N|O|S|P|F|I|b|c|n|o|s|p|\||\(|\)|\.|=|#|-|\+|\\|/|:|~|@|\?|>>?|\*|\$|\%[0-9]{2}|[0-9])";

static SMILES_TOKENIZER: Lazy<Regex> =
    Lazy::new(|| Regex::new(SMILES_TOKENIZER_PATTERN).expect("SMILES tokenizer pattern is valid"));

static BRACKET_ATOM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[(\d*)([A-Z][a-z]?|[a-z][a-z]?|\*)(@[@A-Z0-9]*)?(H\d*)?([+-]+\d*)?(:\d+)?\]$",
    )
    .expect("bracket atom pattern is valid")
});

const AROMATIC_BRACKET_SYMBOLS: &[&str] = &["b", "c", "n", "o", "p", "s", "se", "as", "te"];

/// Split a SMILES (or reaction SMILES) string into tokens.
///
/// Fails when some characters are not covered by any token.
pub fn tokenize(smiles: &str) -> Result<Vec<String>, ToolkitError> {
    let tokens: Vec<String> = SMILES_TOKENIZER
        .find_iter(smiles)
        .map(|m| m.as_str().to_string())
        .collect();

    let covered: usize = tokens.iter().map(String::len).sum();
    if covered != smiles.len() {
        return Err(ToolkitError::invalid(smiles, "contains untokenizable characters"));
    }
    Ok(tokens)
}

/// An atom as written in the SMILES string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    /// Token exactly as written, e.g. `C`, `c`, `[NH4+]`.
    pub token: String,
    /// Element symbol with capitalised first letter, `*` for wildcards.
    pub symbol: String,
    pub charge: i32,
    /// Carries a chirality marker.
    pub chiral: bool,
}

/// A bond between two atoms; `symbol` is `None` for implicit bonds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bond {
    pub begin: usize,
    pub end: usize,
    pub symbol: Option<String>,
}

impl Bond {
    pub fn other(&self, atom: usize) -> usize {
        if self.begin == atom { self.end } else { self.begin }
    }

    fn is_directional(&self) -> bool {
        matches!(self.symbol.as_deref(), Some("/") | Some("\\"))
    }
}

/// Molecular graph parsed from SMILES.
#[derive(Debug, Clone, Default)]
pub struct MolGraph {
    pub atoms: Vec<Atom>,
    pub bonds: Vec<Bond>,
    /// Bond indices incident to each atom, in the order they were written.
    pub adjacency: Vec<Vec<usize>>,
}

impl MolGraph {
    /// Parse one molecule (possibly several `.`-separated components).
    pub fn parse(smiles: &str) -> Result<Self, ToolkitError> {
        Parser::new(smiles).run()
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn formal_charge(&self) -> i32 {
        self.atoms.iter().map(|a| a.charge).sum()
    }

    /// Whether the molecule carries tetrahedral or double-bond stereo.
    pub fn has_stereo(&self) -> bool {
        self.atoms.iter().any(|a| a.chiral) || self.bonds.iter().any(Bond::is_directional)
    }

    /// Connected components, each listed in ascending atom order.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut component_of = vec![usize::MAX; self.atoms.len()];
        let mut components = Vec::new();

        for start in 0..self.atoms.len() {
            if component_of[start] != usize::MAX {
                continue;
            }
            let id = components.len();
            let mut members = vec![start];
            let mut stack = vec![start];
            component_of[start] = id;
            while let Some(atom) = stack.pop() {
                for &bond in &self.adjacency[atom] {
                    let next = self.bonds[bond].other(atom);
                    if component_of[next] == usize::MAX {
                        component_of[next] = id;
                        members.push(next);
                        stack.push(next);
                    }
                }
            }
            members.sort_unstable();
            components.push(members);
        }
        components
    }

    fn add_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.adjacency.push(Vec::new());
        self.atoms.len() - 1
    }

    fn add_bond(&mut self, begin: usize, end: usize, symbol: Option<String>) -> Result<(), String> {
        if begin == end {
            return Err("ring bond from an atom to itself".to_string());
        }
        let duplicate = self.adjacency[begin]
            .iter()
            .any(|&b| self.bonds[b].other(begin) == end);
        if duplicate {
            return Err("duplicate bond between two atoms".to_string());
        }
        let index = self.bonds.len();
        self.bonds.push(Bond { begin, end, symbol });
        self.adjacency[begin].push(index);
        self.adjacency[end].push(index);
        Ok(())
    }
}

/// Parse an atom token into an [`Atom`].
pub fn parse_atom(token: &str) -> Option<Atom> {
    if !token.starts_with('[') {
        let symbol = match token {
            "B" | "C" | "N" | "O" | "P" | "S" | "F" | "Cl" | "Br" | "I" | "*" => token.to_string(),
            "b" | "c" | "n" | "o" | "p" | "s" => token.to_uppercase(),
            _ => return None,
        };
        return Some(Atom {
            token: token.to_string(),
            symbol,
            charge: 0,
            chiral: false,
        });
    }

    let captures = BRACKET_ATOM.captures(token)?;
    let raw_symbol = captures.get(2)?.as_str();
    let first = raw_symbol.chars().next()?;
    if first.is_ascii_lowercase() && !AROMATIC_BRACKET_SYMBOLS.contains(&raw_symbol) {
        return None;
    }
    let mut symbol = String::with_capacity(raw_symbol.len());
    symbol.push(first.to_ascii_uppercase());
    symbol.push_str(&raw_symbol[first.len_utf8()..]);

    let charge = captures.get(5).map(|m| parse_charge(m.as_str())).unwrap_or(0);

    Some(Atom {
        token: token.to_string(),
        symbol,
        charge,
        chiral: captures.get(3).is_some(),
    })
}

fn parse_charge(text: &str) -> i32 {
    let sign = if text.starts_with('-') { -1 } else { 1 };
    let signs = text.chars().take_while(|c| *c == '+' || *c == '-').count() as i32;
    let digits = &text[signs as usize..];
    match digits.parse::<i32>() {
        Ok(n) => sign * n,
        Err(_) => sign * signs,
    }
}

fn ring_number(token: &str) -> Option<u16> {
    if let Some(inner) = token.strip_prefix("%(") {
        return inner.strip_suffix(')')?.parse().ok();
    }
    if let Some(digits) = token.strip_prefix('%') {
        return digits.parse().ok();
    }
    if token.len() == 1 {
        return token.parse().ok();
    }
    None
}

fn is_bond_token(token: &str) -> bool {
    matches!(token, "-" | "=" | "#" | "$" | ":" | "/" | "\\")
}

struct Parser<'a> {
    smiles: &'a str,
    graph: MolGraph,
    previous: Option<usize>,
    branches: Vec<Option<usize>>,
    pending_bond: Option<String>,
    open_rings: HashMap<u16, (usize, Option<String>)>,
}

impl<'a> Parser<'a> {
    fn new(smiles: &'a str) -> Self {
        Self {
            smiles,
            graph: MolGraph::default(),
            previous: None,
            branches: Vec::new(),
            pending_bond: None,
            open_rings: HashMap::new(),
        }
    }

    fn fail(&self, reason: impl Into<String>) -> ToolkitError {
        ToolkitError::invalid(self.smiles, reason)
    }

    fn run(mut self) -> Result<MolGraph, ToolkitError> {
        if self.smiles.is_empty() {
            return Err(self.fail("empty SMILES"));
        }

        for token in tokenize(self.smiles)? {
            self.step(&token)?;
        }

        if self.pending_bond.is_some() {
            return Err(self.fail("dangling bond at end of SMILES"));
        }
        if !self.branches.is_empty() {
            return Err(self.fail("unclosed branch"));
        }
        if !self.open_rings.is_empty() {
            return Err(self.fail("unclosed ring"));
        }
        if self.graph.atoms.is_empty() {
            return Err(self.fail("no atoms"));
        }
        Ok(self.graph)
    }

    fn step(&mut self, token: &str) -> Result<(), ToolkitError> {
        if let Some(atom) = parse_atom(token) {
            let index = self.graph.add_atom(atom);
            if let Some(previous) = self.previous {
                let bond = self.pending_bond.take();
                self.graph
                    .add_bond(previous, index, bond)
                    .map_err(|reason| self.fail(reason))?;
            }
            self.previous = Some(index);
            return Ok(());
        }

        if is_bond_token(token) {
            if self.pending_bond.is_some() || self.previous.is_none() {
                return Err(self.fail(format!("unexpected bond '{}'", token)));
            }
            self.pending_bond = Some(token.to_string());
            return Ok(());
        }

        if let Some(number) = ring_number(token) {
            return self.ring_closure(number);
        }

        match token {
            "(" => {
                if self.previous.is_none() || self.pending_bond.is_some() {
                    return Err(self.fail("branch without a preceding atom"));
                }
                self.branches.push(self.previous);
            }
            ")" => {
                if self.pending_bond.is_some() {
                    return Err(self.fail("dangling bond before ')'"));
                }
                self.previous = self
                    .branches
                    .pop()
                    .ok_or_else(|| self.fail("unbalanced ')'"))?;
            }
            "." => {
                if self.pending_bond.is_some() || !self.branches.is_empty() {
                    return Err(self.fail("unexpected '.'"));
                }
                self.previous = None;
            }
            other => {
                return Err(self.fail(format!("unexpected token '{}'", other)));
            }
        }
        Ok(())
    }

    fn ring_closure(&mut self, number: u16) -> Result<(), ToolkitError> {
        let current = self
            .previous
            .ok_or_else(|| self.fail("ring closure without a preceding atom"))?;
        let bond = self.pending_bond.take();

        match self.open_rings.remove(&number) {
            Some((opener, opening_bond)) => {
                let symbol = match (opening_bond, bond) {
                    (Some(a), Some(b)) if a != b && !is_directional_pair(&a, &b) => {
                        return Err(self.fail(format!("conflicting ring bond {}", number)));
                    }
                    (Some(a), _) => Some(a),
                    (None, b) => b,
                };
                self.graph
                    .add_bond(opener, current, symbol)
                    .map_err(|reason| self.fail(reason))?;
            }
            None => {
                self.open_rings.insert(number, (current, bond));
            }
        }
        Ok(())
    }
}

fn is_directional_pair(a: &str, b: &str) -> bool {
    matches!((a, b), ("/", "\\") | ("\\", "/"))
}
