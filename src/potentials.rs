// src/potentials.rs
//
// =============================================================================
// VASPLAB: PSEUDOPOTENTIAL RESOLVER
// =============================================================================
//
// Partitions the atoms of a structure into POTCAR groups and derives the
// resort permutation that makes every group contiguous.
//
// Emission order (this order IS the POSCAR/POTCAR block order):
// 1. Index setups, caller order. One atom each.
// 2. Symbol setups, caller order. Always emitted, even when empty.
// 3. Default groups for the remaining symbols, first-appearance order.
//    Empty default groups are dropped.
//
// Pure: no I/O, no hash-ordered iteration.

use crate::core::{Atom, GroupKey, Setup, SetupKey, Structure};
use crate::error::{Result, VaspError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotentialGroup {
    pub key: SetupKey,
    /// Relative to the pseudopotential root, e.g. `potpaw_PBE/Fe_sv/POTCAR`.
    pub file_path: String,
    pub count: usize,
    /// Produced by a caller setup rather than by the default grouping.
    pub from_setup: bool,
}

impl PotentialGroup {
    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(self.key.clone(), self.from_setup)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotentialLayout {
    pub groups: Vec<PotentialGroup>,
    /// `resort[i]` is the original index of the i-th atom written to file.
    pub resort: Vec<usize>,
    /// `(symbol, count)` aligned with `groups`.
    pub symbol_counts: Vec<(String, usize)>,
}

/// `potpaw_{pp}/{symbol}{suffix}/POTCAR`
pub fn potcar_path(pp: &str, symbol: &str, suffix: &str) -> String {
    format!("potpaw_{}/{}{}/POTCAR", pp, symbol, suffix)
}

pub fn resolve(atoms: &[Atom], setups: &[Setup], pp: &str) -> Result<PotentialLayout> {
    let n = atoms.len();
    let mut claimed = vec![false; n];
    let mut resort: Vec<usize> = Vec::with_capacity(n);
    let mut groups: Vec<PotentialGroup> = Vec::new();

    // 1. Explicit atom indices.
    for setup in setups.iter().filter(|s| s.key.is_index()) {
        let SetupKey::Index(index) = setup.key else {
            continue;
        };
        let atom = atoms.get(index).ok_or_else(|| VaspError::Sorting {
            detail: format!("setup index {} is out of range for {} atoms", index, n),
            resort: resort.clone(),
        })?;

        groups.push(PotentialGroup {
            key: SetupKey::Index(index),
            file_path: potcar_path(pp, &atom.symbol, &setup.suffix),
            count: 1,
            from_setup: true,
        });
        claimed[index] = true;
        resort.push(index);
    }

    // 2. Symbol overrides.
    for setup in setups.iter().filter(|s| !s.key.is_index()) {
        let SetupKey::Symbol(symbol) = &setup.key else {
            continue;
        };
        let count = claim(atoms, symbol, &mut claimed, &mut resort);
        groups.push(PotentialGroup {
            key: setup.key.clone(),
            file_path: potcar_path(pp, symbol, &setup.suffix),
            count,
            from_setup: true,
        });
    }

    // 3. Whatever is left, by first appearance.
    let mut remaining: Vec<&str> = Vec::new();
    for (i, atom) in atoms.iter().enumerate() {
        if !claimed[i] && !remaining.contains(&atom.symbol.as_str()) {
            remaining.push(&atom.symbol);
        }
    }

    // 4. Default potentials.
    for symbol in remaining {
        let count = claim(atoms, symbol, &mut claimed, &mut resort);
        if count > 0 {
            groups.push(PotentialGroup {
                key: SetupKey::Symbol(symbol.to_string()),
                file_path: potcar_path(pp, symbol, ""),
                count,
                from_setup: false,
            });
        }
    }

    // 5. Every atom exactly once.
    validate_partition(n, &groups, &resort)?;

    let symbol_counts = groups
        .iter()
        .map(|g| {
            let symbol = match &g.key {
                SetupKey::Index(i) => atoms[*i].symbol.clone(),
                SetupKey::Symbol(s) => s.clone(),
            };
            (symbol, g.count)
        })
        .collect();

    Ok(PotentialLayout {
        groups,
        resort,
        symbol_counts,
    })
}

/// Claims every unclaimed atom of `symbol`, in original order.
fn claim(atoms: &[Atom], symbol: &str, claimed: &mut [bool], resort: &mut Vec<usize>) -> usize {
    let mut count = 0;
    for (i, atom) in atoms.iter().enumerate() {
        if atom.symbol == symbol && !claimed[i] {
            claimed[i] = true;
            resort.push(i);
            count += 1;
        }
    }
    count
}

fn validate_partition(n: usize, groups: &[PotentialGroup], resort: &[usize]) -> Result<()> {
    let fail = |detail: String| VaspError::Sorting {
        detail,
        resort: resort.to_vec(),
    };

    if resort.len() != n {
        return Err(fail(format!(
            "{} atoms sorted, structure has {}",
            resort.len(),
            n
        )));
    }

    let mut seen = vec![false; n];
    for &i in resort {
        if i >= n || seen[i] {
            return Err(fail(format!("atom {} is claimed more than once", i)));
        }
        seen[i] = true;
    }

    let total: usize = groups.iter().map(|g| g.count).sum();
    if total != n {
        return Err(fail(format!(
            "group counts sum to {}, structure has {}",
            total, n
        )));
    }

    Ok(())
}

impl PotentialLayout {
    pub fn for_structure(structure: &Structure, setups: &[Setup], pp: &str) -> Result<Self> {
        resolve(&structure.atoms, setups, pp)
    }

    pub fn natoms(&self) -> usize {
        self.resort.len()
    }

    /// Atoms in file order.
    pub fn sorted_atoms<'a>(&self, atoms: &'a [Atom]) -> Vec<&'a Atom> {
        self.resort.iter().map(|&i| &atoms[i]).collect()
    }

    /// Maps per-atom data read in file order back to the original order.
    pub fn unsort<T: Clone>(&self, sorted: &[T]) -> Option<Vec<T>> {
        if sorted.len() != self.resort.len() {
            return None;
        }
        let mut out: Vec<Option<T>> = vec![None; sorted.len()];
        for (file_index, &original) in self.resort.iter().enumerate() {
            out[original] = Some(sorted[file_index].clone());
        }
        out.into_iter().collect()
    }
}
