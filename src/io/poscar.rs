// src/io/poscar.rs
//
// =============================================================================
// VASPLAB: POSCAR FORMAT
// =============================================================================
//
// POSCAR (VASP 5): atoms grouped by POTCAR dataset.
// The comment line records the group keys (`0 Fe* O`), which is what lets
// setups be recovered from a directory. `*` marks a symbol setup group.

use super::{format_float, read_text, write_text};
use crate::core::{GroupKey, Structure};
use crate::error::{Result, VaspError};
use crate::potentials::PotentialLayout;
use std::path::Path;

pub fn render(structure: &Structure, layout: &PotentialLayout) -> Result<String> {
    if layout.natoms() != structure.len() {
        return Err(VaspError::Configuration(format!(
            "layout covers {} atoms, structure has {}",
            layout.natoms(),
            structure.len()
        )));
    }

    let keys: Vec<String> = layout
        .groups
        .iter()
        .map(|g| g.group_key().to_string())
        .collect();
    let symbols: Vec<&str> = layout.symbol_counts.iter().map(|(s, _)| s.as_str()).collect();
    let counts: Vec<String> = layout.symbol_counts.iter().map(|(_, c)| c.to_string()).collect();

    let mut out = String::new();
    out.push_str(&keys.join(" "));
    out.push_str("\n1.0\n");
    for v in &structure.cell {
        out.push_str(&vector(v));
    }
    out.push_str(&symbols.join(" "));
    out.push('\n');
    out.push_str(&counts.join(" "));
    out.push_str("\nCartesian\n");
    for atom in layout.sorted_atoms(&structure.atoms) {
        out.push_str(&vector(&atom.position));
    }
    Ok(out)
}

fn vector(v: &[f64; 3]) -> String {
    format!(
        "  {} {} {}\n",
        format_float(v[0]),
        format_float(v[1]),
        format_float(v[2])
    )
}

pub fn write(path: &Path, structure: &Structure, layout: &PotentialLayout) -> Result<()> {
    write_text(path, &render(structure, layout)?)
}

/// Group keys from the comment line.
pub fn read_group_keys(path: &Path) -> Result<Vec<GroupKey>> {
    let text = read_text(path)?;
    let comment = text
        .lines()
        .next()
        .ok_or_else(|| VaspError::malformed(path, "file is empty"))?;
    Ok(comment
        .split_whitespace()
        .map(|t| t.parse::<GroupKey>().unwrap_or_else(|e| match e {}))
        .collect())
}
