// src/io/outcar.rs
//
// =============================================================================
// VASPLAB: OUTCAR SCRAPER
// =============================================================================
//
// OUTCAR scraping. Only the last occurrence of each quantity counts
// (relaxations print one block per ionic step).

use super::{parse_f64, read_text};
use crate::error::{Result, VaspError};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutcarData {
    pub energy: Option<f64>,
    pub free_energy: Option<f64>,
    /// File (sorted) atom order.
    pub forces: Option<Vec<[f64; 3]>>,
    pub stress: Option<[f64; 6]>,
    pub magmom: Option<f64>,
}

pub fn read(path: &Path, natoms: usize) -> Result<OutcarData> {
    parse(&read_text(path)?, natoms, path)
}

pub fn parse(text: &str, natoms: usize, path: &Path) -> Result<OutcarData> {
    let lines: Vec<&str> = text.lines().collect();
    let mut data = OutcarData::default();

    for (i, line) in lines.iter().enumerate() {
        if line.contains("free  energy   TOTEN") {
            // free  energy   TOTEN  =       -10.51234 eV
            let value = line
                .split('=')
                .nth(1)
                .and_then(|rhs| rhs.split_whitespace().next())
                .ok_or_else(|| VaspError::malformed(path, "bad TOTEN line"))?;
            data.free_energy = Some(parse_f64(value, path)?);
        } else if line.contains("energy(sigma->0)") {
            // energy  without entropy=  -10.4  energy(sigma->0) =  -10.45
            let value = line
                .rsplit('=')
                .next()
                .and_then(|rhs| rhs.split_whitespace().next())
                .ok_or_else(|| VaspError::malformed(path, "bad energy(sigma->0) line"))?;
            data.energy = Some(parse_f64(value, path)?);
        } else if line.trim_start().starts_with("in kB") {
            let values = line
                .split_whitespace()
                .skip(2)
                .map(|t| parse_f64(t, path))
                .collect::<Result<Vec<f64>>>()?;
            let stress: [f64; 6] = values
                .try_into()
                .map_err(|_| VaspError::malformed(path, "stress line needs 6 values"))?;
            data.stress = Some(stress);
        } else if line.contains("TOTAL-FORCE") {
            data.forces = Some(parse_forces(&lines, i, natoms, path)?);
        } else if line.contains("number of electron") && line.contains("magnetization") {
            if let Some(value) = line.split_whitespace().last() {
                data.magmom = Some(parse_f64(value, path)?);
            }
        }
    }

    Ok(data)
}

/// Header, dashed rule, then one `x y z fx fy fz` row per atom.
fn parse_forces(lines: &[&str], header: usize, natoms: usize, path: &Path) -> Result<Vec<[f64; 3]>> {
    let start = header + 2;
    let rows = lines
        .get(start..start + natoms)
        .ok_or_else(|| VaspError::malformed(path, "truncated TOTAL-FORCE block"))?;

    rows.iter()
        .map(|row| {
            let cols: Vec<&str> = row.split_whitespace().collect();
            if cols.len() < 6 {
                return Err(VaspError::malformed(
                    path,
                    format!("bad force row '{}'", row.trim()),
                ));
            }
            Ok([
                parse_f64(cols[3], path)?,
                parse_f64(cols[4], path)?,
                parse_f64(cols[5], path)?,
            ])
        })
        .collect()
}
