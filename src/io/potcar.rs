// src/io/potcar.rs
//
// =============================================================================
// VASPLAB: POTCAR DATASETS
// =============================================================================
//
// POTCAR: concatenated pseudopotential datasets, one per group.
//
// Each dataset starts with a header line `PAW_<family> <name> <date>` and
// ends with an `End of Dataset` line.

use super::{read_text, write_text};
use crate::core::{GroupKey, ParameterSet, Setup, SetupKey};
use crate::error::{Result, VaspError};
use crate::potentials::PotentialLayout;
use serde_json::Value;
use std::path::Path;

pub const END_OF_DATASET: &str = "End of Dataset";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHeader {
    /// First token, e.g. `PAW_PBE`.
    pub kind: String,
    /// Dataset name, e.g. `Fe_sv`.
    pub name: String,
}

impl DatasetHeader {
    /// `PAW_PBE` -> `PBE`, `PAW_GGA` -> `GGA`, bare `PAW` -> `LDA`.
    pub fn family(&self) -> String {
        match self.kind.split_once('_') {
            Some((_, family)) => family.to_string(),
            None => "LDA".to_string(),
        }
    }

    pub fn element(&self) -> &str {
        element_of(&self.name)
    }
}

/// Leading chemical symbol of a dataset name: `Fe_sv` -> `Fe`, `H.5` -> `H`.
pub fn element_of(name: &str) -> &str {
    let mut chars = name.char_indices();
    match (chars.next(), chars.next()) {
        (Some((_, c0)), Some((i, c1))) if c0.is_ascii_uppercase() && c1.is_ascii_lowercase() => {
            &name[..i + c1.len_utf8()]
        }
        (Some((_, c0)), _) if c0.is_ascii_uppercase() => &name[..c0.len_utf8()],
        _ => name,
    }
}

/// One header per dataset: the first line, then every line following an
/// `End of Dataset` marker that is not the last line.
pub fn headers(text: &str, path: &Path) -> Result<Vec<DatasetHeader>> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return Err(VaspError::malformed(path, "file is empty"));
    }

    let mut header_lines = vec![lines[0]];
    for (i, line) in lines.iter().enumerate() {
        if line.contains(END_OF_DATASET) && i != lines.len() - 1 {
            header_lines.push(lines[i + 1]);
        }
    }

    header_lines
        .into_iter()
        .map(|line| {
            let mut tokens = line.split_whitespace();
            match (tokens.next(), tokens.next()) {
                (Some(kind), Some(name)) => Ok(DatasetHeader {
                    kind: kind.to_string(),
                    name: name.to_string(),
                }),
                _ => Err(VaspError::malformed(
                    path,
                    format!("bad dataset header '{}'", line.trim()),
                )),
            }
        })
        .collect()
}

pub fn read_headers(path: &Path) -> Result<Vec<DatasetHeader>> {
    headers(&read_text(path)?, path)
}

/// Element symbols of the datasets, in file order.
pub fn read_symbols(path: &Path) -> Result<Vec<String>> {
    Ok(read_headers(path)?
        .iter()
        .map(|h| h.element().to_string())
        .collect())
}

/// Recovers `pp` and `setups`.
///
/// `keys` are the group keys recorded next to the structure (one per
/// dataset). When they do not line up with the datasets (e.g. a POSCAR
/// written by another tool), index overrides cannot be recovered and every
/// dataset is treated as a default group.
pub fn read_params(path: &Path, keys: Option<&[GroupKey]>) -> Result<ParameterSet> {
    let headers = read_headers(path)?;

    let family = headers[0].family();
    if let Some(other) = headers.iter().find(|h| h.family() != family) {
        return Err(VaspError::malformed(
            path,
            format!("mixed families: {} and {}", family, other.family()),
        ));
    }

    let aligned = |k: &[GroupKey]| {
        k.len() == headers.len()
            && k.iter().zip(&headers).all(|(g, h)| match &g.key {
                SetupKey::Index(_) => true,
                SetupKey::Symbol(s) => s == h.element(),
            })
    };
    let keys: Vec<GroupKey> = match keys {
        Some(k) if aligned(k) => k.to_vec(),
        _ => headers
            .iter()
            .map(|h| GroupKey::new(SetupKey::Symbol(h.element().to_string()), false))
            .collect(),
    };

    let mut setups = Vec::new();
    for (group, header) in keys.into_iter().zip(&headers) {
        let element = header.element();
        let suffix = &header.name[element.len()..];
        match group.key {
            SetupKey::Index(i) => setups.push(Setup::index(i, suffix)),
            SetupKey::Symbol(_) if suffix.is_empty() && !group.from_setup => {}
            SetupKey::Symbol(s) => setups.push(Setup::symbol(s, suffix)),
        }
    }

    let mut params = ParameterSet::new();
    params.insert("pp".into(), Value::from(family));
    if !setups.is_empty() {
        params.insert("setups".into(), serde_json::to_value(setups)?);
    }
    Ok(params)
}

/// Concatenates the library datasets for every group.
pub fn write(path: &Path, pp_root: &Path, layout: &PotentialLayout) -> Result<()> {
    let mut out = String::new();
    for group in &layout.groups {
        let source = pp_root.join(&group.file_path);
        let text = read_text(&source)?;
        out.push_str(&text);
        if !text.ends_with('\n') {
            out.push('\n');
        }
    }
    write_text(path, &out)
}
