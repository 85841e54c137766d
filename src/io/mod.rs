// src/io/mod.rs
//
// =============================================================================
// VASPLAB: RAW FILE FORMATS
// =============================================================================
//
// Plain-text readers and writers for the VASP input/output files.
// Values travel as `serde_json::Value`, so the formatting here decides
// whether a parameter survives a write/read cycle unchanged:
// - floats always carry a decimal point or exponent (`1.0`, not `1`)
// - floats use the shortest representation that parses back exactly

pub mod incar;
pub mod kpoints;
pub mod outcar;
pub mod poscar;
pub mod potcar;

use crate::error::{Result, VaspError};
use serde_json::Value;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Largest chunk read from the end of a file when looking for its last line.
const TAIL_CHUNK: u64 = 16 * 1024;

pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| VaspError::io(path, e))
}

pub fn write_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).map_err(|e| VaspError::io(path, e))
}

/// Last line of a file, without reading the whole file.
/// `Ok(None)` for an empty file.
pub fn tail_line(path: &Path) -> std::io::Result<Option<String>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(TAIL_CHUNK);
    file.seek(SeekFrom::Start(start))?;

    let mut buf = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buf)?;
    let text = String::from_utf8_lossy(&buf);

    Ok(text.lines().last().map(str::to_string))
}

// -----------------------------------------------------------------------------
// Scalars
// -----------------------------------------------------------------------------

pub fn format_float(f: f64) -> String {
    // Debug keeps the decimal point and round-trips exactly.
    format!("{:?}", f)
}

pub fn format_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Bool(true) => Some(".TRUE.".into()),
        Value::Bool(false) => Some(".FALSE.".into()),
        Value::Number(n) => Some(match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(u)) => u.to_string(),
            _ => format_float(n.as_f64().unwrap_or_default()),
        }),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// `.TRUE.` / `T` / `TRUE` style booleans.
pub fn parse_bool(token: &str) -> Option<bool> {
    match token.trim_matches('.').to_ascii_uppercase().as_str() {
        "TRUE" | "T" => Some(true),
        "FALSE" | "F" => Some(false),
        _ => None,
    }
}

/// Number or boolean. `None` for anything that is only a string.
pub fn parse_literal(token: &str) -> Option<Value> {
    if let Ok(i) = token.parse::<i64>() {
        return Some(Value::from(i));
    }
    if let Ok(f) = token.parse::<f64>() {
        if f.is_finite() {
            return Some(Value::from(f));
        }
    }
    // Fortran double precision exponent.
    if token.contains(['d', 'D']) {
        if let Ok(f) = token.replace(['d', 'D'], "e").parse::<f64>() {
            if f.is_finite() {
                return Some(Value::from(f));
            }
        }
    }
    parse_bool(token).map(Value::from)
}

pub fn parse_scalar(token: &str) -> Value {
    parse_literal(token).unwrap_or_else(|| Value::from(token))
}

pub fn parse_f64(token: &str, file: &Path) -> Result<f64> {
    token
        .parse::<f64>()
        .map_err(|_| VaspError::malformed(file, format!("expected a number, got '{}'", token)))
}
