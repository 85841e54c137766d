// src/io/kpoints.rs
//
// =============================================================================
// VASPLAB: KPOINTS FORMAT
// =============================================================================
//
// KPOINTS in three modes:
// - automatic mesh:  kpts = [k1, k2, k3], gamma = true for Gamma-centred
// - explicit list:   kpts = [[x, y, z, w], ...], reciprocal
// - line mode:       kpts = [[x, y, z], ...] pairs, kpts_nintersections, reciprocal

use super::{format_scalar, parse_scalar, read_text, write_text};
use crate::core::ParameterSet;
use crate::error::{Result, VaspError};
use serde_json::Value;
use std::path::Path;

pub fn render(params: &ParameterSet) -> Result<String> {
    let kpts = params
        .get("kpts")
        .and_then(Value::as_array)
        .ok_or_else(|| VaspError::Configuration("kpts must be a list".into()))?;
    let reciprocal = params
        .get("reciprocal")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let coords = if reciprocal { "Reciprocal" } else { "Cartesian" };

    let explicit = kpts.iter().any(Value::is_array);
    let mut out = String::new();

    if !explicit {
        let gamma = params.get("gamma").and_then(Value::as_bool).unwrap_or(false);
        out.push_str("Automatic mesh\n0\n");
        out.push_str(if gamma { "Gamma\n" } else { "Monkhorst-Pack\n" });
        out.push_str(&row(kpts)?);
        out.push_str("0 0 0\n");
    } else if let Some(n) = params.get("kpts_nintersections") {
        let n = format_scalar(n).ok_or_else(|| {
            VaspError::Configuration("kpts_nintersections must be a number".into())
        })?;
        out.push_str(&format!("Line-mode KPOINTS\n{}\nLine-mode\n{}\n", n, coords));
        for k in kpts {
            out.push_str(&row(k.as_array().ok_or_else(mixed)?)?);
        }
    } else {
        out.push_str(&format!("Explicit kpoints\n{}\n{}\n", kpts.len(), coords));
        for k in kpts {
            out.push_str(&row(k.as_array().ok_or_else(mixed)?)?);
        }
    }
    Ok(out)
}

fn mixed() -> VaspError {
    VaspError::Configuration("kpts mixes numbers and kpoint rows".into())
}

fn row(values: &[Value]) -> Result<String> {
    let cells = values
        .iter()
        .map(|v| {
            v.is_number()
                .then(|| format_scalar(v))
                .flatten()
                .ok_or_else(|| VaspError::Configuration(format!("kpoint entry {} is not a number", v)))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("{}\n", cells.join(" ")))
}

pub fn write(path: &Path, params: &ParameterSet) -> Result<()> {
    write_text(path, &render(params)?)
}

pub fn read(path: &Path) -> Result<ParameterSet> {
    parse(&read_text(path)?, path)
}

pub fn parse(text: &str, path: &Path) -> Result<ParameterSet> {
    let lines: Vec<&str> = text.lines().collect();
    let bad = |detail: &str| VaspError::malformed(path, detail.to_string());

    if lines.len() < 4 {
        return Err(bad("expected at least 4 lines"));
    }

    let count_token = lines[1].split_whitespace().next().ok_or_else(|| bad("missing kpoint count"))?;
    let count = parse_scalar(count_token);
    let mode = lines[2].trim();
    let first = mode.chars().next().map(|c| c.to_ascii_lowercase());

    let mut params = ParameterSet::new();

    if count == Value::from(0) {
        // Automatic: third line is the centring, fourth the divisions.
        let divisions = numbers(lines[3], path)?;
        if divisions.len() < 3 {
            return Err(bad("automatic mesh needs three divisions"));
        }
        params.insert("kpts".into(), Value::Array(divisions[..3].to_vec()));
        if first == Some('g') {
            params.insert("gamma".into(), Value::from(true));
        }
        return Ok(params);
    }

    let line_mode = first == Some('l');
    let (coord_line, start) = if line_mode { (lines[3], 4) } else { (mode, 3) };
    let reciprocal = !matches!(
        coord_line.trim().chars().next().map(|c| c.to_ascii_lowercase()),
        Some('c') | Some('k')
    );

    let rows: Vec<Value> = lines[start..]
        .iter()
        .filter(|l| !l.split('!').next().unwrap_or("").trim().is_empty())
        .map(|l| numbers(l, path).map(Value::Array))
        .collect::<Result<_>>()?;

    if !line_mode {
        let n = count.as_u64().ok_or_else(|| bad("kpoint count must be a positive integer"))?;
        if rows.len() as u64 != n {
            return Err(bad(&format!("header announces {} kpoints, found {}", n, rows.len())));
        }
    } else {
        params.insert("kpts_nintersections".into(), count);
    }

    params.insert("kpts".into(), Value::Array(rows));
    params.insert("reciprocal".into(), Value::from(reciprocal));
    Ok(params)
}

/// Numbers on a line; `! label` comments are dropped.
fn numbers(line: &str, path: &Path) -> Result<Vec<Value>> {
    let line = line.split('!').next().unwrap_or("");
    line.split_whitespace()
        .map(|t| {
            let v = parse_scalar(t);
            if v.is_number() {
                Ok(v)
            } else {
                Err(VaspError::malformed(path, format!("expected a number, got '{}'", t)))
            }
        })
        .collect()
}
