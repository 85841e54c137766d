// src/io/incar.rs
//
// =============================================================================
// VASPLAB: INCAR FORMAT
// =============================================================================
//
// INCAR: `TAG = value` lines.

use super::{format_scalar, parse_literal, parse_scalar, read_text, write_text};
use crate::core::ParameterSet;
use crate::error::{Result, VaspError};
use crate::presets::is_special;
use serde_json::Value;
use std::path::Path;

/// Tags that hold one entry per species/atom and stay lists even with one entry.
const ARRAY_TAGS: &[&str] = &["ldaul", "ldauu", "ldauj", "magmom", "rwigs"];

pub fn render(params: &ParameterSet) -> Result<String> {
    let mut out = String::new();
    for (key, value) in params {
        if is_special(key) {
            continue;
        }
        let rendered = match value {
            Value::Array(items) => items
                .iter()
                .map(|v| format_scalar(v).ok_or_else(|| unwritable(key, value)))
                .collect::<Result<Vec<_>>>()?
                .join(" "),
            other => format_scalar(other).ok_or_else(|| unwritable(key, value))?,
        };
        out.push_str(&format!("{} = {}\n", key.to_ascii_uppercase(), rendered));
    }
    Ok(out)
}

fn unwritable(key: &str, value: &Value) -> VaspError {
    VaspError::Configuration(format!("{} = {} cannot be written to INCAR", key, value))
}

pub fn write(path: &Path, params: &ParameterSet) -> Result<()> {
    write_text(path, &render(params)?)
}

pub fn read(path: &Path) -> Result<ParameterSet> {
    parse(&read_text(path)?, path)
}

pub fn parse(text: &str, path: &Path) -> Result<ParameterSet> {
    let mut params = ParameterSet::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.split(['!', '#']).next().unwrap_or("");
        for statement in line.split(';') {
            if statement.trim().is_empty() {
                continue;
            }
            let Some((tag, value)) = statement.split_once('=') else {
                return Err(VaspError::malformed(
                    path,
                    format!("line {}: expected TAG = value, got '{}'", lineno + 1, raw.trim()),
                ));
            };
            let tag = tag.trim().to_ascii_lowercase();
            if tag.is_empty() {
                return Err(VaspError::malformed(
                    path,
                    format!("line {}: missing tag name", lineno + 1),
                ));
            }
            let value = parse_value(&tag, value.trim());
            params.insert(tag, value);
        }
    }

    Ok(params)
}

/// Scalars stay scalars, all-literal token runs become lists, anything
/// else is kept as one string (e.g. `SYSTEM = bulk Cu`).
pub fn parse_value(tag: &str, raw: &str) -> Value {
    let tokens = expand_repeats(raw);
    let force_array = ARRAY_TAGS.contains(&tag);

    if tokens.len() == 1 && !force_array {
        return parse_scalar(&tokens[0]);
    }

    let literals: Option<Vec<Value>> = tokens.iter().map(|t| parse_literal(t)).collect();
    match literals {
        Some(values) => Value::Array(values),
        None if force_array => Value::Array(tokens.iter().map(|t| parse_scalar(t)).collect()),
        None => Value::from(raw),
    }
}

/// `3*1.0 2*0.0` -> `1.0 1.0 1.0 0.0 0.0`
fn expand_repeats(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    for token in raw.split_whitespace() {
        match token.split_once('*') {
            Some((n, v)) if !v.is_empty() => match n.parse::<usize>() {
                Ok(n) => out.extend(std::iter::repeat(v.to_string()).take(n)),
                Err(_) => out.push(token.to_string()),
            },
            _ => out.push(token.to_string()),
        }
    }
    out
}
