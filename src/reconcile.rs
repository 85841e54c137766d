// src/reconcile.rs
//
// =============================================================================
// VASPLAB: OUTPUT RECONCILER
// =============================================================================
//
// Recovers the parameter set a directory was written with and compares it
// against a request.
//
// Pipeline:
// 1. Merge raw sources: INCAR < POTCAR < KPOINTS (later wins).
// 2. Collapse xc: the most specific preset whose tags all match is named
//    under `xc`. Its tags stay in place, as they do in a normalized request.
// 3. Rebuild `ldau_luj` from the positional DFT+U arrays.
// 4. Diff against the request.

use crate::core::ParameterSet;
use crate::drivers::{EngineDriver, ParamSource};
use crate::error::{Result, VaspError};
use crate::layout::CalcDir;
use crate::presets::{self, PRESET_KEY};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub file_params: ParameterSet,
    pub differs: bool,
    /// Requested but absent on disk.
    pub new_keys: BTreeSet<String>,
    /// On disk but not requested.
    pub missing_keys: BTreeSet<String>,
}

/// Reads the directory back and diffs it against `requested`.
///
/// Every failure is wrapped in `VaspError::Reconcile`; callers decide
/// EMPTY before getting here.
pub fn reconcile(
    dir: &CalcDir,
    requested: &ParameterSet,
    driver: &dyn EngineDriver,
) -> Result<Reconciliation> {
    read_file_params(dir, driver)
        .map(|file_params| compare(requested, file_params))
        .map_err(|e| VaspError::reconcile(dir.path(), e))
}

/// Parameters recovered from disk, preset collapsed and DFT+U rebuilt.
pub fn read_file_params(dir: &CalcDir, driver: &dyn EngineDriver) -> Result<ParameterSet> {
    let mut params = merge_sources(dir, driver)?;
    collapse_preset(&mut params);

    if params.contains_key("ldauu") {
        let symbols = driver.potential_symbols(dir)?;
        rebuild_ldau_luj(&mut params, &symbols)?;
    }
    Ok(params)
}

pub fn merge_sources(dir: &CalcDir, driver: &dyn EngineDriver) -> Result<ParameterSet> {
    let mut merged = ParameterSet::new();
    for source in ParamSource::MERGE_ORDER {
        merged.extend(driver.read_raw_params(dir, source)?);
    }
    Ok(merged)
}

/// Names the first matching preset, most specific first. Returns its name.
pub fn collapse_preset(params: &mut ParameterSet) -> Option<&'static str> {
    let preset = presets::collapse_order()
        .into_iter()
        .find(|p| p.matches(params))?;
    params.insert(PRESET_KEY.into(), Value::from(preset.name));
    Some(preset.name)
}

/// Zips `ldaul`/`ldauu`/`ldauj` with the dataset symbols into
/// `ldau_luj = {symbol: {L, U, J}}`.
pub fn rebuild_ldau_luj(params: &mut ParameterSet, symbols: &[String]) -> Result<()> {
    let column = |key: &str| -> Result<Vec<Value>> {
        match params.get(key) {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(scalar @ (Value::Number(_) | Value::String(_))) => Ok(vec![scalar.clone()]),
            Some(other) => Err(VaspError::Configuration(format!(
                "{} is not a list: {}",
                key, other
            ))),
            None => Err(VaspError::Configuration(format!(
                "ldauu is set but {} is missing",
                key
            ))),
        }
    };
    let ls = column("ldaul")?;
    let us = column("ldauu")?;
    let js = column("ldauj")?;

    let n = symbols.len();
    if ls.len() != n || us.len() != n || js.len() != n {
        return Err(VaspError::Configuration(format!(
            "DFT+U arrays (L {}, U {}, J {}) do not match {} potential datasets",
            ls.len(),
            us.len(),
            js.len(),
            n
        )));
    }

    let mut luj = Map::new();
    for (((symbol, l), u), j) in symbols.iter().zip(ls).zip(us).zip(js) {
        luj.insert(symbol.clone(), json!({ "L": l, "U": u, "J": j }));
    }
    params.insert("ldau_luj".into(), Value::Object(luj));
    Ok(())
}

fn compare(requested: &ParameterSet, file_params: ParameterSet) -> Reconciliation {
    let differs = *requested != file_params;

    let requested_keys: BTreeSet<&String> = requested.keys().collect();
    let file_keys: BTreeSet<&String> = file_params.keys().collect();
    let new_keys: BTreeSet<String> = requested_keys
        .difference(&file_keys)
        .map(|k| (*k).clone())
        .collect();
    let missing_keys: BTreeSet<String> = file_keys
        .difference(&requested_keys)
        .map(|k| (*k).clone())
        .collect();

    if differs {
        log::debug!("New keys: {:?}", new_keys);
        log::debug!("Missing keys: {:?}", missing_keys);
        for (key, val) in requested {
            match file_params.get(key) {
                Some(on_disk) if on_disk != val => {
                    log::debug!("{}: requested {} but found {}", key, val, on_disk)
                }
                _ => {}
            }
        }
    }

    Reconciliation {
        file_params,
        differs,
        new_keys,
        missing_keys,
    }
}
