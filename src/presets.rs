// src/presets.rs
//
// =============================================================================
// VASPLAB: PRESETS & REQUEST NORMALIZATION
// =============================================================================
//
// Named xc shorthands, default parameters, and the normal form of a
// requested parameter set. The normal form is what gets compared against
// parameters recovered from disk, so everything the writers emit and the
// readers recover must already be spelled out here.

use crate::core::{ParameterSet, Setup};
use crate::error::{Result, VaspError};
use crate::potentials::PotentialLayout;
use serde_json::{json, Map, Value};

/// Key under which the collapsed preset name is stored.
pub const PRESET_KEY: &str = "xc";

/// Keys that drive file layout rather than INCAR lines.
pub const SPECIAL_KEYS: &[&str] = &[
    "xc",
    "pp",
    "setups",
    "kpts",
    "gamma",
    "kpts_nintersections",
    "reciprocal",
    "ldau_luj",
];

pub fn is_special(key: &str) -> bool {
    SPECIAL_KEYS.contains(&key)
}

// ============================================================================
// 1. PRESET TABLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TagValue {
    Str(&'static str),
    Bool(bool),
    Float(f64),
}

impl TagValue {
    pub fn to_value(self) -> Value {
        match self {
            TagValue::Str(s) => Value::from(s),
            TagValue::Bool(b) => Value::from(b),
            TagValue::Float(f) => Value::from(f),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub name: &'static str,
    pub tags: &'static [(&'static str, TagValue)],
}

use TagValue::{Bool, Float, Str};

pub const PRESETS: &[Preset] = &[
    Preset { name: "lda", tags: &[("pp", Str("LDA"))] },
    // GGAs
    Preset { name: "pbe", tags: &[("pp", Str("PBE"))] },
    Preset { name: "revpbe", tags: &[("pp", Str("LDA")), ("gga", Str("RE"))] },
    Preset { name: "rpbe", tags: &[("pp", Str("LDA")), ("gga", Str("RP"))] },
    Preset { name: "am05", tags: &[("pp", Str("LDA")), ("gga", Str("AM"))] },
    Preset { name: "pbesol", tags: &[("pp", Str("LDA")), ("gga", Str("PS"))] },
    // Meta-GGAs
    Preset { name: "tpss", tags: &[("pp", Str("PBE")), ("metagga", Str("TPSS"))] },
    Preset { name: "revtpss", tags: &[("pp", Str("PBE")), ("metagga", Str("RTPSS"))] },
    Preset { name: "m06l", tags: &[("pp", Str("PBE")), ("metagga", Str("M06L"))] },
    // vdW-DFs
    Preset {
        name: "optpbe-vdw",
        tags: &[("pp", Str("LDA")), ("gga", Str("OR")), ("luse_vdw", Bool(true)), ("aggac", Float(0.0))],
    },
    Preset {
        name: "optb88-vdw",
        tags: &[
            ("pp", Str("LDA")),
            ("gga", Str("BO")),
            ("luse_vdw", Bool(true)),
            ("aggac", Float(0.0)),
            ("param1", Float(1.1 / 6.0)),
            ("param2", Float(0.22)),
        ],
    },
    Preset {
        name: "optb86b-vdw",
        tags: &[
            ("pp", Str("LDA")),
            ("gga", Str("MK")),
            ("luse_vdw", Bool(true)),
            ("aggac", Float(0.0)),
            ("param1", Float(0.1234)),
            ("param2", Float(1.0)),
        ],
    },
    Preset {
        name: "vdw-df2",
        tags: &[
            ("pp", Str("LDA")),
            ("gga", Str("ML")),
            ("luse_vdw", Bool(true)),
            ("aggac", Float(0.0)),
            ("zab_vdw", Float(-1.8867)),
        ],
    },
    Preset {
        name: "beef-vdw",
        tags: &[
            ("pp", Str("PBE")),
            ("gga", Str("BF")),
            ("luse_vdw", Bool(true)),
            ("zab_vdw", Float(-1.8867)),
            ("lbeefens", Bool(true)),
        ],
    },
    // Hybrids
    Preset { name: "pbe0", tags: &[("pp", Str("LDA")), ("gga", Str("PE")), ("lhfcalc", Bool(true))] },
    Preset {
        name: "hse03",
        tags: &[("pp", Str("LDA")), ("gga", Str("PE")), ("lhfcalc", Bool(true)), ("hfscreen", Float(0.3))],
    },
    Preset {
        name: "hse06",
        tags: &[("pp", Str("LDA")), ("gga", Str("PE")), ("lhfcalc", Bool(true)), ("hfscreen", Float(0.2))],
    },
    Preset {
        name: "b3lyp",
        tags: &[
            ("pp", Str("LDA")),
            ("gga", Str("B3")),
            ("lhfcalc", Bool(true)),
            ("aexx", Float(0.2)),
            ("aggax", Float(0.72)),
            ("aggac", Float(0.81)),
            ("aldac", Float(0.19)),
        ],
    },
    Preset {
        name: "hf",
        tags: &[
            ("pp", Str("PBE")),
            ("lhfcalc", Bool(true)),
            ("aexx", Float(1.0)),
            ("aldac", Float(0.0)),
            ("aggac", Float(0.0)),
        ],
    },
];

pub fn find(name: &str) -> Option<&'static Preset> {
    let name = name.to_ascii_lowercase();
    PRESETS.iter().find(|p| p.name == name)
}

/// Most specific first. Ties keep table order.
pub fn collapse_order() -> Vec<&'static Preset> {
    let mut order: Vec<&'static Preset> = PRESETS.iter().collect();
    order.sort_by(|a, b| b.tags.len().cmp(&a.tags.len()));
    order
}

impl Preset {
    /// True when `params` restricted to this preset's keys equals its tags.
    pub fn matches(&self, params: &ParameterSet) -> bool {
        self.tags
            .iter()
            .all(|(key, val)| params.get(*key) == Some(&val.to_value()))
    }
}

// ============================================================================
// 2. DEFAULTS & NORMALIZATION
// ============================================================================

pub fn default_parameters() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.insert("xc".into(), json!("pbe"));
    p.insert("pp".into(), json!("PBE"));
    p.insert("ismear".into(), json!(1));
    p.insert("sigma".into(), json!(0.1));
    p.insert("lwave".into(), json!(false));
    p.insert("lcharg".into(), json!(false));
    p.insert("kpts".into(), json!([1, 1, 1]));
    p
}

/// Builds the normal form of a request.
///
/// - keys lower-cased, defaults filled in
/// - `xc` lower-cased and expanded; preset tags override defaults but not
///   keys the caller set explicitly
/// - setups: index overrides first, then symbol overrides, each in caller
///   order; dropped when empty
/// - kpoint flags that the KPOINTS writer cannot express are dropped, and
///   `reciprocal` is made explicit for explicit/line-mode kpoints
pub fn normalize(user: &ParameterSet) -> Result<ParameterSet> {
    let user: ParameterSet = user
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .collect();

    let mut params = default_parameters();

    let xc = match user.get("xc") {
        Some(Value::String(s)) => s.to_ascii_lowercase(),
        Some(other) => {
            return Err(VaspError::Configuration(format!(
                "xc must be a string, got {}",
                other
            )))
        }
        None => "pbe".to_string(),
    };
    let preset = find(&xc)
        .ok_or_else(|| VaspError::Configuration(format!("unknown xc '{}'", xc)))?;
    for (key, val) in preset.tags {
        params.insert((*key).to_string(), val.to_value());
    }

    for (key, val) in user {
        if key != "xc" {
            params.insert(key, val);
        }
    }
    params.insert(PRESET_KEY.into(), Value::from(xc));

    let setups = setups_of(&params)?;
    if setups.is_empty() {
        params.remove("setups");
    } else {
        params.insert("setups".into(), serde_json::to_value(order_setups(setups))?);
    }

    normalize_kpoints(&mut params)?;
    Ok(params)
}

/// Index setups first, then symbol setups; stable within each kind.
pub fn order_setups(setups: Vec<Setup>) -> Vec<Setup> {
    let (mut index, symbol): (Vec<Setup>, Vec<Setup>) =
        setups.into_iter().partition(|s| s.key.is_index());
    index.extend(symbol);
    index
}

pub fn setups_of(params: &ParameterSet) -> Result<Vec<Setup>> {
    match params.get("setups") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
            VaspError::Configuration(format!("setups must be [[index|symbol, suffix], ...]: {}", e))
        }),
    }
}

pub fn pp_of(params: &ParameterSet) -> Result<&str> {
    params
        .get("pp")
        .and_then(Value::as_str)
        .ok_or_else(|| VaspError::Configuration("pp must be a string".into()))
}

fn normalize_kpoints(params: &mut ParameterSet) -> Result<()> {
    let kpts = params
        .get("kpts")
        .ok_or_else(|| VaspError::Configuration("kpts is required".into()))?;
    let rows = kpts
        .as_array()
        .ok_or_else(|| VaspError::Configuration(format!("kpts must be a list, got {}", kpts)))?;

    let explicit = rows.iter().any(Value::is_array);
    if explicit {
        params.remove("gamma");
        let reciprocal = match params.get("reciprocal") {
            None => true,
            Some(v) => v.as_bool().ok_or_else(|| {
                VaspError::Configuration("reciprocal must be a boolean".into())
            })?,
        };
        params.insert("reciprocal".into(), Value::from(reciprocal));
    } else {
        if rows.len() != 3 {
            return Err(VaspError::Configuration(format!(
                "an automatic kpoint mesh needs 3 divisions, got {}",
                rows.len()
            )));
        }
        params.remove("reciprocal");
        params.remove("kpts_nintersections");
        if params.get("gamma") == Some(&Value::Bool(false)) {
            params.remove("gamma");
        }
    }
    Ok(())
}

// ============================================================================
// 3. DFT+U
// ============================================================================

/// Expands `ldau_luj` into `ldau`, `ldaul`, `ldauu`, `ldauj`, one entry per
/// POTCAR group. Symbols without an entry get L=-1, U=0, J=0, and the
/// completed map is written back so it compares equal to what the
/// reconciler rebuilds from disk.
pub fn expand_ldau_luj(params: &mut ParameterSet, layout: &PotentialLayout) -> Result<()> {
    let Some(luj) = params.get("ldau_luj").cloned() else {
        return Ok(());
    };
    let luj = luj
        .as_object()
        .ok_or_else(|| VaspError::Configuration("ldau_luj must map symbol -> {L, U, J}".into()))?;

    let mut full = Map::new();
    let (mut ls, mut us, mut js) = (Vec::new(), Vec::new(), Vec::new());

    for (symbol, _) in &layout.symbol_counts {
        let (l, u, j) = match luj.get(symbol) {
            Some(entry) => parse_luj(symbol, entry)?,
            None => (-1, 0.0, 0.0),
        };
        ls.push(Value::from(l));
        us.push(Value::from(u));
        js.push(Value::from(j));
        full.insert(symbol.clone(), json!({ "L": l, "U": u, "J": j }));
    }

    for symbol in luj.keys() {
        if !full.contains_key(symbol) {
            log::warn!("ldau_luj entry for {} matches no atom; ignored", symbol);
        }
    }

    params.insert("ldau_luj".into(), Value::Object(full));
    params.insert("ldau".into(), Value::from(true));
    params.insert("ldaul".into(), Value::Array(ls));
    params.insert("ldauu".into(), Value::Array(us));
    params.insert("ldauj".into(), Value::Array(js));
    Ok(())
}

fn parse_luj(symbol: &str, entry: &Value) -> Result<(i64, f64, f64)> {
    let bad = || VaspError::Configuration(format!("ldau_luj[{}] needs numeric L, U, J", symbol));
    let l = entry.get("L").and_then(Value::as_i64).ok_or_else(bad)?;
    let u = entry.get("U").and_then(Value::as_f64).ok_or_else(bad)?;
    let j = entry.get("J").and_then(Value::as_f64).ok_or_else(bad)?;
    Ok((l, u, j))
}

// ============================================================================
// 4. SHAPE VALIDATION
// ============================================================================

/// Structural checks only: every INCAR tag must be writable as a scalar or
/// a flat list. Physics-level validation is out of scope.
pub fn validate(params: &ParameterSet) -> Result<()> {
    for (key, val) in params {
        if is_special(key) {
            continue;
        }
        let flat = match val {
            Value::Object(_) | Value::Null => false,
            Value::Array(items) => items
                .iter()
                .all(|v| !matches!(v, Value::Array(_) | Value::Object(_) | Value::Null)),
            _ => true,
        };
        if !flat {
            return Err(VaspError::Configuration(format!(
                "{} = {} cannot be written to INCAR",
                key, val
            )));
        }
        if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(VaspError::Configuration(format!("invalid tag name '{}'", key)));
        }
    }
    Ok(())
}
