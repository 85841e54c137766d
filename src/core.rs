// src/core.rs
//
// =============================================================================
// VASPLAB: CORE SCHEMA
// =============================================================================
//
// The data contracts shared by the resolver, the state machine, the
// reconciler and the run controller.
//
// Design Principles:
// 1. Structures are immutable inputs. Sorting only derives an index permutation.
// 2. Ordered containers everywhere order reaches a file (Vec / BTreeMap).
// 3. Lifecycle state is derived, never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// 1. STRUCTURE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Atom {
    pub symbol: String,
    pub position: [f64; 3], // Cartesian, Angstroms
    #[serde(default)]
    pub magnetic_moment: Option<f64>,
}

impl Atom {
    pub fn new(symbol: impl Into<String>, position: [f64; 3]) -> Self {
        Self {
            symbol: symbol.into(),
            position,
            magnetic_moment: None,
        }
    }
}

/// An ordered collection of atoms in a periodic cell.
/// Atoms keep the caller's order; file order is a separate permutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Structure {
    pub atoms: Vec<Atom>,
    pub cell: [[f64; 3]; 3], // Row vectors a, b, c

    #[serde(default)]
    pub source: String,
}

impl Structure {
    pub fn new(atoms: Vec<Atom>, cell: [[f64; 3]; 3]) -> Self {
        Self {
            atoms,
            cell,
            source: String::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.atoms.iter().map(|a| a.symbol.as_str()).collect()
    }
}

// ============================================================================
// 2. SETUP OVERRIDES (Pseudopotential choices)
// ============================================================================

/// What a setup override applies to: one atom, or every atom of a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SetupKey {
    Index(usize),
    Symbol(String),
}

impl SetupKey {
    pub fn is_index(&self) -> bool {
        matches!(self, SetupKey::Index(_))
    }
}

impl fmt::Display for SetupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupKey::Index(i) => write!(f, "{}", i),
            SetupKey::Symbol(s) => write!(f, "{}", s),
        }
    }
}

impl FromStr for SetupKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<usize>() {
            Ok(i) => SetupKey::Index(i),
            Err(_) => SetupKey::Symbol(s.to_string()),
        })
    }
}

/// A POTCAR group as recorded next to the structure: its key, and whether
/// a caller setup produced it. Symbol groups written as `Fe*` came from a
/// setup; bare `Fe` is a default group. Index groups always come from one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKey {
    pub key: SetupKey,
    pub from_setup: bool,
}

impl GroupKey {
    pub const SETUP_MARK: char = '*';

    pub fn new(key: SetupKey, from_setup: bool) -> Self {
        let from_setup = from_setup || key.is_index();
        Self { key, from_setup }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            SetupKey::Symbol(s) if self.from_setup => write!(f, "{}{}", s, Self::SETUP_MARK),
            key => write!(f, "{}", key),
        }
    }
}

impl FromStr for GroupKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (token, marked) = match s.strip_suffix(Self::SETUP_MARK) {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let key = token.parse::<SetupKey>()?;
        Ok(Self::new(key, marked))
    }
}

/// `(key, suffix)`, e.g. `(2, "_sv")` or `("Zr", "_sv")`.
/// Serialized as a two element array so it sits naturally inside a parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(SetupKey, String)", into = "(SetupKey, String)")]
pub struct Setup {
    pub key: SetupKey,
    pub suffix: String,
}

impl Setup {
    pub fn index(index: usize, suffix: impl Into<String>) -> Self {
        Self {
            key: SetupKey::Index(index),
            suffix: suffix.into(),
        }
    }

    pub fn symbol(symbol: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            key: SetupKey::Symbol(symbol.into()),
            suffix: suffix.into(),
        }
    }
}

impl From<(SetupKey, String)> for Setup {
    fn from((key, suffix): (SetupKey, String)) -> Self {
        Self { key, suffix }
    }
}

impl From<Setup> for (SetupKey, String) {
    fn from(s: Setup) -> Self {
        (s.key, s.suffix)
    }
}

// ============================================================================
// 3. PARAMETERS
// ============================================================================

/// Tag name (lower case) -> value.
/// INCAR tags, plus the special keys (`xc`, `pp`, `setups`, `kpts`, ...).
pub type ParameterSet = BTreeMap<String, Value>;

// ============================================================================
// 4. LIFECYCLE STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Empty,
    New,
    Queued,
    Finished,
    NotFinished,
    EmptyOutput,
    Neb,
    Unknown,
}

impl LifecycleState {
    /// Stable numeric code, for shell scripts.
    pub fn code(self) -> u8 {
        match self {
            LifecycleState::Empty => 0,
            LifecycleState::New => 1,
            LifecycleState::Queued => 2,
            LifecycleState::Finished => 3,
            LifecycleState::NotFinished => 4,
            LifecycleState::EmptyOutput => 5,
            LifecycleState::Neb => 10,
            LifecycleState::Unknown => 100,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Empty => "EMPTY",
            LifecycleState::New => "NEW",
            LifecycleState::Queued => "QUEUED",
            LifecycleState::Finished => "FINISHED",
            LifecycleState::NotFinished => "NOT_FINISHED",
            LifecycleState::EmptyOutput => "EMPTY_OUTPUT",
            LifecycleState::Neb => "NEB",
            LifecycleState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

// ============================================================================
// 5. RESULTS & PROVENANCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    Energy,
    FreeEnergy,
    Forces,
    Stress,
    Magmom,
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Property::Energy => "energy",
            Property::FreeEnergy => "free_energy",
            Property::Forces => "forces",
            Property::Stress => "stress",
            Property::Magmom => "magmom",
        };
        f.write_str(s)
    }
}

impl FromStr for Property {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "energy" => Ok(Property::Energy),
            "free_energy" => Ok(Property::FreeEnergy),
            "forces" => Ok(Property::Forces),
            "stress" => Ok(Property::Stress),
            "magmom" => Ok(Property::Magmom),
            other => Err(format!("unknown property '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub execution_host: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub command: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalculationResult {
    /// energy(sigma->0), eV
    pub energy: Option<f64>,
    /// TOTEN, eV
    pub free_energy: Option<f64>,
    /// eV/Å, in the caller's original atom order.
    pub forces: Option<Vec<[f64; 3]>>,
    /// kB, VASP order: xx yy zz xy yz zx
    pub stress: Option<[f64; 6]>,
    pub magmom: Option<f64>,

    /// Present only when the results were produced by a run in this process.
    #[serde(default)]
    pub provenance: Option<Provenance>,
}

impl CalculationResult {
    pub fn has(&self, property: Property) -> bool {
        match property {
            Property::Energy => self.energy.is_some(),
            Property::FreeEnergy => self.free_energy.is_some(),
            Property::Forces => self.forces.is_some(),
            Property::Stress => self.stress.is_some(),
            Property::Magmom => self.magmom.is_some(),
        }
    }
}
