// src/lib.rs
//
// =============================================================================
// VASPLAB: LIBRARY ROOT
// =============================================================================
//
// This file declares the module tree and exports public types.

// 1. Declare Modules
pub mod calculator;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod io;
pub mod layout;
pub mod potentials;
pub mod presets;
pub mod queue;
pub mod reconcile;
pub mod state;

// 2. Re-exports (The Public API)

pub use calculator::Calculation;
pub use config::VaspConfig;
pub use core::{
    Atom, CalculationResult, LifecycleState, ParameterSet, Property, Setup, SetupKey, Structure,
};
pub use error::{Result, VaspError};
pub use layout::CalcDir;
pub use potentials::{resolve, PotentialLayout};
pub use reconcile::{reconcile, Reconciliation};
pub use state::{classify, QueueOracle};
