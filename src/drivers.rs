// src/drivers.rs
//
// =============================================================================
// VASPLAB: DRIVER MODULE & INTERFACE
// =============================================================================
//
// The Hexagonal Port.
//
// Responsibilities:
// 1. Define the `EngineDriver` trait: everything the core needs from the
//    file formats and the engine binary, and nothing else.
// 2. Provide the standardized command runner used by concrete drivers.

use crate::core::{CalculationResult, ParameterSet, Structure};
use crate::error::Result;
use crate::layout::CalcDir;
use crate::potentials::PotentialLayout;

pub mod vasp;

// ============================================================================
// 1. THE DRIVER TRAIT (The Contract)
// ============================================================================

/// Raw parameter sources, merged in this order (later wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    MainControl,
    PotentialMetadata,
    Kpoints,
}

impl ParamSource {
    pub const MERGE_ORDER: [ParamSource; 3] = [
        ParamSource::MainControl,
        ParamSource::PotentialMetadata,
        ParamSource::Kpoints,
    ];
}

pub trait EngineDriver {
    /// Engine name used in error messages.
    fn name(&self) -> &str;

    fn read_raw_params(&self, dir: &CalcDir, source: ParamSource) -> Result<ParameterSet>;

    /// Chemical symbol of every potential dataset, in file order.
    fn potential_symbols(&self, dir: &CalcDir) -> Result<Vec<String>>;

    fn write_inputs(
        &self,
        dir: &CalcDir,
        structure: &Structure,
        params: &ParameterSet,
        layout: &PotentialLayout,
    ) -> Result<()>;

    /// Runs the engine with `dir` as its working directory.
    /// Returns the exit code; interpreting it is the caller's job.
    fn spawn_engine(&self, dir: &CalcDir) -> Result<i32>;

    /// Results in the caller's original atom order.
    fn read_results(&self, dir: &CalcDir, layout: &PotentialLayout) -> Result<CalculationResult>;
}

// ============================================================================
// 2. HELPER: STANDARDIZED COMMAND EXECUTION
// ============================================================================

pub mod utils {
    use crate::error::{Result, VaspError};
    use std::path::Path;
    use std::process::{Command, Stdio};

    /// Runs `sh -c <command>` inside `dir`.
    ///
    /// stdout is captured (engines are chatty; it is only logged at debug
    /// level), stderr goes straight to the terminal. The parent's working
    /// directory is never touched.
    pub fn run_in_dir(command: &str, dir: &Path) -> Result<i32> {
        log::info!("Running '{}' in {:?}", command, dir);

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| VaspError::io(dir, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            log::debug!(
                "stdout tail:\n{}",
                stdout.lines().rev().take(10).collect::<Vec<_>>().into_iter().rev().collect::<Vec<_>>().join("\n")
            );
        }

        // Killed by a signal: no exit code.
        Ok(output.status.code().unwrap_or(-1))
    }
}
