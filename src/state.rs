// src/state.rs
//
// =============================================================================
// VASPLAB: STATE MACHINE
// =============================================================================
//
// Classifies a calculation directory from filesystem evidence plus one
// queue-membership query. Nothing here is persisted.
//
// Priority (first match wins):
// 1. INCAR+POTCAR+KPOINTS, no POSCAR, an `00` image dir  -> NEB
// 2. any of INCAR/POSCAR/POTCAR/KPOINTS missing           -> EMPTY
// 3. inputs present, job id recorded, no OUTCAR           -> NEW
// 4. in the queue                                         -> QUEUED
// 5. OUTCAR last line carries the termination marker      -> FINISHED
// 6. OUTCAR without the marker, or no OUTCAR              -> NOT_FINISHED
// 7. zero-length CONTCAR                                  -> EMPTY_OUTPUT
// 8. anything else                                        -> UNKNOWN
//
// NEB must be tested before EMPTY: NEB layouts have no top-level POSCAR.
// Steps 7-8 are only reachable when OUTCAR exists but cannot be read.

use crate::config::NORMAL_TERMINATION;
use crate::core::LifecycleState;
use crate::error::Result;
use crate::io::tail_line;
use crate::layout::CalcDir;
use std::path::Path;

// ============================================================================
// 1. THE QUEUE ORACLE (The Port)
// ============================================================================

/// Queue membership and the stored job id of a directory.
pub trait QueueOracle {
    fn job_id(&self, dir: &CalcDir) -> Result<Option<String>>;
    fn in_queue(&self, dir: &CalcDir) -> Result<bool>;
}

// ============================================================================
// 2. CLASSIFICATION
// ============================================================================

pub fn classify(dir: &CalcDir, queue: &dyn QueueOracle) -> Result<LifecycleState> {
    classify_with_marker(dir, queue, NORMAL_TERMINATION)
}

pub fn classify_with_marker(
    dir: &CalcDir,
    queue: &dyn QueueOracle,
    marker: &str,
) -> Result<LifecycleState> {
    // 1. NEB
    if dir.incar().exists()
        && dir.potcar().exists()
        && dir.kpoints().exists()
        && !dir.poscar().exists()
        && dir.image(0).is_dir()
    {
        return Ok(LifecycleState::Neb);
    }

    // 2. Some input is missing
    if !dir.required_inputs().iter().all(|p| p.exists()) {
        return Ok(LifecycleState::Empty);
    }

    // 3. Submitted, nothing written yet
    let outcar = dir.outcar();
    if queue.job_id(dir)?.is_some() && !outcar.exists() {
        return Ok(LifecycleState::New);
    }

    // 4. Queued
    if queue.in_queue(dir)? {
        return Ok(LifecycleState::Queued);
    }

    // 5./6. Finished or not
    match output_status(&outcar, marker) {
        OutputStatus::Finished => return Ok(LifecycleState::Finished),
        OutputStatus::Incomplete | OutputStatus::Missing => {
            return Ok(LifecycleState::NotFinished)
        }
        OutputStatus::Unreadable => {}
    }

    // 7. Crashed before writing the structure
    if let Ok(meta) = std::fs::metadata(dir.contcar()) {
        if meta.is_file() && meta.len() == 0 {
            return Ok(LifecycleState::EmptyOutput);
        }
    }

    // 8.
    log::warn!("Could not classify {}", dir);
    Ok(LifecycleState::Unknown)
}

// ============================================================================
// 3. OUTPUT INSPECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    Missing,
    Finished,
    Incomplete,
    /// Present, but could not be read as a file.
    Unreadable,
}

pub fn output_status(path: &Path, marker: &str) -> OutputStatus {
    if !path.exists() {
        return OutputStatus::Missing;
    }
    match tail_line(path) {
        Ok(Some(last)) if last.contains(marker) => OutputStatus::Finished,
        Ok(_) => OutputStatus::Incomplete,
        Err(e) => {
            log::debug!("Cannot read {:?}: {}", path, e);
            OutputStatus::Unreadable
        }
    }
}

/// True when the primary output ends with the termination marker.
pub fn is_finished(dir: &CalcDir, marker: &str) -> bool {
    output_status(&dir.outcar(), marker) == OutputStatus::Finished
}
