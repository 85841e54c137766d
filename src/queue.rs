// src/queue.rs
//
// =============================================================================
// VASPLAB: QUEUE ORACLES
// =============================================================================
//
// Implementations of `QueueOracle`.
//
// - `LocalQueue`:     job ids from the directory's store, never queued.
// - `SchedulerQueue`: PBS/Torque style membership check.
//     1. No recorded job id          -> not queued.
//     2. Id absent from `qselect`    -> not queued.
//     3. `qstat <id>` exits 0 and the status column (line 3, field 5)
//        is anything but `C`         -> queued.

use crate::checkpoint::JobStore;
use crate::config::QueueConfig;
use crate::error::{Result, VaspError};
use crate::layout::CalcDir;
use crate::state::QueueOracle;
use std::process::{Command, Output};

/// Status letter PBS reports for completed jobs.
const COMPLETED: &str = "C";

#[derive(Debug, Clone, Default)]
pub struct LocalQueue;

impl QueueOracle for LocalQueue {
    fn job_id(&self, dir: &CalcDir) -> Result<Option<String>> {
        JobStore::lookup_job_id(dir.path())
    }

    fn in_queue(&self, _dir: &CalcDir) -> Result<bool> {
        Ok(false)
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerQueue {
    cfg: QueueConfig,
}

impl SchedulerQueue {
    pub fn new(cfg: QueueConfig) -> Self {
        Self { cfg }
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        Command::new(program)
            .args(args)
            .output()
            .map_err(|e| VaspError::Queue(format!("failed to run '{}': {}", program, e)))
    }
}

impl QueueOracle for SchedulerQueue {
    fn job_id(&self, dir: &CalcDir) -> Result<Option<String>> {
        JobStore::lookup_job_id(dir.path())
    }

    fn in_queue(&self, dir: &CalcDir) -> Result<bool> {
        let Some(job_id) = self.job_id(dir)? else {
            log::debug!("No job id recorded for {}", dir);
            return Ok(false);
        };

        let listed = self.run(&self.cfg.select_command, &[])?;
        let listed = String::from_utf8_lossy(&listed.stdout);
        if !listed.lines().any(|l| l.trim() == job_id) {
            return Ok(false);
        }

        let status = self.run(&self.cfg.status_command, &[&job_id])?;
        if !status.status.success() {
            return Ok(false);
        }
        let text = String::from_utf8_lossy(&status.stdout);
        Ok(job_status(&text)? != COMPLETED)
    }
}

/// Status letter from `qstat <id>` output.
pub fn job_status(qstat_output: &str) -> Result<String> {
    qstat_output
        .lines()
        .nth(2)
        .and_then(|line| line.split_whitespace().nth(4))
        .map(str::to_string)
        .ok_or_else(|| {
            VaspError::Queue(format!(
                "unexpected status output: {}",
                qstat_output.trim()
            ))
        })
}

/// Oracle selected by the configuration.
pub fn from_config(cfg: Option<&QueueConfig>) -> Box<dyn QueueOracle> {
    match cfg {
        Some(q) => Box::new(SchedulerQueue::new(q.clone())),
        None => Box::new(LocalQueue),
    }
}
