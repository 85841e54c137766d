// src/calculator.rs
//
// =============================================================================
// VASPLAB: RUN CONTROLLER
// =============================================================================
//
// The Decision Engine.
//
// Responsibilities:
// 1. Construction: normalize the request, resolve the potential layout,
//    restore results from a FINISHED directory.
// 2. Decide whether a run is needed (state -> reconcile -> cache -> marker).
// 3. Run: write inputs, spawn the engine in the directory, read results.
// 4. Directory housekeeping: clone, describe, advisory lock.
//
// Design Principles:
// - The parent process never changes its working directory; the engine is
//   started with the calculation directory as its own.
// - Pending states are typed errors, not sentinel results.

use crate::checkpoint::JobStore;
use crate::config::VaspConfig;
use crate::core::{CalculationResult, LifecycleState, ParameterSet, Property, Structure};
use crate::drivers::vasp::VaspDriver;
use crate::drivers::EngineDriver;
use crate::error::{Result, VaspError};
use crate::layout::{CalcDir, CONTCAR, LOCK_FILE, OUTCAR, VASPRUN};
use crate::potentials::PotentialLayout;
use crate::presets;
use crate::queue;
use crate::reconcile::{reconcile, Reconciliation};
use crate::state::{classify_with_marker, is_finished, QueueOracle};
use fs2::FileExt;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

pub struct Calculation {
    dir: CalcDir,
    config: VaspConfig,
    structure: Structure,
    params: ParameterSet,
    layout: PotentialLayout,
    results: Option<CalculationResult>,
    driver: Box<dyn EngineDriver>,
    queue: Box<dyn QueueOracle>,
}

// ============================================================================
// 1. CONSTRUCTION
// ============================================================================

impl Calculation {
    pub fn new(
        dir: impl Into<PathBuf>,
        structure: Structure,
        params: &ParameterSet,
        config: VaspConfig,
        driver: Box<dyn EngineDriver>,
        queue: Box<dyn QueueOracle>,
    ) -> Result<Self> {
        let dir = CalcDir::new(dir);
        fs::create_dir_all(dir.path()).map_err(|e| VaspError::io(dir.path(), e))?;

        let mut params = presets::normalize(params)?;
        let setups = presets::setups_of(&params)?;
        let layout = PotentialLayout::for_structure(&structure, &setups, presets::pp_of(&params)?)?;
        presets::expand_ldau_luj(&mut params, &layout)?;
        if config.validate {
            presets::validate(&params)?;
        }

        let mut calc = Self {
            dir,
            config,
            structure,
            params,
            layout,
            results: None,
            driver,
            queue,
        };
        calc.restore()?;
        Ok(calc)
    }

    /// VASP driver and the queue oracle named by `config`.
    pub fn vasp(
        dir: impl Into<PathBuf>,
        structure: Structure,
        params: &ParameterSet,
        config: VaspConfig,
    ) -> Result<Self> {
        let driver = Box::new(VaspDriver::from_config(&config));
        let queue = queue::from_config(config.queue.as_ref());
        Self::new(dir, structure, params, config, driver, queue)
    }

    /// Loads results when the directory already holds a finished run.
    /// Unreadable results on a finished directory are an error, not a
    /// reason to rerun.
    fn restore(&mut self) -> Result<()> {
        self.results = None;
        if self.state()? != LifecycleState::Finished {
            return Ok(());
        }
        self.results = Some(self.driver.read_results(&self.dir, &self.layout)?);
        log::debug!("Restored results from {}", self.dir);
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn layout(&self) -> &PotentialLayout {
        &self.layout
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn results(&self) -> Option<&CalculationResult> {
        self.results.as_ref()
    }
}

// ============================================================================
// 2. DECISION
// ============================================================================

impl Calculation {
    pub fn state(&self) -> Result<LifecycleState> {
        classify_with_marker(&self.dir, self.queue.as_ref(), &self.config.termination_marker)
    }

    /// Whether `ensure_computed(properties)` would start the engine.
    /// Pending and unrunnable states are returned as errors.
    pub fn calculation_required(&self, properties: &[Property]) -> Result<bool> {
        let state = self.state()?;
        self.decide(state, properties)
    }

    fn decide(&self, state: LifecycleState, properties: &[Property]) -> Result<bool> {
        let dir = self.dir.path().to_path_buf();
        match state {
            LifecycleState::Empty => {
                log::debug!("{} is empty: run required", self.dir);
                return Ok(true);
            }
            LifecycleState::Neb => return Err(VaspError::NebLayout(dir)),
            LifecycleState::Queued => {
                let job_id = self.queue.job_id(&self.dir)?.unwrap_or_default();
                return Err(VaspError::QueuedPending { dir, job_id });
            }
            LifecycleState::New => {
                let job_id = self.queue.job_id(&self.dir)?.unwrap_or_default();
                return Err(VaspError::SubmittedPending { dir, job_id });
            }
            LifecycleState::Unknown => return Err(VaspError::Unclassified(dir)),
            LifecycleState::Finished
            | LifecycleState::NotFinished
            | LifecycleState::EmptyOutput => {}
        }

        let rec = self.reconciliation()?;
        if rec.differs {
            log::info!("Parameters on file differ in {}: run required", self.dir);
            return Ok(true);
        }

        if let Some(missing) = properties.iter().find(|p| !self.has_cached(**p)) {
            log::debug!("{} not in cached results: run required", missing);
            return Ok(true);
        }

        Ok(!is_finished(&self.dir, &self.config.termination_marker))
    }

    /// Parameters on disk against this calculation's normalized request.
    pub fn reconciliation(&self) -> Result<Reconciliation> {
        reconcile(&self.dir, &self.params, self.driver.as_ref())
    }

    fn has_cached(&self, property: Property) -> bool {
        self.results.as_ref().is_some_and(|r| r.has(property))
    }
}

// ============================================================================
// 3. EXECUTION
// ============================================================================

impl Calculation {
    /// Runs the engine only if needed and returns results holding every
    /// requested property.
    pub fn ensure_computed(&mut self, properties: &[Property]) -> Result<&CalculationResult> {
        let _lock = match self.config.lock {
            true => Some(DirLock::acquire(&self.dir)?),
            false => None,
        };

        let state = self.state()?;
        if state == LifecycleState::Finished && self.results.is_none() {
            // Finished after this calculation was constructed (e.g. by a queue).
            self.restore()?;
        }

        if self.decide(state, properties)? {
            self.run()?;
        } else {
            log::info!("Reusing results in {}", self.dir);
        }

        let missing = properties.iter().copied().find(|p| !self.has_cached(*p));
        match (missing, self.results.as_ref()) {
            (None, Some(results)) => Ok(results),
            (Some(property), _) => Err(VaspError::MissingKey(property)),
            (None, None) => Err(VaspError::MissingKey(Property::Energy)),
        }
    }

    pub fn energy(&mut self) -> Result<f64> {
        let results = self.ensure_computed(&[Property::Energy])?;
        results.energy.ok_or(VaspError::MissingKey(Property::Energy))
    }

    pub fn forces(&mut self) -> Result<Vec<[f64; 3]>> {
        let results = self.ensure_computed(&[Property::Forces])?;
        results.forces.clone().ok_or(VaspError::MissingKey(Property::Forces))
    }

    fn run(&mut self) -> Result<()> {
        self.results = None;
        self.driver
            .write_inputs(&self.dir, &self.structure, &self.params, &self.layout)?;
        // Outputs of the previous run must not outlive its inputs.
        for name in [OUTCAR, CONTCAR, VASPRUN] {
            remove_if_present(&self.dir.file(name))?;
        }

        let code = self.driver.spawn_engine(&self.dir)?;
        if code != 0 {
            return Err(VaspError::ProcessFailed {
                engine: self.driver.name().to_string(),
                code,
            });
        }

        self.results = Some(self.driver.read_results(&self.dir, &self.layout)?);
        log::info!("{} finished in {}", self.driver.name(), self.dir);
        Ok(())
    }
}

// ============================================================================
// 4. HOUSEKEEPING
// ============================================================================

impl Calculation {
    /// Copies the directory to `newdir` (unless it exists) and retargets
    /// this calculation there. Outputs of unfinished runs are not carried
    /// over, and the copy forgets its job id.
    pub fn clone_into(&mut self, newdir: impl Into<PathBuf>) -> Result<()> {
        let newdir: PathBuf = newdir.into();
        let state = self.state()?;

        if !newdir.is_dir() {
            copy_tree(self.dir.path(), &newdir)?;

            let stale: &[&str] = match state {
                LifecycleState::Queued | LifecycleState::NotFinished => &[OUTCAR, VASPRUN],
                LifecycleState::EmptyOutput => &[OUTCAR, VASPRUN, CONTCAR],
                _ => &[],
            };
            for name in stale {
                remove_if_present(&newdir.join(name))?;
            }
            remove_if_present(&newdir.join(LOCK_FILE))?;
        }

        log::info!("Cloned {} ({}) to {:?}", self.dir, state, newdir);
        self.dir = CalcDir::new(newdir);
        JobStore::open(self.dir.path())?.clear_job_id()?;
        self.restore()
    }

    /// INCAR and POSCAR as they are on disk.
    pub fn describe(&self) -> String {
        let show = |path: PathBuf, name: &str| match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => format!("No {} yet\n", name),
        };
        let mut s = format!("VASP calculation in {}\n\n", self.dir);
        s.push_str(&show(self.dir.incar(), "INCAR"));
        s.push('\n');
        s.push_str(&show(self.dir.poscar(), "POSCAR"));
        s
    }
}

impl fmt::Display for Calculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl fmt::Debug for Calculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Calculation")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .field("structure", &self.structure)
            .field("params", &self.params)
            .field("layout", &self.layout)
            .field("results", &self.results)
            .finish_non_exhaustive()
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).map_err(|e| VaspError::io(to, e))?;
    let entries = fs::read_dir(from).map_err(|e| VaspError::io(from, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| VaspError::io(from, e))?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        if source.is_dir() {
            copy_tree(&source, &target)?;
        } else {
            fs::copy(&source, &target).map_err(|e| VaspError::io(&source, e))?;
        }
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(VaspError::io(path, e)),
    }
}

// ============================================================================
// 5. DIRECTORY LOCK
// ============================================================================

/// Exclusive advisory lock on `<dir>/.vasplab.lock`, released on drop.
pub struct DirLock {
    file: File,
}

impl DirLock {
    pub fn acquire(dir: &CalcDir) -> Result<Self> {
        let path = dir.file(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| VaspError::io(&path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file }),
            Err(_) => Err(VaspError::Locked(dir.path().to_path_buf())),
        }
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
