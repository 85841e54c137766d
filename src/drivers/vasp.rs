// src/drivers/vasp.rs
//
// =============================================================================
// VASPLAB: VASP DRIVER
// =============================================================================
//
// The Compatibility Adapter.
//
// Responsibilities:
// 1. Write INCAR / POSCAR / POTCAR / KPOINTS in resolver order.
// 2. Read the raw parameter sources back for the reconciler.
// 3. Run the configured command and scrape OUTCAR.
// 4. Provenance: host, timestamps, command, exit code.

use crate::config::VaspConfig;
use crate::core::{CalculationResult, ParameterSet, Provenance, Structure};
use crate::drivers::utils::run_in_dir;
use crate::drivers::{EngineDriver, ParamSource};
use crate::error::{Result, VaspError};
use crate::io::{incar, kpoints, outcar, poscar, potcar};
use crate::layout::CalcDir;
use crate::potentials::PotentialLayout;
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::path::PathBuf;

pub struct VaspDriver {
    pp_root: PathBuf,
    command: Option<String>,
    // Timing of the last spawn, attached to the next results read.
    last_run: RefCell<Option<Provenance>>,
}

impl VaspDriver {
    pub fn new(pp_root: impl Into<PathBuf>, command: Option<String>) -> Self {
        Self {
            pp_root: pp_root.into(),
            command,
            last_run: RefCell::new(None),
        }
    }

    pub fn from_config(cfg: &VaspConfig) -> Self {
        Self::new(cfg.pp_root.clone(), cfg.command.clone())
    }
}

impl EngineDriver for VaspDriver {
    fn name(&self) -> &str {
        "VASP"
    }

    fn read_raw_params(&self, dir: &CalcDir, source: ParamSource) -> Result<ParameterSet> {
        match source {
            ParamSource::MainControl => incar::read(&dir.incar()),
            ParamSource::Kpoints => kpoints::read(&dir.kpoints()),
            ParamSource::PotentialMetadata => {
                // Group keys live on the POSCAR comment line; NEB layouts have none.
                let keys = match dir.poscar().is_file() {
                    true => Some(poscar::read_group_keys(&dir.poscar())?),
                    false => None,
                };
                potcar::read_params(&dir.potcar(), keys.as_deref())
            }
        }
    }

    fn potential_symbols(&self, dir: &CalcDir) -> Result<Vec<String>> {
        potcar::read_symbols(&dir.potcar())
    }

    fn write_inputs(
        &self,
        dir: &CalcDir,
        structure: &Structure,
        params: &ParameterSet,
        layout: &PotentialLayout,
    ) -> Result<()> {
        std::fs::create_dir_all(dir.path()).map_err(|e| VaspError::io(dir.path(), e))?;

        incar::write(&dir.incar(), params)?;
        poscar::write(&dir.poscar(), structure, layout)?;
        potcar::write(&dir.potcar(), &self.pp_root, layout)?;
        kpoints::write(&dir.kpoints(), params)?;

        log::debug!("Wrote inputs for {} atoms in {}", structure.len(), dir);
        Ok(())
    }

    fn spawn_engine(&self, dir: &CalcDir) -> Result<i32> {
        let command = self.command.as_deref().ok_or_else(|| {
            VaspError::Configuration(
                "no engine command: set VASP_COMMAND or `command` in the config file".into(),
            )
        })?;

        let start_time: DateTime<Utc> = Utc::now();
        let exit_code = run_in_dir(command, dir.path())?;

        *self.last_run.borrow_mut() = Some(Provenance {
            execution_host: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "localhost".into()),
            start_time,
            end_time: Utc::now(),
            command: command.to_string(),
            exit_code,
        });

        Ok(exit_code)
    }

    fn read_results(&self, dir: &CalcDir, layout: &PotentialLayout) -> Result<CalculationResult> {
        let path = dir.outcar();
        let data = outcar::read(&path, layout.natoms())?;

        let forces = match data.forces {
            Some(sorted) => Some(layout.unsort(&sorted).ok_or_else(|| {
                VaspError::malformed(&path, "force block does not match the atom count")
            })?),
            None => None,
        };

        Ok(CalculationResult {
            energy: data.energy,
            free_energy: data.free_energy,
            forces,
            stress: data.stress,
            magmom: data.magmom,
            provenance: self.last_run.borrow_mut().take(),
        })
    }
}
