// src/main.rs
//
// =============================================================================
// VASPLAB: COMMANDER & ENTRY POINT
// =============================================================================
//
// Modes:
// 1. STATE: Classify a calculation directory.
// 2. CHECK: Report whether a job would run, and which parameters drifted.
// 3. SORT:  Show the POTCAR grouping of a job's structure.
// 4. RUN:   Run (or reuse) a calculation and print its results.
// 5. CLONE: Copy a calculation to a new directory.
// 6. JOBID: Inspect or record the scheduler job id of a directory.
//
// A job file is JSON: { "structure": {...}, "params": {...} }.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use vasplab::checkpoint::JobStore;
use vasplab::core::{ParameterSet, Property, Structure};
use vasplab::layout::CalcDir;
use vasplab::{presets, queue, Calculation, LifecycleState, PotentialLayout, VaspConfig};

// ============================================================================
// 1. CLI DEFINITION
// ============================================================================

#[derive(Parser)]
#[command(name = "vasplab", version, about = "VASP calculation manager")]
struct Cli {
    /// YAML configuration (default: $VASPRC, then built-in defaults).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the lifecycle state of a calculation directory.
    State {
        dir: PathBuf,

        /// Print only the numeric code.
        #[arg(long)]
        code: bool,
    },

    /// Report whether running the job in DIR would start the engine.
    Check {
        dir: PathBuf,

        #[arg(long)]
        job: PathBuf,

        /// JSON object merged over the job's params (e.g. '{"encut": 400}').
        #[arg(long)]
        params: Option<String>,
    },

    /// Print the potential layout of a job as JSON.
    Sort {
        #[arg(long)]
        job: PathBuf,

        #[arg(long)]
        params: Option<String>,
    },

    /// Run the job in DIR unless finished results can be reused.
    Run {
        dir: PathBuf,

        #[arg(long)]
        job: PathBuf,

        #[arg(long)]
        params: Option<String>,

        /// Properties that must be present (energy, free_energy, forces, stress, magmom).
        #[arg(long, value_delimiter = ',', default_value = "energy")]
        properties: Vec<Property>,
    },

    /// Copy the calculation in DIR to NEWDIR, dropping unfinished outputs.
    Clone {
        dir: PathBuf,
        newdir: PathBuf,

        #[arg(long)]
        job: PathBuf,
    },

    /// Show, record or clear the job id stored in DIR.
    Jobid {
        dir: PathBuf,

        #[arg(long, conflicts_with = "clear")]
        set: Option<String>,

        #[arg(long)]
        clear: bool,
    },
}

#[derive(Deserialize)]
struct JobFile {
    structure: Structure,
    #[serde(default)]
    params: ParameterSet,
}

// ============================================================================
// 2. ENTRY POINT
// ============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = VaspConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::State { dir, code } => cmd_state(&dir, code, &config),
        Commands::Check { dir, job, params } => cmd_check(dir, &job, params, config),
        Commands::Sort { job, params } => cmd_sort(&job, params),
        Commands::Run {
            dir,
            job,
            params,
            properties,
        } => cmd_run(dir, &job, params, &properties, config),
        Commands::Clone { dir, newdir, job } => cmd_clone(dir, newdir, &job, config),
        Commands::Jobid { dir, set, clear } => cmd_jobid(&dir, set, clear),
    }
}

// ============================================================================
// 3. COMMANDS
// ============================================================================

fn cmd_state(dir: &Path, code_only: bool, config: &VaspConfig) -> Result<()> {
    let oracle = queue::from_config(config.queue.as_ref());
    let state = vasplab::state::classify_with_marker(
        &CalcDir::new(dir),
        oracle.as_ref(),
        &config.termination_marker,
    )
    .with_context(|| format!("Failed to classify {:?}", dir))?;

    if code_only {
        println!("{}", state.code());
    } else {
        println!("{} ({})", state, state.code());
    }
    Ok(())
}

fn cmd_check(dir: PathBuf, job: &Path, overrides: Option<String>, config: VaspConfig) -> Result<()> {
    let (structure, params) = load_job(job, overrides)?;
    let calc = Calculation::vasp(&dir, structure, &params, config)?;

    let state = calc.state()?;
    println!("State: {}", state);

    match calc.calculation_required(&[Property::Energy]) {
        Ok(true) => println!("Run required"),
        Ok(false) => println!("Up to date"),
        Err(e) if e.is_pending() => println!("Pending: {}", e),
        Err(e) => return Err(e.into()),
    }

    // Drift report only makes sense once inputs are on disk.
    if state != LifecycleState::Empty {
        match calc.reconciliation() {
            Ok(rec) => {
                for key in &rec.new_keys {
                    println!("  + {} (requested, not on file)", key);
                }
                for key in &rec.missing_keys {
                    println!("  - {} (on file, not requested)", key);
                }
                for (key, val) in calc.params() {
                    if let Some(on_disk) = rec.file_params.get(key) {
                        if on_disk != val {
                            println!("  ~ {}: {} -> {}", key, on_disk, val);
                        }
                    }
                }
            }
            Err(e) => log::warn!("No drift report for {}: {}", calc.dir().display(), e),
        }
    }
    Ok(())
}

fn cmd_sort(job: &Path, overrides: Option<String>) -> Result<()> {
    let (structure, params) = load_job(job, overrides)?;
    let params = presets::normalize(&params)?;
    let setups = presets::setups_of(&params)?;
    let layout = PotentialLayout::for_structure(&structure, &setups, presets::pp_of(&params)?)?;
    println!("{}", serde_json::to_string_pretty(&layout)?);
    Ok(())
}

fn cmd_run(
    dir: PathBuf,
    job: &Path,
    overrides: Option<String>,
    properties: &[Property],
    config: VaspConfig,
) -> Result<()> {
    let (structure, params) = load_job(job, overrides)?;
    let mut calc = Calculation::vasp(&dir, structure, &params, config)?;

    match calc.ensure_computed(properties) {
        Ok(results) => {
            println!("{}", serde_json::to_string_pretty(results)?);
            Ok(())
        }
        Err(e) if e.is_pending() => {
            log::info!("{}", e);
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Calculation in {:?} failed", dir)),
    }
}

fn cmd_clone(dir: PathBuf, newdir: PathBuf, job: &Path, config: VaspConfig) -> Result<()> {
    let (structure, params) = load_job(job, None)?;
    let mut calc = Calculation::vasp(&dir, structure, &params, config)?;
    calc.clone_into(&newdir)
        .with_context(|| format!("Failed to clone {:?} to {:?}", dir, newdir))?;
    println!("{}", calc);
    Ok(())
}

fn cmd_jobid(dir: &Path, set: Option<String>, clear: bool) -> Result<()> {
    if let Some(id) = set {
        JobStore::open(dir)?.set_job_id(&id)?;
        log::info!("Recorded job {} for {:?}", id, dir);
    } else if clear {
        JobStore::open(dir)?.clear_job_id()?;
    } else {
        match JobStore::lookup_job_id(dir)? {
            Some(id) => println!("{}", id),
            None => println!("none"),
        }
    }
    Ok(())
}

// ============================================================================
// 4. HELPERS
// ============================================================================

fn load_job(path: &Path, overrides: Option<String>) -> Result<(Structure, ParameterSet)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {:?}", path))?;
    let mut job: JobFile = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse job file {:?}", path))?;

    if let Some(raw) = overrides {
        let extra: ParameterSet =
            serde_json::from_str(&raw).context("--params must be a JSON object")?;
        job.params.extend(extra);
    }
    Ok((job.structure, job.params))
}
