mod common;

use common::{
    config, driver, fake_engine, finished_outcar, iron_oxide, params, pp_library, run_count,
    structure, touch,
};
use serde_json::json;
use std::fs;
use std::path::Path;
use vasplab::calculator::DirLock;
use vasplab::checkpoint::JobStore;
use vasplab::core::{LifecycleState, Property, Structure};
use vasplab::layout::CalcDir;
use vasplab::queue::LocalQueue;
use vasplab::state::QueueOracle;
use vasplab::{Calculation, Result, VaspError};

struct AlwaysQueued;

impl QueueOracle for AlwaysQueued {
    fn job_id(&self, _dir: &CalcDir) -> Result<Option<String>> {
        Ok(Some("99.pbs".into()))
    }

    fn in_queue(&self, _dir: &CalcDir) -> Result<bool> {
        Ok(true)
    }
}

fn calculation(root: &Path, dir: &Path, structure: Structure, request: serde_json::Value) -> Calculation {
    let pp = root.join("pp");
    let command = fake_engine(root, structure.len());
    Calculation::new(
        dir,
        structure,
        &params(request),
        config(&pp),
        Box::new(driver(&pp, Some(command))),
        Box::new(LocalQueue),
    )
    .expect("construct calculation")
}

#[test]
fn test_runs_once_then_reuses() {
    let tmp = tempfile::tempdir().expect("tempdir");
    pp_library(tmp.path());
    let dir = tmp.path().join("calc");

    let mut calc = calculation(tmp.path(), &dir, iron_oxide(), json!({ "encut": 400 }));
    assert!(calc.calculation_required(&[Property::Energy]).expect("decide"));

    let energy = calc.energy().expect("energy");
    assert_eq!(energy, -10.45);
    assert_eq!(run_count(tmp.path()), 1);
    assert_eq!(calc.state().expect("state"), LifecycleState::Finished);

    let results = calc.results().expect("results");
    assert_eq!(results.free_energy, Some(-10.5));
    assert_eq!(results.stress, Some([1.0, 2.0, 3.0, 0.1, 0.2, 0.3]));
    assert_eq!(results.magmom, Some(2.0));
    let provenance = results.provenance.as_ref().expect("provenance");
    assert_eq!(provenance.exit_code, 0);

    // Same request, same directory: restored, not rerun.
    let mut again = calculation(tmp.path(), &dir, iron_oxide(), json!({ "encut": 400 }));
    assert!(again.results().is_some());
    assert!(!again.calculation_required(&[Property::Energy, Property::Forces]).expect("decide"));
    again
        .ensure_computed(&[Property::Energy, Property::Forces])
        .expect("reuse");
    assert_eq!(run_count(tmp.path()), 1);

    // Changed request: rerun.
    let mut changed = calculation(tmp.path(), &dir, iron_oxide(), json!({ "encut": 500 }));
    assert!(changed.calculation_required(&[Property::Energy]).expect("decide"));
    changed.energy().expect("energy");
    assert_eq!(run_count(tmp.path()), 2);
}

#[test]
fn test_forces_come_back_in_original_order() {
    let tmp = tempfile::tempdir().expect("tempdir");
    pp_library(tmp.path());
    let dir = tmp.path().join("calc");

    let mut calc = calculation(
        tmp.path(),
        &dir,
        structure(&["O", "Fe", "O", "Fe", "O"]),
        json!({}),
    );
    let forces = calc.forces().expect("forces");
    let fx: Vec<f64> = forces.iter().map(|f| f[0]).collect();
    // File order is O O O Fe Fe.
    assert_eq!(fx, vec![1.0, 4.0, 2.0, 5.0, 3.0]);

    let poscar = fs::read_to_string(CalcDir::new(&dir).poscar()).expect("POSCAR");
    let lines: Vec<&str> = poscar.lines().collect();
    assert_eq!(lines[0], "O Fe");
    assert_eq!(lines[5], "O Fe");
    assert_eq!(lines[6], "3 2");
}

#[test]
fn test_engine_failure_names_engine_and_code() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let pp = pp_library(tmp.path());
    let dir = tmp.path().join("calc");
    let before = std::env::current_dir().expect("cwd");

    let mut calc = Calculation::new(
        &dir,
        iron_oxide(),
        &params(json!({})),
        config(&pp),
        Box::new(driver(&pp, Some("exit 1".into()))),
        Box::new(LocalQueue),
    )
    .expect("construct calculation");

    let err = calc.ensure_computed(&[Property::Energy]).unwrap_err();
    match &err {
        VaspError::ProcessFailed { engine, code } => {
            assert_eq!(engine, "VASP");
            assert_eq!(*code, 1);
        }
        other => panic!("expected ProcessFailed, got {:?}", other),
    }
    assert_eq!(err.to_string(), "VASP returned an error: 1");
    assert_eq!(std::env::current_dir().expect("cwd"), before);
    assert!(calc.results().is_none());
}

#[test]
fn test_failed_rerun_never_serves_previous_results() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let pp = pp_library(tmp.path());
    let dir = tmp.path().join("calc");

    let mut first = calculation(tmp.path(), &dir, iron_oxide(), json!({ "encut": 400 }));
    assert_eq!(first.energy().expect("energy"), -10.45);
    touch(&dir.join("CONTCAR"), "old geometry\n");

    let failing = |encut: i64| {
        Calculation::new(
            &dir,
            iron_oxide(),
            &params(json!({ "encut": encut })),
            config(&pp),
            Box::new(driver(&pp, Some("exit 1".into()))),
            Box::new(LocalQueue),
        )
        .expect("construct calculation")
    };

    let mut changed = failing(500);
    let err = changed.energy().unwrap_err();
    assert!(matches!(err, VaspError::ProcessFailed { code: 1, .. }), "got {:?}", err);
    assert!(!dir.join("OUTCAR").exists());
    assert!(!dir.join("CONTCAR").exists());

    // Same object: the failed run is attempted again, not papered over.
    let err = changed.energy().unwrap_err();
    assert!(matches!(err, VaspError::ProcessFailed { .. }), "got {:?}", err);

    // Fresh object over the same directory.
    let mut fresh = failing(500);
    assert!(fresh.results().is_none());
    assert!(fresh.calculation_required(&[Property::Energy]).expect("decide"));
    assert!(fresh.energy().is_err());
    assert_eq!(run_count(tmp.path()), 1);
}

#[test]
fn test_unreadable_finished_results_are_reported() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let pp = pp_library(tmp.path());
    let dir = tmp.path().join("calc");
    for name in ["INCAR", "POSCAR", "POTCAR", "KPOINTS"] {
        touch(&dir.join(name), "x\n");
    }
    // Finished, but the force block covers 2 atoms out of 5.
    touch(&dir.join("OUTCAR"), &finished_outcar(2));

    let err = Calculation::new(
        &dir,
        iron_oxide(),
        &params(json!({})),
        config(&pp),
        Box::new(driver(&pp, Some(fake_engine(tmp.path(), 5)))),
        Box::new(LocalQueue),
    )
    .unwrap_err();
    assert!(matches!(err, VaspError::Malformed { .. }), "got {:?}", err);
    assert_eq!(run_count(tmp.path()), 0);
}

#[test]
fn test_missing_command_is_a_configuration_error() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let pp = pp_library(tmp.path());

    let mut calc = Calculation::new(
        tmp.path().join("calc"),
        iron_oxide(),
        &params(json!({})),
        config(&pp),
        Box::new(driver(&pp, None)),
        Box::new(LocalQueue),
    )
    .expect("construct calculation");

    let err = calc.ensure_computed(&[Property::Energy]).unwrap_err();
    assert!(matches!(err, VaspError::Configuration(_)), "got {:?}", err);
}

#[test]
fn test_output_without_property_is_missing_key() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let pp = pp_library(tmp.path());

    // Finishes cleanly but prints no energies.
    let mut calc = Calculation::new(
        tmp.path().join("calc"),
        iron_oxide(),
        &params(json!({})),
        config(&pp),
        Box::new(driver(&pp, Some("echo ' Voluntary context switches: 1' > OUTCAR".into()))),
        Box::new(LocalQueue),
    )
    .expect("construct calculation");

    let err = calc.ensure_computed(&[Property::Energy]).unwrap_err();
    assert!(
        matches!(err, VaspError::MissingKey(Property::Energy)),
        "got {:?}",
        err
    );
}

#[test]
fn test_queued_directory_is_pending() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let pp = pp_library(tmp.path());
    let dir = tmp.path().join("calc");
    for name in ["INCAR", "POSCAR", "POTCAR", "KPOINTS", "OUTCAR"] {
        touch(&dir.join(name), "x\n");
    }

    let mut calc = Calculation::new(
        &dir,
        iron_oxide(),
        &params(json!({})),
        config(&pp),
        Box::new(driver(&pp, Some("exit 0".into()))),
        Box::new(AlwaysQueued),
    )
    .expect("construct calculation");

    let err = calc.ensure_computed(&[Property::Energy]).unwrap_err();
    assert!(err.is_pending());
    match err {
        VaspError::QueuedPending { job_id, .. } => assert_eq!(job_id, "99.pbs"),
        other => panic!("expected QueuedPending, got {:?}", other),
    }
}

#[test]
fn test_submitted_directory_is_pending() {
    let tmp = tempfile::tempdir().expect("tempdir");
    pp_library(tmp.path());
    let dir = tmp.path().join("calc");
    for name in ["INCAR", "POSCAR", "POTCAR", "KPOINTS"] {
        touch(&dir.join(name), "x\n");
    }
    JobStore::open(&dir)
        .expect("store")
        .set_job_id("7.pbs")
        .expect("record");

    let mut calc = calculation(tmp.path(), &dir, iron_oxide(), json!({}));
    let err = calc.ensure_computed(&[Property::Energy]).unwrap_err();
    assert!(
        matches!(err, VaspError::SubmittedPending { ref job_id, .. } if job_id == "7.pbs"),
        "got {:?}",
        err
    );
    assert_eq!(run_count(tmp.path()), 0);
}

#[test]
fn test_neb_directory_is_refused() {
    let tmp = tempfile::tempdir().expect("tempdir");
    pp_library(tmp.path());
    let dir = tmp.path().join("calc");
    for name in ["INCAR", "POTCAR", "KPOINTS"] {
        touch(&dir.join(name), "x\n");
    }
    fs::create_dir_all(dir.join("00")).expect("image");

    let mut calc = calculation(tmp.path(), &dir, iron_oxide(), json!({}));
    let err = calc.ensure_computed(&[Property::Energy]).unwrap_err();
    assert!(matches!(err, VaspError::NebLayout(_)), "got {:?}", err);
}

#[test]
fn test_locked_directory_is_refused() {
    let tmp = tempfile::tempdir().expect("tempdir");
    pp_library(tmp.path());
    let dir = tmp.path().join("calc");

    let mut calc = calculation(tmp.path(), &dir, iron_oxide(), json!({}));
    let held = DirLock::acquire(&CalcDir::new(&dir)).expect("lock");

    let err = calc.ensure_computed(&[Property::Energy]).unwrap_err();
    assert!(matches!(err, VaspError::Locked(_)), "got {:?}", err);

    drop(held);
    calc.ensure_computed(&[Property::Energy]).expect("run after unlock");
    assert_eq!(run_count(tmp.path()), 1);
}

#[test]
fn test_clone_drops_unfinished_outputs() {
    let tmp = tempfile::tempdir().expect("tempdir");
    pp_library(tmp.path());
    let dir = tmp.path().join("calc");
    let copy = tmp.path().join("copy");

    let mut calc = calculation(tmp.path(), &dir, iron_oxide(), json!({}));
    calc.energy().expect("energy");

    // Pretend the run was cut short.
    fs::write(dir.join("OUTCAR"), " half written\n").expect("truncate OUTCAR");
    touch(&dir.join("vasprun.xml"), "<modeling>");
    JobStore::open(&dir)
        .expect("store")
        .set_job_id("12.pbs")
        .expect("record");

    assert_eq!(calc.state().expect("state"), LifecycleState::NotFinished);
    calc.clone_into(&copy).expect("clone");

    assert_eq!(calc.dir(), copy.as_path());
    assert!(copy.join("INCAR").is_file());
    assert!(!copy.join("OUTCAR").exists());
    assert!(!copy.join("vasprun.xml").exists());
    assert_eq!(JobStore::lookup_job_id(&copy).expect("lookup"), None);
    // The original keeps everything.
    assert!(dir.join("OUTCAR").is_file());
    assert_eq!(
        JobStore::lookup_job_id(&dir).expect("lookup"),
        Some("12.pbs".to_string())
    );
}

#[test]
fn test_describe_shows_inputs() {
    let tmp = tempfile::tempdir().expect("tempdir");
    pp_library(tmp.path());
    let dir = tmp.path().join("calc");

    let mut calc = calculation(tmp.path(), &dir, iron_oxide(), json!({ "encut": 350 }));
    assert!(calc.describe().contains("No INCAR yet"));

    calc.energy().expect("energy");
    let text = calc.to_string();
    assert!(text.contains("ENCUT = 350"));
    assert!(text.contains("Cartesian"));
}
