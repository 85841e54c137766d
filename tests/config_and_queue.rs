use serde_json::json;
use vasplab::config::{QueueConfig, NORMAL_TERMINATION};
use vasplab::core::ParameterSet;
use vasplab::presets;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use vasplab::checkpoint::JobStore;
use vasplab::layout::CalcDir;
use vasplab::queue::{job_status, SchedulerQueue};
use vasplab::state::QueueOracle;
use vasplab::{VaspConfig, VaspError};

#[test]
fn test_config_defaults() {
    let cfg = VaspConfig::default();
    assert!(cfg.validate);
    assert!(cfg.lock);
    assert_eq!(cfg.termination_marker, NORMAL_TERMINATION);
    assert!(cfg.command.is_none());
    assert!(cfg.queue.is_none());
}

#[test]
fn test_config_from_yaml() {
    let yaml = "
pp_root: /opt/vasp/potentials
command: mpirun -np 4 vasp_std
validate: false
queue:
  status_command: /usr/local/bin/qstat
";
    let cfg = VaspConfig::from_yaml_str(yaml).expect("parse config");
    assert_eq!(cfg.pp_root, std::path::PathBuf::from("/opt/vasp/potentials"));
    assert_eq!(cfg.command.as_deref(), Some("mpirun -np 4 vasp_std"));
    assert!(!cfg.validate);
    assert!(cfg.lock);

    let queue = cfg.queue.expect("queue section");
    assert_eq!(queue.select_command, QueueConfig::default().select_command);
    assert_eq!(queue.status_command, "/usr/local/bin/qstat");
}

#[test]
fn test_config_rejects_empty_marker() {
    let err = VaspConfig::from_yaml_str("termination_marker: ''\n").unwrap_err();
    assert!(matches!(err, VaspError::Configuration(_)), "got {:?}", err);
}

#[test]
fn test_qstat_status_column() {
    let output = "\
Job ID                    Name             User            Time Use S Queue
------------------------- ---------------- --------------- -------- - -----
1234.server               relax            alice           00:01:02 R batch
";
    assert_eq!(job_status(output).expect("status"), "R");

    let done = output.replace(" R batch", " C batch");
    assert_eq!(job_status(&done).expect("status"), "C");

    assert!(matches!(job_status("qstat: Unknown Job Id"), Err(VaspError::Queue(_))));
}

#[test]
fn test_normalize_applies_defaults_and_preset() {
    let request: ParameterSet = serde_json::from_value(json!({
        "XC": "PBE0",
        "ENCUT": 450,
        "setups": [["O", "_s"], [3, "_sv"]]
    }))
    .expect("request");
    let p = presets::normalize(&request).expect("normalize");

    assert_eq!(p["xc"], json!("pbe0"));
    assert_eq!(p["encut"], json!(450));
    assert_eq!(p["gga"], json!("PE"));
    assert_eq!(p["lhfcalc"], json!(true));
    assert_eq!(p["pp"], json!("LDA"));
    assert_eq!(p["ismear"], json!(1));
    assert_eq!(p["setups"], json!([[3, "_sv"], ["O", "_s"]]));
}

#[test]
fn test_explicit_keys_beat_preset_tags() {
    let request: ParameterSet =
        serde_json::from_value(json!({ "xc": "hse06", "pp": "PBE", "hfscreen": 0.3 }))
            .expect("request");
    let p = presets::normalize(&request).expect("normalize");
    assert_eq!(p["pp"], json!("PBE"));
    assert_eq!(p["hfscreen"], json!(0.3));
}

#[test]
fn test_normalize_rejects_bad_requests() {
    let unknown: ParameterSet =
        serde_json::from_value(json!({ "xc": "not-a-functional" })).expect("request");
    assert!(matches!(
        presets::normalize(&unknown),
        Err(VaspError::Configuration(_))
    ));

    let short_mesh: ParameterSet =
        serde_json::from_value(json!({ "kpts": [4, 4] })).expect("request");
    assert!(matches!(
        presets::normalize(&short_mesh),
        Err(VaspError::Configuration(_))
    ));

    let nested: ParameterSet =
        serde_json::from_value(json!({ "encut": { "value": 400 } })).expect("request");
    let p = presets::normalize(&nested).expect("normalize");
    assert!(matches!(presets::validate(&p), Err(VaspError::Configuration(_))));
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

/// `qstat` stand-in printing a status table for its argument.
fn qstat(dir: &Path, name: &str, status: &str, exit: i32) -> PathBuf {
    let body = format!(
        "echo 'Job ID  Name  User  Time Use S Queue'\n\
         echo '------  ----  ----  -------- - -----'\n\
         echo \"$1  relax  alice  00:01:02 {} batch\"\n\
         exit {}\n",
        status, exit
    );
    script(dir, name, &body)
}

#[test]
fn test_scheduler_queue_membership() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let bin = tmp.path().join("bin");
    std::fs::create_dir_all(&bin).expect("bin dir");
    let calc = CalcDir::new(tmp.path().join("calc"));
    std::fs::create_dir_all(calc.path()).expect("calc dir");

    let qselect = script(&bin, "qselect", "echo 3.pbs\necho 7.pbs\n");
    let oracle = |status_command: &Path| {
        SchedulerQueue::new(QueueConfig {
            select_command: qselect.display().to_string(),
            status_command: status_command.display().to_string(),
        })
    };
    let running = qstat(&bin, "qstat_running", "R", 0);

    // No job id: the scheduler is never asked.
    let unreachable = SchedulerQueue::new(QueueConfig {
        select_command: "/nonexistent/qselect".into(),
        status_command: "/nonexistent/qstat".into(),
    });
    assert!(!unreachable.in_queue(&calc).expect("no job id"));

    // Job id not listed by qselect.
    JobStore::open(calc.path())
        .expect("store")
        .set_job_id("12.pbs")
        .expect("record");
    assert!(!oracle(&running).in_queue(&calc).expect("unlisted"));

    JobStore::open(calc.path())
        .expect("store")
        .set_job_id("7.pbs")
        .expect("record");
    assert!(oracle(&running).in_queue(&calc).expect("running"));

    let queued = qstat(&bin, "qstat_queued", "Q", 0);
    assert!(oracle(&queued).in_queue(&calc).expect("queued"));

    let completed = qstat(&bin, "qstat_completed", "C", 0);
    assert!(!oracle(&completed).in_queue(&calc).expect("completed"));

    let failing = qstat(&bin, "qstat_failing", "R", 153);
    assert!(!oracle(&failing).in_queue(&calc).expect("qstat failed"));

    // A listed job with unparseable status output is an error.
    let garbled = script(&bin, "qstat_garbled", "echo 'qstat: try again'\n");
    assert!(matches!(
        oracle(&garbled).in_queue(&calc),
        Err(VaspError::Queue(_))
    ));
}
