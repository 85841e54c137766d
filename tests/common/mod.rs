// Shared fixtures: a fake pseudopotential library, structures, fake engines.
#![allow(dead_code)]

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use vasplab::core::{Atom, ParameterSet, Structure};
use vasplab::drivers::vasp::VaspDriver;
use vasplab::VaspConfig;

pub const DATASETS: &[&str] = &["Fe", "Fe_sv", "Fe_pv", "O", "O_s", "Ni"];

/// `potpaw_PBE/` and `potpaw_LDA/` with one small dataset per name.
pub fn pp_library(root: &Path) -> PathBuf {
    let lib = root.join("pp");
    for (family, kind) in [("PBE", "PAW_PBE"), ("LDA", "PAW")] {
        for name in DATASETS {
            let dir = lib.join(format!("potpaw_{}", family)).join(name);
            fs::create_dir_all(&dir).expect("create dataset dir");
            fs::write(
                dir.join("POTCAR"),
                format!("  {} {} 06Sep2000\n   1.0000\n parameters\n End of Dataset\n", kind, name),
            )
            .expect("write dataset");
        }
    }
    lib
}

pub fn atoms(symbols: &[&str]) -> Vec<Atom> {
    symbols
        .iter()
        .enumerate()
        .map(|(i, s)| Atom::new(*s, [0.5 * i as f64, 0.25, 0.0]))
        .collect()
}

pub fn structure(symbols: &[&str]) -> Structure {
    Structure::new(
        atoms(symbols),
        [[5.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 5.0]],
    )
}

/// `[Fe, Fe, O, O, O]`
pub fn iron_oxide() -> Structure {
    structure(&["Fe", "Fe", "O", "O", "O"])
}

pub fn params(value: Value) -> ParameterSet {
    serde_json::from_value(value).expect("parameter object")
}

pub fn config(pp_root: &Path) -> VaspConfig {
    VaspConfig::default().with_pp_root(pp_root)
}

pub fn driver(pp_root: &Path, command: Option<String>) -> VaspDriver {
    VaspDriver::new(pp_root, command)
}

/// A finished OUTCAR for `natoms` atoms. The force on the k-th atom in
/// file order is `(k + 1, 0, 0)`.
pub fn finished_outcar(natoms: usize) -> String {
    let mut s = String::new();
    s.push_str(" POSITION                                       TOTAL-FORCE (eV/Angst)\n");
    s.push_str(" -----------------------------------------------------------------------\n");
    for k in 0..natoms {
        s.push_str(&format!(
            "      0.00000      0.00000      0.00000         {}.000000      0.000000      0.000000\n",
            k + 1
        ));
    }
    s.push_str(" -----------------------------------------------------------------------\n");
    s.push_str("  in kB       1.00000     2.00000     3.00000     0.10000     0.20000     0.30000\n");
    s.push_str("  free  energy   TOTEN  =       -10.50000000 eV\n");
    s.push_str("  energy  without entropy=      -10.40000000  energy(sigma->0) =      -10.45000000\n");
    s.push_str(" number of electron      40.0000000 magnetization       2.0000000\n");
    s.push_str(" Voluntary context switches:         42\n");
    s
}

/// Shell command that "runs" the engine: copies a finished OUTCAR into the
/// working directory and appends one line to `runs.log` in `root`.
pub fn fake_engine(root: &Path, natoms: usize) -> String {
    let template = root.join("OUTCAR.template");
    fs::write(&template, finished_outcar(natoms)).expect("write OUTCAR template");
    format!(
        "cp '{}' OUTCAR && echo run >> '{}'",
        template.display(),
        root.join("runs.log").display()
    )
}

pub fn run_count(root: &Path) -> usize {
    fs::read_to_string(root.join("runs.log"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

pub fn touch(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
}
