// src/layout.rs
//
// Fixed file names of a calculation directory.

use std::fmt;
use std::path::{Path, PathBuf};

pub const INCAR: &str = "INCAR";
pub const POSCAR: &str = "POSCAR";
pub const POTCAR: &str = "POTCAR";
pub const KPOINTS: &str = "KPOINTS";
pub const OUTCAR: &str = "OUTCAR";
pub const CONTCAR: &str = "CONTCAR";
pub const VASPRUN: &str = "vasprun.xml";
pub const LOCK_FILE: &str = ".vasplab.lock";

/// A calculation directory. The path is the calculation's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalcDir {
    root: PathBuf,
}

impl CalcDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn incar(&self) -> PathBuf {
        self.file(INCAR)
    }

    pub fn poscar(&self) -> PathBuf {
        self.file(POSCAR)
    }

    pub fn potcar(&self) -> PathBuf {
        self.file(POTCAR)
    }

    pub fn kpoints(&self) -> PathBuf {
        self.file(KPOINTS)
    }

    pub fn outcar(&self) -> PathBuf {
        self.file(OUTCAR)
    }

    pub fn contcar(&self) -> PathBuf {
        self.file(CONTCAR)
    }

    pub fn vasprun(&self) -> PathBuf {
        self.file(VASPRUN)
    }

    /// NEB image directory: `00`, `01`, ...
    pub fn image(&self, index: usize) -> PathBuf {
        self.root.join(format!("{:02}", index))
    }

    /// INCAR, POSCAR, POTCAR, KPOINTS.
    pub fn required_inputs(&self) -> [PathBuf; 4] {
        [self.incar(), self.poscar(), self.potcar(), self.kpoints()]
    }
}

impl fmt::Display for CalcDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root.display())
    }
}
