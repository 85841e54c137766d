// src/config.rs
//
// =============================================================================
// VASPLAB: CONFIGURATION
// =============================================================================
//
// Explicit configuration, threaded through every constructor.
//
// Resolution order (later wins):
// 1. Built-in defaults.
// 2. YAML file: explicit path, else $VASPRC if set.
// 3. Environment: VASP_PP_PATH, VASP_COMMAND.

use crate::error::{Result, VaspError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Literal marker VASP prints on the last line of a completed OUTCAR.
pub const NORMAL_TERMINATION: &str = "Voluntary context switches:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Lists job ids of the current user, one per line.
    #[serde(default = "default_select_command")]
    pub select_command: String,
    /// Reports one job; status in the fifth column of the third line.
    #[serde(default = "default_status_command")]
    pub status_command: String,
}

fn default_select_command() -> String {
    "qselect".into()
}

fn default_status_command() -> String {
    "qstat".into()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            select_command: default_select_command(),
            status_command: default_status_command(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaspConfig {
    /// Directory holding `potpaw_<family>/<name>/POTCAR`.
    pub pp_root: PathBuf,
    /// Shell command that runs the engine inside the calculation directory.
    pub command: Option<String>,
    /// Check parameter shapes when a calculation is constructed.
    pub validate: bool,
    pub termination_marker: String,
    /// Hold an advisory lock on the directory while deciding/running.
    pub lock: bool,
    /// Batch scheduler used for queue membership. `None` means local runs only.
    pub queue: Option<QueueConfig>,
}

impl Default for VaspConfig {
    fn default() -> Self {
        Self {
            pp_root: PathBuf::from("."),
            command: None,
            validate: true,
            termination_marker: NORMAL_TERMINATION.into(),
            lock: true,
            queue: None,
        }
    }
}

impl VaspConfig {
    /// Full resolution: defaults, then file, then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os("VASPRC").map(PathBuf::from),
        };

        let mut cfg = match file {
            Some(p) => {
                log::debug!("Loading configuration from {:?}", p);
                Self::from_yaml_file(&p)?
            }
            None => Self::default(),
        };

        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| VaspError::io(path, e))?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(text)?;
        if cfg.termination_marker.trim().is_empty() {
            return Err(VaspError::Configuration(
                "termination_marker must not be empty".into(),
            ));
        }
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Some(pp) = std::env::var_os("VASP_PP_PATH") {
            self.pp_root = PathBuf::from(pp);
        }
        if let Ok(cmd) = std::env::var("VASP_COMMAND") {
            if !cmd.trim().is_empty() {
                self.command = Some(cmd);
            }
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_pp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.pp_root = root.into();
        self
    }
}
