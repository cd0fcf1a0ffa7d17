use super::RuntimeError;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_STATE_ROOT_DIR: &str = ".waypoint";
pub const STATE_ROOT_ENV: &str = "WAYPOINT_HOME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn required_directories(&self) -> Vec<PathBuf> {
        vec![self.runs_dir(), self.logs_dir()]
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    pub fn run_record_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.json"))
    }

    pub fn run_lock_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.lock"))
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(run_id)
    }

    pub fn payload_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("payload")
    }

    pub fn stashed_payload_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("payload.prev")
    }

    pub fn launch_dir(&self, run_id: &str, launch: u32, step: &str) -> PathBuf {
        self.run_dir(run_id)
            .join("launches")
            .join(format!("{launch:04}-{step}"))
    }
}

/// Resolves the state root once per process: explicit override, then
/// `WAYPOINT_HOME`, then `$HOME/.waypoint`.
pub fn resolve_state_root(explicit: Option<&Path>) -> Result<PathBuf, RuntimeError> {
    let root = match explicit {
        Some(path) => path.to_path_buf(),
        None => match std::env::var_os(STATE_ROOT_ENV).filter(|v| !v.is_empty()) {
            Some(value) => PathBuf::from(value),
            None => default_state_root_path()?,
        },
    };
    if !root.is_absolute() {
        return Err(RuntimeError::RelativeStateRoot {
            path: root.display().to_string(),
        });
    }
    Ok(root)
}

pub fn default_state_root_path() -> Result<PathBuf, RuntimeError> {
    let home = std::env::var_os("HOME").ok_or(RuntimeError::HomeDirectoryUnavailable)?;
    Ok(PathBuf::from(home).join(DEFAULT_STATE_ROOT_DIR))
}

pub fn bootstrap_state_root(paths: &StatePaths) -> Result<(), RuntimeError> {
    for path in paths.required_directories() {
        fs::create_dir_all(&path).map_err(|source| RuntimeError::CreateDir {
            path: path.display().to_string(),
            source,
        })?;
    }
    Ok(())
}
