use crate::orchestration::background::ProcessHandle;
use crate::orchestration::error::{io_error, json_error, OrchestratorError};
use crate::orchestration::outcome::Outcome;
use crate::orchestration::registry::WorkflowDefinition;
use crate::orchestration::run_lock::RunLock;
use crate::runtime::StatePaths;
use crate::shared::fs_atomic::{atomic_write_file, is_temp_file_name, remove_file_if_exists};
use crate::shared::ids::RunId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Pending,
    Running,
    AwaitingInput,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::AwaitingInput => "awaiting-input",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finished step. `next_step` is set when the outcome moved the run on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub step: String,
    pub outcome: Outcome,
    #[serde(default)]
    pub next_step: Option<String>,
    pub at: i64,
}

impl HistoryEntry {
    /// The step the run sits in after this entry was recorded.
    pub fn ends_at(&self) -> &str {
        self.next_step.as_deref().unwrap_or(&self.step)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub run_id: String,
    pub workflow_name: String,
    pub discriminator: String,
    pub current_step: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_handle: Option<ProcessHandle>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub launch_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RunState {
    pub fn new_pending(
        run_id: impl Into<String>,
        definition: &WorkflowDefinition,
        discriminator: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            workflow_name: definition.name().to_string(),
            discriminator: discriminator.into(),
            current_step: definition.initial_step().to_string(),
            status: RunStatus::Pending,
            process_handle: None,
            history: Vec::new(),
            last_error: None,
            launch_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Checks the record invariants against its workflow definition.
    pub fn check_invariants(&self, definition: &WorkflowDefinition) -> Result<(), String> {
        if self.workflow_name != definition.name() {
            return Err(format!(
                "run belongs to workflow `{}`, not `{}`",
                self.workflow_name,
                definition.name()
            ));
        }
        if !definition.has_step(&self.current_step) {
            return Err(format!(
                "current step `{}` is not declared by workflow `{}`",
                self.current_step, self.workflow_name
            ));
        }
        if let Some(last) = self.history.last() {
            if last.ends_at() != self.current_step {
                return Err(format!(
                    "last history entry ends at `{}` but current step is `{}`",
                    last.ends_at(),
                    self.current_step
                ));
            }
        }
        match (self.status, self.process_handle.is_some()) {
            (RunStatus::Running, false) => Err("running run has no process handle".to_string()),
            (status, true) if status != RunStatus::Running => {
                Err(format!("{status} run still holds a process handle"))
            }
            _ => Ok(()),
        }
    }
}

/// Owns the on-disk run records under `<state_root>/runs`.
#[derive(Debug, Clone)]
pub struct WorkflowRunStore {
    paths: StatePaths,
}

impl WorkflowRunStore {
    pub fn new(paths: StatePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn state_root(&self) -> &Path {
        &self.paths.root
    }

    pub fn load(&self, run_id: &str) -> Result<RunState, OrchestratorError> {
        self.try_load(run_id)?
            .ok_or_else(|| OrchestratorError::UnknownRun {
                run_id: run_id.to_string(),
            })
    }

    pub fn try_load(&self, run_id: &str) -> Result<Option<RunState>, OrchestratorError> {
        checked_run_id(run_id)?;
        let path = self.paths.run_record_path(run_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(&path, source)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| json_error(&path, source))
    }

    pub fn save(&self, state: &RunState) -> Result<(), OrchestratorError> {
        checked_run_id(&state.run_id)?;
        let path = self.paths.run_record_path(&state.run_id);
        let body = serde_json::to_vec_pretty(state).map_err(|e| json_error(&path, e))?;
        atomic_write_file(&path, &body).map_err(|e| io_error(&path, e))
    }

    pub fn list_runs(&self, workflow_name: Option<&str>) -> Result<Vec<RunState>, OrchestratorError> {
        let runs_root = self.paths.runs_dir();
        let entries = match fs::read_dir(&runs_root) {
            Ok(entries) => entries,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io_error(&runs_root, source)),
        };

        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&runs_root, source))?;
            let path = entry.path();
            if !path.is_file() || is_temp_file_name(&entry.file_name().to_string_lossy()) {
                continue;
            }
            if path.extension().and_then(|value| value.to_str()) != Some("json") {
                continue;
            }

            let raw = fs::read_to_string(&path).map_err(|source| io_error(&path, source))?;
            let run: RunState =
                serde_json::from_str(&raw).map_err(|source| json_error(&path, source))?;
            if workflow_name.is_some_and(|name| run.workflow_name != name) {
                continue;
            }
            runs.push(run);
        }
        runs.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        Ok(runs)
    }

    /// Removes the record and its launch artifacts. Step processes are left alone.
    pub fn delete(&self, run_id: &str) -> Result<(), OrchestratorError> {
        checked_run_id(run_id)?;
        let path = self.paths.run_record_path(run_id);
        let removed = remove_file_if_exists(&path).map_err(|e| io_error(&path, e))?;
        if !removed {
            return Err(OrchestratorError::UnknownRun {
                run_id: run_id.to_string(),
            });
        }
        let run_dir = self.paths.run_dir(run_id);
        match fs::remove_dir_all(&run_dir) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(io_error(&run_dir, source)),
        }
    }

    pub fn write_payload(&self, run_id: &str, payload: &[u8]) -> Result<PathBuf, OrchestratorError> {
        checked_run_id(run_id)?;
        let path = self.paths.payload_path(run_id);
        atomic_write_file(&path, payload).map_err(|e| io_error(&path, e))?;
        Ok(path)
    }

    pub fn payload_path(&self, run_id: &str) -> Option<PathBuf> {
        checked_run_id(run_id).ok()?;
        let path = self.paths.payload_path(run_id);
        path.is_file().then_some(path)
    }

    /// Moves the current payload aside so a restart can be rolled back.
    pub fn stash_payload(&self, run_id: &str) -> Result<(), OrchestratorError> {
        checked_run_id(run_id)?;
        let current = self.paths.payload_path(run_id);
        let stashed = self.paths.stashed_payload_path(run_id);
        match fs::rename(&current, &stashed) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == ErrorKind::NotFound => {
                remove_file_if_exists(&stashed).map_err(|e| io_error(&stashed, e))?;
                Ok(())
            }
            Err(source) => Err(io_error(&current, source)),
        }
    }

    /// Puts the stashed payload back, dropping whatever replaced it.
    pub fn restore_payload(&self, run_id: &str) -> Result<(), OrchestratorError> {
        checked_run_id(run_id)?;
        let current = self.paths.payload_path(run_id);
        let stashed = self.paths.stashed_payload_path(run_id);
        match fs::rename(&stashed, &current) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == ErrorKind::NotFound => {
                remove_file_if_exists(&current).map_err(|e| io_error(&current, e))?;
                Ok(())
            }
            Err(source) => Err(io_error(&stashed, source)),
        }
    }

    pub fn discard_stashed_payload(&self, run_id: &str) -> Result<(), OrchestratorError> {
        checked_run_id(run_id)?;
        let stashed = self.paths.stashed_payload_path(run_id);
        remove_file_if_exists(&stashed).map_err(|e| io_error(&stashed, e))?;
        Ok(())
    }

    pub fn lock(&self, run_id: &str) -> Result<RunLock, OrchestratorError> {
        checked_run_id(run_id)?;
        RunLock::acquire(&self.paths, run_id)
    }
}

// Run ids become file names under `runs/`; anything else is not a run.
fn checked_run_id(run_id: &str) -> Result<(), OrchestratorError> {
    RunId::parse(run_id)
        .map(|_| ())
        .map_err(|_| OrchestratorError::UnknownRun {
            run_id: run_id.to_string(),
        })
}
