use crate::config::StepCommand;
use crate::orchestration::error::{io_error, json_error, OrchestratorError};
use crate::orchestration::outcome::OutcomeRecord;
use crate::runtime::{is_process_alive, process_start_ticks};
use crate::shared::fs_atomic::{atomic_write_file, remove_file_if_exists};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub const OUTCOME_FILE_NAME: &str = "outcome.json";
pub const STEP_LOG_FILE_NAME: &str = "step.log";

/// Durable reference to a detached step process. Everything needed to probe the
/// step later is in here, so it can be rebuilt from the run record alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessHandle {
    pub pid: u32,
    pub started_at: i64,
    #[serde(default)]
    pub start_ticks: Option<u64>,
    pub launch_dir: PathBuf,
    pub outcome_path: PathBuf,
    pub log_path: PathBuf,
}

/// What a launched step needs to know about the run it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchContext {
    pub run_id: String,
    pub workflow: String,
    pub step: String,
    pub discriminator: String,
    pub launch_dir: PathBuf,
    pub payload_path: Option<PathBuf>,
}

impl LaunchContext {
    pub fn outcome_path(&self) -> PathBuf {
        self.launch_dir.join(OUTCOME_FILE_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.launch_dir.join(STEP_LOG_FILE_NAME)
    }

    fn variables(&self) -> BTreeMap<&'static str, String> {
        let mut vars = BTreeMap::from([
            ("run_id", self.run_id.clone()),
            ("workflow", self.workflow.clone()),
            ("step", self.step.clone()),
            ("discriminator", self.discriminator.clone()),
            ("outcome_path", self.outcome_path().display().to_string()),
            ("launch_dir", self.launch_dir.display().to_string()),
        ]);
        vars.insert(
            "payload_path",
            self.payload_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_default(),
        );
        vars
    }

    fn environment(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("WAYPOINT_RUN_ID", self.run_id.clone()),
            ("WAYPOINT_WORKFLOW", self.workflow.clone()),
            ("WAYPOINT_STEP", self.step.clone()),
            ("WAYPOINT_DISCRIMINATOR", self.discriminator.clone()),
            ("WAYPOINT_OUTCOME_PATH", self.outcome_path().display().to_string()),
            ("WAYPOINT_LAUNCH_DIR", self.launch_dir.display().to_string()),
        ];
        if let Some(payload) = &self.payload_path {
            env.push(("WAYPOINT_PAYLOAD_PATH", payload.display().to_string()));
        }
        env
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Running,
    Finished(OutcomeRecord),
    Vanished,
}

/// Spawns the step detached from this process and returns without waiting.
///
/// The child gets its own process group, a null stdin, and `step.log` for
/// stdout and stderr. Spawn failures surface as `LaunchFailed`.
pub fn launch(
    command: &StepCommand,
    context: &LaunchContext,
    now: i64,
) -> Result<ProcessHandle, OrchestratorError> {
    fs::create_dir_all(&context.launch_dir).map_err(|e| io_error(&context.launch_dir, e))?;
    let outcome_path = context.outcome_path();
    remove_file_if_exists(&outcome_path).map_err(|e| io_error(&outcome_path, e))?;

    let log_path = context.log_path();
    let log = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| io_error(&log_path, e))?;
    let log_err = log.try_clone().map_err(|e| io_error(&log_path, e))?;

    let vars = context.variables();
    let program = substitute(&command.program, &vars);
    let mut process = Command::new(&program);
    process
        .args(command.args.iter().map(|arg| substitute(arg, &vars)))
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));
    if let Some(dir) = &command.working_dir {
        process.current_dir(substitute(&dir.display().to_string(), &vars));
    }
    for (key, value) in &command.env {
        process.env(key, substitute(value, &vars));
    }
    for (key, value) in context.environment() {
        process.env(key, value);
    }
    detach(&mut process);

    let child = process.spawn().map_err(|err| {
        let reason = if err.kind() == ErrorKind::NotFound {
            format!("program `{program}` not found")
        } else {
            format!("spawn `{program}`: {err}")
        };
        OrchestratorError::LaunchFailed {
            run_id: context.run_id.clone(),
            step: context.step.clone(),
            reason,
        }
    })?;
    let pid = child.id();
    // Dropping `Child` neither waits for nor kills the step.
    drop(child);

    Ok(ProcessHandle {
        pid,
        started_at: now,
        start_ticks: process_start_ticks(pid),
        launch_dir: context.launch_dir.clone(),
        outcome_path,
        log_path,
    })
}

#[cfg(unix)]
fn detach(process: &mut Command) {
    use std::os::unix::process::CommandExt;
    process.process_group(0);
}

#[cfg(not(unix))]
fn detach(_process: &mut Command) {}

/// Non-blocking check of a launched step. Never mutates state.
pub fn probe(handle: &ProcessHandle) -> ProbeResult {
    if let Some(record) = read_outcome(&handle.outcome_path) {
        return ProbeResult::Finished(record);
    }
    if handle_is_alive(handle) {
        return ProbeResult::Running;
    }
    // The step may have written its outcome and exited between the two checks.
    match read_outcome(&handle.outcome_path) {
        Some(record) => ProbeResult::Finished(record),
        None => ProbeResult::Vanished,
    }
}

fn handle_is_alive(handle: &ProcessHandle) -> bool {
    if !is_process_alive(handle.pid) {
        return false;
    }
    match (handle.start_ticks, process_start_ticks(handle.pid)) {
        (Some(recorded), Some(current)) => recorded == current,
        _ => true,
    }
}

fn read_outcome(path: &Path) -> Option<OutcomeRecord> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Writes an outcome record the way a step implementation is expected to.
pub fn write_outcome(path: &Path, record: &OutcomeRecord) -> Result<(), OrchestratorError> {
    let body = serde_json::to_vec(record).map_err(|e| json_error(path, e))?;
    atomic_write_file(path, &body).map_err(|e| io_error(path, e))
}

fn substitute(template: &str, vars: &BTreeMap<&'static str, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}
