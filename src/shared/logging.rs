use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

pub fn orchestrator_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/orchestrator.log")
}

/// Appends one JSON line to the orchestrator log. Logging never fails the caller.
pub fn append_orchestrator_event(
    state_root: &Path,
    level: LogLevel,
    event: &str,
    run_id: Option<&str>,
    message: &str,
) {
    let payload = serde_json::json!({
        "timestamp": super::time::now_secs(),
        "level": level.as_str(),
        "event": event,
        "runId": run_id,
        "message": message,
    });
    let Ok(line) = serde_json::to_string(&payload) else {
        return;
    };
    let _ = append_orchestrator_log_line(state_root, &line);
}

pub fn append_orchestrator_log_line(state_root: &Path, line: &str) -> std::io::Result<()> {
    let path = orchestrator_log_path(state_root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    writeln!(file, "{line}")
}
