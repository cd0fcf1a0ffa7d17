use crate::orchestration::run_store::RunState;
use crate::orchestration::WorkflowController;
use crate::runtime::{resolve_state_root, StatePaths};
use crate::shared::time::format_timestamp;
use std::path::{Path, PathBuf};

pub use crate::shared::time::now_secs;

pub const STATE_ROOT_FLAG: &str = "--state-root";

/// Global flags that may appear anywhere before or after the verb.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalOptions {
    pub state_root: Option<PathBuf>,
}

pub fn split_global_options(args: Vec<String>) -> Result<(GlobalOptions, Vec<String>), String> {
    let mut options = GlobalOptions::default();
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == STATE_ROOT_FLAG {
            let value = iter
                .next()
                .ok_or_else(|| format!("{STATE_ROOT_FLAG} requires a path"))?;
            options.state_root = Some(absolutize(Path::new(&value))?);
        } else if let Some(value) = arg.strip_prefix("--state-root=") {
            options.state_root = Some(absolutize(Path::new(value))?);
        } else {
            rest.push(arg);
        }
    }
    Ok((options, rest))
}

fn absolutize(path: &Path) -> Result<PathBuf, String> {
    if path.as_os_str().is_empty() {
        return Err(format!("{STATE_ROOT_FLAG} requires a path"));
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| format!("failed to resolve current directory: {e}"))?;
    Ok(cwd.join(path))
}

pub fn open_controller(options: &GlobalOptions) -> Result<WorkflowController, String> {
    let root = resolve_state_root(options.state_root.as_deref()).map_err(|e| e.to_string())?;
    WorkflowController::open(StatePaths::new(root)).map_err(|e| e.to_string())
}

pub fn render_run(run: &RunState) -> String {
    let mut lines = vec![
        format!("run_id={}", run.run_id),
        format!("workflow={}", run.workflow_name),
        format!("discriminator={}", run.discriminator),
        format!("status={}", run.status),
        format!("current_step={}", run.current_step),
        format!("launch_count={}", run.launch_count),
        format!(
            "pid={}",
            run.process_handle
                .as_ref()
                .map(|handle| handle.pid.to_string())
                .unwrap_or_else(|| "none".to_string())
        ),
        format!("last_error={}", run.last_error.as_deref().unwrap_or("none")),
        format!("created_at={}", format_timestamp(run.created_at)),
        format!("updated_at={}", format_timestamp(run.updated_at)),
        format!("history_count={}", run.history.len()),
    ];
    for (index, entry) in run.history.iter().enumerate() {
        lines.push(format!(
            "history.{index}={}:{}->{}@{}",
            entry.step,
            entry.outcome,
            entry.next_step.as_deref().unwrap_or("end"),
            format_timestamp(entry.at)
        ));
    }
    lines.join("\n")
}

/// One line per run, used by `runs`.
pub fn render_run_summary(run: &RunState) -> String {
    format!(
        "run_id={} workflow={} status={} step={}",
        run.run_id, run.workflow_name, run.status, run.current_step
    )
}
