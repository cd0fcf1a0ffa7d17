use crate::config::ConfigError;
use crate::orchestration::outcome::Outcome;
use crate::runtime::RuntimeError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("unknown workflow `{workflow}`")]
    UnknownWorkflow { workflow: String },
    #[error("workflow run `{run_id}` not found")]
    UnknownRun { run_id: String },
    #[error("workflow `{workflow}` defines no transition from step `{step}` on outcome `{outcome}`")]
    NoTransition {
        workflow: String,
        step: String,
        outcome: Outcome,
    },
    #[error("workflow `{workflow}` definition is invalid: {reason}")]
    InvalidWorkflowDefinition { workflow: String, reason: String },
    #[error("workflow `{workflow}` is already registered")]
    DuplicateWorkflow { workflow: String },
    #[error("failed to launch step `{step}` of run `{run_id}`: {reason}")]
    LaunchFailed {
        run_id: String,
        step: String,
        reason: String,
    },
    #[error("run id `{run_id}` already belongs to workflow `{workflow}`")]
    RunIdConflict { run_id: String, workflow: String },
    #[error("workflow run `{run_id}` is busy (locked by pid {holder_pid})")]
    RunBusy { run_id: String, holder_pid: u32 },
    #[error("no step command configured for `{workflow}.{step}`")]
    MissingStepCommand { workflow: String, step: String },
    #[error("invalid discriminator `{discriminator}`: {reason}")]
    InvalidDiscriminator {
        discriminator: String,
        reason: String,
    },
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl OrchestratorError {
    /// Errors worth retrying by re-invoking the same command later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::LaunchFailed { .. } | OrchestratorError::RunBusy { .. }
        )
    }
}

impl From<ConfigError> for OrchestratorError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

pub(crate) fn io_error(path: &std::path::Path, source: std::io::Error) -> OrchestratorError {
    OrchestratorError::Io {
        path: path.display().to_string(),
        source,
    }
}

pub(crate) fn json_error(path: &std::path::Path, source: serde_json::Error) -> OrchestratorError {
    OrchestratorError::Json {
        path: path.display().to_string(),
        source,
    }
}
