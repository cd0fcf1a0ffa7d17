use super::ConfigError;
use crate::orchestration::outcome::Outcome;
use crate::shared::ids::{validate_identifier_value, StepName, WorkflowName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// How to invoke one step implementation. `program`, `args`, env values and
/// `working_dir` may use `{run_id}`, `{workflow}`, `{step}`, `{discriminator}`,
/// `{outcome_path}`, `{payload_path}` and `{launch_dir}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StepCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl StepCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TransitionDeclaration {
    pub from: StepName,
    pub outcome: Outcome,
    pub to: StepName,
}

/// A workflow declared in `config.yaml` in addition to the built-in catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkflowDeclaration {
    pub name: WorkflowName,
    #[serde(default)]
    pub description: String,
    pub initial_step: StepName,
    #[serde(default)]
    pub transitions: Vec<TransitionDeclaration>,
    pub terminal_steps: Vec<StepName>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub default_step_command: Option<StepCommand>,
    /// Keyed by `<workflow>` or `<workflow>.<step>`.
    #[serde(default)]
    pub step_commands: BTreeMap<String, StepCommand>,
    #[serde(default)]
    pub workflows: Vec<WorkflowDeclaration>,
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(command) = &self.default_step_command {
            validate_command("default_step_command", command)?;
        }
        for (key, command) in &self.step_commands {
            let mut parts = key.splitn(2, '.');
            let workflow = parts.next().unwrap_or_default();
            validate_identifier_value("step_commands workflow", workflow)
                .map_err(|err| ConfigError::Settings(format!("`{key}`: {err}")))?;
            if let Some(step) = parts.next() {
                validate_identifier_value("step_commands step", step)
                    .map_err(|err| ConfigError::Settings(format!("`{key}`: {err}")))?;
            }
            validate_command(&format!("step_commands.{key}"), command)?;
        }
        Ok(())
    }

    /// Most specific wins: `<workflow>.<step>`, `<workflow>`, then the default.
    pub fn resolve_step_command(&self, workflow: &str, step: &str) -> Option<&StepCommand> {
        self.step_commands
            .get(&format!("{workflow}.{step}"))
            .or_else(|| self.step_commands.get(workflow))
            .or(self.default_step_command.as_ref())
    }
}

fn validate_command(label: &str, command: &StepCommand) -> Result<(), ConfigError> {
    if command.program.trim().is_empty() {
        return Err(ConfigError::Settings(format!(
            "`{label}.program` must be non-empty"
        )));
    }
    Ok(())
}
