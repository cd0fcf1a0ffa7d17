use crate::config::{load_settings, Settings};
use crate::orchestration::background::{self, LaunchContext, ProbeResult};
use crate::orchestration::error::OrchestratorError;
use crate::orchestration::registry::{WorkflowDefinition, WorkflowRegistry};
use crate::orchestration::run_store::{RunState, RunStatus, WorkflowRunStore};
use crate::orchestration::transitions::{apply, decide, Action};
use crate::runtime::{bootstrap_state_root, StatePaths};
use crate::shared::ids::derive_run_id;
use crate::shared::logging::{append_orchestrator_event, LogLevel};

/// Entry point for CLI commands. Every call is one synchronous
/// load, probe, decide, act, persist sequence; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct WorkflowController {
    registry: WorkflowRegistry,
    store: WorkflowRunStore,
    settings: Settings,
}

impl WorkflowController {
    pub fn new(registry: WorkflowRegistry, store: WorkflowRunStore, settings: Settings) -> Self {
        Self {
            registry,
            store,
            settings,
        }
    }

    /// Bootstraps `paths`, loads `config.yaml`, and registers every workflow.
    pub fn open(paths: StatePaths) -> Result<Self, OrchestratorError> {
        bootstrap_state_root(&paths)?;
        let settings = load_settings(&paths)?;
        let registry = WorkflowRegistry::from_settings(&settings)?;
        Ok(Self::new(registry, WorkflowRunStore::new(paths), settings))
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn store(&self) -> &WorkflowRunStore {
        &self.store
    }

    pub fn run_id_for(&self, workflow: &str, discriminator: &str) -> Result<String, OrchestratorError> {
        self.registry.lookup(workflow)?;
        derive_run_id(workflow, discriminator)
            .map(|run_id| run_id.as_str().to_string())
            .map_err(|reason| OrchestratorError::InvalidDiscriminator {
                discriminator: discriminator.to_string(),
                reason,
            })
    }

    /// Starts a run for `(workflow, discriminator)` or returns the live one.
    ///
    /// A run that is running or awaiting input is reused untouched. A missing,
    /// pending, completed, or failed run is replaced by a fresh one at the initial
    /// step. Nothing is persisted unless the first launch succeeds; a failed
    /// launch leaves the previous record and payload in place.
    pub fn start(
        &self,
        workflow: &str,
        discriminator: &str,
        payload: Option<&[u8]>,
        now: i64,
    ) -> Result<String, OrchestratorError> {
        let definition = self.registry.lookup(workflow)?;
        let run_id = self.run_id_for(workflow, discriminator)?;
        let _lock = self.store.lock(&run_id)?;

        let previous = self.store.try_load(&run_id)?;
        if let Some(existing) = &previous {
            if existing.workflow_name != definition.name() {
                return Err(OrchestratorError::RunIdConflict {
                    run_id,
                    workflow: existing.workflow_name.clone(),
                });
            }
            if matches!(existing.status, RunStatus::Running | RunStatus::AwaitingInput) {
                self.log(
                    LogLevel::Info,
                    "run.reuse",
                    &run_id,
                    &format!("status={} step={}", existing.status, existing.current_step),
                );
                return Ok(run_id);
            }
        }

        let mut state = RunState::new_pending(&run_id, definition, discriminator.trim(), now);
        // Launch directories keep counting across restarts of the same subject.
        state.launch_count = previous.as_ref().map_or(0, |run| run.launch_count);

        // The previous run's payload stays recoverable until the new launch succeeds.
        self.store.stash_payload(&run_id)?;
        let launched = match payload {
            Some(bytes) => self.store.write_payload(&run_id, bytes).map(|_| ()),
            None => Ok(()),
        }
        .and_then(|()| self.launch_current_step(&mut state, now));
        if let Err(err) = launched {
            if let Err(restore_err) = self.store.restore_payload(&run_id) {
                self.log(
                    LogLevel::Error,
                    "run.payload_restore_failed",
                    &run_id,
                    &restore_err.to_string(),
                );
            }
            return Err(err);
        }
        self.store.discard_stashed_payload(&run_id)?;
        self.store.save(&state)?;
        self.log(
            LogLevel::Info,
            "run.start",
            &run_id,
            &format!(
                "workflow={workflow} step={} restarted={}",
                state.current_step,
                previous.is_some()
            ),
        );
        Ok(run_id)
    }

    /// Moves a running run forward by at most one transition.
    pub fn advance(&self, run_id: &str, now: i64) -> Result<RunState, OrchestratorError> {
        self.ensure_run_exists(run_id)?;
        let _lock = self.store.lock(run_id)?;
        let state = self.store.load(run_id)?;
        if state.status != RunStatus::Running {
            return Ok(state);
        }

        let definition = self.registry.lookup(&state.workflow_name)?;
        let probe = match &state.process_handle {
            Some(handle) => background::probe(handle),
            None => ProbeResult::Vanished,
        };
        let action = decide(definition, &state, &probe);
        self.act(definition, state, action, now)
    }

    fn act(
        &self,
        definition: &WorkflowDefinition,
        state: RunState,
        action: Action,
        now: i64,
    ) -> Result<RunState, OrchestratorError> {
        if action == Action::KeepWaiting {
            return Ok(state);
        }

        let from_step = state.current_step.clone();
        let mut next = state;
        apply(&mut next, &action, now);
        if let Action::Advance { .. } = &action {
            // Launch before persisting so a failed spawn leaves the stored record
            // as it was and a retried advance repeats the same decision.
            self.launch_current_step(&mut next, now)?;
        }
        self.store.save(&next)?;

        let (level, event) = match &action {
            Action::Advance { .. } => (LogLevel::Info, "run.advance"),
            Action::Complete => (LogLevel::Info, "run.complete"),
            Action::AwaitInput => (LogLevel::Info, "run.awaiting_input"),
            Action::Fail { .. } => (LogLevel::Error, "run.fail"),
            Action::KeepWaiting => (LogLevel::Info, "run.wait"),
        };
        self.log(
            level,
            event,
            &next.run_id,
            &format!(
                "workflow={} action={} from={from_step} to={} status={} error={}",
                definition.name(),
                action.name(),
                next.current_step,
                next.status,
                next.last_error.as_deref().unwrap_or("none")
            ),
        );
        Ok(next)
    }

    /// Read-only view of a run.
    pub fn status(&self, run_id: &str) -> Result<RunState, OrchestratorError> {
        self.store.load(run_id)
    }

    /// Re-arms a run that is awaiting input by relaunching its current step.
    /// Any other status is returned unchanged.
    pub fn resume(&self, run_id: &str, now: i64) -> Result<RunState, OrchestratorError> {
        self.ensure_run_exists(run_id)?;
        let _lock = self.store.lock(run_id)?;
        let state = self.store.load(run_id)?;
        if state.status != RunStatus::AwaitingInput {
            return Ok(state);
        }
        self.registry.lookup(&state.workflow_name)?;

        let mut next = state;
        next.last_error = None;
        self.launch_current_step(&mut next, now)?;
        self.store.save(&next)?;
        self.log(
            LogLevel::Info,
            "run.resume",
            run_id,
            &format!("step={}", next.current_step),
        );
        Ok(next)
    }

    pub fn list(&self, workflow: Option<&str>) -> Result<Vec<RunState>, OrchestratorError> {
        if let Some(name) = workflow {
            self.registry.lookup(name)?;
        }
        self.store.list_runs(workflow)
    }

    /// Removes a run record. A still-running step process is not terminated.
    pub fn clear(&self, run_id: &str) -> Result<RunState, OrchestratorError> {
        self.ensure_run_exists(run_id)?;
        let _lock = self.store.lock(run_id)?;
        let state = self.store.load(run_id)?;
        self.store.delete(run_id)?;
        self.log(
            LogLevel::Info,
            "run.clear",
            run_id,
            &format!("status={} step={}", state.status, state.current_step),
        );
        Ok(state)
    }

    fn launch_current_step(&self, state: &mut RunState, now: i64) -> Result<(), OrchestratorError> {
        let command = self
            .settings
            .resolve_step_command(&state.workflow_name, &state.current_step)
            .ok_or_else(|| OrchestratorError::MissingStepCommand {
                workflow: state.workflow_name.clone(),
                step: state.current_step.clone(),
            })?;
        let launch = state.launch_count.saturating_add(1);
        let context = LaunchContext {
            run_id: state.run_id.clone(),
            workflow: state.workflow_name.clone(),
            step: state.current_step.clone(),
            discriminator: state.discriminator.clone(),
            launch_dir: self
                .store
                .paths()
                .launch_dir(&state.run_id, launch, &state.current_step),
            payload_path: self.store.payload_path(&state.run_id),
        };

        let handle = match background::launch(command, &context, now) {
            Ok(handle) => handle,
            Err(err) => {
                self.log(
                    LogLevel::Error,
                    "step.launch_failed",
                    &state.run_id,
                    &format!("step={} error={err}", state.current_step),
                );
                return Err(err);
            }
        };
        self.log(
            LogLevel::Info,
            "step.launch",
            &state.run_id,
            &format!(
                "step={} launch={launch} pid={}",
                state.current_step, handle.pid
            ),
        );

        state.process_handle = Some(handle);
        state.launch_count = launch;
        state.status = RunStatus::Running;
        state.updated_at = now;
        Ok(())
    }

    // Caller mistakes surface before any lock file is created.
    fn ensure_run_exists(&self, run_id: &str) -> Result<(), OrchestratorError> {
        match self.store.try_load(run_id)? {
            Some(_) => Ok(()),
            None => Err(OrchestratorError::UnknownRun {
                run_id: run_id.to_string(),
            }),
        }
    }

    fn log(&self, level: LogLevel, event: &str, run_id: &str, message: &str) {
        append_orchestrator_event(self.store.state_root(), level, event, Some(run_id), message);
    }
}
