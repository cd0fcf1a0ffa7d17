use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;
use waypoint::config::{Settings, StepCommand};
use waypoint::orchestration::background::{probe, ProbeResult};
use waypoint::orchestration::catalog::{
    CREATE_JIRA_ISSUE, PULL_REQUEST_REVIEW, SUMMARIZE_PULL_REQUEST, WORK_ON_JIRA_ISSUE,
};
use waypoint::orchestration::{
    Outcome, OrchestratorError, RunState, RunStatus, WorkflowController, WorkflowRegistry,
    WorkflowRunStore,
};
use waypoint::runtime::{bootstrap_state_root, StatePaths};
use waypoint::shared::logging::orchestrator_log_path;

const NOW: i64 = 1_700_000_000;

fn sh(script: &str) -> StepCommand {
    StepCommand::new("sh", ["-c", script])
}

fn emit(outcome: &str) -> StepCommand {
    sh(&format!(
        "printf '{{\"outcome\":\"{outcome}\"}}' > \"$WAYPOINT_OUTCOME_PATH\""
    ))
}

fn settings_with(commands: &[(&str, StepCommand)]) -> Settings {
    let mut settings = Settings::default();
    for (key, command) in commands {
        settings
            .step_commands
            .insert((*key).to_string(), command.clone());
    }
    settings
}

fn controller(root: &Path, settings: Settings) -> WorkflowController {
    let paths = StatePaths::new(root);
    bootstrap_state_root(&paths).expect("bootstrap");
    let registry = WorkflowRegistry::from_settings(&settings).expect("registry");
    WorkflowController::new(registry, WorkflowRunStore::new(paths), settings)
}

fn wait_for_step(controller: &WorkflowController, run_id: &str) {
    let state = controller.status(run_id).expect("status");
    let Some(handle) = state.process_handle else {
        return;
    };
    let deadline = Instant::now() + Duration::from_secs(10);
    while probe(&handle) == ProbeResult::Running {
        assert!(Instant::now() < deadline, "step of {run_id} never finished");
        thread::sleep(Duration::from_millis(20));
    }
}

/// Advances until the run leaves `running`.
fn drive(controller: &WorkflowController, run_id: &str) -> RunState {
    for tick in 0..32 {
        wait_for_step(controller, run_id);
        let state = controller.advance(run_id, NOW + tick + 1).expect("advance");
        if state.status != RunStatus::Running {
            return state;
        }
    }
    panic!("run {run_id} did not settle");
}

#[test]
fn review_workflow_runs_to_completion() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(
        dir.path(),
        settings_with(&[
            (PULL_REQUEST_REVIEW, emit("success")),
            ("pull-request-review.await-review", emit("approved")),
        ]),
    );

    let run_id = controller
        .start(PULL_REQUEST_REVIEW, "42", None, NOW)
        .expect("start");
    assert_eq!(run_id, "pull-request-review--42");
    let started = controller.status(&run_id).expect("status");
    assert_eq!(started.status, RunStatus::Running);
    assert_eq!(started.current_step, "retrieve-threads");

    let state = drive(&controller, &run_id);
    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.current_step, "done");
    let steps = state
        .history
        .iter()
        .map(|entry| (entry.step.as_str(), entry.outcome))
        .collect::<Vec<_>>();
    assert_eq!(
        steps,
        vec![
            ("retrieve-threads", Outcome::Success),
            ("build-prompts", Outcome::Success),
            ("await-review", Outcome::Approved),
            ("done", Outcome::Success),
        ]
    );
    assert_eq!(state.launch_count, 4);
    let definition = controller
        .registry()
        .lookup(PULL_REQUEST_REVIEW)
        .expect("definition");
    state.check_invariants(definition).expect("invariants");
}

#[test]
fn one_advance_moves_exactly_one_step() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(
        dir.path(),
        settings_with(&[
            ("pull-request-review.retrieve-threads", emit("success")),
            ("pull-request-review.build-prompts", sh("sleep 5")),
        ]),
    );
    let run_id = controller
        .start(PULL_REQUEST_REVIEW, "43", None, NOW)
        .expect("start");
    wait_for_step(&controller, &run_id);

    let state = controller.advance(&run_id, NOW + 1).expect("advance");
    assert_eq!(state.status, RunStatus::Running);
    assert_eq!(state.current_step, "build-prompts");
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].step, "retrieve-threads");
    assert_eq!(state.history[0].outcome, Outcome::Success);
    assert_eq!(state.history[0].at, NOW + 1);
    assert_eq!(controller.status(&run_id).expect("persisted"), state);

    let again = controller.advance(&run_id, NOW + 2).expect("advance");
    assert_eq!(again, state);
}

#[test]
fn start_reuses_a_live_run() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(dir.path(), settings_with(&[("summarize-pull-request", sh("sleep 5"))]));

    let first = controller
        .start(SUMMARIZE_PULL_REQUEST, "7", None, NOW)
        .expect("first start");
    let before = controller.status(&first).expect("status");
    let second = controller
        .start(SUMMARIZE_PULL_REQUEST, " 7 ", None, NOW + 10)
        .expect("second start");

    assert_eq!(first, second);
    let after = controller.status(&second).expect("status");
    assert_eq!(before, after);
    assert_eq!(after.launch_count, 1);
}

#[test]
fn advance_keeps_waiting_while_the_step_runs() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(dir.path(), settings_with(&[(CREATE_JIRA_ISSUE, sh("sleep 5"))]));
    let run_id = controller
        .start(CREATE_JIRA_ISSUE, "PROJ-1", None, NOW)
        .expect("start");

    let before = controller.status(&run_id).expect("status");
    let after = controller.advance(&run_id, NOW + 5).expect("advance");
    assert_eq!(before, after);
}

#[test]
fn crashed_step_fails_the_run() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(dir.path(), settings_with(&[(WORK_ON_JIRA_ISSUE, sh("exit 3"))]));
    let run_id = controller
        .start(WORK_ON_JIRA_ISSUE, "PROJ-9", None, NOW)
        .expect("start");

    let state = drive(&controller, &run_id);
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.last_error.as_deref(), Some("crashed"));
    assert_eq!(state.current_step, "retrieve");
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].outcome, Outcome::Crashed);
    assert!(state.process_handle.is_none());
}

#[test]
fn outcome_without_transition_fails_the_run() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(
        dir.path(),
        settings_with(&[(PULL_REQUEST_REVIEW, emit("rejected"))]),
    );
    let run_id = controller
        .start(PULL_REQUEST_REVIEW, "13", None, NOW)
        .expect("start");

    let state = drive(&controller, &run_id);
    assert_eq!(state.status, RunStatus::Failed);
    let error = state.last_error.expect("error");
    assert!(error.contains("retrieve-threads"), "{error}");
    assert!(error.contains("no transition"), "{error}");
}

#[test]
fn failed_first_launch_persists_nothing() {
    let dir = tempdir().expect("tempdir");
    let mut settings = Settings::default();
    settings.default_step_command = Some(StepCommand::new(
        "/nonexistent/waypoint-step",
        Vec::<String>::new(),
    ));
    let controller = controller(dir.path(), settings);

    let err = controller
        .start(SUMMARIZE_PULL_REQUEST, "5", None, NOW)
        .expect_err("launch fails");
    assert!(matches!(err, OrchestratorError::LaunchFailed { .. }), "{err}");
    assert!(err.is_retryable());
    assert!(controller
        .store()
        .try_load("summarize-pull-request--5")
        .expect("load")
        .is_none());
    assert!(!controller
        .store()
        .paths()
        .run_lock_path("summarize-pull-request--5")
        .exists());
}

#[test]
fn failed_next_launch_leaves_the_record_untouched() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(
        dir.path(),
        settings_with(&[
            ("pull-request-review.retrieve-threads", emit("success")),
            (
                "pull-request-review.build-prompts",
                StepCommand::new("/nonexistent/waypoint-step", Vec::<String>::new()),
            ),
        ]),
    );
    let run_id = controller
        .start(PULL_REQUEST_REVIEW, "77", None, NOW)
        .expect("start");
    wait_for_step(&controller, &run_id);
    let before = controller.status(&run_id).expect("status");

    for tick in 1..=2 {
        let err = controller
            .advance(&run_id, NOW + tick)
            .expect_err("launch fails");
        assert!(matches!(err, OrchestratorError::LaunchFailed { ref step, .. } if step == "build-prompts"));
        assert_eq!(controller.status(&run_id).expect("status"), before);
    }
}

#[test]
fn missing_step_command_is_reported() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(dir.path(), Settings::default());
    let err = controller
        .start(CREATE_JIRA_ISSUE, "PROJ-2", None, NOW)
        .expect_err("no command");
    assert!(matches!(
        err,
        OrchestratorError::MissingStepCommand { ref workflow, ref step }
            if workflow == CREATE_JIRA_ISSUE && step == "initiate"
    ));
}

#[test]
fn busy_run_is_rejected_without_changes() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(dir.path(), settings_with(&[(CREATE_JIRA_ISSUE, emit("success"))]));
    let run_id = controller
        .start(CREATE_JIRA_ISSUE, "PROJ-3", None, NOW)
        .expect("start");
    wait_for_step(&controller, &run_id);
    let before = controller.status(&run_id).expect("status");

    let guard = controller.store().lock(&run_id).expect("hold lock");
    let err = controller.advance(&run_id, NOW + 1).expect_err("busy");
    assert!(matches!(err, OrchestratorError::RunBusy { .. }), "{err}");
    let err = controller
        .start(CREATE_JIRA_ISSUE, "PROJ-3", None, NOW + 1)
        .expect_err("busy");
    assert!(matches!(err, OrchestratorError::RunBusy { .. }), "{err}");
    assert_eq!(controller.status(&run_id).expect("status"), before);
    drop(guard);

    let state = controller.advance(&run_id, NOW + 2).expect("advance");
    assert_eq!(state.status, RunStatus::Completed);
}

#[test]
fn terminal_runs_do_not_change_on_advance() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(dir.path(), settings_with(&[(SUMMARIZE_PULL_REQUEST, emit("success"))]));
    let run_id = controller
        .start(SUMMARIZE_PULL_REQUEST, "8", None, NOW)
        .expect("start");
    let completed = drive(&controller, &run_id);
    assert_eq!(completed.status, RunStatus::Completed);

    for tick in 100..103 {
        assert_eq!(controller.advance(&run_id, NOW + tick).expect("advance"), completed);
    }
    assert_eq!(controller.resume(&run_id, NOW + 200).expect("resume"), completed);
}

#[test]
fn start_after_completion_begins_a_fresh_run() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(dir.path(), settings_with(&[(SUMMARIZE_PULL_REQUEST, emit("success"))]));
    let run_id = controller
        .start(SUMMARIZE_PULL_REQUEST, "9", None, NOW)
        .expect("start");
    drive(&controller, &run_id);

    let again = controller
        .start(SUMMARIZE_PULL_REQUEST, "9", None, NOW + 50)
        .expect("restart");
    assert_eq!(again, run_id);
    let state = controller.status(&run_id).expect("status");
    assert_eq!(state.status, RunStatus::Running);
    assert!(state.history.is_empty());
    assert_eq!(state.launch_count, 2);
    assert_eq!(state.created_at, NOW + 50);
    let handle = state.process_handle.expect("handle");
    assert!(handle.launch_dir.ends_with("launches/0002-summarize"));
}

#[test]
fn rejected_implementation_loops_back_to_planning() {
    let dir = tempdir().expect("tempdir");
    let marker = dir.path().join("implemented-once");
    let implement = sh(&format!(
        "if [ -f '{marker}' ]; then o=success; else touch '{marker}'; o=rejected; fi; \
         printf '{{\"outcome\":\"%s\"}}' \"$o\" > \"$WAYPOINT_OUTCOME_PATH\"",
        marker = marker.display()
    ));
    let controller = controller(
        dir.path(),
        settings_with(&[
            (WORK_ON_JIRA_ISSUE, emit("success")),
            ("work-on-jira-issue.implement", implement),
        ]),
    );
    let run_id = controller
        .start(WORK_ON_JIRA_ISSUE, "PROJ-11", None, NOW)
        .expect("start");

    let state = drive(&controller, &run_id);
    assert_eq!(state.status, RunStatus::Completed);
    let path = state
        .history
        .iter()
        .map(|entry| entry.step.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        path,
        vec![
            "retrieve",
            "plan",
            "implement",
            "plan",
            "implement",
            "open-pull-request",
            "done"
        ]
    );
    assert_eq!(state.history[2].outcome, Outcome::Rejected);
    assert_eq!(state.history[2].next_step.as_deref(), Some("plan"));
}

#[test]
fn needs_input_waits_for_resume() {
    let dir = tempdir().expect("tempdir");
    let approval = dir.path().join("approved");
    let initiate = sh(&format!(
        "if [ -f '{approval}' ]; then o=success; else o=needs-input; fi; \
         printf '{{\"outcome\":\"%s\"}}' \"$o\" > \"$WAYPOINT_OUTCOME_PATH\"",
        approval = approval.display()
    ));
    let controller = controller(dir.path(), settings_with(&[(CREATE_JIRA_ISSUE, initiate)]));
    let run_id = controller
        .start(CREATE_JIRA_ISSUE, "PROJ-4", None, NOW)
        .expect("start");

    let waiting = drive(&controller, &run_id);
    assert_eq!(waiting.status, RunStatus::AwaitingInput);
    assert_eq!(waiting.history.last().map(|e| e.outcome), Some(Outcome::NeedsInput));
    assert_eq!(
        controller.advance(&run_id, NOW + 100).expect("advance"),
        waiting
    );
    // A start on an awaiting run is a reuse, not a restart.
    controller
        .start(CREATE_JIRA_ISSUE, "PROJ-4", None, NOW + 101)
        .expect("reuse");
    assert_eq!(controller.status(&run_id).expect("status"), waiting);

    fs::write(&approval, "yes").expect("approve");
    let resumed = controller.resume(&run_id, NOW + 102).expect("resume");
    assert_eq!(resumed.status, RunStatus::Running);
    assert_eq!(resumed.launch_count, 2);

    let done = drive(&controller, &run_id);
    assert_eq!(done.status, RunStatus::Completed);
    assert_eq!(done.history.len(), 2);
}

#[test]
fn payload_is_visible_to_steps() {
    let dir = tempdir().expect("tempdir");
    let step = sh(
        "cp \"$WAYPOINT_PAYLOAD_PATH\" \"$WAYPOINT_LAUNCH_DIR/seen\" && \
         printf '{\"outcome\":\"success\"}' > \"$WAYPOINT_OUTCOME_PATH\"",
    );
    let controller = controller(dir.path(), settings_with(&[(CREATE_JIRA_ISSUE, step)]));
    let run_id = controller
        .start(CREATE_JIRA_ISSUE, "PROJ-5", Some(b"{\"summary\":\"fix login\"}".as_slice()), NOW)
        .expect("start");

    let state = drive(&controller, &run_id);
    assert_eq!(state.status, RunStatus::Completed);
    let seen = controller
        .store()
        .paths()
        .launch_dir(&run_id, 1, "initiate")
        .join("seen");
    assert_eq!(
        fs::read_to_string(seen).expect("payload copy"),
        "{\"summary\":\"fix login\"}"
    );
}

#[test]
fn list_filters_by_workflow() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(dir.path(), settings_with(&[]).with_default(sh("sleep 5")));
    controller
        .start(SUMMARIZE_PULL_REQUEST, "1", None, NOW)
        .expect("start");
    controller
        .start(CREATE_JIRA_ISSUE, "PROJ-6", None, NOW)
        .expect("start");

    let all = controller.list(None).expect("list");
    assert_eq!(
        all.iter().map(|run| run.run_id.as_str()).collect::<Vec<_>>(),
        vec!["create-jira-issue--PROJ-6", "summarize-pull-request--1"]
    );
    let filtered = controller.list(Some(SUMMARIZE_PULL_REQUEST)).expect("list");
    assert_eq!(filtered.len(), 1);
    let err = controller.list(Some("unknown-flow")).expect_err("unknown");
    assert!(matches!(err, OrchestratorError::UnknownWorkflow { .. }));
}

#[test]
fn clear_removes_the_record_and_its_artifacts() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(dir.path(), settings_with(&[(SUMMARIZE_PULL_REQUEST, emit("success"))]));
    let run_id = controller
        .start(SUMMARIZE_PULL_REQUEST, "10", Some(b"diff".as_slice()), NOW)
        .expect("start");
    drive(&controller, &run_id);

    let cleared = controller.clear(&run_id).expect("clear");
    assert_eq!(cleared.status, RunStatus::Completed);
    let paths = controller.store().paths();
    assert!(!paths.run_record_path(&run_id).exists());
    assert!(!paths.run_dir(&run_id).exists());
    assert!(matches!(
        controller.clear(&run_id),
        Err(OrchestratorError::UnknownRun { .. })
    ));
}

#[test]
fn unknown_names_are_rejected_without_side_effects() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(dir.path(), settings_with(&[]).with_default(emit("success")));

    let err = controller
        .start("deploy-service", "1", None, NOW)
        .expect_err("unknown workflow");
    assert!(matches!(err, OrchestratorError::UnknownWorkflow { .. }));
    for result in [
        controller.status("deploy-service--1"),
        controller.advance("deploy-service--1", NOW),
        controller.resume("deploy-service--1", NOW),
    ] {
        assert!(matches!(result, Err(OrchestratorError::UnknownRun { .. })));
    }
    let entries = fs::read_dir(controller.store().paths().runs_dir())
        .expect("runs dir")
        .count();
    assert_eq!(entries, 0);
}

#[test]
fn lifecycle_events_are_logged() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(dir.path(), settings_with(&[(SUMMARIZE_PULL_REQUEST, emit("success"))]));
    let run_id = controller
        .start(SUMMARIZE_PULL_REQUEST, "12", None, NOW)
        .expect("start");
    drive(&controller, &run_id);

    let log = fs::read_to_string(orchestrator_log_path(dir.path())).expect("log");
    for event in ["run.start", "step.launch", "run.complete"] {
        assert!(
            log.contains(&format!("\"event\":\"{event}\"")),
            "missing {event} in:\n{log}"
        );
    }
    assert!(log.contains(&run_id));
}

trait WithDefault {
    fn with_default(self, command: StepCommand) -> Self;
}

impl WithDefault for Settings {
    fn with_default(mut self, command: StepCommand) -> Self {
        self.default_step_command = Some(command);
        self
    }
}

#[test]
fn failed_restart_keeps_the_previous_run_and_payload() {
    let dir = tempdir().expect("tempdir");
    let working = controller(dir.path(), settings_with(&[(CREATE_JIRA_ISSUE, emit("success"))]));
    let run_id = working
        .start(CREATE_JIRA_ISSUE, "P-1", Some(b"original".as_slice()), NOW)
        .expect("start");
    let completed = drive(&working, &run_id);
    assert_eq!(completed.status, RunStatus::Completed);

    let mut broken = Settings::default();
    broken.default_step_command = Some(StepCommand::new(
        "/nonexistent/waypoint-step",
        Vec::<String>::new(),
    ));
    let broken = controller(dir.path(), broken);
    let paths = broken.store().paths().clone();
    for payload in [Some(b"new".as_slice()), None] {
        let err = broken
            .start(CREATE_JIRA_ISSUE, "P-1", payload, NOW + 100)
            .expect_err("launch fails");
        assert!(matches!(err, OrchestratorError::LaunchFailed { .. }), "{err}");
        assert_eq!(broken.status(&run_id).expect("status"), completed);
        assert_eq!(
            fs::read(paths.payload_path(&run_id)).expect("payload"),
            b"original"
        );
        assert!(!paths.stashed_payload_path(&run_id).exists());
    }
}

#[test]
fn restart_without_payload_drops_the_old_one() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(dir.path(), settings_with(&[(CREATE_JIRA_ISSUE, emit("success"))]));
    let run_id = controller
        .start(CREATE_JIRA_ISSUE, "P-2", Some(b"first".as_slice()), NOW)
        .expect("start");
    drive(&controller, &run_id);

    controller
        .start(CREATE_JIRA_ISSUE, "P-2", None, NOW + 10)
        .expect("restart");
    let paths = controller.store().paths();
    assert!(!paths.payload_path(&run_id).exists());
    assert!(!paths.stashed_payload_path(&run_id).exists());
}

#[test]
fn path_like_run_ids_are_unknown_runs() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("state");
    let controller = controller(&root, settings_with(&[]).with_default(emit("success")));
    let victim_dir = dir.path().join("victim");
    fs::create_dir_all(&victim_dir).expect("victim dir");
    fs::write(victim_dir.join("important.txt"), "keep").expect("victim file");
    let registry = WorkflowRegistry::with_builtin_workflows().expect("catalog");
    let mut victim = RunState::new_pending(
        "victim",
        registry.lookup(SUMMARIZE_PULL_REQUEST).expect("workflow"),
        "1",
        NOW,
    );
    victim.status = RunStatus::Completed;
    fs::write(
        dir.path().join("victim.json"),
        serde_json::to_vec(&victim).expect("json"),
    )
    .expect("victim record");

    let run_id = "../../victim";
    assert!(matches!(
        controller.clear(run_id),
        Err(OrchestratorError::UnknownRun { .. })
    ));
    for result in [
        controller.status(run_id),
        controller.advance(run_id, NOW),
        controller.resume(run_id, NOW),
    ] {
        assert!(matches!(result, Err(OrchestratorError::UnknownRun { .. })));
    }
    assert!(victim_dir.join("important.txt").is_file());
    assert!(dir.path().join("victim.json").is_file());
}

#[test]
fn start_refuses_a_record_owned_by_another_workflow() {
    let dir = tempdir().expect("tempdir");
    let controller = controller(dir.path(), settings_with(&[]).with_default(emit("success")));
    let registry = WorkflowRegistry::with_builtin_workflows().expect("catalog");
    let mut foreign = RunState::new_pending(
        "summarize-pull-request--1",
        registry.lookup(CREATE_JIRA_ISSUE).expect("workflow"),
        "1",
        NOW,
    );
    foreign.status = RunStatus::Completed;
    controller.store().save(&foreign).expect("save");

    let err = controller
        .start(SUMMARIZE_PULL_REQUEST, "1", None, NOW + 1)
        .expect_err("conflict");
    assert!(
        matches!(&err, OrchestratorError::RunIdConflict { workflow, .. } if workflow == CREATE_JIRA_ISSUE),
        "{err}"
    );
    assert_eq!(
        controller.status("summarize-pull-request--1").expect("status"),
        foreign
    );
}
