use crate::orchestration::background::ProbeResult;
use crate::orchestration::outcome::Outcome;
use crate::orchestration::registry::WorkflowDefinition;
use crate::orchestration::run_store::{HistoryEntry, RunState, RunStatus};

pub const CRASHED_REASON: &str = "crashed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// The step is still executing; nothing to do this invocation.
    KeepWaiting,
    Advance { next_step: String, outcome: Outcome },
    Complete,
    /// The step asked for a human and no automated transition follows.
    AwaitInput,
    Fail { outcome: Outcome, reason: String },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::KeepWaiting => "keep_waiting",
            Action::Advance { .. } => "advance",
            Action::Complete => "complete",
            Action::AwaitInput => "await_input",
            Action::Fail { .. } => "fail",
        }
    }
}

/// Computes the next action for a running step. Pure: same inputs, same action.
pub fn decide(definition: &WorkflowDefinition, state: &RunState, probe: &ProbeResult) -> Action {
    match probe {
        ProbeResult::Running => Action::KeepWaiting,
        ProbeResult::Vanished => Action::Fail {
            outcome: Outcome::Crashed,
            reason: CRASHED_REASON.to_string(),
        },
        ProbeResult::Finished(record) => {
            decide_outcome(definition, &state.current_step, record.outcome, &record.detail)
        }
    }
}

fn decide_outcome(
    definition: &WorkflowDefinition,
    step: &str,
    outcome: Outcome,
    detail: &str,
) -> Action {
    // A terminal step ends the run only on success; any other outcome must be
    // routed by an explicit edge.
    if outcome == Outcome::Success && definition.is_terminal(step) {
        return Action::Complete;
    }
    if let Ok(next) = definition.next_step(step, outcome) {
        return Action::Advance {
            next_step: next.to_string(),
            outcome,
        };
    }
    if outcome.requires_human() {
        return Action::AwaitInput;
    }

    let mut reason = format!("step `{step}` finished with outcome `{outcome}` and no transition");
    if outcome == Outcome::Crashed {
        reason = CRASHED_REASON.to_string();
    } else if !detail.trim().is_empty() {
        reason.push_str(": ");
        reason.push_str(detail.trim());
    }
    Action::Fail { outcome, reason }
}

/// Applies `action` to the in-memory record. Launching the next step and
/// persisting stay with the caller.
pub fn apply(state: &mut RunState, action: &Action, now: i64) {
    let step = state.current_step.clone();
    match action {
        Action::KeepWaiting => return,
        Action::Advance { next_step, outcome } => {
            state.history.push(HistoryEntry {
                step,
                outcome: *outcome,
                next_step: Some(next_step.clone()),
                at: now,
            });
            state.current_step = next_step.clone();
            state.status = RunStatus::Running;
            state.last_error = None;
        }
        Action::Complete => {
            state.history.push(HistoryEntry {
                step,
                outcome: Outcome::Success,
                next_step: None,
                at: now,
            });
            state.status = RunStatus::Completed;
            state.last_error = None;
        }
        Action::AwaitInput => {
            state.history.push(HistoryEntry {
                step,
                outcome: Outcome::NeedsInput,
                next_step: None,
                at: now,
            });
            state.status = RunStatus::AwaitingInput;
        }
        Action::Fail { outcome, reason } => {
            state.history.push(HistoryEntry {
                step,
                outcome: *outcome,
                next_step: None,
                at: now,
            });
            state.status = RunStatus::Failed;
            state.last_error = Some(reason.clone());
        }
    }
    state.process_handle = None;
    state.updated_at = now;
}
