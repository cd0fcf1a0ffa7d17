use crate::orchestration::error::OrchestratorError;
use crate::orchestration::outcome::Outcome;
use crate::orchestration::registry::{Transition, WorkflowDefinition, WorkflowRegistry};

pub const PULL_REQUEST_REVIEW: &str = "pull-request-review";
pub const WORK_ON_JIRA_ISSUE: &str = "work-on-jira-issue";
pub const CREATE_JIRA_ISSUE: &str = "create-jira-issue";
pub const SUMMARIZE_PULL_REQUEST: &str = "summarize-pull-request";

pub fn register_builtin_workflows(registry: &mut WorkflowRegistry) -> Result<(), OrchestratorError> {
    registry.register(pull_request_review()?)?;
    registry.register(work_on_jira_issue()?)?;
    registry.register(
        WorkflowDefinition::single_step(CREATE_JIRA_ISSUE, "initiate")?
            .with_description("Draft and file a Jira issue from the supplied payload"),
    )?;
    registry.register(
        WorkflowDefinition::single_step(SUMMARIZE_PULL_REQUEST, "summarize")?
            .with_description("Summarize a pull request diff for reviewers"),
    )?;
    Ok(())
}

fn pull_request_review() -> Result<WorkflowDefinition, OrchestratorError> {
    Ok(WorkflowDefinition::new(
        PULL_REQUEST_REVIEW,
        "retrieve-threads",
        vec![
            Transition::new("retrieve-threads", Outcome::Success, "build-prompts"),
            Transition::new("build-prompts", Outcome::Success, "await-review"),
            Transition::new("await-review", Outcome::Approved, "done"),
            Transition::new("await-review", Outcome::Rejected, "build-prompts"),
        ],
        ["done"],
    )?
    .with_description("Collect review threads, build review prompts, and wait for a verdict"))
}

// `retrieve` gathers the issue before planning starts. It is the initial step so
// every run records it in history instead of running it out of band.
fn work_on_jira_issue() -> Result<WorkflowDefinition, OrchestratorError> {
    Ok(WorkflowDefinition::new(
        WORK_ON_JIRA_ISSUE,
        "retrieve",
        vec![
            Transition::new("retrieve", Outcome::Success, "plan"),
            Transition::new("plan", Outcome::Success, "implement"),
            Transition::new("implement", Outcome::Success, "open-pull-request"),
            Transition::new("implement", Outcome::Rejected, "plan"),
            Transition::new("open-pull-request", Outcome::Success, "done"),
        ],
        ["done"],
    )?
    .with_description("Retrieve a Jira issue, plan, implement, and open a pull request"))
}
