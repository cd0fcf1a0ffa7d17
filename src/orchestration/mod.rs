pub mod background;
pub mod catalog;
pub mod controller;
pub mod coverage;
pub mod error;
pub mod outcome;
pub mod registry;
pub mod run_lock;
pub mod run_store;
pub mod transitions;

pub use background::{LaunchContext, ProbeResult, ProcessHandle};
pub use controller::WorkflowController;
pub use error::OrchestratorError;
pub use outcome::{Outcome, OutcomeRecord};
pub use registry::{Transition, WorkflowDefinition, WorkflowRegistry};
pub use run_lock::RunLock;
pub use run_store::{HistoryEntry, RunState, RunStatus, WorkflowRunStore};
pub use transitions::{apply, decide, Action};
