pub mod process;
pub mod state_paths;

pub use crate::shared::errors::RuntimeError;
pub use process::{is_process_alive, process_start_ticks};
pub use state_paths::{
    bootstrap_state_root, default_state_root_path, resolve_state_root, StatePaths,
    DEFAULT_STATE_ROOT_DIR, STATE_ROOT_ENV,
};
