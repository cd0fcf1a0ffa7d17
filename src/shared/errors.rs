#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to create state path {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to resolve home directory for state root; set WAYPOINT_HOME or pass --state-root")]
    HomeDirectoryUnavailable,
    #[error("state root `{path}` must be an absolute path")]
    RelativeStateRoot { path: String },
}
