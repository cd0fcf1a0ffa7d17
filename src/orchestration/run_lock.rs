use crate::orchestration::error::{io_error, OrchestratorError};
use crate::runtime::StatePaths;
use crate::shared::logging::{append_orchestrator_event, LogLevel};
use fd_lock::RwLock;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const MAX_CLAIM_ATTEMPTS: usize = 8;

/// Exclusive claim on one run, held as an OS advisory lock on `<run_id>.lock`.
///
/// The kernel drops the lock when the holder exits, so a lock file left by a
/// dead process is taken over without any pid bookkeeping. A second claimant
/// fails fast with `RunBusy`. The file body carries the holder pid for
/// diagnostics only. Dropping the guard removes the file and releases the lock.
pub struct RunLock {
    path: PathBuf,
    run_id: String,
    // Closing this file releases the advisory lock.
    _file: RwLock<File>,
}

impl RunLock {
    pub fn acquire(paths: &StatePaths, run_id: &str) -> Result<Self, OrchestratorError> {
        let path = paths.run_lock_path(run_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let file = fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| io_error(&path, e))?;
            let mut lock = RwLock::new(file);
            let mut guard = match lock.try_write() {
                Ok(guard) => guard,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Err(OrchestratorError::RunBusy {
                        run_id: run_id.to_string(),
                        holder_pid: read_holder_pid(&path).unwrap_or(0),
                    })
                }
                Err(err) => return Err(io_error(&path, err)),
            };

            // A releasing holder unlinks the file; a lock on that orphaned inode
            // excludes nobody, so claim the current file instead.
            if !is_current_file(&guard, &path) {
                continue;
            }

            let previous = read_holder_pid(&path);
            guard.set_len(0).map_err(|e| io_error(&path, e))?;
            guard
                .write_all(std::process::id().to_string().as_bytes())
                .and_then(|()| guard.sync_all())
                .map_err(|e| io_error(&path, e))?;
            // The lock lives as long as the open file, not the guard.
            std::mem::forget(guard);

            if let Some(pid) = previous {
                append_orchestrator_event(
                    &paths.root,
                    LogLevel::Warn,
                    "lock.reclaimed",
                    Some(run_id),
                    &format!("lock file left by pid {pid}"),
                );
            }
            return Ok(Self {
                path,
                run_id: run_id.to_string(),
                _file: lock,
            });
        }

        Err(OrchestratorError::RunBusy {
            run_id: run_id.to_string(),
            holder_pid: read_holder_pid(&path).unwrap_or(0),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock")
            .field("path", &self.path)
            .field("run_id", &self.run_id)
            .finish()
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Unlink while still locked; claimants racing on the old inode retry.
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(unix)]
fn is_current_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_current_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

fn read_holder_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse::<u32>().ok()
}
