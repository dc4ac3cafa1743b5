use std::path::PathBuf;
use tracing::warn;

/// Ensures a sync job's temp directory is removed exactly once, whether the
/// run finished, failed, or was cancelled — the `Drop` impl is this crate's
/// equivalent of the source system's `finally: cleanup_sync_directory()`,
/// generalized from the teacher's graceful-shutdown signal handling (one
/// guaranteed cleanup action regardless of how the scope is exited).
pub struct SyncDirectoryGuard {
    dir: PathBuf,
}

impl SyncDirectoryGuard {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.dir
    }
}

impl Drop for SyncDirectoryGuard {
    fn drop(&mut self) {
        if !self.dir.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "failed to clean up sync job directory");
        }
    }
}
