//! Process-wide reconcile lock

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{EdgeManageError, Result};

/// Exclusive advisory lock on the shared lock file, released on drop.
///
/// Every process reconciling the same segment directory must use the same
/// lock path.
#[derive(Debug)]
pub struct ReconcileLock {
    file: File,
    path: PathBuf,
}

impl ReconcileLock {
    /// Take the lock without blocking. Contention is reported as
    /// [`EdgeManageError::LockUnavailable`]; the caller decides whether to
    /// try again later.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| EdgeManageError::persistence(&path, e))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!(path = %path.display(), "Acquired reconcile lock");
                Ok(Self { file, path })
            }
            Err(e) if is_contended(&e) => {
                warn!(path = %path.display(), "Reconcile lock is held elsewhere");
                Err(EdgeManageError::LockUnavailable { path })
            }
            Err(e) => Err(EdgeManageError::persistence(&path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for ReconcileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release reconcile lock");
        } else {
            debug!(path = %self.path.display(), "Released reconcile lock");
        }
    }
}
