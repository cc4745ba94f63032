//! Advisory sentinel lock for artifact appends
//!
//! The lock is a sibling file created with create-exclusive semantics. Its
//! existence is externally observable: a human (or a second process that
//! respects the convention) can see that an append is in progress. A crash
//! can leave the lock file behind; cleanup is manual, there is no staleness
//! timeout.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::AskError;

/// Exclusive advisory lock scoped to an artifact path
///
/// Acquired via [`PathLock::acquire`], released on drop. Release happens on
/// both success and failure paths of the caller.
#[derive(Debug)]
pub struct PathLock {
    lock_path: PathBuf,
    file: Option<File>,
}

impl PathLock {
    /// Acquire the lock for `artifact_path`
    ///
    /// Fails with [`AskError::LockContention`] if the lock file already
    /// exists. Contention is never retried here; retry policy belongs to
    /// the caller.
    pub fn acquire(artifact_path: &Path) -> Result<Self, AskError> {
        let lock_path = lock_path_for(artifact_path);

        match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(file) => {
                debug!(path = %lock_path.display(), "Acquired artifact lock");
                Ok(Self {
                    lock_path,
                    file: Some(file),
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(AskError::LockContention {
                path: lock_path.clone(),
            }),
            Err(e) => Err(AskError::io(
                format!("failed to create lock file {}", lock_path.display()),
                e,
            )),
        }
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        // Close the handle before removing; Windows refuses to delete open files
        drop(self.file.take());

        if let Err(e) = fs::remove_file(&self.lock_path) {
            warn!(path = %self.lock_path.display(), error = %e, "Failed to remove lock file");
        } else {
            debug!(path = %self.lock_path.display(), "Released artifact lock");
        }
    }
}

fn lock_path_for(artifact_path: &Path) -> PathBuf {
    let mut os_string = artifact_path.as_os_str().to_os_string();
    os_string.push(".lock");
    PathBuf::from(os_string)
}
