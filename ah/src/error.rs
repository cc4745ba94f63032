//! Error taxonomy for the rendezvous engine
//!
//! Every failure an `ask` call can surface is a distinct variant so the
//! protocol layer can map them to stable error codes.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the ask-human engine
#[derive(Debug, Error)]
pub enum AskError {
    /// Question or context text exceeds its configured ceiling.
    /// Rejected before any side effect.
    #[error("{field} too long: {len} chars (max {max})")]
    InputTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Too many questions are already waiting for answers.
    /// Rejected before any side effect.
    #[error("too many pending questions: {pending} (max {max})")]
    TooManyPending { pending: usize, max: usize },

    /// The artifact append lock is held by someone else.
    /// Surfaced immediately; retry policy belongs to the caller.
    #[error("ask file is locked: {}", path.display())]
    LockContention { path: PathBuf },

    /// Reading, writing, or renaming the artifact failed.
    #[error("ask file access failed: {message}")]
    ArtifactIo {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// The artifact has grown past the configured size ceiling.
    #[error("ask file too large: {size} bytes (max {max})")]
    ArtifactTooLarge { size: u64, max: u64 },

    /// No answer arrived within the configured wait duration.
    #[error("no answer received for question {id} within {timeout:?}")]
    Timeout { id: String, timeout: Duration },

    /// The process is stopping; not a caller mistake.
    #[error("server is shutting down")]
    Shutdown,

    /// The filesystem watch could not be established at construction time.
    #[error("failed to start file watcher: {0}")]
    WatchInit(#[from] notify::Error),
}

impl AskError {
    /// Wrap an io::Error with a short description of the failed operation
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::ArtifactIo {
            message: message.into(),
            source,
        }
    }
}
