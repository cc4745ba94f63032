//! Durable read/write of the shared markdown artifact
//!
//! Writers never observe a partially-written file: every write lands in a
//! temporary sibling first and is moved over the target with an atomic
//! rename. Appends are serialized process-wide through the sentinel lock.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::artifact::lock::PathLock;
use crate::artifact::parse::format_question_block;
use crate::domain::QuestionId;
use crate::error::AskError;

/// Handle to the artifact file
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the artifact file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the artifact contents
    ///
    /// A missing file is not an error; it reads as empty text.
    pub fn read(&self) -> Result<String, AskError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(AskError::io(
                format!("failed to read {}", self.path.display()),
                e,
            )),
        }
    }

    /// Write the full artifact contents atomically
    ///
    /// Line endings are normalized to `\n`, missing parent directories are
    /// created, and the content is renamed over the target from a temporary
    /// sibling. On a failed rename the temporary file is removed best-effort
    /// and the original artifact is left untouched.
    pub fn write(&self, content: &str) -> Result<(), AskError> {
        let content = normalize_line_endings(content);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AskError::io(format!("failed to create directory {}", parent.display()), e)
            })?;
        }

        let tmp_path = tmp_path_for(&self.path);
        fs::write(&tmp_path, content.as_bytes()).map_err(|e| {
            AskError::io(format!("failed to write temporary file {}", tmp_path.display()), e)
        })?;

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(AskError::io(
                format!("failed to rename {} over {}", tmp_path.display(), self.path.display()),
                e,
            ));
        }

        debug!(path = %self.path.display(), bytes = content.len(), "Wrote artifact");
        Ok(())
    }

    /// Append a question block under the artifact lock
    ///
    /// Lock acquisition failure surfaces as [`AskError::LockContention`]
    /// without any retry.
    pub fn append_question_block(
        &self,
        id: &QuestionId,
        question: &str,
        context: &str,
        timestamp: &str,
    ) -> Result<(), AskError> {
        let _lock = PathLock::acquire(&self.path)?;

        let mut content = self.read()?;
        content.push_str(&format_question_block(id, question, context, timestamp));
        self.write(&content)?;

        debug!(%id, path = %self.path.display(), "Appended question block");
        Ok(())
    }

    /// Current artifact size in bytes; a missing file has size zero
    pub fn file_size(&self) -> Result<u64, AskError> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(AskError::io(
                format!("failed to stat {}", self.path.display()),
                e,
            )),
        }
    }

    /// Create the artifact with its instructional header if it doesn't exist
    pub fn init_file(&self) -> Result<(), AskError> {
        if self.path.exists() {
            return Ok(());
        }

        let started = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let header = format!(
            "# Ask Human Q&A Session\n\
             \n\
             This file is used by the askhuman server to let AI agents ask questions\n\
             and wait for a human to answer.\n\
             \n\
             **Instructions:**\n\
             1. AI agents will add questions below with \"Answer: PENDING\"\n\
             2. Replace \"PENDING\" with your actual answer\n\
             3. The AI will automatically pick up your response\n\
             \n\
             **File:** {}\n\
             **Started:** {}\n\
             \n\
             ---\n\
             \n",
            self.path.display(),
            started
        );

        self.write(&header)?;
        info!(path = %self.path.display(), "Initialized ask file");
        Ok(())
    }
}

/// Convert Windows and old Mac line endings to Unix
fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(".tmp");
    PathBuf::from(os_string)
}
