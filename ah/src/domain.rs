//! Question identifiers and input validation
//!
//! IDs use the format `Q{8-char-hex}`, e.g. `Q1a2b3c4d`. The hex comes from
//! a v4 uuid, so ids are unique for the process lifetime without any
//! coordination.

use crate::error::AskError;

/// Generate a fresh question id
pub fn generate_id() -> QuestionId {
    let uuid = uuid::Uuid::new_v4();
    QuestionId(format!("Q{}", &uuid.simple().to_string()[..8]))
}

/// Question ID wrapper for type-safe handling
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuestionId(String);

impl QuestionId {
    /// Create from an existing ID string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the full ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for QuestionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for QuestionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for QuestionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for QuestionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for QuestionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

/// Validate and sanitize input text
///
/// Enforces the length ceiling, then strips control characters except
/// newlines and tabs so a hostile question cannot corrupt the markdown
/// block structure.
pub fn sanitize_input(text: &str, max_len: usize, field: &'static str) -> Result<String, AskError> {
    if text.len() > max_len {
        return Err(AskError::InputTooLong {
            field,
            len: text.len(),
            max: max_len,
        });
    }

    let sanitized = text
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .collect();

    Ok(sanitized)
}

/// Truncate a string for log output, appending "..." if shortened
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_len).collect();
    format!("{}...", truncated)
}
