//! Extracting answers and question text from the artifact
//!
//! Parsing is deliberately forgiving: a missing block, a missing answer
//! marker, or a half-saved file all read as "not answered yet". Absence of
//! a well-formed answer is a normal transient state, never a fault.

use regex::Regex;

use crate::domain::QuestionId;

/// Placeholder the human replaces with their answer
pub const PENDING_SENTINEL: &str = "PENDING";

/// Find the answer for a question id in the artifact text
///
/// Locates the `### <id>` block (case-insensitive), extracts the value
/// after `**Answer:**` up to the next block boundary, and trims it. Answers
/// may span multiple lines. Returns `None` while the value is still the
/// pending sentinel or the block is absent or malformed.
pub fn find_answer(content: &str, id: &QuestionId) -> Option<String> {
    // The capture is non-greedy and stops at the first delimiter: a blank
    // line followed by a horizontal rule, the next block header, or end of
    // text.
    let pattern = format!(
        r"(?is)### {}\s*\n.*?\*\*Answer:\*\*\s*(.*?)(?:\n{{2,}}---|### |$)",
        regex::escape(id.as_str())
    );

    // The id is hex plus an escaped prefix, so the pattern always compiles
    let re = Regex::new(&pattern).ok()?;
    let captures = re.captures(content)?;

    let answer = captures.get(1)?.as_str().trim();
    if answer.eq_ignore_ascii_case(PENDING_SENTINEL) {
        return None;
    }

    Some(answer.to_string())
}

/// Extract the question text for a given question id, if present
pub fn question_text(content: &str, id: &QuestionId) -> Option<String> {
    let header = format!("### {}", id.as_str());
    let mut in_block = false;

    for line in content.lines() {
        if line.contains(&header) {
            in_block = true;
            continue;
        }

        if in_block {
            if let Some(rest) = line.strip_prefix("**Question:**") {
                return Some(rest.trim().to_string());
            }
            if line.starts_with("###") || line.starts_with("---") {
                break;
            }
        }
    }

    None
}

/// Render the block appended to the artifact for a new question
pub fn format_question_block(id: &QuestionId, question: &str, context: &str, timestamp: &str) -> String {
    format!(
        "\n---\n\n### {}\n\n\
         **Timestamp:** {}  \n\
         **Question:** {}  \n\
         **Context:** {}  \n\
         **Answer:** {}\n\n",
        id, timestamp, question, context, PENDING_SENTINEL
    )
}
