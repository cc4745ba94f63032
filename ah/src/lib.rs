//! askhuman - let AI agents ask a human and wait for the answer
//!
//! An agent calls the `ask_human` tool; the question is appended to a shared
//! markdown file with `Answer: PENDING`, and the call blocks until a human
//! edits the answer in, a timeout elapses, or the server shuts down. A
//! filesystem watcher provides low-latency wakeups and a periodic poll
//! backstops platforms where change notifications are unreliable.
//!
//! # Modules
//!
//! - [`artifact`] - durable read/write/append of the markdown file and answer parsing
//! - [`notifier`] - filesystem change notifications fanned out to waiters
//! - [`registry`] - in-flight question tracking with a periodic sweep
//! - [`engine`] - the blocking ask-and-wait state machine
//! - [`mcp`] - JSON-RPC 2.0 stdio protocol layer
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod artifact;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod mcp;
pub mod notifier;
pub mod registry;

// Re-export commonly used types
pub use artifact::{find_answer, format_question_block, ArtifactStore, PENDING_SENTINEL};
pub use config::{Config, ArtifactConfig, LimitsConfig, WaitConfig};
pub use domain::QuestionId;
pub use engine::{AskHumanEngine, SessionStats};
pub use error::AskError;
pub use mcp::McpServer;
pub use notifier::ChangeNotifier;
pub use registry::PendingRegistry;
