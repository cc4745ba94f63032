//! The rendezvous engine: ask a question, wait for a human answer
//!
//! An `ask` call appends a question block to the artifact and then blocks on
//! a composite wait: a change notification, a periodic reconciliation poll,
//! the per-question deadline, and the process-wide shutdown signal. The
//! notification is only a liveness hint; the answer is always re-derived
//! from a fresh read of the artifact.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::artifact::{find_answer, question_text, ArtifactStore};
use crate::config::Config;
use crate::domain::{generate_id, sanitize_input, truncate, QuestionId};
use crate::error::AskError;
use crate::notifier::ChangeNotifier;
use crate::registry::{sweep_loop, PendingRegistry};

/// Aggregate counters for one server session
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionStats {
    pub total_asked: u64,
    pub total_answered: u64,
    pub pending: u64,
}

/// How a wait loop ended
enum Resolution {
    Answered(String),
    TimedOut,
    Shutdown,
}

/// The ask-human rendezvous engine
///
/// Owns the artifact store, the change notifier, and the pending registry.
/// Construction spawns the watch loop and the registry sweep; both stop
/// when [`AskHumanEngine::shutdown`] fires.
pub struct AskHumanEngine {
    config: Config,
    store: ArtifactStore,
    notifier: Arc<ChangeNotifier>,
    registry: Arc<PendingRegistry>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    total_asked: AtomicU64,
    total_answered: AtomicU64,
}

impl AskHumanEngine {
    /// Build the engine and start its background tasks
    ///
    /// Creates the artifact file (with its instructional header) if absent.
    /// Fails if the filesystem watch cannot be established.
    pub fn new(config: Config) -> Result<Self, AskError> {
        let store = ArtifactStore::new(&config.artifact.file);
        store.init_file()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let notifier = ChangeNotifier::start(store.path(), shutdown_rx.clone())?;

        let registry = Arc::new(PendingRegistry::new());
        tokio::spawn(sweep_loop(
            Arc::clone(&registry),
            config.wait.timeout(),
            config.wait.sweep_interval(),
            shutdown_rx.clone(),
        ));

        info!(artifact = %config.artifact.file.display(), "Ask-human engine started");

        Ok(Self {
            config,
            store,
            notifier,
            registry,
            shutdown_tx,
            shutdown_rx,
            total_asked: AtomicU64::new(0),
            total_answered: AtomicU64::new(0),
        })
    }

    /// Ask the human a question and block until an answer arrives
    ///
    /// Returns the answer text with surrounding whitespace trimmed, or a
    /// typed error. Validation and capacity failures reject before any side
    /// effect; after the question block is written, the call waits up to the
    /// configured timeout.
    pub async fn ask(&self, question: &str, context: &str) -> Result<String, AskError> {
        // Validating: no mutation happens on any rejection below
        let question = sanitize_input(question, self.config.limits.max_question_length, "question")?;
        let context = sanitize_input(context, self.config.limits.max_context_length, "context")?;

        let pending = self.registry.count().await;
        if pending >= self.config.limits.max_pending {
            return Err(AskError::TooManyPending {
                pending,
                max: self.config.limits.max_pending,
            });
        }

        let size = self.store.file_size()?;
        if size > self.config.artifact.max_file_size {
            return Err(AskError::ArtifactTooLarge {
                size,
                max: self.config.artifact.max_file_size,
            });
        }

        // Admitted
        let id = generate_id();
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        // Subscribe before the artifact write so an answer arriving between
        // the append and the first wait cannot be a lost wakeup
        let mut subscription = self.notifier.subscribe(&id).await;

        if let Err(e) = self
            .store
            .append_question_block(&id, &question, &context, &timestamp)
        {
            self.notifier.unsubscribe(&id).await;
            return Err(e);
        }

        self.total_asked.fetch_add(1, Ordering::SeqCst);

        // The answer may already be there if the human edits fast or a
        // leftover block carries the same id
        if let Some(answer) = self.try_find_answer(&id) {
            self.notifier.unsubscribe(&id).await;
            self.total_answered.fetch_add(1, Ordering::SeqCst);
            info!(%id, "Found existing answer");
            return Ok(answer);
        }

        self.registry.register(id.as_str()).await;

        info!(
            %id,
            question = %truncate(&question, 100),
            context = %truncate(&context, 100),
            "New question; edit {} and replace PENDING with your answer",
            self.store.path().display()
        );

        // Waiting
        let timeout = self.config.wait.timeout();
        let deadline = tokio::time::Instant::now() + timeout;

        let mut poll = tokio::time::interval(self.config.wait.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Consume the interval's immediate first tick; the answer was
        // checked just above
        poll.tick().await;

        let mut shutdown = self.shutdown_rx.clone();
        let mut subscription_open = true;

        let resolution = loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    break Resolution::Shutdown;
                }

                _ = tokio::time::sleep_until(deadline) => {
                    break Resolution::TimedOut;
                }

                notice = subscription.recv(), if subscription_open => {
                    match notice {
                        Some(()) => {
                            debug!(%id, "Artifact change notification");
                            if let Some(answer) = self.try_find_answer(&id) {
                                break Resolution::Answered(answer);
                            }
                        }
                        None => {
                            // Channel closed; the poll arm keeps the wait live
                            subscription_open = false;
                        }
                    }
                }

                _ = poll.tick() => {
                    if let Some(answer) = self.try_find_answer(&id) {
                        break Resolution::Answered(answer);
                    }
                }
            }
        };

        // Every exit path cleans up, and cleanup is idempotent against the
        // periodic sweep
        self.registry.remove(id.as_str()).await;
        self.notifier.unsubscribe(&id).await;

        match resolution {
            Resolution::Answered(answer) => {
                self.total_answered.fetch_add(1, Ordering::SeqCst);
                info!(%id, "Got answer");
                Ok(answer)
            }
            Resolution::TimedOut => {
                warn!(%id, ?timeout, "Question timed out");
                Err(AskError::Timeout {
                    id: id.as_str().to_string(),
                    timeout,
                })
            }
            Resolution::Shutdown => Err(AskError::Shutdown),
        }
    }

    /// Re-read the artifact and look for this question's answer
    ///
    /// A read failure is treated as "try again on the next signal"; the
    /// artifact may be momentarily inconsistent during a human's save.
    fn try_find_answer(&self, id: &QuestionId) -> Option<String> {
        match self.store.read() {
            Ok(content) => find_answer(&content, id),
            Err(e) => {
                debug!(%id, error = %e, "Artifact read failed mid-wait, continuing");
                None
            }
        }
    }

    /// Signal every waiting call and background task to stop
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Receiver that observes the shutdown signal
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Session counters
    pub async fn stats(&self) -> SessionStats {
        SessionStats {
            total_asked: self.total_asked.load(Ordering::SeqCst),
            total_answered: self.total_answered.load(Ordering::SeqCst),
            pending: self.registry.count().await as u64,
        }
    }

    /// Number of questions currently inside a wait loop
    pub async fn pending_count(&self) -> usize {
        self.registry.count().await
    }

    /// Formatted report of the session's statistics
    pub async fn stats_report(&self) -> String {
        let stats = self.stats().await;
        let file_size = self.store.file_size().unwrap_or(0);

        let mut out = String::from("Ask-Human Q&A Statistics\n\n");
        out.push_str(&format!("**Total Questions Asked:** {}\n", stats.total_asked));
        out.push_str(&format!("**Questions Answered:** {}\n", stats.total_answered));
        out.push_str(&format!("**Currently Pending:** {}\n", stats.pending));

        if stats.total_asked > 0 {
            let rate = stats.total_answered as f64 / stats.total_asked as f64 * 100.0;
            out.push_str(&format!("**Answer Rate:** {:.1}%\n", rate));
        }

        out.push_str(&format!("**Ask File:** {}\n", self.store.path().display()));
        out.push_str(&format!("**File Size:** {:.2} KB\n", file_size as f64 / 1024.0));
        out.push_str(&format!("**Max Pending:** {}\n", self.config.limits.max_pending));
        out.push_str(&format!("**Timeout:** {}s\n", self.config.wait.timeout_secs));

        if stats.pending > 0 {
            out.push_str(&format!(
                "\nYou have {} questions waiting for answers.\nEdit {} to provide responses.",
                stats.pending,
                self.store.path().display()
            ));
        }

        out
    }

    /// Formatted list of questions currently awaiting an answer
    pub async fn list_pending(&self) -> Result<String, AskError> {
        let content = self.store.read()?;
        let snapshot = self.registry.snapshot().await;

        if snapshot.is_empty() {
            return Ok("No pending questions".to_string());
        }

        let mut out = format!("Pending Questions ({}):\n\n", snapshot.len());
        for (id, waited) in snapshot {
            out.push_str(&format!("**{}** (waiting {}s)\n", id, waited.as_secs()));
            if let Some(text) = question_text(&content, &QuestionId::from_string(id)) {
                out.push_str(&format!("  Question: {}\n", truncate(&text, 200)));
            }
            out.push('\n');
        }

        out.push_str(&format!("Edit {} to provide answers.", self.store.path().display()));
        Ok(out)
    }

    /// Path of the artifact file this engine serves
    pub fn artifact_path(&self) -> &std::path::Path {
        self.store.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.artifact.file = dir.join("ask_human.md");
        config.wait.timeout_secs = 2;
        config.wait.poll_interval_secs = 1;
        config
    }

    /// Replace the PENDING sentinel inside a specific question's block
    fn answer_question(path: &std::path::Path, id: &str, answer: &str) {
        let content = std::fs::read_to_string(path).unwrap();
        let block_start = content.find(&format!("### {}", id)).expect("block present");
        let pending_at = content[block_start..]
            .find("PENDING")
            .map(|off| block_start + off)
            .expect("sentinel present");
        let mut updated = content.clone();
        updated.replace_range(pending_at..pending_at + "PENDING".len(), answer);
        std::fs::write(path, updated).unwrap();
    }

    fn extract_question_id(path: &std::path::Path) -> String {
        let content = std::fs::read_to_string(path).unwrap();
        let start = content.rfind("### Q").expect("question block present") + 4;
        content[start..start + 9].to_string()
    }

    #[tokio::test]
    async fn test_ask_returns_answer_written_by_human() {
        let temp = tempdir().unwrap();
        let engine = Arc::new(AskHumanEngine::new(test_config(temp.path())).unwrap());
        let path = temp.path().join("ask_human.md");

        let editor = {
            let path = path.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                let id = extract_question_id(&path);
                answer_question(&path, &id, "blue");
            })
        };

        let answer = engine.ask("pick a color", "").await.unwrap();
        assert_eq!(answer, "blue");
        editor.await.unwrap();

        // Resolution removed the pending entry
        assert_eq!(engine.pending_count().await, 0);

        let stats = engine.stats().await;
        assert_eq!(stats.total_asked, 1);
        assert_eq!(stats.total_answered, 1);
    }

    #[tokio::test]
    async fn test_ask_times_out_and_leaves_no_residue() {
        let temp = tempdir().unwrap();
        let mut config = test_config(temp.path());
        config.wait.timeout_secs = 1;
        let engine = AskHumanEngine::new(config).unwrap();

        let err = engine.ask("anyone there?", "").await.unwrap_err();
        match err {
            AskError::Timeout { id, timeout } => {
                assert!(id.starts_with('Q'));
                assert_eq!(timeout, Duration::from_secs(1));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(engine.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_oversized_question_rejected_without_side_effects() {
        let temp = tempdir().unwrap();
        let mut config = test_config(temp.path());
        config.limits.max_question_length = 10;
        let engine = AskHumanEngine::new(config).unwrap();

        let before = std::fs::read_to_string(temp.path().join("ask_human.md")).unwrap();
        let err = engine.ask("this question is far too long", "").await.unwrap_err();
        assert!(matches!(err, AskError::InputTooLong { field: "question", .. }));

        // No block was appended and nothing is pending
        let after = std::fs::read_to_string(temp.path().join("ask_human.md")).unwrap();
        assert_eq!(before, after);
        assert_eq!(engine.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_capacity_rejection_before_any_write() {
        let temp = tempdir().unwrap();
        let mut config = test_config(temp.path());
        config.limits.max_pending = 1;
        let engine = Arc::new(AskHumanEngine::new(config).unwrap());

        // First ask occupies the single slot
        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.ask("first", "").await })
        };

        // Wait until the first call is registered as pending
        for _ in 0..50 {
            if engine.pending_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(engine.pending_count().await, 1);

        let before = std::fs::read_to_string(temp.path().join("ask_human.md")).unwrap();
        let err = engine.ask("second", "").await.unwrap_err();
        assert!(matches!(err, AskError::TooManyPending { pending: 1, max: 1 }));
        let after = std::fs::read_to_string(temp.path().join("ask_human.md")).unwrap();
        assert_eq!(before, after, "rejected ask must not write the artifact");

        // Let the first ask time out
        let result = first.await.unwrap();
        assert!(matches!(result, Err(AskError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_releases_waiting_ask() {
        let temp = tempdir().unwrap();
        let mut config = test_config(temp.path());
        config.wait.timeout_secs = 60;
        let engine = Arc::new(AskHumanEngine::new(config).unwrap());

        let waiter = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.ask("question", "").await })
        };

        for _ in 0..50 {
            if engine.pending_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        engine.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("shutdown must release the waiter promptly")
            .unwrap();
        assert!(matches!(result, Err(AskError::Shutdown)));
        assert_eq!(engine.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_asks_use_distinct_ids() {
        let temp = tempdir().unwrap();
        let mut config = test_config(temp.path());
        config.wait.timeout_secs = 1;
        let engine = Arc::new(AskHumanEngine::new(config).unwrap());

        let a = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.ask("first", "").await })
        };

        // Let the first append land before starting the second; simultaneous
        // appends surface lock contention by design
        for _ in 0..50 {
            if engine.pending_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let b = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.ask("second", "").await })
        };

        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        let id_a = match ra.unwrap_err() {
            AskError::Timeout { id, .. } => id,
            other => panic!("unexpected: {other}"),
        };
        let id_b = match rb.unwrap_err() {
            AskError::Timeout { id, .. } => id,
            other => panic!("unexpected: {other}"),
        };
        assert_ne!(id_a, id_b);
    }

    #[tokio::test]
    async fn test_list_pending_names_waiting_question() {
        let temp = tempdir().unwrap();
        let mut config = test_config(temp.path());
        config.wait.timeout_secs = 60;
        let engine = Arc::new(AskHumanEngine::new(config).unwrap());

        assert_eq!(engine.list_pending().await.unwrap(), "No pending questions");

        let waiter = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.ask("pick a color", "").await })
        };

        for _ in 0..50 {
            if engine.pending_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let listing = engine.list_pending().await.unwrap();
        assert!(listing.contains("Pending Questions (1):"));
        assert!(listing.contains("pick a color"));

        engine.shutdown();
        let _ = waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_report_mentions_rate() {
        let temp = tempdir().unwrap();
        let mut config = test_config(temp.path());
        config.wait.timeout_secs = 1;
        let engine = AskHumanEngine::new(config).unwrap();

        let _ = engine.ask("no one answers", "").await;
        let report = engine.stats_report().await;
        assert!(report.contains("**Total Questions Asked:** 1"));
        assert!(report.contains("**Answer Rate:** 0.0%"));
    }
}
