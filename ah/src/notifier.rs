//! Filesystem change notifier
//!
//! Watches the artifact's parent directory (the file itself may not exist
//! yet) and fans a liveness signal out to every subscribed question through
//! single-slot channels. Notifications carry no payload: the waiting call
//! always re-reads the artifact, so coalesced or spurious signals are
//! harmless.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};

use crate::domain::QuestionId;
use crate::error::AskError;

/// Fan-out of artifact write events to waiting questions
pub struct ChangeNotifier {
    subscriptions: RwLock<HashMap<QuestionId, mpsc::Sender<()>>>,
}

impl ChangeNotifier {
    /// Start watching the artifact's parent directory
    ///
    /// Failure to establish the watch is fatal: this component cannot
    /// silently degrade to polling-only. The background task exits when
    /// `shutdown` fires, closing the watch handle.
    pub fn start(artifact_path: &Path, shutdown: watch::Receiver<bool>) -> Result<Arc<Self>, AskError> {
        let watch_dir = parent_dir(artifact_path);
        let watch_dir = watch_dir
            .canonicalize()
            .map_err(|e| AskError::io(format!("failed to resolve watch dir {}", watch_dir.display()), e))?;

        let file_name = artifact_path
            .file_name()
            .ok_or_else(|| {
                AskError::io(
                    format!("artifact path has no file name: {}", artifact_path.display()),
                    std::io::Error::from(std::io::ErrorKind::InvalidInput),
                )
            })?
            .to_os_string();
        let target = watch_dir.join(file_name);

        // The notify backend runs its own thread; bridge its events into
        // the async world through an unbounded channel.
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let _ = event_tx.send(res);
            },
            notify::Config::default(),
        )?;
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        info!(dir = %watch_dir.display(), target = %target.display(), "Artifact watcher started");

        let notifier = Arc::new(Self {
            subscriptions: RwLock::new(HashMap::new()),
        });

        tokio::spawn(watch_loop(Arc::clone(&notifier), watcher, target, event_rx, shutdown));

        Ok(notifier)
    }

    /// Register a single-slot signal channel for a question id
    pub async fn subscribe(&self, id: &QuestionId) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        let mut subs = self.subscriptions.write().await;
        subs.insert(id.clone(), tx);
        debug!(%id, subscribers = subs.len(), "Subscribed to artifact changes");
        rx
    }

    /// Remove a question's channel; idempotent
    pub async fn unsubscribe(&self, id: &QuestionId) {
        let mut subs = self.subscriptions.write().await;
        if subs.remove(id).is_some() {
            debug!(%id, subscribers = subs.len(), "Unsubscribed from artifact changes");
        }
    }

    /// Send a non-blocking signal to every subscriber
    ///
    /// A full slot is skipped: the subscriber already has a wakeup queued
    /// and will re-read the artifact anyway.
    pub async fn notify_all(&self) {
        let subs = self.subscriptions.read().await;
        for (id, tx) in subs.iter() {
            if tx.try_send(()).is_err() {
                debug!(%id, "Subscriber slot full, coalescing notification");
            }
        }
    }

    /// Number of live subscriptions
    pub async fn subscriber_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

/// Event kinds that mean the artifact's content may have changed
///
/// Rename-to counts as a write because many editors save by writing a
/// temporary file and renaming it over the target.
fn is_write_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both | RenameMode::Any))
    )
}

async fn watch_loop(
    notifier: Arc<ChangeNotifier>,
    watcher: RecommendedWatcher,
    target: PathBuf,
    mut events: mpsc::UnboundedReceiver<Result<Event, notify::Error>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("Artifact watcher stopping");
                break;
            }
            event = events.recv() => {
                match event {
                    None => {
                        warn!("Watcher event stream closed");
                        break;
                    }
                    Some(Ok(event)) => {
                        if is_write_event(&event.kind) && event.paths.iter().any(|p| p == &target) {
                            debug!(kind = ?event.kind, "Artifact changed, notifying subscribers");
                            notifier.notify_all().await;
                        }
                    }
                    Some(Err(e)) => {
                        // Transient watcher errors are logged, not fatal
                        warn!(error = %e, "File watcher error");
                    }
                }
            }
        }
    }

    // Dropping the watcher closes the underlying watch handle
    drop(watcher);
    info!("Artifact watcher stopped");
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write_kind() -> EventKind {
        EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Content))
    }

    #[test]
    fn test_is_write_event_mapping() {
        assert!(is_write_event(&EventKind::Create(notify::event::CreateKind::File)));
        assert!(is_write_event(&write_kind()));
        assert!(is_write_event(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
        assert!(!is_write_event(&EventKind::Remove(notify::event::RemoveKind::File)));
        assert!(!is_write_event(&EventKind::Access(notify::event::AccessKind::Read)));
        assert!(!is_write_event(&EventKind::Modify(ModifyKind::Name(RenameMode::From))));
    }

    #[tokio::test]
    async fn test_subscribe_notify_receive() {
        let temp = tempdir().unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let notifier = ChangeNotifier::start(&temp.path().join("ask.md"), shutdown_rx).unwrap();

        let mut rx = notifier.subscribe(&QuestionId::from("Q1")).await;
        notifier.notify_all().await;

        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("signal should arrive")
            .expect("channel should be open");
    }

    #[tokio::test]
    async fn test_full_slot_coalesces_without_blocking() {
        let temp = tempdir().unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let notifier = ChangeNotifier::start(&temp.path().join("ask.md"), shutdown_rx).unwrap();

        let mut rx = notifier.subscribe(&QuestionId::from("Q1")).await;

        // Three notifications against a single-slot channel: the extra two
        // coalesce, and none of them block
        notifier.notify_all().await;
        notifier.notify_all().await;
        notifier.notify_all().await;

        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let temp = tempdir().unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let notifier = ChangeNotifier::start(&temp.path().join("ask.md"), shutdown_rx).unwrap();

        let id = QuestionId::from("Q1");
        let _rx = notifier.subscribe(&id).await;
        assert_eq!(notifier.subscriber_count().await, 1);

        notifier.unsubscribe(&id).await;
        notifier.unsubscribe(&id).await;
        assert_eq!(notifier.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_channel() {
        let temp = tempdir().unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let notifier = ChangeNotifier::start(&temp.path().join("ask.md"), shutdown_rx).unwrap();

        let id = QuestionId::from("Q1");
        let mut rx = notifier.subscribe(&id).await;
        notifier.unsubscribe(&id).await;

        // Sender dropped on unsubscribe, so recv yields None
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_file_write_wakes_subscriber() {
        let temp = tempdir().unwrap();
        let artifact = temp.path().join("ask.md");
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let notifier = ChangeNotifier::start(&artifact, shutdown_rx).unwrap();

        let mut rx = notifier.subscribe(&QuestionId::from("Q1")).await;

        // Give the watcher a moment to arm before writing
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&artifact, "### Q1\n**Answer:** PENDING\n").unwrap();

        tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("write should trigger a notification")
            .expect("channel should be open");
    }

    #[tokio::test]
    async fn test_writes_to_sibling_files_are_ignored() {
        let temp = tempdir().unwrap();
        let artifact = temp.path().join("ask.md");
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let notifier = ChangeNotifier::start(&artifact, shutdown_rx).unwrap();

        let mut rx = notifier.subscribe(&QuestionId::from("Q1")).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(temp.path().join("unrelated.md"), "noise").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_watch_on_missing_directory_fails_construction() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("does-not-exist").join("ask.md");
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        assert!(ChangeNotifier::start(&missing, shutdown_rx).is_err());
    }
}
