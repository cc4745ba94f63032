//! Pending question registry
//!
//! Tracks every question currently inside a wait loop, keyed by id with its
//! registration time. The periodic sweep is a safety net for entries whose
//! owning wait exited without cleanup; normal resolution paths always remove
//! their own entry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// Registry of in-flight questions
///
/// All mutations go through the exclusive side of the lock; aggregate reads
/// (count, snapshot) take the shared side.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: RwLock<HashMap<String, Instant>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a question as pending
    pub async fn register(&self, id: &str) {
        let mut entries = self.entries.write().await;
        entries.insert(id.to_string(), Instant::now());
        debug!(%id, pending = entries.len(), "Registered pending question");
    }

    /// Remove a question; returns whether an entry existed
    ///
    /// Removal is idempotent so a wait loop racing the sweep never
    /// double-reports.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.entries.write().await.remove(id).is_some();
        if removed {
            debug!(%id, "Removed pending question");
        }
        removed
    }

    /// Number of questions currently pending
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Snapshot of pending ids with their wait durations
    pub async fn snapshot(&self) -> Vec<(String, Duration)> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .iter()
            .map(|(id, started)| (id.clone(), now.duration_since(*started)))
            .collect()
    }

    /// Delete every entry older than `max_age`; returns how many were removed
    pub async fn sweep_expired(&self, max_age: Duration) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|id, started| {
            let keep = started.elapsed() <= max_age;
            if !keep {
                warn!(%id, age = ?started.elapsed(), "Sweeping expired pending entry");
            }
            keep
        });
        before - entries.len()
    }
}

/// Run the periodic expired-entry sweep until shutdown
///
/// Spawned once by the engine as an independent background task.
pub async fn sweep_loop(
    registry: std::sync::Arc<PendingRegistry>,
    max_age: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick of a tokio interval completes immediately; consume it
    // so the first sweep happens one full interval in.
    ticker.tick().await;

    info!(interval_secs = interval.as_secs(), "Registry sweep started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("Registry sweep stopping");
                return;
            }
            _ = ticker.tick() => {
                let swept = registry.sweep_expired(max_age).await;
                if swept > 0 {
                    info!(swept, "Sweep removed expired pending entries");
                }
            }
        }
    }
}
