//! # Offline Mutation Queue
//!
//! Buffers locally-originated writes while the backend is unreachable and
//! replays them once connectivity returns.
//!
//! ## Behavior
//!
//! - `enqueue` persists the mutation before returning its id, so a process
//!   restart never loses an accepted write.
//! - `drain` replays every queued mutation oldest first. At most one drain
//!   runs at a time; a drain requested while one is in progress returns a
//!   skipped outcome immediately, which keeps the periodic tick, the online
//!   transition, and manual retries from double-submitting.
//! - A mutation whose retry count exceeds the ceiling is evicted and
//!   reported in [`DrainOutcome::evicted`]. The loss is explicit and logged,
//!   never silent.

use crate::client::api::BackendClient;
use crate::client::local_db::queue::{MutationKind, QueuedMutation};
use crate::client::local_db::LocalDatabase;
use crate::shared::error::SyncError;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

pub use crate::client::local_db::queue::MutationKind as Kind;

/// Result of one drain pass
#[derive(Debug, Clone, Default)]
pub struct DrainOutcome {
    /// Whether the drain was skipped because another was in progress
    pub skipped: bool,
    /// Mutations successfully replayed and removed
    pub replayed: usize,
    /// Mutations that failed this pass but remain queued
    pub failed: usize,
    /// Mutations evicted after exceeding the retry ceiling
    pub evicted: Vec<EvictedMutation>,
    /// Mutations still queued after the pass
    pub remaining: usize,
}

impl DrainOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// A mutation dropped after exhausting its retries
#[derive(Debug, Clone)]
pub struct EvictedMutation {
    /// Queue id of the dropped mutation
    pub id: String,
    /// What kind of write was lost
    pub kind: MutationKind,
    /// The error from the final attempt
    pub last_error: String,
}

/// Durable queue of locally-originated writes
#[derive(Debug)]
pub struct MutationQueue {
    db: Arc<LocalDatabase>,
    api: Arc<BackendClient>,
    max_replay_attempts: u32,
    drain_lock: Mutex<()>,
    pending_tx: watch::Sender<usize>,
}

impl MutationQueue {
    /// Create the queue component. The pending count is re-read from
    /// storage here so restarts start from the persisted truth.
    pub async fn new(
        db: Arc<LocalDatabase>,
        api: Arc<BackendClient>,
        max_replay_attempts: u32,
    ) -> Result<Self, SyncError> {
        let initial = db.pending_mutation_count().await?;
        let (pending_tx, _) = watch::channel(initial);
        Ok(Self {
            db,
            api,
            max_replay_attempts,
            drain_lock: Mutex::new(()),
            pending_tx,
        })
    }

    /// Durably enqueue a mutation and return its id
    pub async fn enqueue(
        &self,
        kind: MutationKind,
        data: serde_json::Value,
    ) -> Result<String, SyncError> {
        let id = self.db.enqueue_mutation(kind, &data).await?;
        let count = self.db.pending_mutation_count().await?;
        let _ = self.pending_tx.send(count);
        tracing::info!(id = %id, kind = kind.as_str(), pending = count, "queued offline mutation");
        Ok(id)
    }

    /// Replay all queued mutations against the backend, oldest first.
    ///
    /// No-op if another drain is already running.
    pub async fn drain(&self) -> Result<DrainOutcome, SyncError> {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            tracing::debug!("drain already in progress, skipping");
            return Ok(DrainOutcome::skipped());
        };

        let pending = self.db.pending_mutations().await?;
        let mut outcome = DrainOutcome::default();

        for mutation in pending {
            match self.submit(&mutation).await {
                Ok(()) => {
                    self.db.remove_mutation(&mutation.id).await?;
                    outcome.replayed += 1;
                    tracing::info!(id = %mutation.id, "replayed offline mutation");
                }
                Err(e) => {
                    let retries = self
                        .db
                        .record_failed_attempt(&mutation.id, &e.to_string())
                        .await?;
                    if retries > i64::from(self.max_replay_attempts) {
                        self.db.remove_mutation(&mutation.id).await?;
                        tracing::warn!(
                            id = %mutation.id,
                            kind = mutation.kind.as_str(),
                            attempts = retries,
                            "evicting mutation after repeated replay failures: {e}"
                        );
                        outcome.evicted.push(EvictedMutation {
                            id: mutation.id,
                            kind: mutation.kind,
                            last_error: e.to_string(),
                        });
                    } else {
                        outcome.failed += 1;
                        tracing::debug!(id = %mutation.id, attempt = retries, "replay failed: {e}");
                    }
                }
            }
        }

        outcome.remaining = self.db.pending_mutation_count().await?;
        let _ = self.pending_tx.send(outcome.remaining);
        Ok(outcome)
    }

    async fn submit(&self, mutation: &QueuedMutation) -> Result<(), SyncError> {
        match mutation.kind {
            MutationKind::Order => self.api.submit_order(&mutation.data).await,
            MutationKind::WaiterCall => self.api.submit_waiter_call(&mutation.data).await,
        }
    }

    /// Current queued mutation count, recomputed from storage
    pub async fn pending_count(&self) -> Result<usize, SyncError> {
        self.db.pending_mutation_count().await
    }

    /// Watch the pending count for "N pending" indicators
    pub fn pending_watch(&self) -> watch::Receiver<usize> {
        self.pending_tx.subscribe()
    }
}
