//! # Mutation Queue Rows and Sync Metadata
//!
//! Row-level operations for the durable outbound queue. The queue is the
//! single source of truth for pending writes: in-memory counts are caches of
//! it and are recomputed from here after every queue mutation and at
//! startup.
//!
//! Queue ids are time-ordered UUIDs so `ORDER BY enqueued_at, id` yields a
//! stable oldest-first drain order even when two mutations share a
//! timestamp.

use crate::client::local_db::LocalDatabase;
use crate::shared::error::SyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;

/// Metadata key for the sync cursor
const LAST_SYNC_KEY: &str = "last_sync_time";

/// What kind of local write a queued mutation represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Order,
    WaiterCall,
}

impl MutationKind {
    /// Stable name stored in the queue table
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Order => "order",
            MutationKind::WaiterCall => "waiter_call",
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "order" => Some(MutationKind::Order),
            "waiter_call" => Some(MutationKind::WaiterCall),
            _ => None,
        }
    }
}

/// A locally-originated write awaiting replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Time-ordered unique identifier
    pub id: String,
    /// What kind of write this is
    pub kind: MutationKind,
    /// The JSON payload the UI write path produced
    pub data: serde_json::Value,
    /// When the mutation was enqueued
    pub enqueued_at: String,
    /// Failed replay attempts so far
    pub retry_count: i64,
    /// Timestamp of the last replay attempt
    pub last_attempt: Option<String>,
    /// Error message from the last failed attempt
    pub last_error: Option<String>,
}

impl LocalDatabase {
    /// Durably enqueue a mutation, returning its id once stored
    pub async fn enqueue_mutation(
        &self,
        kind: MutationKind,
        data: &serde_json::Value,
    ) -> Result<String, SyncError> {
        let id = Uuid::now_v7().to_string();
        sqlx::query(
            "INSERT INTO mutation_queue (id, kind, data, enqueued_at, retry_count)
             VALUES (?, ?, ?, ?, 0)",
        )
        .bind(&id)
        .bind(kind.as_str())
        .bind(serde_json::to_string(data)?)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(id)
    }

    /// All queued mutations, oldest first
    pub async fn pending_mutations(&self) -> Result<Vec<QueuedMutation>, SyncError> {
        let rows = sqlx::query(
            "SELECT id, kind, data, enqueued_at, retry_count, last_attempt, last_error
             FROM mutation_queue
             ORDER BY enqueued_at ASC, id ASC",
        )
        .fetch_all(self.pool())
        .await?;

        let mut mutations = Vec::with_capacity(rows.len());
        for row in rows {
            let kind_name: String = row.try_get("kind")?;
            let Some(kind) = MutationKind::from_str(&kind_name) else {
                tracing::warn!(kind = %kind_name, "skipping queued mutation of unknown kind");
                continue;
            };
            let data: String = row.try_get("data")?;
            let data = match serde_json::from_str(&data) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("skipping queued mutation with corrupt payload: {e}");
                    continue;
                }
            };
            mutations.push(QueuedMutation {
                id: row.try_get("id")?,
                kind,
                data,
                enqueued_at: row.try_get("enqueued_at")?,
                retry_count: row.try_get("retry_count")?,
                last_attempt: row.try_get("last_attempt")?,
                last_error: row.try_get("last_error")?,
            });
        }
        Ok(mutations)
    }

    /// Remove a mutation after successful replay or eviction
    pub async fn remove_mutation(&self, id: &str) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM mutation_queue WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Record a failed replay attempt and return the new retry count
    pub async fn record_failed_attempt(&self, id: &str, error: &str) -> Result<i64, SyncError> {
        sqlx::query(
            "UPDATE mutation_queue SET
                retry_count = retry_count + 1,
                last_attempt = ?,
                last_error = ?
             WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(error)
        .bind(id)
        .execute(self.pool())
        .await?;

        let row = sqlx::query("SELECT retry_count FROM mutation_queue WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        match row {
            Some(row) => Ok(row.try_get("retry_count")?),
            None => Err(SyncError::storage(format!("queued mutation {id} vanished"))),
        }
    }

    /// Count of queued, unsynced mutations
    pub async fn pending_mutation_count(&self) -> Result<usize, SyncError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM mutation_queue")
            .fetch_one(self.pool())
            .await?;
        Ok(count.0 as usize)
    }

    /// Set a sync metadata value
    pub async fn set_sync_metadata(&self, key: &str, value: &str) -> Result<(), SyncError> {
        sqlx::query("INSERT OR REPLACE INTO sync_metadata (key, value, updated_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(value)
            .bind(Utc::now().to_rfc3339())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Get a sync metadata value
    pub async fn get_sync_metadata(&self, key: &str) -> Result<Option<String>, SyncError> {
        let row = sqlx::query("SELECT value FROM sync_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    /// The persisted sync cursor, used only for staleness display
    pub async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        let value = self.get_sync_metadata(LAST_SYNC_KEY).await?;
        Ok(value
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    /// Persist the sync cursor
    pub async fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<(), SyncError> {
        self.set_sync_metadata(LAST_SYNC_KEY, &at.to_rfc3339()).await
    }
}
