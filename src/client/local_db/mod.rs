//! # Local Database Module
//!
//! SQLite-backed device store. Two concerns live here:
//!
//! - **Cache partitions**: snapshots of the read-mostly collections (menu
//!   items, categories, settings) so the device can serve reads while the
//!   backend is unreachable.
//! - **Mutation queue**: the durable outbound queue of locally-originated
//!   writes awaiting replay, the single source of truth for pending work
//!   across process restarts.
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool and schema management
//! - `cache.rs`: cached collection operations
//! - `queue.rs`: mutation queue rows and sync metadata

pub mod cache;
pub mod queue;

use crate::shared::error::SyncError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::{Path, PathBuf};

/// Local database connection manager
#[derive(Debug)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the database at the platform data directory
    pub async fn new() -> Result<Self, SyncError> {
        Self::open(Self::default_path()).await
    }

    /// Open or create the database at an explicit path
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::storage(format!("failed to create data dir: {e}")))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        // WAL keeps readers unblocked during queue writes
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Platform-specific default database file path
    fn default_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("tillsync");
        path.push("local.db");
        path
    }

    /// Create tables and run pending migrations
    async fn init_schema(&self) -> Result<(), SyncError> {
        sqlx::raw_sql(include_str!("schema.sql"))
            .execute(&self.pool)
            .await?;
        self.run_migrations().await?;
        Ok(())
    }

    /// Apply schema migrations beyond the base schema
    async fn run_migrations(&self) -> Result<(), SyncError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current_version: (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await
                .unwrap_or((0,));

        if current_version.0 < 1 {
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (1, ?)")
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Basic statistics for debugging and status screens
    pub async fn stats(&self) -> Result<DatabaseStats, SyncError> {
        let cached_menu_items: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM cached_menu_items")
                .fetch_one(&self.pool)
                .await?;
        let cached_categories: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM cached_categories")
                .fetch_one(&self.pool)
                .await?;
        let pending_mutations: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM mutation_queue")
                .fetch_one(&self.pool)
                .await?;

        Ok(DatabaseStats {
            cached_menu_items: cached_menu_items.0 as u64,
            cached_categories: cached_categories.0 as u64,
            pending_mutations: pending_mutations.0 as u64,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Cached menu item count
    pub cached_menu_items: u64,
    /// Cached category count
    pub cached_categories: u64,
    /// Mutations waiting for replay
    pub pending_mutations: u64,
}
