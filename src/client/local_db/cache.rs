//! # Cached Collection Operations
//!
//! Replacement-snapshot persistence for the read-mostly collections. Writes
//! replace the whole partition inside a transaction so a crash can never
//! leave a half-updated cache; reads deserialize the JSON column and skip
//! corrupt rows rather than failing the whole read.

use crate::client::local_db::LocalDatabase;
use crate::shared::error::SyncError;
use crate::shared::models::{AppSettings, Category, MenuItem};
use sqlx::Row;

/// Key of the single settings row
const SETTINGS_KEY: &str = "appSettings";

impl LocalDatabase {
    /// Replace the cached menu item snapshot
    pub async fn replace_cached_menu_items(&self, items: &[MenuItem]) -> Result<(), SyncError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM cached_menu_items")
            .execute(&mut *tx)
            .await?;
        for item in items {
            sqlx::query("INSERT INTO cached_menu_items (id, data, cached_at) VALUES (?, ?, ?)")
                .bind(item.id.to_string())
                .bind(serde_json::to_string(item)?)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Read the cached menu item snapshot
    pub async fn cached_menu_items(&self) -> Result<Vec<MenuItem>, SyncError> {
        let rows = sqlx::query("SELECT data FROM cached_menu_items ORDER BY rowid")
            .fetch_all(self.pool())
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.try_get("data")?;
            match serde_json::from_str::<MenuItem>(&data) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!("skipping corrupt cached menu item: {e}"),
            }
        }
        Ok(items)
    }

    /// Replace the cached category snapshot
    pub async fn replace_cached_categories(&self, categories: &[Category]) -> Result<(), SyncError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM cached_categories")
            .execute(&mut *tx)
            .await?;
        for category in categories {
            sqlx::query("INSERT INTO cached_categories (id, data, cached_at) VALUES (?, ?, ?)")
                .bind(category.id.to_string())
                .bind(serde_json::to_string(category)?)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Read the cached category snapshot
    pub async fn cached_categories(&self) -> Result<Vec<Category>, SyncError> {
        let rows = sqlx::query("SELECT data FROM cached_categories ORDER BY rowid")
            .fetch_all(self.pool())
            .await?;

        let mut categories = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.try_get("data")?;
            match serde_json::from_str::<Category>(&data) {
                Ok(category) => categories.push(category),
                Err(e) => tracing::warn!("skipping corrupt cached category: {e}"),
            }
        }
        Ok(categories)
    }

    /// Persist the settings singleton
    pub async fn save_settings(&self, settings: &AppSettings) -> Result<(), SyncError> {
        sqlx::query("INSERT OR REPLACE INTO app_settings (key, data, updated_at) VALUES (?, ?, ?)")
            .bind(SETTINGS_KEY)
            .bind(serde_json::to_string(settings)?)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Read the cached settings singleton
    pub async fn cached_settings(&self) -> Result<Option<AppSettings>, SyncError> {
        let row = sqlx::query("SELECT data FROM app_settings WHERE key = ?")
            .bind(SETTINGS_KEY)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data")?;
                match serde_json::from_str::<AppSettings>(&data) {
                    Ok(settings) => Ok(Some(settings)),
                    Err(e) => {
                        tracing::warn!("discarding corrupt cached settings: {e}");
                        Ok(None)
                    }
                }
            }
            None => Ok(None),
        }
    }
}
