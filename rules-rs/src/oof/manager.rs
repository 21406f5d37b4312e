//! Out-of-Office state manager
//!
//! Tracks the per-mailbox OOF flag. The state is externally controlled
//! (owner or administrative tooling) and read afresh for every delivery, so
//! a flip takes effect for the next message without re-registering rules.

use crate::error::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

/// Manages per-mailbox Out-of-Office state.
pub struct OofManager {
    db: SqlitePool,
}

impl OofManager {
    /// Create a new OOF manager
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS oof_state (
                mailbox TEXT PRIMARY KEY,
                enabled INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Set the OOF state for a mailbox.
    pub async fn set_enabled(&self, mailbox: &str, enabled: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO oof_state (mailbox, enabled, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(mailbox) DO UPDATE SET
                enabled = excluded.enabled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(mailbox)
        .bind(enabled)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        info!(mailbox, enabled, "Out-of-Office state changed");
        Ok(())
    }

    /// Whether the mailbox is currently in the OOF state. A mailbox with no
    /// stored state is not in OOF.
    pub async fn is_enabled(&self, mailbox: &str) -> Result<bool> {
        let row = sqlx::query_as::<_, (bool,)>("SELECT enabled FROM oof_state WHERE mailbox = ?")
            .bind(mailbox)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.map(|(enabled,)| enabled).unwrap_or(false))
    }
}
