//! Out-of-Office reply history
//!
//! Per-rule, per-sender record of sent OOF replies. While a rule carries the
//! keep-history flag, a sender receives at most one reply from it per
//! continuous OOF period. Entries are cleared when the rule is deleted or
//! when the mailbox leaves the OOF state.

use crate::error::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

/// Tracks which senders a keep-history rule has already replied to.
pub struct OofHistory {
    db: SqlitePool,
}

impl OofHistory {
    /// Create a new history tracker
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS oof_history (
                mailbox TEXT NOT NULL,
                rule_id INTEGER NOT NULL,
                sender TEXT NOT NULL,
                replied_at TEXT NOT NULL,
                PRIMARY KEY (mailbox, rule_id, sender)
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Whether a reply from this rule to this sender must be suppressed.
    pub async fn should_suppress(&self, mailbox: &str, rule_id: i64, sender: &str) -> Result<bool> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT 1 FROM oof_history
            WHERE mailbox = ? AND rule_id = ? AND sender = ?
            LIMIT 1
            "#,
        )
        .bind(mailbox)
        .bind(rule_id)
        .bind(sender)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.is_some())
    }

    /// Record that a reply was sent. Idempotent on retry, which is what makes
    /// the reply action at-most-once per sender.
    pub async fn record_replied(&self, mailbox: &str, rule_id: i64, sender: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO oof_history (mailbox, rule_id, sender, replied_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(mailbox)
        .bind(rule_id)
        .bind(sender)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        debug!(mailbox, rule_id, sender, "Recorded OOF reply");
        Ok(())
    }

    /// Drop the history of a deleted rule.
    pub async fn clear_rule(&self, mailbox: &str, rule_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM oof_history WHERE mailbox = ? AND rule_id = ?")
            .bind(mailbox)
            .bind(rule_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Drop all history for a mailbox. Called when the mailbox leaves the
    /// OOF state so the next OOF period starts fresh.
    pub async fn clear_mailbox(&self, mailbox: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM oof_history WHERE mailbox = ?")
            .bind(mailbox)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
