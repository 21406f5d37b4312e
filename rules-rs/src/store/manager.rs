//! Folder and message storage
//!
//! Messages are property bags stored as JSON per folder. Also holds the
//! deferred-action records produced by client-deferred rule actions and the
//! error records produced when an action fails during rule execution.

use crate::error::{Result, RuleError};
use crate::rules::types::FolderKind;
use crate::store::types::{props, DeferredAction, Folder, RuleErrorRecord, StoredMessage};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Persistent folder and message storage.
pub struct MessageStore {
    db: SqlitePool,
}

impl MessageStore {
    /// Create a new message store
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                folder_id INTEGER NOT NULL,
                properties TEXT NOT NULL,
                size INTEGER NOT NULL,
                received_at TEXT NOT NULL,
                FOREIGN KEY (folder_id) REFERENCES folders(id)
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_folder ON messages(folder_id)
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deferred_actions (
                id TEXT PRIMARY KEY,
                folder_id INTEGER NOT NULL,
                rule_id INTEGER NOT NULL,
                message_id TEXT NOT NULL,
                data BLOB NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rule_errors (
                id TEXT PRIMARY KEY,
                folder_id INTEGER NOT NULL,
                rule_id INTEGER NOT NULL,
                rule_name TEXT NOT NULL,
                action TEXT NOT NULL,
                error TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Create a folder for a mailbox owner.
    pub async fn create_folder(&self, owner: &str, name: &str, kind: FolderKind) -> Result<Folder> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO folders (owner, name, kind, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(owner)
        .bind(name)
        .bind(kind)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(Folder {
            id: result.last_insert_rowid(),
            owner: owner.to_string(),
            name: name.to_string(),
            kind,
            created_at: now,
        })
    }

    /// Get a folder by id.
    pub async fn folder(&self, folder_id: i64) -> Result<Option<Folder>> {
        let row = sqlx::query_as::<_, (i64, String, String, FolderKind, String)>(
            "SELECT id, owner, name, kind, created_at FROM folders WHERE id = ?",
        )
        .bind(folder_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(id, owner, name, kind, created_at)| Folder {
            id,
            owner,
            name,
            kind,
            created_at: parse_timestamp(&created_at),
        }))
    }

    /// Store a newly delivered message in a folder.
    pub async fn store_message(
        &self,
        folder_id: i64,
        properties: HashMap<String, serde_json::Value>,
    ) -> Result<StoredMessage> {
        if self.folder(folder_id).await?.is_none() {
            return Err(RuleError::NotFound(format!(
                "Folder {} not found",
                folder_id
            )));
        }

        let id = Uuid::new_v4().to_string();
        let received_at = Utc::now();
        let size = properties
            .get(props::BODY)
            .and_then(|v| v.as_str())
            .map(|body| body.len() as i64)
            .unwrap_or(0);

        sqlx::query(
            r#"
            INSERT INTO messages (id, folder_id, properties, size, received_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(folder_id)
        .bind(serde_json::to_string(&properties)?)
        .bind(size)
        .bind(received_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        debug!(folder_id, message_id = %id, "Stored message");

        Ok(StoredMessage {
            id,
            folder_id,
            properties,
            size,
            received_at,
        })
    }

    /// Get a message by id.
    pub async fn get_message(&self, message_id: &str) -> Result<Option<StoredMessage>> {
        let row = sqlx::query_as::<_, (String, i64, String, i64, String)>(
            "SELECT id, folder_id, properties, size, received_at FROM messages WHERE id = ?",
        )
        .bind(message_id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some((id, folder_id, properties, size, received_at)) => Ok(Some(StoredMessage {
                id,
                folder_id,
                properties: serde_json::from_str(&properties)?,
                size,
                received_at: parse_timestamp(&received_at),
            })),
            None => Ok(None),
        }
    }

    /// List a folder's messages in delivery order.
    pub async fn list_messages(&self, folder_id: i64) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query_as::<_, (String, i64, String, i64, String)>(
            r#"
            SELECT id, folder_id, properties, size, received_at
            FROM messages
            WHERE folder_id = ?
            ORDER BY received_at ASC, id ASC
            "#,
        )
        .bind(folder_id)
        .fetch_all(&self.db)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for (id, folder_id, properties, size, received_at) in rows {
            messages.push(StoredMessage {
                id,
                folder_id,
                properties: serde_json::from_str(&properties)?,
                size,
                received_at: parse_timestamp(&received_at),
            });
        }

        Ok(messages)
    }

    /// Set a property on a message. Returns false if the message no longer
    /// exists (a prior action deleted or moved it away).
    pub async fn set_property(
        &self,
        message_id: &str,
        property: &str,
        value: serde_json::Value,
    ) -> Result<bool> {
        let Some(mut message) = self.get_message(message_id).await? else {
            return Ok(false);
        };

        message.properties.insert(property.to_string(), value);

        let result = sqlx::query("UPDATE messages SET properties = ? WHERE id = ?")
            .bind(serde_json::to_string(&message.properties)?)
            .bind(message_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Set the read flag on a message.
    pub async fn mark_read(&self, message_id: &str) -> Result<bool> {
        self.set_property(message_id, props::READ, serde_json::json!(true))
            .await
    }

    /// Delete a message. Returns false if it was already gone.
    pub async fn delete_message(&self, message_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(message_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move a message into another folder.
    pub async fn move_message(&self, message_id: &str, dest_folder_id: i64) -> Result<()> {
        if self.folder(dest_folder_id).await?.is_none() {
            return Err(RuleError::NotFound(format!(
                "Destination folder {} not found",
                dest_folder_id
            )));
        }

        let result = sqlx::query("UPDATE messages SET folder_id = ? WHERE id = ?")
            .bind(dest_folder_id)
            .bind(message_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            warn!(message_id, "Move target message no longer exists");
        }
        Ok(())
    }

    /// Copy a message into another folder under a fresh id.
    pub async fn copy_message(
        &self,
        message_id: &str,
        dest_folder_id: i64,
    ) -> Result<StoredMessage> {
        if self.folder(dest_folder_id).await?.is_none() {
            return Err(RuleError::NotFound(format!(
                "Destination folder {} not found",
                dest_folder_id
            )));
        }

        let message = self
            .get_message(message_id)
            .await?
            .ok_or_else(|| RuleError::NotFound(format!("Message {} not found", message_id)))?;

        self.store_message(dest_folder_id, message.properties).await
    }

    /// Record a deferred action for later client-side processing.
    pub async fn record_deferred_action(
        &self,
        folder_id: i64,
        rule_id: i64,
        message_id: &str,
        data: &[u8],
    ) -> Result<DeferredAction> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO deferred_actions (id, folder_id, rule_id, message_id, data, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(folder_id)
        .bind(rule_id)
        .bind(message_id)
        .bind(data)
        .bind(created_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(DeferredAction {
            id,
            folder_id,
            rule_id,
            message_id: message_id.to_string(),
            data: data.to_vec(),
            created_at,
        })
    }

    /// List deferred actions recorded for a folder.
    pub async fn list_deferred_actions(&self, folder_id: i64) -> Result<Vec<DeferredAction>> {
        let rows = sqlx::query_as::<_, (String, i64, i64, String, Vec<u8>, String)>(
            r#"
            SELECT id, folder_id, rule_id, message_id, data, created_at
            FROM deferred_actions
            WHERE folder_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(folder_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, folder_id, rule_id, message_id, data, created_at)| DeferredAction {
                    id,
                    folder_id,
                    rule_id,
                    message_id,
                    data,
                    created_at: parse_timestamp(&created_at),
                },
            )
            .collect())
    }

    /// Record a failed rule action.
    pub async fn record_rule_error(
        &self,
        folder_id: i64,
        rule_id: i64,
        rule_name: &str,
        action: &str,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rule_errors (id, folder_id, rule_id, rule_name, action, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(folder_id)
        .bind(rule_id)
        .bind(rule_name)
        .bind(action)
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// List rule error records for a folder.
    pub async fn list_rule_errors(&self, folder_id: i64) -> Result<Vec<RuleErrorRecord>> {
        let rows = sqlx::query_as::<_, (String, i64, i64, String, String, String, String)>(
            r#"
            SELECT id, folder_id, rule_id, rule_name, action, error, created_at
            FROM rule_errors
            WHERE folder_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(folder_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, folder_id, rule_id, rule_name, action, error, created_at)| RuleErrorRecord {
                    id,
                    folder_id,
                    rule_id,
                    rule_name,
                    action,
                    error,
                    created_at: parse_timestamp(&created_at),
                },
            )
            .collect())
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
