//! Outbound message queue
//!
//! Generated messages (replies, forwards, bounces) are queued here for an
//! external transport to drain. Submission is fire-and-forget relative to
//! the delivery path: rule evaluation never waits for an outbound message to
//! be delivered, and a queued reply does not re-enter rule evaluation on the
//! originating mailbox.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// What kind of generated message this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum OutboundKind {
    Reply,
    OofReply,
    Forward,
    Delegate,
    Bounce,
}

/// A generated message awaiting transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: String,
    /// Mailbox on whose behalf the message was generated
    pub mailbox: String,
    pub from_addr: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub message_class: String,
    /// Id of the incoming message that triggered generation
    pub in_reply_to: Option<String>,
    pub kind: OutboundKind,
    pub created_at: DateTime<Utc>,
}

/// Persistent queue of generated outbound messages.
pub struct Outbox {
    db: SqlitePool,
}

impl Outbox {
    /// Create a new outbox
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outbound_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                mailbox TEXT NOT NULL,
                from_addr TEXT NOT NULL,
                recipients TEXT NOT NULL,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                message_class TEXT NOT NULL,
                in_reply_to TEXT,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_outbound_mailbox ON outbound_messages(mailbox)
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Queue a generated message. Returns immediately once the row is
    /// written; delivery happens out of band.
    pub async fn submit(
        &self,
        mailbox: &str,
        from_addr: &str,
        recipients: &[String],
        subject: &str,
        body: &str,
        message_class: &str,
        in_reply_to: Option<&str>,
        kind: OutboundKind,
    ) -> Result<OutboundMessage> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO outbound_messages (
                id, mailbox, from_addr, recipients, subject, body,
                message_class, in_reply_to, kind, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(mailbox)
        .bind(from_addr)
        .bind(serde_json::to_string(recipients)?)
        .bind(subject)
        .bind(body)
        .bind(message_class)
        .bind(in_reply_to)
        .bind(kind)
        .bind(created_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        debug!(mailbox, ?kind, "Queued outbound message");

        Ok(OutboundMessage {
            id,
            mailbox: mailbox.to_string(),
            from_addr: from_addr.to_string(),
            recipients: recipients.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
            message_class: message_class.to_string(),
            in_reply_to: in_reply_to.map(|s| s.to_string()),
            kind,
            created_at,
        })
    }

    /// List the messages generated on behalf of a mailbox, in submission
    /// order. Timestamps can tie within a write burst, so ordering runs on
    /// the monotonic sequence column.
    pub async fn list_for_mailbox(&self, mailbox: &str) -> Result<Vec<OutboundMessage>> {
        let rows = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                String,
                String,
                String,
                String,
                Option<String>,
                OutboundKind,
                String,
            ),
        >(
            r#"
            SELECT id, mailbox, from_addr, recipients, subject, body,
                   message_class, in_reply_to, kind, created_at
            FROM outbound_messages
            WHERE mailbox = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(mailbox)
        .fetch_all(&self.db)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for (
            id,
            mailbox,
            from_addr,
            recipients,
            subject,
            body,
            message_class,
            in_reply_to,
            kind,
            created_at,
        ) in rows
        {
            messages.push(OutboundMessage {
                id,
                mailbox,
                from_addr,
                recipients: serde_json::from_str(&recipients)?,
                subject,
                body,
                message_class,
                in_reply_to,
                kind,
                created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            });
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> Outbox {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let outbox = Outbox::new(pool);
        outbox.init_db().await.unwrap();
        outbox
    }

    #[tokio::test]
    async fn test_submit_and_list() {
        let outbox = setup().await;

        outbox
            .submit(
                "user@example.com",
                "user@example.com",
                &["sender@example.com".to_string()],
                "Out of Office",
                "I am away.",
                "IPM.Note.rules.OOFTemplate",
                Some("msg-1"),
                OutboundKind::OofReply,
            )
            .await
            .unwrap();

        let messages = outbox.list_for_mailbox("user@example.com").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, OutboundKind::OofReply);
        assert_eq!(messages[0].recipients, vec!["sender@example.com"]);
        assert_eq!(messages[0].in_reply_to.as_deref(), Some("msg-1"));

        assert!(outbox
            .list_for_mailbox("other@example.com")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_listing_preserves_submission_order() {
        let outbox = setup().await;

        // Submitted back to back, so the RFC 3339 timestamps will collide
        for recipient in ["a@example.com", "b@example.com", "c@example.com"] {
            outbox
                .submit(
                    "user@example.com",
                    "user@example.com",
                    &[recipient.to_string()],
                    "Out of Office",
                    "I am away.",
                    "IPM.Note.rules.OOFTemplate",
                    None,
                    OutboundKind::OofReply,
                )
                .await
                .unwrap();
        }

        let messages = outbox.list_for_mailbox("user@example.com").await.unwrap();
        let recipients: Vec<&str> = messages
            .iter()
            .map(|m| m.recipients[0].as_str())
            .collect();
        assert_eq!(
            recipients,
            vec!["a@example.com", "b@example.com", "c@example.com"]
        );
    }
}
