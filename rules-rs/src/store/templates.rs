//! Reply template storage
//!
//! Templates are folder-associated items referenced by rules through a
//! (folder id, message id, GUID) triple. A template must outlive every rule
//! that references it; a dangling reference makes the reply action fail
//! softly at execution time.

use crate::error::Result;
use crate::rules::types::TemplateRef;
use crate::store::types::ReplyTemplate;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Stores reply templates for reply-type rule actions.
pub struct TemplateStore {
    db: SqlitePool,
}

impl TemplateStore {
    /// Create a new template store
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reply_templates (
                folder_id INTEGER NOT NULL,
                message_id TEXT NOT NULL,
                guid TEXT NOT NULL,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                recipients TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (folder_id, message_id, guid)
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Store a new reply template in a folder, returning it with its
    /// generated (message id, GUID) reference.
    pub async fn create_template(
        &self,
        folder_id: i64,
        subject: &str,
        body: &str,
        recipients: &[String],
    ) -> Result<ReplyTemplate> {
        let message_id = Uuid::new_v4().to_string();
        let guid = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO reply_templates (folder_id, message_id, guid, subject, body, recipients, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(folder_id)
        .bind(&message_id)
        .bind(&guid)
        .bind(subject)
        .bind(body)
        .bind(serde_json::to_string(recipients)?)
        .bind(created_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(ReplyTemplate {
            folder_id,
            message_id,
            guid,
            subject: subject.to_string(),
            body: body.to_string(),
            recipients: recipients.to_vec(),
            created_at,
        })
    }

    /// Resolve a rule's template reference.
    pub async fn get_template(&self, template: &TemplateRef) -> Result<Option<ReplyTemplate>> {
        let row = sqlx::query_as::<_, (String, String, String, String)>(
            r#"
            SELECT subject, body, recipients, created_at
            FROM reply_templates
            WHERE folder_id = ? AND message_id = ? AND guid = ?
            "#,
        )
        .bind(template.folder_id)
        .bind(&template.message_id)
        .bind(&template.guid)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some((subject, body, recipients, created_at)) => Ok(Some(ReplyTemplate {
                folder_id: template.folder_id,
                message_id: template.message_id.clone(),
                guid: template.guid.clone(),
                subject,
                body,
                recipients: serde_json::from_str(&recipients)?,
                created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })),
            None => Ok(None),
        }
    }

    /// Delete a template. Dependent reply actions fail softly afterwards.
    pub async fn delete_template(&self, template: &TemplateRef) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM reply_templates WHERE folder_id = ? AND message_id = ? AND guid = ?",
        )
        .bind(template.folder_id)
        .bind(&template.message_id)
        .bind(&template.guid)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl ReplyTemplate {
    /// The reference rules use to point at this template.
    pub fn template_ref(&self) -> TemplateRef {
        TemplateRef {
            folder_id: self.folder_id,
            message_id: self.message_id.clone(),
            guid: self.guid.clone(),
        }
    }
}
