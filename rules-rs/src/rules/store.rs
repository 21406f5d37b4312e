//! Persistent per-folder rule store
//!
//! Rules are stored per folder, ordered by sequence (ties resolve by storage
//! order). Mutations on the same folder serialize behind a per-folder lock,
//! and every batch is applied in a single transaction so that a concurrent
//! evaluation snapshot never observes a half-applied ReplaceAll.

use crate::error::{Result, RuleError};
use crate::rules::types::{FolderKind, ModifyMode, Rule, RuleOp, RuleState};
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Ordered rule storage for folders.
pub struct RuleStore {
    db: SqlitePool,
    // One entry per folder ever mutated, never evicted. Bounded by the
    // folder count, not the rule or message count.
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl RuleStore {
    /// Create a new rule store
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                folder_id INTEGER NOT NULL,
                rule_id INTEGER NOT NULL,
                sequence INTEGER NOT NULL,
                name TEXT NOT NULL,
                state INTEGER NOT NULL,
                condition TEXT NOT NULL,
                actions TEXT NOT NULL,
                provider TEXT NOT NULL,
                provider_data BLOB NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(folder_id, rule_id)
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_rules_folder_order
            ON rules(folder_id, sequence, id)
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    fn folder_lock(&self, folder_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(folder_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Look up a folder's kind for action validation.
    async fn folder_kind(&self, folder_id: i64) -> Result<FolderKind> {
        let row = sqlx::query_as::<_, (FolderKind,)>("SELECT kind FROM folders WHERE id = ?")
            .bind(folder_id)
            .fetch_optional(&self.db)
            .await?;

        row.map(|(kind,)| kind)
            .ok_or_else(|| RuleError::NotFound(format!("Folder {} not found", folder_id)))
    }

    /// Reject any rule carrying an action variant the folder kind disallows.
    fn validate_rule(kind: FolderKind, rule: &Rule) -> Result<()> {
        for action in &rule.actions {
            if !action.allowed_in(kind) {
                return Err(RuleError::UnsupportedAction {
                    action: action.kind().to_string(),
                    folder: kind.as_str().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Add a batch of rules to a folder, all-or-nothing.
    ///
    /// Fails without storing anything if any rule carries an action that is
    /// illegal for the folder kind, or if a rule id already exists.
    pub async fn add_rules(&self, folder_id: i64, rules: &[Rule]) -> Result<()> {
        let lock = self.folder_lock(folder_id);
        let _guard = lock.lock().await;

        let kind = self.folder_kind(folder_id).await?;
        let mut seen = HashSet::new();
        for rule in rules {
            Self::validate_rule(kind, rule)?;
            if !seen.insert(rule.id) {
                return Err(RuleError::DuplicateRuleId(rule.id));
            }
        }

        let mut tx = self.db.begin().await?;
        for rule in rules {
            Self::insert_rule(&mut tx, folder_id, rule).await?;
        }
        tx.commit().await?;

        info!(folder_id, count = rules.len(), "Added rules to folder");
        Ok(())
    }

    /// Apply a batch of rule modifications.
    ///
    /// `ReplaceAll` atomically discards the folder's prior rule set before
    /// inserting the new one and accepts only `Add` entries. `OnExisting`
    /// merges by rule id: `Add` inserts, `Update` rewrites an existing id,
    /// `Remove` deletes by id.
    pub async fn modify_rules(
        &self,
        folder_id: i64,
        ops: &[RuleOp],
        mode: ModifyMode,
    ) -> Result<()> {
        let lock = self.folder_lock(folder_id);
        let _guard = lock.lock().await;

        let kind = self.folder_kind(folder_id).await?;
        for op in ops {
            match op {
                RuleOp::Add(rule) | RuleOp::Update(rule) => Self::validate_rule(kind, rule)?,
                RuleOp::Remove(_) => {}
            }
        }

        let mut tx = self.db.begin().await?;

        match mode {
            ModifyMode::ReplaceAll => {
                sqlx::query("DELETE FROM rules WHERE folder_id = ?")
                    .bind(folder_id)
                    .execute(&mut *tx)
                    .await?;

                for op in ops {
                    match op {
                        RuleOp::Add(rule) => Self::insert_rule(&mut tx, folder_id, rule).await?,
                        RuleOp::Update(_) | RuleOp::Remove(_) => {
                            return Err(RuleError::Parse(
                                "ReplaceAll batches accept only Add entries".to_string(),
                            ));
                        }
                    }
                }
            }
            ModifyMode::OnExisting => {
                for op in ops {
                    match op {
                        RuleOp::Add(rule) => Self::insert_rule(&mut tx, folder_id, rule).await?,
                        RuleOp::Update(rule) => {
                            let result = sqlx::query(
                                r#"
                                UPDATE rules
                                SET sequence = ?, name = ?, state = ?, condition = ?,
                                    actions = ?, provider = ?, provider_data = ?, updated_at = ?
                                WHERE folder_id = ? AND rule_id = ?
                                "#,
                            )
                            .bind(rule.sequence as i64)
                            .bind(&rule.name)
                            .bind(rule.state.bits() as i64)
                            .bind(serde_json::to_string(&rule.condition)?)
                            .bind(serde_json::to_string(&rule.actions)?)
                            .bind(&rule.provider)
                            .bind(&rule.provider_data)
                            .bind(Utc::now().to_rfc3339())
                            .bind(folder_id)
                            .bind(rule.id)
                            .execute(&mut *tx)
                            .await?;

                            if result.rows_affected() == 0 {
                                return Err(RuleError::NotFound(format!(
                                    "Rule {} not found in folder {}",
                                    rule.id, folder_id
                                )));
                            }
                        }
                        RuleOp::Remove(rule_id) => {
                            sqlx::query("DELETE FROM rules WHERE folder_id = ? AND rule_id = ?")
                                .bind(folder_id)
                                .bind(rule_id)
                                .execute(&mut *tx)
                                .await?;
                        }
                    }
                }
            }
        }

        tx.commit().await?;

        debug!(folder_id, count = ops.len(), ?mode, "Modified folder rules");
        Ok(())
    }

    /// Get a folder's rules ordered by sequence ascending, ties by storage
    /// order. This single query is the consistent snapshot the evaluation
    /// loop works from.
    pub async fn get_rules(&self, folder_id: i64) -> Result<Vec<Rule>> {
        let rows = sqlx::query_as::<_, (i64, i64, String, i64, String, String, String, Vec<u8>)>(
            r#"
            SELECT rule_id, sequence, name, state, condition, actions, provider, provider_data
            FROM rules
            WHERE folder_id = ?
            ORDER BY sequence ASC, id ASC
            "#,
        )
        .bind(folder_id)
        .fetch_all(&self.db)
        .await?;

        let mut rules = Vec::with_capacity(rows.len());
        for (rule_id, sequence, name, state, condition, actions, provider, provider_data) in rows {
            rules.push(Rule {
                id: rule_id,
                sequence: sequence as u32,
                name,
                state: RuleState(state as u32),
                condition: serde_json::from_str(&condition)?,
                actions: serde_json::from_str(&actions)?,
                provider,
                provider_data,
            });
        }

        Ok(rules)
    }

    /// Delete rules by id, returning the number removed.
    pub async fn delete_rules(&self, folder_id: i64, rule_ids: &[i64]) -> Result<u64> {
        let lock = self.folder_lock(folder_id);
        let _guard = lock.lock().await;

        let mut tx = self.db.begin().await?;
        let mut deleted = 0;
        for rule_id in rule_ids {
            let result = sqlx::query("DELETE FROM rules WHERE folder_id = ? AND rule_id = ?")
                .bind(folder_id)
                .bind(rule_id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;

        info!(folder_id, deleted, "Deleted rules from folder");
        Ok(deleted)
    }

    async fn insert_rule(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        folder_id: i64,
        rule: &Rule,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO rules (
                folder_id, rule_id, sequence, name, state, condition, actions,
                provider, provider_data, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(folder_id)
        .bind(rule.id)
        .bind(rule.sequence as i64)
        .bind(&rule.name)
        .bind(rule.state.bits() as i64)
        .bind(serde_json::to_string(&rule.condition)?)
        .bind(serde_json::to_string(&rule.actions)?)
        .bind(&rule.provider)
        .bind(&rule.provider_data)
        .bind(&now)
        .bind(&now)
        .execute(&mut **tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RuleError::DuplicateRuleId(rule.id)
            }
            other => RuleError::Database(other),
        })?;

        Ok(())
    }
}
