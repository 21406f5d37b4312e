//! Rule evaluation engine
//!
//! Wires the rule store, OOF state, message store and action executor into
//! the operations a protocol frontend drives: rule mutation, retrieval,
//! message delivery and OOF control.

pub mod executor;
pub mod gate;
pub mod processor;

pub use executor::{ActionExecutor, ActionOutcome};
pub use processor::RuleProcessor;

use crate::config::Config;
use crate::error::Result;
use crate::oof::{OofHistory, OofManager};
use crate::rules::store::RuleStore;
use crate::rules::types::{ModifyMode, Rule, RuleOp};
use crate::store::outbox::Outbox;
use crate::store::types::StoredMessage;
use crate::store::{MessageStore, TemplateStore};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// The engine facade owning all per-mailbox rule processing state.
pub struct RuleEngine {
    rules: Arc<RuleStore>,
    oof: Arc<OofManager>,
    history: Arc<OofHistory>,
    store: Arc<MessageStore>,
    templates: Arc<TemplateStore>,
    outbox: Arc<Outbox>,
    processor: RuleProcessor,
}

impl RuleEngine {
    /// Create a new engine over a database pool.
    pub fn new(db: SqlitePool, config: Config) -> Self {
        let rules = Arc::new(RuleStore::new(db.clone()));
        let oof = Arc::new(OofManager::new(db.clone()));
        let history = Arc::new(OofHistory::new(db.clone()));
        let store = Arc::new(MessageStore::new(db.clone()));
        let templates = Arc::new(TemplateStore::new(db.clone()));
        let outbox = Arc::new(Outbox::new(db));

        let executor = ActionExecutor::new(
            store.clone(),
            templates.clone(),
            outbox.clone(),
            history.clone(),
        );
        let processor = RuleProcessor::new(
            rules.clone(),
            oof.clone(),
            store.clone(),
            executor,
            config.processing.clone(),
        );

        Self {
            rules,
            oof,
            history,
            store,
            templates,
            outbox,
            processor,
        }
    }

    /// Initialize all database tables.
    pub async fn init_db(&self) -> Result<()> {
        self.store.init_db().await?;
        self.rules.init_db().await?;
        self.oof.init_db().await?;
        self.history.init_db().await?;
        self.templates.init_db().await?;
        self.outbox.init_db().await?;
        Ok(())
    }

    /// Add rules to a folder. Rejects the whole batch if any rule carries an
    /// action the folder kind disallows.
    pub async fn add_rules(&self, folder_id: i64, rules: &[Rule]) -> Result<()> {
        self.rules.add_rules(folder_id, rules).await
    }

    /// Apply a modification batch to a folder's rule set.
    pub async fn modify_rules(
        &self,
        folder_id: i64,
        ops: &[RuleOp],
        mode: ModifyMode,
    ) -> Result<()> {
        self.rules.modify_rules(folder_id, ops, mode).await
    }

    /// Get a folder's rules in evaluation order.
    pub async fn get_rules(&self, folder_id: i64) -> Result<Vec<Rule>> {
        self.rules.get_rules(folder_id).await
    }

    /// Delete rules and drop their OOF reply history.
    pub async fn delete_rules(&self, folder_id: i64, rule_ids: &[i64]) -> Result<u64> {
        let deleted = self.rules.delete_rules(folder_id, rule_ids).await?;

        if let Some(folder) = self.store.folder(folder_id).await? {
            for rule_id in rule_ids {
                self.history.clear_rule(&folder.owner, *rule_id).await?;
            }
        }

        Ok(deleted)
    }

    /// Deliver a message into a folder and synchronously run the folder's
    /// rules against it. Returns the message as stored, before any rule
    /// actions were applied.
    ///
    /// Once the message is stored the delivery has happened; rule processing
    /// failures after that point are logged, not surfaced to the caller.
    pub async fn deliver(
        &self,
        folder_id: i64,
        properties: HashMap<String, serde_json::Value>,
    ) -> Result<StoredMessage> {
        let message = self.store.store_message(folder_id, properties).await?;
        if let Err(e) = self.processor.process_delivery(folder_id, &message.id).await {
            warn!(
                folder_id,
                message_id = %message.id,
                error = %e,
                "Rule processing failed for delivered message"
            );
        }
        Ok(message)
    }

    /// Set a mailbox's Out-of-Office state. Leaving the OOF state clears the
    /// mailbox's reply history so the next OOF period starts fresh.
    pub async fn set_oof(&self, mailbox: &str, enabled: bool) -> Result<()> {
        self.oof.set_enabled(mailbox, enabled).await?;
        if !enabled {
            self.history.clear_mailbox(mailbox).await?;
        }
        Ok(())
    }

    /// Whether a mailbox is in the Out-of-Office state.
    pub async fn oof_enabled(&self, mailbox: &str) -> Result<bool> {
        self.oof.is_enabled(mailbox).await
    }

    /// Folder and message storage.
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Reply template storage.
    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    /// Queue of generated outbound messages.
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Out-of-Office reply history.
    pub fn history(&self) -> &OofHistory {
        &self.history
    }
}
