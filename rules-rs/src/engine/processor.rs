//! Per-delivery rule evaluation loop
//!
//! Runs once, synchronously, for every message delivered to a folder. The
//! loop works from a consistent snapshot of the folder's ordered rule list
//! and the mailbox's OOF state, both taken at the start of the pass, so a
//! concurrent ReplaceAll or OOF flip affects the next delivery, not this one.

use crate::config::ProcessingConfig;
use crate::engine::executor::{ActionExecutor, ActionOutcome};
use crate::engine::gate;
use crate::error::{Result, RuleError};
use crate::oof::OofManager;
use crate::rules::matcher;
use crate::rules::store::RuleStore;
use crate::rules::types::RuleState;
use crate::store::MessageStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Evaluates a folder's rules against newly delivered messages.
pub struct RuleProcessor {
    rules: Arc<RuleStore>,
    oof: Arc<OofManager>,
    store: Arc<MessageStore>,
    executor: ActionExecutor,
    config: ProcessingConfig,
}

impl RuleProcessor {
    pub fn new(
        rules: Arc<RuleStore>,
        oof: Arc<OofManager>,
        store: Arc<MessageStore>,
        executor: ActionExecutor,
        config: ProcessingConfig,
    ) -> Self {
        Self {
            rules,
            oof,
            store,
            executor,
            config,
        }
    }

    /// Run the folder's rules against a delivered message.
    ///
    /// Failures of individual actions are logged and recorded but never
    /// surfaced: from the sender's perspective delivery already happened.
    pub async fn process_delivery(&self, folder_id: i64, message_id: &str) -> Result<()> {
        let folder = self
            .store
            .folder(folder_id)
            .await?
            .ok_or_else(|| RuleError::NotFound(format!("Folder {} not found", folder_id)))?;

        // Snapshot of the ordered rule set and the OOF state for this pass
        let rules = self.rules.get_rules(folder_id).await?;
        let oof_enabled = self.oof.is_enabled(&folder.owner).await?;

        debug!(
            folder_id,
            message_id,
            rule_count = rules.len(),
            oof_enabled,
            "Evaluating rules for delivery"
        );

        // Set once an exit-level rule has fired while the mailbox is in the
        // OOF state: only Out-of-Office rules survive past that point.
        let mut oof_rules_only = false;

        for rule in &rules {
            if !rule.is_enabled() || rule.state.contains(RuleState::RULE_PARSE_ERROR) {
                continue;
            }
            if oof_rules_only && !gate::is_oof_rule(rule.state, &self.config) {
                continue;
            }
            if !gate::is_eligible(rule.state, oof_enabled, &self.config) {
                continue;
            }

            // The message is reloaded per rule so earlier actions' effects
            // are visible to later conditions.
            let Some(message) = self.store.get_message(message_id).await? else {
                debug!(message_id, "Message left the folder, ending evaluation");
                break;
            };

            if rule.state.contains(RuleState::SKIP_IF_SCL_IS_SAFE) && message.scl_is_safe() {
                debug!(rule_id = rule.id, "Skipping rule for safe-scored message");
                continue;
            }

            if !matcher::matches(&rule.condition, &message) {
                continue;
            }

            info!(
                folder_id,
                rule_id = rule.id,
                rule_name = %rule.name,
                message_id,
                "Rule matched"
            );

            let mut message_gone = false;
            for action in &rule.actions {
                if message_gone {
                    debug!(
                        rule_id = rule.id,
                        action = action.kind(),
                        "Skipping action, message already gone"
                    );
                    continue;
                }

                match self.executor.execute(&folder, rule, action, &message).await {
                    ActionOutcome::Applied | ActionOutcome::Suppressed => {}
                    ActionOutcome::MessageGone => message_gone = true,
                    ActionOutcome::Failed(error) => {
                        warn!(
                            rule_id = rule.id,
                            action = action.kind(),
                            error,
                            "Rule action failed"
                        );
                        self.store
                            .record_rule_error(folder_id, rule.id, &rule.name, action.kind(), &error)
                            .await?;
                    }
                }
            }

            if rule.state.contains(RuleState::EXIT_LEVEL) {
                if oof_enabled {
                    // Exit-level does not terminate Out-of-Office evaluation:
                    // subsequent OOF rules still run, everything else stops.
                    debug!(rule_id = rule.id, "Exit-level rule fired during OOF");
                    oof_rules_only = true;
                } else {
                    debug!(rule_id = rule.id, "Exit-level rule fired, terminating");
                    break;
                }
            }

            if message_gone {
                break;
            }
        }

        Ok(())
    }
}
