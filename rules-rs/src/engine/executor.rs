//! Rule action execution
//!
//! Executes a single matched rule action against the message and mailbox.
//! Failures are reported as outcomes, never as errors: a failing action must
//! not abort the evaluation loop.

use crate::oof::OofHistory;
use crate::rules::types::{ReplyFlavor, Rule, RuleAction, RuleState, TemplateRef};
use crate::store::outbox::{Outbox, OutboundKind};
use crate::store::types::{props, Folder, StoredMessage};
use crate::store::{MessageStore, TemplateStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of executing one action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The action applied its effect.
    Applied,
    /// A policy decision suppressed the action (auto-response suppression,
    /// OOF history). Not an error.
    Suppressed,
    /// The message left the folder (deleted or moved); remaining actions on
    /// it are no-ops.
    MessageGone,
    /// The action failed; its effect is absent but evaluation continues.
    Failed(String),
}

/// Executes rule actions against the message store and outbox.
pub struct ActionExecutor {
    store: Arc<MessageStore>,
    templates: Arc<TemplateStore>,
    outbox: Arc<Outbox>,
    history: Arc<OofHistory>,
}

impl ActionExecutor {
    pub fn new(
        store: Arc<MessageStore>,
        templates: Arc<TemplateStore>,
        outbox: Arc<Outbox>,
        history: Arc<OofHistory>,
    ) -> Self {
        Self {
            store,
            templates,
            outbox,
            history,
        }
    }

    /// Execute one action of a matched rule.
    pub async fn execute(
        &self,
        folder: &Folder,
        rule: &Rule,
        action: &RuleAction,
        message: &StoredMessage,
    ) -> ActionOutcome {
        let result = match action {
            RuleAction::Tag { property, value } => {
                self.execute_tag(message, property, value.clone()).await
            }
            RuleAction::MarkRead => self.execute_mark_read(message).await,
            RuleAction::Delete => self.execute_delete(message).await,
            RuleAction::MoveOrCopy { folder_id, is_copy } => {
                self.execute_move_or_copy(message, *folder_id, *is_copy)
                    .await
            }
            RuleAction::ForwardOrDelegate {
                recipients,
                is_delegate,
            } => {
                self.execute_forward(folder, message, recipients, *is_delegate)
                    .await
            }
            RuleAction::Reply {
                template,
                oof,
                flavor,
            } => {
                self.execute_reply(folder, rule, message, template, *oof, *flavor)
                    .await
            }
            RuleAction::DeferToClient { data } => self.execute_defer(folder, rule, message, data).await,
            RuleAction::Bounce { code } => self.execute_bounce(folder, message, *code).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => ActionOutcome::Failed(e.to_string()),
        }
    }

    async fn execute_tag(
        &self,
        message: &StoredMessage,
        property: &str,
        value: serde_json::Value,
    ) -> crate::error::Result<ActionOutcome> {
        if self.store.set_property(&message.id, property, value).await? {
            Ok(ActionOutcome::Applied)
        } else {
            Ok(ActionOutcome::MessageGone)
        }
    }

    async fn execute_mark_read(
        &self,
        message: &StoredMessage,
    ) -> crate::error::Result<ActionOutcome> {
        if self.store.mark_read(&message.id).await? {
            Ok(ActionOutcome::Applied)
        } else {
            Ok(ActionOutcome::MessageGone)
        }
    }

    async fn execute_delete(
        &self,
        message: &StoredMessage,
    ) -> crate::error::Result<ActionOutcome> {
        self.store.delete_message(&message.id).await?;
        Ok(ActionOutcome::MessageGone)
    }

    async fn execute_move_or_copy(
        &self,
        message: &StoredMessage,
        dest_folder_id: i64,
        is_copy: bool,
    ) -> crate::error::Result<ActionOutcome> {
        if is_copy {
            match self.store.copy_message(&message.id, dest_folder_id).await {
                Ok(_) => Ok(ActionOutcome::Applied),
                Err(e) => Ok(ActionOutcome::Failed(e.to_string())),
            }
        } else {
            match self.store.move_message(&message.id, dest_folder_id).await {
                Ok(()) => Ok(ActionOutcome::MessageGone),
                Err(e) => Ok(ActionOutcome::Failed(e.to_string())),
            }
        }
    }

    async fn execute_forward(
        &self,
        folder: &Folder,
        message: &StoredMessage,
        recipients: &[String],
        is_delegate: bool,
    ) -> crate::error::Result<ActionOutcome> {
        if recipients.is_empty() {
            return Ok(ActionOutcome::Failed(
                "forward action has no recipients".to_string(),
            ));
        }

        let original_subject = message.subject().unwrap_or_default();
        let body = message.property_str(props::BODY).unwrap_or_default();

        // A delegated message is resent on behalf of the original sender;
        // a forward goes out under the mailbox owner's address.
        let (from_addr, subject, kind) = if is_delegate {
            let sender = message.sender().unwrap_or(&folder.owner);
            (
                sender.to_string(),
                original_subject.to_string(),
                OutboundKind::Delegate,
            )
        } else {
            (
                folder.owner.clone(),
                format!("FW: {}", original_subject),
                OutboundKind::Forward,
            )
        };

        self.outbox
            .submit(
                &folder.owner,
                &from_addr,
                recipients,
                &subject,
                body,
                "IPM.Note",
                Some(&message.id),
                kind,
            )
            .await?;

        Ok(ActionOutcome::Applied)
    }

    async fn execute_reply(
        &self,
        folder: &Folder,
        rule: &Rule,
        message: &StoredMessage,
        template_ref: &TemplateRef,
        oof: bool,
        flavor: ReplyFlavor,
    ) -> crate::error::Result<ActionOutcome> {
        // The sender opted out of automatic responses.
        if message.suppresses_auto_reply() {
            debug!(
                rule_id = rule.id,
                message_id = %message.id,
                "Reply suppressed by auto-response-suppress bit"
            );
            return Ok(ActionOutcome::Suppressed);
        }

        let Some(sender) = message.sender().map(|s| s.to_string()) else {
            return Ok(ActionOutcome::Failed(
                "message has no sender to reply to".to_string(),
            ));
        };

        let keep_history = oof && rule.state.contains(RuleState::KEEP_OOF_HIST);
        if keep_history
            && self
                .history
                .should_suppress(&folder.owner, rule.id, &sender)
                .await?
        {
            debug!(
                rule_id = rule.id,
                sender, "Reply suppressed by OOF history"
            );
            return Ok(ActionOutcome::Suppressed);
        }

        let Some(template) = self.templates.get_template(template_ref).await? else {
            return Ok(ActionOutcome::Failed(format!(
                "reply template {} no longer exists",
                template_ref.guid
            )));
        };

        // Recipients merge template and original-message properties; the
        // no-self-reply flavor takes them exclusively from the template.
        let recipients = match flavor {
            ReplyFlavor::NoSenderReply => {
                if template.recipients.is_empty() {
                    warn!(
                        rule_id = rule.id,
                        "No-self-reply template has no recipients, skipping reply"
                    );
                    return Ok(ActionOutcome::Suppressed);
                }
                template.recipients.clone()
            }
            ReplyFlavor::Standard => {
                let mut recipients = vec![sender.clone()];
                for recipient in &template.recipients {
                    if !recipients.contains(recipient) {
                        recipients.push(recipient.clone());
                    }
                }
                recipients
            }
        };

        let subject = if template.subject.is_empty() {
            format!("Re: {}", message.subject().unwrap_or_default())
        } else {
            template.subject.clone()
        };

        let message_class = if oof {
            props::OOF_REPLY_CLASS
        } else {
            "IPM.Note"
        };

        let kind = if oof {
            OutboundKind::OofReply
        } else {
            OutboundKind::Reply
        };

        self.outbox
            .submit(
                &folder.owner,
                &folder.owner,
                &recipients,
                &subject,
                &template.body,
                message_class,
                Some(&message.id),
                kind,
            )
            .await?;

        if keep_history {
            self.history
                .record_replied(&folder.owner, rule.id, &sender)
                .await?;
        }

        info!(rule_id = rule.id, sender, oof, "Sent rule-generated reply");
        Ok(ActionOutcome::Applied)
    }

    async fn execute_defer(
        &self,
        folder: &Folder,
        rule: &Rule,
        message: &StoredMessage,
        data: &[u8],
    ) -> crate::error::Result<ActionOutcome> {
        self.store
            .record_deferred_action(folder.id, rule.id, &message.id, data)
            .await?;
        Ok(ActionOutcome::Applied)
    }

    async fn execute_bounce(
        &self,
        folder: &Folder,
        message: &StoredMessage,
        code: u32,
    ) -> crate::error::Result<ActionOutcome> {
        let Some(sender) = message.sender().map(|s| s.to_string()) else {
            return Ok(ActionOutcome::Failed(
                "message has no sender to bounce to".to_string(),
            ));
        };

        let subject = format!(
            "Undeliverable: {}",
            message.subject().unwrap_or_default()
        );
        let body = format!("Your message was rejected by a mailbox rule (code {}).", code);

        self.outbox
            .submit(
                &folder.owner,
                &folder.owner,
                &[sender],
                &subject,
                &body,
                "REPORT.IPM.Note.NDR",
                Some(&message.id),
                OutboundKind::Bounce,
            )
            .await?;

        Ok(ActionOutcome::Applied)
    }
}
