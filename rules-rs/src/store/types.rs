//! Message store types and well-known property names

use crate::rules::types::FolderKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known message property names.
pub mod props {
    pub const SUBJECT: &str = "subject";
    pub const SENDER: &str = "sender";
    pub const RECIPIENTS: &str = "recipients";
    pub const BODY: &str = "body";
    pub const MESSAGE_CLASS: &str = "message-class";
    pub const IMPORTANCE: &str = "importance";
    pub const READ: &str = "read";
    pub const AUTO_RESPONSE_SUPPRESS: &str = "auto-response-suppress";
    pub const SPAM_CONFIDENCE_LEVEL: &str = "spam-confidence-level";

    /// Bit in `AUTO_RESPONSE_SUPPRESS` that suppresses automatic replies.
    pub const SUPPRESS_OOF_REPLY_BIT: i64 = 0x20;

    /// Message class stamped on Out-of-Office replies.
    pub const OOF_REPLY_CLASS: &str = "IPM.Note.rules.OOFTemplate";

    /// Spam confidence level meaning "sender is safe".
    pub const SCL_SAFE: i64 = -1;
}

/// A folder holding messages and a rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: i64,
    /// Owning mailbox address
    pub owner: String,
    pub name: String,
    pub kind: FolderKind,
    pub created_at: DateTime<Utc>,
}

/// A message stored in a folder.
///
/// All message content lives in the property bag; `size` is computed at
/// delivery time from the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub folder_id: i64,
    pub properties: HashMap<String, serde_json::Value>,
    pub size: i64,
    pub received_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name)
    }

    /// String value of a property, if present and a string.
    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(|v| v.as_str())
    }

    pub fn sender(&self) -> Option<&str> {
        self.property_str(props::SENDER)
    }

    pub fn subject(&self) -> Option<&str> {
        self.property_str(props::SUBJECT)
    }

    pub fn is_read(&self) -> bool {
        self.properties
            .get(props::READ)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Whether the sender asked for automatic replies to be suppressed.
    pub fn suppresses_auto_reply(&self) -> bool {
        self.properties
            .get(props::AUTO_RESPONSE_SUPPRESS)
            .and_then(|v| v.as_i64())
            .map(|bits| bits & props::SUPPRESS_OOF_REPLY_BIT != 0)
            .unwrap_or(false)
    }

    /// Whether the message's spam confidence level marks the sender as safe.
    pub fn scl_is_safe(&self) -> bool {
        self.properties
            .get(props::SPAM_CONFIDENCE_LEVEL)
            .and_then(|v| v.as_i64())
            .map(|scl| scl == props::SCL_SAFE)
            .unwrap_or(false)
    }
}

/// A stored reply template (folder-associated item) supplying the subject,
/// body and recipients of generated replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyTemplate {
    pub folder_id: i64,
    pub message_id: String,
    pub guid: String,
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A deferred action stored for later client-side processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredAction {
    pub id: String,
    pub folder_id: i64,
    pub rule_id: i64,
    pub message_id: String,
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// A record of an action that failed while a rule executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleErrorRecord {
    pub id: String,
    pub folder_id: i64,
    pub rule_id: i64,
    pub rule_name: String,
    pub action: String,
    pub error: String,
    pub created_at: DateTime<Utc>,
}
