//! Rule types and data structures

use serde::{Deserialize, Serialize};

/// Rule state bitmask.
///
/// Combinable bit flags controlling whether and when a rule is evaluated.
/// The two high extension bits (0x80 and 0x100) are vendor extensions whose
/// interpretation is gated by [`crate::config::ProcessingConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleState(pub u32);

impl RuleState {
    /// The rule is enabled for execution.
    pub const ENABLED: RuleState = RuleState(0x0000_0001);
    /// An error condition was encountered the last time the rule ran.
    pub const ERROR: RuleState = RuleState(0x0000_0002);
    /// Evaluate the rule only while the mailbox is in the Out-of-Office state.
    pub const ONLY_WHEN_OOF: RuleState = RuleState(0x0000_0004);
    /// Keep a per-sender history and reply at most once per sender.
    pub const KEEP_OOF_HIST: RuleState = RuleState(0x0000_0008);
    /// Stop evaluating further rules after this one executes, except for
    /// Out-of-Office rules while the mailbox is in the OOF state.
    pub const EXIT_LEVEL: RuleState = RuleState(0x0000_0010);
    /// Skip the rule when the message's spam confidence level marks it safe.
    pub const SKIP_IF_SCL_IS_SAFE: RuleState = RuleState(0x0000_0020);
    /// The rule could not be parsed when it was stored.
    pub const RULE_PARSE_ERROR: RuleState = RuleState(0x0000_0040);
    /// Extension bit: disable this specific Out-of-Office rule.
    pub const DISABLE_SPECIFIC_OOF_RULE: RuleState = RuleState(0x0000_0080);
    /// Extension bit: same semantics as [`RuleState::ONLY_WHEN_OOF`].
    pub const ALIAS_ONLY_WHEN_OOF: RuleState = RuleState(0x0000_0100);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: RuleState) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for RuleState {
    type Output = RuleState;

    fn bitor(self, rhs: RuleState) -> RuleState {
        RuleState(self.0 | rhs.0)
    }
}

/// Folder kind, restricting which actions a stored rule may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum FolderKind {
    /// A mailbox folder (Inbox or user-created).
    Private,
    /// A public folder; rejects client-side and cross-store actions.
    Public,
}

impl FolderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FolderKind::Private => "private",
            FolderKind::Public => "public",
        }
    }
}

/// Match type for content restrictions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MatchType {
    /// Exact match
    Is,
    /// Contains substring
    Contains,
    /// Prefix match
    Prefix,
    /// Regex match
    Regex,
}

/// Comparison operator for typed property restrictions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PropertyOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A rule condition, evaluated against an incoming message's properties.
///
/// Decoded once when the rule is loaded, never re-parsed per evaluation.
/// Evaluation is pure; a missing property is a non-match, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Restriction {
    /// Always true
    True,
    /// Always false
    False,
    /// Logical NOT
    Not { restriction: Box<Restriction> },
    /// All restrictions must match (AND, short-circuits)
    And { restrictions: Vec<Restriction> },
    /// Any restriction must match (OR)
    Or { restrictions: Vec<Restriction> },
    /// The property is present on the message
    Exists { property: String },
    /// String content test against a property
    Content {
        property: String,
        match_type: MatchType,
        #[serde(default)]
        case_sensitive: bool,
        value: String,
    },
    /// Typed comparison against a property value
    Property {
        property: String,
        op: PropertyOp,
        value: serde_json::Value,
    },
    /// Message size test
    Size { over: bool, size: u64 },
}

/// Reference to a stored reply template (a folder-associated item).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateRef {
    pub folder_id: i64,
    pub message_id: String,
    pub guid: String,
}

/// Reply action flavor
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub enum ReplyFlavor {
    /// Standard reply behavior: the reply goes back to the message sender.
    #[default]
    Standard,
    /// Do not reply to the sender; recipients come exclusively from the
    /// reply template.
    NoSenderReply,
}

/// An action executed when a rule's condition matches.
///
/// One closed variant per protocol action type. Public folders reject
/// `MoveOrCopy` and `DeferToClient` at rule add/modify time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum RuleAction {
    /// Set a property/value pair on the message
    Tag {
        property: String,
        value: serde_json::Value,
    },
    /// Set the read flag on the message
    MarkRead,
    /// Remove the message from the folder
    Delete,
    /// Relocate or duplicate the message into another folder
    MoveOrCopy { folder_id: i64, is_copy: bool },
    /// Send the message on to other recipients
    ForwardOrDelegate {
        recipients: Vec<String>,
        is_delegate: bool,
    },
    /// Reply using a stored template; `oof` selects the Out-of-Office variant
    Reply {
        template: TemplateRef,
        oof: bool,
        #[serde(default)]
        flavor: ReplyFlavor,
    },
    /// Store an opaque buffer for later client-side processing
    DeferToClient { data: Vec<u8> },
    /// Send a non-delivery report back to the sender
    Bounce { code: u32 },
}

impl RuleAction {
    /// Short name used in logs and error records.
    pub fn kind(&self) -> &'static str {
        match self {
            RuleAction::Tag { .. } => "tag",
            RuleAction::MarkRead => "mark-read",
            RuleAction::Delete => "delete",
            RuleAction::MoveOrCopy { is_copy: false, .. } => "move",
            RuleAction::MoveOrCopy { is_copy: true, .. } => "copy",
            RuleAction::ForwardOrDelegate {
                is_delegate: false, ..
            } => "forward",
            RuleAction::ForwardOrDelegate {
                is_delegate: true, ..
            } => "delegate",
            RuleAction::Reply { oof: false, .. } => "reply",
            RuleAction::Reply { oof: true, .. } => "oof-reply",
            RuleAction::DeferToClient { .. } => "defer",
            RuleAction::Bounce { .. } => "bounce",
        }
    }

    /// Whether this action may be stored in a rule on a folder of `kind`.
    pub fn allowed_in(&self, kind: FolderKind) -> bool {
        match kind {
            FolderKind::Private => true,
            FolderKind::Public => !matches!(
                self,
                RuleAction::MoveOrCopy { .. } | RuleAction::DeferToClient { .. }
            ),
        }
    }
}

/// A stored rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Opaque 64-bit identifier, unique within a folder
    pub id: i64,
    /// Ordering key; lower sequences are evaluated first, ties resolve by
    /// storage order
    pub sequence: u32,
    /// Display name
    pub name: String,
    /// State bit flags
    pub state: RuleState,
    /// Condition evaluated against incoming messages
    pub condition: Restriction,
    /// Actions executed in declared order when the condition matches
    pub actions: Vec<RuleAction>,
    /// Owning component
    pub provider: String,
    /// Opaque provider payload
    pub provider_data: Vec<u8>,
}

impl Rule {
    pub fn is_enabled(&self) -> bool {
        self.state.contains(RuleState::ENABLED)
    }
}

/// How a batch of rule modifications is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyMode {
    /// Atomically discard the folder's rule set and insert the new one.
    ReplaceAll,
    /// Merge by rule id: add new ids, update existing ids, remove marked ids.
    OnExisting,
}

/// A single entry in a modify batch.
#[derive(Debug, Clone)]
pub enum RuleOp {
    Add(Rule),
    Update(Rule),
    Remove(i64),
}
