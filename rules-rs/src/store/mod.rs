//! Folder, message, template and outbound storage

pub mod manager;
pub mod outbox;
pub mod templates;
pub mod types;

pub use manager::MessageStore;
pub use outbox::{Outbox, OutboundKind, OutboundMessage};
pub use templates::TemplateStore;
pub use types::{Folder, ReplyTemplate, StoredMessage};
