//! rules-rs: Server-side mailbox rule evaluation
//!
//! A rule engine for mail folders in the style of Exchange server-side
//! rules: persisted per-folder rule sets, condition matching over message
//! properties, and automatic actions including Out-of-Office replies.
//!
//! # Features
//!
//! - **Rule Store**: Ordered, per-folder rule sets with all-or-nothing batch mutation
//! - **Condition Matching**: Content, existence, comparison and size restrictions
//! - **Out-of-Office**: OOF-gated rules and at-most-once reply history per sender
//! - **Actions**: Tag, mark read, delete, move/copy, forward/delegate, reply, defer, bounce
//! - **Storage**: SQLite via sqlx, async throughout
//!
//! # Example
//!
//! ```no_run
//! use rules_rs::config::Config;
//! use rules_rs::engine::RuleEngine;
//! use sqlx::SqlitePool;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = SqlitePool::connect("sqlite::memory:").await?;
//!     let engine = RuleEngine::new(pool, Config::default());
//!     engine.init_db().await?;
//!
//!     engine.set_oof("user@example.com", true).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`rules`]: Rule model, condition matcher and rule persistence
//! - [`oof`]: Out-of-Office state and reply history
//! - [`store`]: Folders, messages, templates and the outbound queue
//! - [`engine`]: Evaluation loop and action execution

pub mod config;
pub mod engine;
pub mod error;
pub mod oof;
pub mod rules;
pub mod store;

pub use config::Config;
pub use engine::RuleEngine;
pub use error::{Result, RuleError};
