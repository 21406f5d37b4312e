//! Rule model, condition matching and rule persistence

pub mod matcher;
pub mod store;
pub mod types;

pub use store::RuleStore;
pub use types::{
    FolderKind, MatchType, ModifyMode, PropertyOp, ReplyFlavor, Restriction, Rule, RuleAction,
    RuleOp, RuleState, TemplateRef,
};
