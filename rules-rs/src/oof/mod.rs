//! Out-of-Office state and reply history

pub mod history;
pub mod manager;

pub use history::OofHistory;
pub use manager::OofManager;
