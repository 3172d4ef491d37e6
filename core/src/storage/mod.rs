//! In-memory message storage for Asgard Sync

pub mod cache;
pub mod list;

pub use cache::{CacheStats, EvictionCallback, FolderContentCache};
pub use list::{LocalChanges, MessageList};
