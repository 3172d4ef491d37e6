//! Asgard Sync Core Library
//!
//! Keeps a client-side view of remote mail accounts current:
//! - Folder hierarchies polled into ordered trees, republished on change
//! - Per-folder message lists reconciled against the server by content identity
//! - A bounded folder content cache with an always-resident inbox
//! - Background poll loops with cooperative stop
//!
//! The remote side is reached through the [`store::MailStore`] trait and
//! results flow out through a [`notify::NotificationSink`].

pub mod account;
pub mod config;
pub mod error;
pub mod folder;
pub mod message;
pub mod notify;
pub mod storage;
pub mod store;
pub mod sync;
pub mod tree;

// Re-export commonly used types
pub use account::{build_account_forest, owning_account, AccountInfo, TreeNode};
pub use config::{Config, SyncConfig};
pub use error::{AsgardError, AsgardResult};
pub use folder::{FolderDescriptor, FolderKind};
pub use message::{MessageFlag, MessageIdentity, MessageRef, MessageSummary, RawMessageHeader};
pub use notify::{ChannelSink, NotificationSink, SyncEvent, TracingSink};
pub use storage::{FolderContentCache, MessageList};
pub use store::{InMemoryMailStore, MailStore};
pub use sync::{AccountSession, MessageActions, SyncManager};
pub use tree::OrderedTree;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Asgard Sync";

/// Default configuration directory name
pub const CONFIG_DIR_NAME: &str = "asgard-sync";

/// Default inbox folder name
pub const DEFAULT_INBOX_NAME: &str = "INBOX";

/// Initialize the core library
pub fn init() -> AsgardResult<()> {
    tracing::info!("Initializing Asgard Sync Core v{}", VERSION);
    Ok(())
}

/// Configuration directory without creating it
pub fn default_config_dir() -> std::path::PathBuf {
    std::env::var("ASGARD_MAIL_CONFIG_DIR")
        .map(std::path::PathBuf::from)
        .ok()
        .or_else(|| {
            directories::ProjectDirs::from("", "", CONFIG_DIR_NAME).map(|dirs| dirs.config_dir().to_path_buf())
        })
        .unwrap_or_else(|| std::path::PathBuf::from("~/.config/asgard-sync"))
}

/// Get the default configuration directory, creating it if needed
pub fn get_config_dir() -> AsgardResult<std::path::PathBuf> {
    let config_dir = default_config_dir();
    std::fs::create_dir_all(&config_dir).map_err(|_| AsgardError::ConfigDirCreateFailed(config_dir.clone()))?;
    Ok(config_dir)
}
