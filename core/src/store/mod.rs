//! Boundary to the remote mail store
//!
//! The sync core never talks IMAP or POP3 itself. Everything it needs from
//! the server goes through [`MailStore`]; every failure comes back as
//! `AsgardError::Access`.

pub mod memory;

pub use memory::InMemoryMailStore;

use crate::error::AsgardResult;
use crate::folder::FolderDescriptor;
use crate::message::{MessageFlag, MessageRef, RawMessageHeader};

/// Remote mail store capability
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MailStore: Send + Sync {
    /// List the direct children of `parent_path` in server order (`""` is the account root)
    async fn list_folders(&self, parent_path: &str) -> AsgardResult<Vec<FolderDescriptor>>;

    /// Make a folder accessible before fetching from it
    async fn open_folder(&self, _path: &str) -> AsgardResult<()> {
        Ok(())
    }

    /// Release a folder opened for a single operation
    async fn close_folder(&self, _path: &str) -> AsgardResult<()> {
        Ok(())
    }

    /// Number of messages currently in a folder
    async fn message_count(&self, path: &str) -> AsgardResult<usize>;

    /// Peek at every message header in a folder without touching \Seen
    async fn list_messages(&self, path: &str) -> AsgardResult<Vec<RawMessageHeader>>;

    /// Peek at the headers from position `start` (0-based) to the end
    async fn list_messages_from(&self, path: &str, start: usize) -> AsgardResult<Vec<RawMessageHeader>> {
        let mut headers = self.list_messages(path).await?;
        Ok(headers.split_off(start.min(headers.len())))
    }

    /// Set or clear a flag on a message
    async fn set_flag(&self, message: &MessageRef, flag: MessageFlag, value: bool) -> AsgardResult<()>;

    /// Delete a message
    async fn delete(&self, message: &MessageRef) -> AsgardResult<()>;

    /// Create a folder
    async fn create_folder(&self, path: &str) -> AsgardResult<()>;

    /// Rename a folder along with its children
    async fn rename_folder(&self, old_path: &str, new_path: &str) -> AsgardResult<()>;

    /// Delete a folder along with its children
    async fn delete_folder(&self, path: &str) -> AsgardResult<()>;
}
