//! Folder descriptors as reported by the remote store

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Default IMAP hierarchy separator
pub const DEFAULT_SEPARATOR: char = '/';

/// Well-known folder roles, guessed from the folder name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderKind {
    /// Inbox folder
    Inbox,
    /// Sent folder
    Sent,
    /// Drafts folder
    Drafts,
    /// Trash folder
    Trash,
    /// Spam folder
    Spam,
    /// Archive folder
    Archive,
    /// Custom folder
    Custom,
}

impl std::fmt::Display for FolderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FolderKind::Inbox => write!(f, "Inbox"),
            FolderKind::Sent => write!(f, "Sent"),
            FolderKind::Drafts => write!(f, "Drafts"),
            FolderKind::Trash => write!(f, "Trash"),
            FolderKind::Spam => write!(f, "Spam"),
            FolderKind::Archive => write!(f, "Archive"),
            FolderKind::Custom => write!(f, "Custom"),
        }
    }
}

/// A remote folder
///
/// Equality and hashing only look at `full_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderDescriptor {
    /// Leaf name
    pub name: String,
    /// Fully qualified, separator-joined path
    pub full_path: String,
    /// Folder can be selected and hold messages
    pub can_hold_messages: bool,
    /// Folder can have child folders
    pub can_hold_subfolders: bool,
}

impl FolderDescriptor {
    /// Create a new folder descriptor
    pub fn new(
        name: impl Into<String>,
        full_path: impl Into<String>,
        can_hold_messages: bool,
        can_hold_subfolders: bool,
    ) -> Self {
        Self {
            name: name.into(),
            full_path: full_path.into(),
            can_hold_messages,
            can_hold_subfolders,
        }
    }

    /// Create a descriptor from a full path, taking the leaf after the last separator
    pub fn from_path(full_path: impl Into<String>, separator: char) -> Self {
        let full_path = full_path.into();
        let name = full_path
            .rsplit(separator)
            .next()
            .unwrap_or(full_path.as_str())
            .to_string();
        Self::new(name, full_path, true, true)
    }

    /// Get the full path
    pub fn path(&self) -> &str {
        &self.full_path
    }

    /// Check if this is the inbox for an account whose inbox is called `inbox_name`
    pub fn is_inbox(&self, inbox_name: &str) -> bool {
        is_inbox_path(&self.full_path, inbox_name)
    }

    /// Guess the folder role from its name
    pub fn kind(&self) -> FolderKind {
        let name = self.name.to_lowercase();
        match name.as_str() {
            "inbox" => FolderKind::Inbox,
            n if n.contains("sent") => FolderKind::Sent,
            n if n.contains("draft") => FolderKind::Drafts,
            n if n.contains("trash") || n.contains("deleted") => FolderKind::Trash,
            n if n.contains("spam") || n.contains("junk") => FolderKind::Spam,
            n if n.contains("archive") => FolderKind::Archive,
            _ => FolderKind::Custom,
        }
    }
}

impl PartialEq for FolderDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.full_path == other.full_path
    }
}

impl Eq for FolderDescriptor {}

impl Hash for FolderDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full_path.hash(state);
    }
}

impl std::fmt::Display for FolderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_path)
    }
}

/// IMAP treats the inbox name case-insensitively
pub fn is_inbox_path(path: &str, inbox_name: &str) -> bool {
    path.eq_ignore_ascii_case(inbox_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_uses_full_path_only() {
        let a = FolderDescriptor::new("Reports", "Work/Reports", true, false);
        let b = FolderDescriptor::new("reports (renamed)", "Work/Reports", false, true);
        let c = FolderDescriptor::new("Reports", "Archive/Reports", true, false);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_from_path() {
        let folder = FolderDescriptor::from_path("Work/Clients/Acme", DEFAULT_SEPARATOR);
        assert_eq!(folder.name, "Acme");
        assert_eq!(folder.path(), "Work/Clients/Acme");

        let top = FolderDescriptor::from_path("Archive", '.');
        assert_eq!(top.name, "Archive");
    }

    #[test]
    fn test_inbox_detection() {
        let inbox = FolderDescriptor::from_path("Inbox", DEFAULT_SEPARATOR);
        assert!(inbox.is_inbox("INBOX"));
        assert_eq!(inbox.kind(), FolderKind::Inbox);
        assert!(!FolderDescriptor::from_path("Work/INBOX", '/').is_inbox("INBOX"));
    }

    #[test]
    fn test_folder_kind() {
        assert_eq!(FolderDescriptor::from_path("Sent Items", '/').kind(), FolderKind::Sent);
        assert_eq!(FolderDescriptor::from_path("[Gmail]/Drafts", '/').kind(), FolderKind::Drafts);
        assert_eq!(FolderDescriptor::from_path("Junk", '/').kind(), FolderKind::Spam);
        assert_eq!(FolderDescriptor::from_path("Projects", '/').kind(), FolderKind::Custom);
    }
}
