//! In-memory mail store
//!
//! Holds folders and message headers in process memory. Used by the demo
//! binary and as the test fixture: outages can be switched on and off, and
//! the store records which calls it served.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use crate::error::{AsgardError, AsgardResult};
use crate::folder::{FolderDescriptor, DEFAULT_SEPARATOR};
use crate::message::{MessageFlag, MessageIdentity, MessageRef, RawMessageHeader};
use crate::store::MailStore;

#[derive(Debug, Clone)]
struct FolderEntry {
    descriptor: FolderDescriptor,
    parent: String,
    messages: Vec<RawMessageHeader>,
}

#[derive(Debug, Default)]
struct StoreState {
    folders: IndexMap<String, FolderEntry>,
    offline: bool,
    open: HashSet<String>,
    list_calls: HashMap<String, usize>,
    tail_calls: HashMap<String, usize>,
    flag_updates: Vec<(MessageRef, MessageFlag, bool)>,
    deleted: Vec<MessageRef>,
}

impl StoreState {
    fn ensure_online(&self) -> AsgardResult<()> {
        if self.offline {
            Err(AsgardError::access("mail store is unreachable"))
        } else {
            Ok(())
        }
    }

    fn folder_mut(&mut self, path: &str) -> AsgardResult<&mut FolderEntry> {
        self.folders
            .get_mut(path)
            .ok_or_else(|| AsgardError::access(format!("no such folder: {}", path)))
    }

    fn message_position(&self, message: &MessageRef) -> AsgardResult<usize> {
        self.folders
            .get(&message.folder)
            .and_then(|entry| entry.messages.iter().position(|h| h.identity() == message.identity))
            .ok_or_else(|| AsgardError::access(format!("no such message in {}", message.folder)))
    }
}

/// Mail store backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryMailStore {
    state: Mutex<StoreState>,
}

impl InMemoryMailStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a folder under `parent` (`""` for the root) and return its descriptor
    pub fn add_folder(
        &self,
        parent: &str,
        name: &str,
        can_hold_messages: bool,
        can_hold_subfolders: bool,
    ) -> FolderDescriptor {
        let full_path = join_path(parent, name);
        let descriptor = FolderDescriptor::new(name, full_path.clone(), can_hold_messages, can_hold_subfolders);
        self.state.lock().folders.insert(
            full_path,
            FolderEntry {
                descriptor: descriptor.clone(),
                parent: parent.to_string(),
                messages: Vec::new(),
            },
        );
        descriptor
    }

    /// Append a message to a folder, assigning the next sequence number
    pub fn add_message(&self, path: &str, mut header: RawMessageHeader) -> MessageIdentity {
        let mut state = self.state.lock();
        let identity = header.identity();
        if let Some(entry) = state.folders.get_mut(path) {
            header.sequence = entry.messages.len() as u32 + 1;
            entry.messages.push(header);
        }
        identity
    }

    /// Expunge a message as another client would, renumbering the rest
    pub fn expunge(&self, path: &str, identity: MessageIdentity) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.folders.get_mut(path) else {
            return false;
        };
        let before = entry.messages.len();
        entry.messages.retain(|h| h.identity() != identity);
        resequence(&mut entry.messages);
        entry.messages.len() != before
    }

    /// Simulate a lost connection; every call fails with `Access` while set
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Check if a folder is currently open
    pub fn is_open(&self, path: &str) -> bool {
        self.state.lock().open.contains(path)
    }

    /// Number of full message listings served for a folder
    pub fn list_calls(&self, path: &str) -> usize {
        self.state.lock().list_calls.get(path).copied().unwrap_or(0)
    }

    /// Number of tail fetches served for a folder
    pub fn tail_calls(&self, path: &str) -> usize {
        self.state.lock().tail_calls.get(path).copied().unwrap_or(0)
    }

    /// Flag changes received so far
    pub fn flag_updates(&self) -> Vec<(MessageRef, MessageFlag, bool)> {
        self.state.lock().flag_updates.clone()
    }

    /// Message deletions received so far
    pub fn deleted_messages(&self) -> Vec<MessageRef> {
        self.state.lock().deleted.clone()
    }

    /// Current headers of a folder
    pub fn headers(&self, path: &str) -> Vec<RawMessageHeader> {
        self.state
            .lock()
            .folders
            .get(path)
            .map(|entry| entry.messages.clone())
            .unwrap_or_default()
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", parent, DEFAULT_SEPARATOR, name)
    }
}

fn split_path(path: &str) -> (&str, &str) {
    match path.rfind(DEFAULT_SEPARATOR) {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => ("", path),
    }
}

fn is_within(path: &str, root: &str) -> bool {
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with(DEFAULT_SEPARATOR))
}

fn resequence(messages: &mut [RawMessageHeader]) {
    for (i, header) in messages.iter_mut().enumerate() {
        header.sequence = i as u32 + 1;
    }
}

#[async_trait::async_trait]
impl MailStore for InMemoryMailStore {
    async fn list_folders(&self, parent_path: &str) -> AsgardResult<Vec<FolderDescriptor>> {
        let state = self.state.lock();
        state.ensure_online()?;
        Ok(state
            .folders
            .values()
            .filter(|entry| entry.parent == parent_path)
            .map(|entry| entry.descriptor.clone())
            .collect())
    }

    async fn open_folder(&self, path: &str) -> AsgardResult<()> {
        let mut state = self.state.lock();
        state.ensure_online()?;
        if !state.folders.contains_key(path) {
            return Err(AsgardError::access(format!("no such folder: {}", path)));
        }
        state.open.insert(path.to_string());
        Ok(())
    }

    async fn close_folder(&self, path: &str) -> AsgardResult<()> {
        self.state.lock().open.remove(path);
        Ok(())
    }

    async fn message_count(&self, path: &str) -> AsgardResult<usize> {
        let mut state = self.state.lock();
        state.ensure_online()?;
        Ok(state.folder_mut(path)?.messages.len())
    }

    async fn list_messages(&self, path: &str) -> AsgardResult<Vec<RawMessageHeader>> {
        let mut state = self.state.lock();
        state.ensure_online()?;
        let messages = state.folder_mut(path)?.messages.clone();
        *state.list_calls.entry(path.to_string()).or_default() += 1;
        Ok(messages)
    }

    async fn list_messages_from(&self, path: &str, start: usize) -> AsgardResult<Vec<RawMessageHeader>> {
        let mut state = self.state.lock();
        state.ensure_online()?;
        let tail = state.folder_mut(path)?.messages.get(start..).map(<[_]>::to_vec);
        *state.tail_calls.entry(path.to_string()).or_default() += 1;
        Ok(tail.unwrap_or_default())
    }

    async fn set_flag(&self, message: &MessageRef, flag: MessageFlag, value: bool) -> AsgardResult<()> {
        let mut state = self.state.lock();
        state.ensure_online()?;
        let pos = state.message_position(message)?;
        let header = &mut state.folder_mut(&message.folder)?.messages[pos];
        match flag {
            MessageFlag::Seen => header.seen = value,
            MessageFlag::Flagged => header.flagged = value,
        }
        state.flag_updates.push((message.clone(), flag, value));
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> AsgardResult<()> {
        let mut state = self.state.lock();
        state.ensure_online()?;
        let pos = state.message_position(message)?;
        let entry = state.folder_mut(&message.folder)?;
        entry.messages.remove(pos);
        resequence(&mut entry.messages);
        state.deleted.push(message.clone());
        Ok(())
    }

    async fn create_folder(&self, path: &str) -> AsgardResult<()> {
        {
            let state = self.state.lock();
            state.ensure_online()?;
            if state.folders.contains_key(path) {
                return Err(AsgardError::access(format!("folder exists: {}", path)));
            }
        }
        let (parent, name) = split_path(path);
        self.add_folder(parent, name, true, true);
        Ok(())
    }

    async fn rename_folder(&self, old_path: &str, new_path: &str) -> AsgardResult<()> {
        let mut state = self.state.lock();
        state.ensure_online()?;
        if !state.folders.contains_key(old_path) {
            return Err(AsgardError::access(format!("no such folder: {}", old_path)));
        }

        let folders = std::mem::take(&mut state.folders);
        state.folders = folders
            .into_iter()
            .map(|(path, mut entry)| {
                if !is_within(&path, old_path) {
                    return (path, entry);
                }
                let renamed = format!("{}{}", new_path, &path[old_path.len()..]);
                if path == old_path {
                    entry.parent = split_path(new_path).0.to_string();
                } else {
                    entry.parent = format!("{}{}", new_path, &entry.parent[old_path.len()..]);
                }
                let name = split_path(&renamed).1.to_string();
                entry.descriptor = FolderDescriptor::new(
                    name,
                    renamed.clone(),
                    entry.descriptor.can_hold_messages,
                    entry.descriptor.can_hold_subfolders,
                );
                (renamed, entry)
            })
            .collect();
        Ok(())
    }

    async fn delete_folder(&self, path: &str) -> AsgardResult<()> {
        let mut state = self.state.lock();
        state.ensure_online()?;
        if !state.folders.contains_key(path) {
            return Err(AsgardError::access(format!("no such folder: {}", path)));
        }
        state.folders.retain(|p, _| !is_within(p, path));
        state.open.retain(|p| !is_within(p, path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn header(subject: &str) -> RawMessageHeader {
        RawMessageHeader::new(
            "bob@example.com",
            Some("Bob".to_string()),
            Some(subject.to_string()),
            datetime!(2024-05-01 12:00 UTC),
        )
    }

    #[tokio::test]
    async fn test_folder_listing_preserves_order() {
        let store = InMemoryMailStore::new();
        store.add_folder("", "INBOX", true, false);
        store.add_folder("", "Work", true, true);
        store.add_folder("Work", "Reports", true, false);
        store.add_folder("", "Archive", true, true);

        let roots: Vec<_> = store.list_folders("").await.unwrap().into_iter().map(|f| f.full_path).collect();
        assert_eq!(roots, vec!["INBOX", "Work", "Archive"]);
        let work = store.list_folders("Work").await.unwrap();
        assert_eq!(work[0].full_path, "Work/Reports");
        assert_eq!(work[0].name, "Reports");
    }

    #[tokio::test]
    async fn test_offline_store_fails_with_access_error() {
        let store = InMemoryMailStore::new();
        store.add_folder("", "INBOX", true, false);
        store.set_offline(true);
        let err = store.list_messages("INBOX").await.unwrap_err();
        assert!(err.is_access_error());
        store.set_offline(false);
        assert!(store.list_messages("INBOX").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expunge_renumbers() {
        let store = InMemoryMailStore::new();
        store.add_folder("", "INBOX", true, false);
        let first = store.add_message("INBOX", header("one"));
        store.add_message("INBOX", header("two"));
        assert!(store.expunge("INBOX", first));
        let headers = store.headers("INBOX");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].sequence, 1);
        assert_eq!(store.list_messages_from("INBOX", 1).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_rename_moves_children() {
        let store = InMemoryMailStore::new();
        store.add_folder("", "Work", true, true);
        store.add_folder("Work", "Reports", true, true);
        store.add_folder("Work/Reports", "2024", true, false);
        store.add_folder("", "Workshop", true, false);

        store.rename_folder("Work", "Jobs").await.unwrap();

        let roots: Vec<_> = store.list_folders("").await.unwrap().into_iter().map(|f| f.full_path).collect();
        assert_eq!(roots, vec!["Jobs", "Workshop"]);
        let nested = store.list_folders("Jobs/Reports").await.unwrap();
        assert_eq!(nested[0].full_path, "Jobs/Reports/2024");

        store.delete_folder("Jobs").await.unwrap();
        let roots: Vec<_> = store.list_folders("").await.unwrap().into_iter().map(|f| f.full_path).collect();
        assert_eq!(roots, vec!["Workshop"]);
    }
}
