//! User-initiated mutations of cached messages and folders
//!
//! Flag changes and deletions land in the cached list right away and reach
//! the server from a background task. Folder operations wait for the server
//! and then refresh the affected cache entries and the folder tree.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AsgardError, AsgardResult};
use crate::message::{MessageFlag, MessageIdentity, MessageRef};
use crate::notify::NotificationSink;
use crate::storage::list::PendingChange;
use crate::storage::{FolderContentCache, MessageList};
use crate::store::MailStore;
use crate::sync::{FolderHierarchyWatcher, PollTask};

/// Remote half of a local mutation, running in the background
#[derive(Debug)]
pub struct PendingRemote {
    task: JoinHandle<AsgardResult<()>>,
}

impl PendingRemote {
    /// Wait for the server to acknowledge the change
    pub async fn wait(self) -> AsgardResult<()> {
        self.task
            .await
            .map_err(|e| AsgardError::invalid_state(format!("remote update task failed: {}", e)))?
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Mutation entry point for one account
pub struct MessageActions {
    account_id: Uuid,
    store: Arc<dyn MailStore>,
    sink: Arc<dyn NotificationSink>,
    cache: Arc<FolderContentCache>,
    hierarchy: Arc<FolderHierarchyWatcher>,
}

impl MessageActions {
    /// Create a new action set
    pub fn new(
        account_id: Uuid,
        store: Arc<dyn MailStore>,
        sink: Arc<dyn NotificationSink>,
        cache: Arc<FolderContentCache>,
        hierarchy: Arc<FolderHierarchyWatcher>,
    ) -> Self {
        Self {
            account_id,
            store,
            sink,
            cache,
            hierarchy,
        }
    }

    fn cached_list(&self, folder: &str) -> AsgardResult<MessageList> {
        self.cache
            .peek(folder)
            .ok_or_else(|| AsgardError::not_found(format!("folder not cached: {}", folder)))
    }

    /// Mark a message read or unread
    pub fn mark_read(&self, folder: &str, identity: MessageIdentity, read: bool) -> AsgardResult<PendingRemote> {
        let change = self
            .cached_list(folder)?
            .set_read(identity, read)
            .ok_or_else(|| AsgardError::not_found(format!("message {} in {}", identity, folder)))?;
        self.push_flag(MessageRef { folder: folder.to_string(), identity }, MessageFlag::Seen, read, change)
    }

    /// Flag or unflag a message
    pub fn mark_flagged(&self, folder: &str, identity: MessageIdentity, flagged: bool) -> AsgardResult<PendingRemote> {
        let change = self
            .cached_list(folder)?
            .set_flagged(identity, flagged)
            .ok_or_else(|| AsgardError::not_found(format!("message {} in {}", identity, folder)))?;
        self.push_flag(
            MessageRef { folder: folder.to_string(), identity },
            MessageFlag::Flagged,
            flagged,
            change,
        )
    }

    /// Delete a message
    ///
    /// Reconciliation passes leave the message out until the server has
    /// answered, and drop listings fetched before the delete.
    pub fn delete_message(&self, folder: &str, identity: MessageIdentity) -> AsgardResult<PendingRemote> {
        let change = self
            .cached_list(folder)?
            .remove(identity)
            .ok_or_else(|| AsgardError::not_found(format!("message {} in {}", identity, folder)))?;
        self.sink.message_list_changed(self.account_id, folder);

        let store = self.store.clone();
        let message = MessageRef { folder: folder.to_string(), identity };
        self.spawn_remote(format!("delete {} from {}", identity, folder), change, async move {
            store.delete(&message).await
        })
    }

    fn push_flag(
        &self,
        message: MessageRef,
        flag: MessageFlag,
        value: bool,
        change: PendingChange,
    ) -> AsgardResult<PendingRemote> {
        let store = self.store.clone();
        let what = format!("set {} on {} in {}", flag, message.identity, message.folder);
        self.spawn_remote(what, change, async move { store.set_flag(&message, flag, value).await })
    }

    /// Run the remote half; `change` stays registered until it finishes
    ///
    /// On failure the local value stays until the next reconcile pass takes
    /// the server's state.
    fn spawn_remote<F>(&self, what: String, change: PendingChange, remote: F) -> AsgardResult<PendingRemote>
    where
        F: std::future::Future<Output = AsgardResult<()>> + Send + 'static,
    {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| AsgardError::invalid_state("no async runtime for remote update"))?;
        let account_id = self.account_id;
        let sink = self.sink.clone();

        let task = handle.spawn(async move {
            let result = remote.await;
            drop(change);
            if let Err(e) = &result {
                warn!(account = %account_id, "Failed to {}: {}", what, e);
                sink.warning(account_id, &format!("Could not {}: {}", what, e));
            }
            result
        });
        Ok(PendingRemote { task })
    }

    /// Create a folder
    pub async fn create_folder(&self, path: &str) -> AsgardResult<()> {
        self.store.create_folder(path).await?;
        info!(account = %self.account_id, folder = path, "Created folder");
        self.refresh_hierarchy().await;
        Ok(())
    }

    /// Rename a folder along with everything below it
    pub async fn rename_folder(&self, old_path: &str, new_path: &str) -> AsgardResult<()> {
        self.store.rename_folder(old_path, new_path).await?;
        self.cache.invalidate_tree(old_path);
        info!(account = %self.account_id, from = old_path, to = new_path, "Renamed folder");
        self.refresh_hierarchy().await;
        Ok(())
    }

    /// Delete a folder along with everything below it
    pub async fn delete_folder(&self, path: &str) -> AsgardResult<()> {
        self.store.delete_folder(path).await?;
        self.cache.invalidate_tree(path);
        info!(account = %self.account_id, folder = path, "Deleted folder");
        self.refresh_hierarchy().await;
        Ok(())
    }

    async fn refresh_hierarchy(&self) {
        if let Err(e) = self.hierarchy.poll_once(None).await {
            self.hierarchy.report_failure(&e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::FolderDescriptor;
    use crate::message::RawMessageHeader;
    use crate::notify::{ChannelSink, SyncEvent};
    use crate::store::InMemoryMailStore;
    use crate::sync::MessageListReconciler;
    use parking_lot::Mutex;
    use time::macros::datetime;
    use tokio::sync::{oneshot, Notify};

    struct Fixture {
        store: Arc<InMemoryMailStore>,
        cache: Arc<FolderContentCache>,
        hierarchy: Arc<FolderHierarchyWatcher>,
        actions: MessageActions,
        rx: tokio::sync::mpsc::UnboundedReceiver<SyncEvent>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryMailStore::new());
        store.add_folder("", "INBOX", true, false);
        store.add_folder("", "Work", true, true);
        store.add_folder("Work", "Reports", true, false);

        let (sink, rx) = ChannelSink::new();
        let sink: Arc<dyn NotificationSink> = Arc::new(sink);
        let account_id = Uuid::new_v4();
        let reconciler = Arc::new(MessageListReconciler::new(account_id, "INBOX", store.clone(), sink.clone()));
        let cache = Arc::new(FolderContentCache::new("INBOX", 4, reconciler));
        let hierarchy = Arc::new(FolderHierarchyWatcher::new(account_id, store.clone(), sink.clone()));
        let actions = MessageActions::new(account_id, store.clone(), sink, cache.clone(), hierarchy.clone());
        Fixture {
            store,
            cache,
            hierarchy,
            actions,
            rx,
        }
    }

    fn seed(store: &InMemoryMailStore, folder: &str, subject: &str) -> MessageIdentity {
        store.add_message(
            folder,
            RawMessageHeader::new("frank@example.com", None, Some(subject.to_string()), datetime!(2024-09-01 9:00 UTC)),
        )
    }

    #[tokio::test]
    async fn test_mark_read_updates_cache_then_server() {
        let f = fixture();
        let id = seed(&f.store, "Work", "agenda");
        let list = f.cache.get_synced("Work").await.unwrap();

        let pending = f.actions.mark_read("Work", id, true).unwrap();
        assert!(list.get(id).unwrap().is_read());
        pending.wait().await.unwrap();

        let updates = f.store.flag_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1, MessageFlag::Seen);
        assert!(f.store.headers("Work")[0].seen);
    }

    #[tokio::test]
    async fn test_failed_flag_change_warns_then_follows_server() {
        let mut f = fixture();
        let id = seed(&f.store, "Work", "agenda");
        let list = f.cache.get_synced("Work").await.unwrap();
        let _ = f.rx.try_recv();

        f.store.set_offline(true);
        let pending = f.actions.mark_flagged("Work", id, true).unwrap();
        assert!(pending.wait().await.unwrap_err().is_access_error());
        assert!(list.get(id).unwrap().is_flagged());
        assert!(matches!(f.rx.recv().await, Some(SyncEvent::Warning { .. })));
        assert!(!list.has_pending_changes());

        f.store.set_offline(false);
        f.cache.get_synced("Work").await.unwrap();
        assert!(!f.store.headers("Work")[0].flagged);
        assert!(!list.get(id).unwrap().is_flagged());
    }

    #[tokio::test]
    async fn test_unknown_targets_are_not_found() {
        let f = fixture();
        let id = seed(&f.store, "Work", "agenda");
        assert!(matches!(f.actions.mark_read("Work", id, true), Err(AsgardError::NotFound(_))));

        f.cache.get_synced("Work").await.unwrap();
        let other = MessageIdentity::compute("x@y.z", "", "nope", datetime!(2024-01-01 0:00 UTC));
        assert!(matches!(f.actions.delete_message("Work", other), Err(AsgardError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_message_removes_locally_and_remotely() {
        let f = fixture();
        let id = seed(&f.store, "Work", "agenda");
        let list = f.cache.get_synced("Work").await.unwrap();

        f.actions.delete_message("Work", id).unwrap().wait().await.unwrap();
        assert!(list.is_empty());
        assert!(f.store.headers("Work").is_empty());
        assert_eq!(f.store.deleted_messages().len(), 1);
    }

    /// Holds the first full listing until released
    struct GatedStore {
        inner: Arc<InMemoryMailStore>,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
        listed: Notify,
    }

    #[async_trait::async_trait]
    impl MailStore for GatedStore {
        async fn list_folders(&self, parent_path: &str) -> AsgardResult<Vec<FolderDescriptor>> {
            self.inner.list_folders(parent_path).await
        }

        async fn message_count(&self, path: &str) -> AsgardResult<usize> {
            self.inner.message_count(path).await
        }

        async fn list_messages(&self, path: &str) -> AsgardResult<Vec<RawMessageHeader>> {
            let listing = self.inner.list_messages(path).await;
            let gate = self.gate.lock().take();
            if let Some(gate) = gate {
                self.listed.notify_one();
                let _ = gate.await;
            }
            listing
        }

        async fn set_flag(&self, message: &MessageRef, flag: MessageFlag, value: bool) -> AsgardResult<()> {
            self.inner.set_flag(message, flag, value).await
        }

        async fn delete(&self, message: &MessageRef) -> AsgardResult<()> {
            self.inner.delete(message).await
        }

        async fn create_folder(&self, path: &str) -> AsgardResult<()> {
            self.inner.create_folder(path).await
        }

        async fn rename_folder(&self, old_path: &str, new_path: &str) -> AsgardResult<()> {
            self.inner.rename_folder(old_path, new_path).await
        }

        async fn delete_folder(&self, path: &str) -> AsgardResult<()> {
            self.inner.delete_folder(path).await
        }
    }

    #[tokio::test]
    async fn test_delete_survives_listing_fetched_before_it() {
        let inner = Arc::new(InMemoryMailStore::new());
        inner.add_folder("", "INBOX", true, false);
        inner.add_folder("", "Work", true, false);
        let doomed = seed(&inner, "Work", "doomed");
        let kept = seed(&inner, "Work", "kept");

        let store = Arc::new(GatedStore {
            inner: inner.clone(),
            gate: Mutex::new(None),
            listed: Notify::new(),
        });
        let (sink, _rx) = ChannelSink::new();
        let sink: Arc<dyn NotificationSink> = Arc::new(sink);
        let account_id = Uuid::new_v4();
        let reconciler = Arc::new(MessageListReconciler::new(account_id, "INBOX", store.clone(), sink.clone()));
        let cache = Arc::new(FolderContentCache::new("INBOX", 4, reconciler.clone()));
        let hierarchy = Arc::new(FolderHierarchyWatcher::new(account_id, store.clone(), sink.clone()));
        let actions = MessageActions::new(account_id, store.clone(), sink, cache.clone(), hierarchy);

        let list = cache.get_synced("Work").await.unwrap();
        assert_eq!(list.len(), 2);

        let (release, gate) = oneshot::channel();
        *store.gate.lock() = Some(gate);
        let in_flight = {
            let reconciler = reconciler.clone();
            let list = list.clone();
            tokio::spawn(async move { reconciler.reconcile("Work", &list).await })
        };
        store.listed.notified().await;

        actions.delete_message("Work", doomed).unwrap().wait().await.unwrap();
        release.send(()).unwrap();

        let outcome = in_flight.await.unwrap().unwrap();
        assert!(!outcome.changed());
        assert!(!list.contains(doomed));
        assert!(list.contains(kept));
        assert!(inner.headers("Work").iter().all(|h| h.identity() != doomed));

        reconciler.reconcile("Work", &list).await.unwrap();
        assert_eq!(list.len(), 1);
        assert!(!list.contains(doomed));
    }

    #[tokio::test]
    async fn test_folder_operations_refresh_tree_and_cache() {
        let f = fixture();
        f.cache.get_synced("Work").await.unwrap();
        f.cache.get_synced("Work/Reports").await.unwrap();

        f.actions.create_folder("Receipts").await.unwrap();
        let tree = f.hierarchy.current_tree().unwrap();
        assert!(tree.contains(&FolderDescriptor::from_path("Receipts", '/')));

        f.actions.rename_folder("Work", "Jobs").await.unwrap();
        assert!(!f.cache.contains("Work"));
        assert!(!f.cache.contains("Work/Reports"));
        let tree = f.hierarchy.current_tree().unwrap();
        assert!(tree.contains(&FolderDescriptor::from_path("Jobs/Reports", '/')));

        f.actions.delete_folder("Jobs").await.unwrap();
        let tree = f.hierarchy.current_tree().unwrap();
        assert!(!tree.contains(&FolderDescriptor::from_path("Jobs", '/')));
    }

    #[tokio::test]
    async fn test_failed_folder_operation_leaves_cache() {
        let f = fixture();
        f.cache.get_synced("Work").await.unwrap();
        f.store.set_offline(true);
        assert!(f.actions.delete_folder("Work").await.unwrap_err().is_access_error());
        assert!(f.cache.contains("Work"));
    }
}
