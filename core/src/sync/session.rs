//! Everything that keeps one account in sync

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::account::AccountInfo;
use crate::config::SyncConfig;
use crate::error::{AsgardError, AsgardResult};
use crate::folder::FolderDescriptor;
use crate::notify::NotificationSink;
use crate::storage::{FolderContentCache, MessageList};
use crate::store::MailStore;
use crate::sync::{
    spawn_poller, FirstCycle, FolderHierarchyWatcher, FolderReconcileTask, InboxWatcher, MessageActions,
    MessageListReconciler, PollHandle,
};
use crate::tree::OrderedTree;

type FolderPollers = Arc<Mutex<HashMap<String, PollHandle>>>;

/// Sync state and background loops of one account
///
/// Owns the hierarchy watcher, the folder content cache, the inbox watchers
/// and one reconcile loop per viewed folder. A folder's loop starts on its
/// first view and stops when the folder leaves the cache.
pub struct AccountSession {
    info: AccountInfo,
    config: SyncConfig,
    store: Arc<dyn MailStore>,
    sink: Arc<dyn NotificationSink>,
    reconciler: Arc<MessageListReconciler>,
    cache: Arc<FolderContentCache>,
    hierarchy: Arc<FolderHierarchyWatcher>,
    actions: MessageActions,
    pollers: Mutex<Vec<PollHandle>>,
    folder_pollers: FolderPollers,
    started: AtomicBool,
}

impl AccountSession {
    /// Create a new session; nothing runs until [`start`](Self::start)
    pub fn new(
        info: AccountInfo,
        config: SyncConfig,
        store: Arc<dyn MailStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let reconciler = Arc::new(MessageListReconciler::new(
            info.id,
            config.inbox_name.clone(),
            store.clone(),
            sink.clone(),
        ));

        let folder_pollers: FolderPollers = Arc::new(Mutex::new(HashMap::new()));
        let evicted_pollers = folder_pollers.clone();
        let cache = Arc::new(
            FolderContentCache::new(config.inbox_name.clone(), config.folder_cache_capacity, reconciler.clone())
                .with_eviction_callback(move |path| {
                    if let Some(handle) = evicted_pollers.lock().remove(path) {
                        debug!(folder = path, "Stopping reconcile loop of evicted folder");
                        handle.stop();
                    }
                }),
        );

        let hierarchy = Arc::new(FolderHierarchyWatcher::new(info.id, store.clone(), sink.clone()));
        let actions = MessageActions::new(info.id, store.clone(), sink.clone(), cache.clone(), hierarchy.clone());

        Self {
            info,
            config,
            store,
            sink,
            reconciler,
            cache,
            hierarchy,
            actions,
            pollers: Mutex::new(Vec::new()),
            folder_pollers,
            started: AtomicBool::new(false),
        }
    }

    pub fn info(&self) -> &AccountInfo {
        &self.info
    }

    pub fn id(&self) -> uuid::Uuid {
        self.info.id
    }

    /// Load the inbox and start the account-wide loops
    ///
    /// A failed inbox load is reported and left to the loops to retry.
    pub async fn start(&self) -> AsgardResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(AsgardError::invalid_state(format!("account {} already started", self.info.id)));
        }

        let inbox_path = self.config.inbox_name.clone();
        let inbox = self.cache.inbox();
        if let Some(outcome) = self.reconciler.reconcile_and_report(&inbox_path, &inbox).await {
            info!(account = %self.info.id, messages = outcome.total, "Loaded inbox");
        }

        let inbox_watcher = Arc::new(InboxWatcher::new(
            self.info.id,
            inbox_path.clone(),
            inbox.clone(),
            self.store.clone(),
            self.sink.clone(),
            self.reconciler.clone(),
        ));
        let inbox_reconcile = Arc::new(FolderReconcileTask::new(self.reconciler.clone(), inbox_path, inbox));

        let mut pollers = self.pollers.lock();
        pollers.push(spawn_poller(
            self.hierarchy.clone(),
            self.config.hierarchy_interval(),
            FirstCycle::Immediate,
        ));
        pollers.push(spawn_poller(inbox_watcher, self.config.inbox_interval(), FirstCycle::AfterInterval));
        pollers.push(spawn_poller(
            inbox_reconcile,
            self.config.inbox_reconcile_interval(),
            FirstCycle::AfterInterval,
        ));

        info!(account = %self.info.id, email = %self.info.email, "Account session started");
        Ok(())
    }

    /// Message list of a folder, most recent first
    ///
    /// Returns the cached list right away and refreshes it in the background.
    /// The first view of a non-inbox folder also starts its reconcile loop.
    pub fn folder_content(&self, path: &str) -> MessageList {
        let list = self.cache.get(path);
        if self.cache.is_inbox(path) || !self.started.load(Ordering::SeqCst) {
            return list;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            debug!(folder = path, "No runtime, not starting reconcile loop");
            return list;
        }

        let mut folder_pollers = self.folder_pollers.lock();
        folder_pollers.retain(|_, handle| !handle.is_finished());
        if !folder_pollers.contains_key(path) {
            let task = Arc::new(FolderReconcileTask::new(self.reconciler.clone(), path, list.clone()));
            let handle = spawn_poller(task, self.config.folder_interval(), FirstCycle::AfterInterval);
            folder_pollers.insert(path.to_string(), handle);
        }
        list
    }

    /// Reconcile a folder now and wait for the result
    pub async fn refresh_folder(&self, path: &str) -> AsgardResult<MessageList> {
        self.cache.get_synced(path).await
    }

    /// Last published folder tree
    pub fn folder_tree(&self) -> Option<OrderedTree<FolderDescriptor>> {
        self.hierarchy.current_tree()
    }

    /// Fetch the folder hierarchy now; `true` if it changed
    pub async fn refresh_hierarchy(&self) -> AsgardResult<bool> {
        self.hierarchy.poll_once(None).await
    }

    pub fn actions(&self) -> &MessageActions {
        &self.actions
    }

    pub fn cache(&self) -> &Arc<FolderContentCache> {
        &self.cache
    }

    /// Folders with a running reconcile loop
    pub fn open_folders(&self) -> Vec<String> {
        let mut folders: Vec<String> = self.folder_pollers.lock().keys().cloned().collect();
        folders.sort();
        folders
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Stop every loop of this account and wait for them
    pub async fn shutdown(&self) {
        let mut handles: Vec<PollHandle> = std::mem::take(&mut *self.pollers.lock());
        handles.extend(self.folder_pollers.lock().drain().map(|(_, handle)| handle));

        for handle in &handles {
            handle.stop();
        }
        for handle in handles {
            handle.join().await;
        }
        self.cache.shutdown().await;

        if self.started.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.store.close_folder(&self.config.inbox_name).await {
                warn!(account = %self.info.id, "Failed to close inbox: {}", e);
            }
        }
        info!(account = %self.info.id, "Account session stopped");
    }
}
