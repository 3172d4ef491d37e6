//! Folder content cache
//!
//! The inbox list lives for the whole session. Every other folder sits in a
//! bounded LRU; an evicted or invalidated folder is rebuilt from scratch on
//! its next access.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::AsgardResult;
use crate::folder::{is_inbox_path, DEFAULT_SEPARATOR};
use crate::storage::MessageList;
use crate::sync::{MessageListReconciler, StopSignal};

/// Called with the path of every folder dropped from the cache
pub type EvictionCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from a resident entry
    pub hits: usize,
    /// Lookups that created a fresh entry
    pub misses: usize,
    /// Entries dropped for capacity
    pub evictions: usize,
}

/// Per-account cache of folder message lists
pub struct FolderContentCache {
    inbox_path: String,
    inbox: MessageList,
    entries: Mutex<IndexMap<String, MessageList>>,
    capacity: usize,
    reconciler: Arc<MessageListReconciler>,
    on_evict: Option<EvictionCallback>,
    stats: Mutex<CacheStats>,
    stop_tx: watch::Sender<bool>,
    stop: StopSignal,
    refreshes: Mutex<Vec<JoinHandle<()>>>,
}

impl FolderContentCache {
    /// Create a new cache holding at most `capacity` non-inbox folders
    pub fn new(inbox_path: impl Into<String>, capacity: usize, reconciler: Arc<MessageListReconciler>) -> Self {
        let (stop_tx, stop) = StopSignal::channel();
        Self {
            inbox_path: inbox_path.into(),
            inbox: MessageList::new(),
            entries: Mutex::new(IndexMap::new()),
            capacity: capacity.max(1),
            reconciler,
            on_evict: None,
            stats: Mutex::new(CacheStats::default()),
            stop_tx,
            stop,
            refreshes: Mutex::new(Vec::new()),
        }
    }

    /// Install the callback run when a folder leaves the cache
    pub fn with_eviction_callback(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_evict = Some(Box::new(callback));
        self
    }

    /// The inbox list
    pub fn inbox(&self) -> MessageList {
        self.inbox.clone()
    }

    pub fn is_inbox(&self, path: &str) -> bool {
        is_inbox_path(path, &self.inbox_path)
    }

    /// Cached list of a folder without touching LRU order or the server
    pub fn peek(&self, path: &str) -> Option<MessageList> {
        if self.is_inbox(path) {
            return Some(self.inbox());
        }
        self.entries.lock().get(path).cloned()
    }

    /// List of a folder, refreshed in the background
    ///
    /// Returns the cached list immediately. A resident list is revalidated,
    /// a missing one is created empty and filled by a full first load. The
    /// inbox is kept current by its own watchers and is returned as is.
    /// After [`shutdown`](Self::shutdown) nothing is refreshed any more.
    pub fn get(&self, path: &str) -> MessageList {
        if self.is_inbox(path) {
            return self.inbox();
        }

        let list = self.lookup(path);
        if self.stop.is_stopped() {
            debug!(folder = path, "Cache shut down, skipping background refresh");
            return list;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let reconciler = self.reconciler.clone();
                let background = list.clone();
                let folder = path.to_string();
                let stop = self.stop.clone();
                let task = handle.spawn(async move {
                    if let Err(e) = reconciler.reconcile_with_stop(&folder, &background, Some(&stop)).await {
                        reconciler.report_failure(&folder, &e);
                    }
                });
                let mut refreshes = self.refreshes.lock();
                refreshes.retain(|task| !task.is_finished());
                refreshes.push(task);
            }
            Err(_) => debug!(folder = path, "No runtime, skipping background refresh"),
        }
        list
    }

    /// Cancel background refreshes and wait for them to finish
    ///
    /// A refresh already waiting on the server finishes that call but
    /// publishes nothing.
    pub async fn shutdown(&self) {
        // Fails only when no signal is left to hear it.
        let _ = self.stop_tx.send(true);
        let refreshes: Vec<JoinHandle<()>> = std::mem::take(&mut *self.refreshes.lock());
        for task in refreshes {
            if let Err(e) = task.await {
                debug!("Background refresh ended abnormally: {}", e);
            }
        }
    }

    /// List of a folder after a completed reconciliation pass
    pub async fn get_synced(&self, path: &str) -> AsgardResult<MessageList> {
        let list = if self.is_inbox(path) {
            self.inbox()
        } else {
            self.lookup(path)
        };
        self.reconciler.reconcile(path, &list).await?;
        Ok(list)
    }

    fn lookup(&self, path: &str) -> MessageList {
        let (list, evicted) = {
            let mut entries = self.entries.lock();
            if let Some(list) = entries.shift_remove(path) {
                entries.insert(path.to_string(), list.clone());
                self.stats.lock().hits += 1;
                return list;
            }

            let list = MessageList::new();
            entries.insert(path.to_string(), list.clone());
            let mut evicted = Vec::new();
            while entries.len() > self.capacity {
                if let Some((old, _)) = entries.shift_remove_index(0) {
                    evicted.push(old);
                }
            }

            let mut stats = self.stats.lock();
            stats.misses += 1;
            stats.evictions += evicted.len();
            (list, evicted)
        };

        for old in &evicted {
            debug!(folder = old.as_str(), "Evicted folder from cache");
            self.notify_evicted(old);
        }
        list
    }

    fn notify_evicted(&self, path: &str) {
        if let Some(callback) = &self.on_evict {
            callback(path);
        }
    }

    /// Drop a folder so its next access rebuilds it
    ///
    /// The inbox is never dropped; its list is emptied instead so the next
    /// pass is a first load.
    pub fn invalidate(&self, path: &str) -> bool {
        if self.is_inbox(path) {
            self.inbox.clear();
            return true;
        }
        let removed = self.entries.lock().shift_remove(path).is_some();
        if removed {
            self.notify_evicted(path);
        }
        removed
    }

    /// Invalidate a folder and every folder below it
    pub fn invalidate_tree(&self, root: &str) -> usize {
        let removed: Vec<String> = {
            let mut entries = self.entries.lock();
            let doomed: Vec<String> = entries.keys().filter(|p| is_within(p, root)).cloned().collect();
            for path in &doomed {
                entries.shift_remove(path);
            }
            doomed
        };
        for path in &removed {
            self.notify_evicted(path);
        }

        let mut count = removed.len();
        if is_within(&self.inbox_path, root) {
            self.inbox.clear();
            count += 1;
        }
        count
    }

    /// Check if a non-inbox folder is resident
    pub fn contains(&self, path: &str) -> bool {
        self.entries.lock().contains_key(path)
    }

    /// Resident non-inbox folders, least recently used first
    pub fn cached_folders(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }
}

fn is_within(path: &str, root: &str) -> bool {
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with(DEFAULT_SEPARATOR))
}
