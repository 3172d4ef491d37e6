//! Folder hierarchy polling

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AsgardError, AsgardResult};
use crate::folder::FolderDescriptor;
use crate::notify::NotificationSink;
use crate::store::MailStore;
use crate::sync::{checkpoint, PollTask, StopSignal};
use crate::tree::OrderedTree;

/// List the whole remote folder hierarchy into a tree
///
/// Sibling order is the server's order. Only folders that can hold
/// subfolders are listed further.
pub async fn fetch_folder_tree(
    store: &dyn MailStore,
    stop: Option<&StopSignal>,
) -> AsgardResult<OrderedTree<FolderDescriptor>> {
    let mut tree = OrderedTree::new();
    let mut pending = VecDeque::new();

    for folder in store.list_folders("").await? {
        checkpoint(stop)?;
        if tree.contains(&folder) {
            warn!(folder = %folder, "Duplicate folder in listing, skipping");
            continue;
        }
        if folder.can_hold_subfolders {
            pending.push_back(folder.clone());
        }
        tree.add(folder);
    }

    while let Some(parent) = pending.pop_front() {
        checkpoint(stop)?;
        for child in store.list_folders(parent.path()).await? {
            checkpoint(stop)?;
            if tree.contains(&child) {
                warn!(folder = %child, "Duplicate folder in listing, skipping");
                continue;
            }
            if child.can_hold_subfolders {
                pending.push_back(child.clone());
            }
            tree.add_child(child, &parent)?;
        }
    }

    Ok(tree)
}

/// Keeps the published folder tree of one account current
pub struct FolderHierarchyWatcher {
    account_id: Uuid,
    store: Arc<dyn MailStore>,
    sink: Arc<dyn NotificationSink>,
    current: RwLock<Option<OrderedTree<FolderDescriptor>>>,
}

impl FolderHierarchyWatcher {
    /// Create a new watcher with no published tree
    pub fn new(account_id: Uuid, store: Arc<dyn MailStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            account_id,
            store,
            sink,
            current: RwLock::new(None),
        }
    }

    /// Last published tree
    pub fn current_tree(&self) -> Option<OrderedTree<FolderDescriptor>> {
        self.current.read().clone()
    }

    /// Fetch the hierarchy once; returns `true` if a new tree was published
    ///
    /// On failure the previous tree stays current.
    pub async fn poll_once(&self, stop: Option<&StopSignal>) -> AsgardResult<bool> {
        let fresh = fetch_folder_tree(self.store.as_ref(), stop).await?;
        checkpoint(stop)?;

        {
            let mut current = self.current.write();
            if current.as_ref() == Some(&fresh) {
                debug!(account = %self.account_id, "Folder hierarchy unchanged");
                return Ok(false);
            }
            *current = Some(fresh.clone());
        }

        info!(account = %self.account_id, folders = fresh.len(), "Publishing folder hierarchy");
        self.sink.folder_tree_changed(self.account_id, &fresh);
        Ok(true)
    }
}

#[async_trait::async_trait]
impl PollTask for FolderHierarchyWatcher {
    fn name(&self) -> String {
        format!("hierarchy watcher for {}", self.account_id)
    }

    async fn run_cycle(&self, stop: &StopSignal) -> AsgardResult<()> {
        self.poll_once(Some(stop)).await.map(|_| ())
    }

    fn report_failure(&self, error: &AsgardError) {
        warn!(account = %self.account_id, "Folder listing failed: {}", error);
        self.sink
            .warning(self.account_id, &format!("Could not refresh folders: {}", error));
    }
}
