//! Reconciling a cached message list with the remote folder

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AsgardError, AsgardResult};
use crate::folder::is_inbox_path;
use crate::message::{sort_by_recency, MessageIdentity, MessageSummary};
use crate::notify::NotificationSink;
use crate::storage::{LocalChanges, MessageList};
use crate::store::MailStore;
use crate::sync::{checkpoint, PollTask, StopSignal};

/// What a reconciliation pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Messages appended from the remote list
    pub added: usize,
    /// Cached messages no longer present remotely
    pub removed: usize,
    /// Cached messages whose read or flagged state was taken from the server
    pub updated: usize,
    /// Size of the list afterwards
    pub total: usize,
}

impl ReconcileOutcome {
    /// Check if the pass changed the list
    pub fn changed(&self) -> bool {
        self.added > 0 || self.removed > 0 || self.updated > 0
    }
}

/// Merge a full remote listing into `local`
///
/// Adds every remote message whose identity is not cached yet. Unless `local`
/// was empty (a first load), drops every cached message the remote listing
/// no longer has. Cached flags follow the server except where `changes`
/// holds a local flag change; messages with a pending local delete are never
/// added back. The result is sorted most recent first.
pub fn merge_remote(
    local: &[MessageSummary],
    remote: Vec<MessageSummary>,
    changes: &LocalChanges,
) -> (Vec<MessageSummary>, ReconcileOutcome) {
    let first_load = local.is_empty();
    let mut remote_flags: HashMap<MessageIdentity, (bool, bool)> = HashMap::with_capacity(remote.len());
    for summary in &remote {
        remote_flags
            .entry(summary.identity())
            .or_insert((summary.is_read(), summary.is_flagged()));
    }

    let mut updated = 0;
    let refreshed: Vec<MessageSummary> = local
        .iter()
        .map(|m| match remote_flags.get(&m.identity()) {
            Some(&(read, flagged))
                if !changes.is_flagging(m.identity()) && (m.is_read(), m.is_flagged()) != (read, flagged) =>
            {
                updated += 1;
                m.clone().with_read(read).with_flagged(flagged)
            }
            _ => m.clone(),
        })
        .collect();

    let (mut merged, added) = append_missing(&refreshed, remote, changes);

    let mut removed = 0;
    if !first_load {
        let before = merged.len();
        merged.retain(|m| remote_flags.contains_key(&m.identity()));
        removed = before - merged.len();
    }

    sort_by_recency(&mut merged);
    let total = merged.len();
    (merged, ReconcileOutcome { added, removed, updated, total })
}

/// Append messages whose identity is not in `local`; never removes anything
///
/// Messages with a pending local delete are skipped.
pub(crate) fn append_missing(
    local: &[MessageSummary],
    fresh: Vec<MessageSummary>,
    changes: &LocalChanges,
) -> (Vec<MessageSummary>, usize) {
    let mut known: HashSet<MessageIdentity> = local.iter().map(MessageSummary::identity).collect();
    let mut merged = local.to_vec();
    let mut added = 0;
    for summary in fresh {
        if changes.is_deleting(summary.identity()) {
            continue;
        }
        if known.insert(summary.identity()) {
            merged.push(summary);
            added += 1;
        }
    }
    (merged, added)
}

/// Brings one folder's cached list in line with the server
pub struct MessageListReconciler {
    account_id: Uuid,
    inbox_name: String,
    store: Arc<dyn MailStore>,
    sink: Arc<dyn NotificationSink>,
}

impl MessageListReconciler {
    /// Create a new reconciler for one account
    pub fn new(
        account_id: Uuid,
        inbox_name: impl Into<String>,
        store: Arc<dyn MailStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            account_id,
            inbox_name: inbox_name.into(),
            store,
            sink,
        }
    }

    /// Peek at the full remote list of `folder`
    ///
    /// The folder is closed again afterwards unless it is the inbox, which
    /// stays open for the inbox watcher.
    pub async fn fetch_remote(&self, folder: &str, stop: Option<&StopSignal>) -> AsgardResult<Vec<MessageSummary>> {
        self.store.open_folder(folder).await?;
        let fetched = self.store.list_messages(folder).await;

        if !is_inbox_path(folder, &self.inbox_name) {
            if let Err(e) = self.store.close_folder(folder).await {
                warn!(folder, "Failed to close folder: {}", e);
            }
        }

        let headers = fetched?;
        let mut summaries = Vec::with_capacity(headers.len());
        for header in &headers {
            checkpoint(stop)?;
            summaries.push(MessageSummary::from_header(header));
        }
        Ok(summaries)
    }

    /// One reconciliation pass over `list`
    ///
    /// On any failure `list` is left untouched. A listing fetched before a
    /// local mutation of `list` is discarded; the next pass picks it up.
    pub async fn reconcile(&self, folder: &str, list: &MessageList) -> AsgardResult<ReconcileOutcome> {
        self.reconcile_with_stop(folder, list, None).await
    }

    pub(crate) async fn reconcile_with_stop(
        &self,
        folder: &str,
        list: &MessageList,
        stop: Option<&StopSignal>,
    ) -> AsgardResult<ReconcileOutcome> {
        checkpoint(stop)?;
        let generation = list.generation();
        let remote = self.fetch_remote(folder, stop).await?;
        checkpoint(stop)?;

        let outcome = list
            .merge(generation, |current, changes| {
                let (merged, outcome) = merge_remote(current, remote, changes);
                outcome.changed().then_some((merged, outcome))
            })
            .unwrap_or(ReconcileOutcome {
                total: list.len(),
                ..ReconcileOutcome::default()
            });

        if outcome.changed() {
            info!(
                account = %self.account_id,
                folder,
                added = outcome.added,
                removed = outcome.removed,
                updated = outcome.updated,
                "Reconciled message list"
            );
            self.sink.message_list_changed(self.account_id, folder);
        } else {
            debug!(account = %self.account_id, folder, "Message list unchanged");
        }
        Ok(outcome)
    }

    /// Reconcile, reporting a failure instead of returning it
    pub async fn reconcile_and_report(&self, folder: &str, list: &MessageList) -> Option<ReconcileOutcome> {
        match self.reconcile(folder, list).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                self.report_failure(folder, &e);
                None
            }
        }
    }

    /// Log a failed pass and surface it as a warning
    pub fn report_failure(&self, folder: &str, error: &AsgardError) {
        if error.is_cancelled() {
            return;
        }
        warn!(account = %self.account_id, folder, "Reconciliation failed: {}", error);
        self.sink
            .warning(self.account_id, &format!("Could not refresh {}: {}", folder, error));
    }
}

/// Recurring reconciliation of one open folder
pub struct FolderReconcileTask {
    reconciler: Arc<MessageListReconciler>,
    folder: String,
    list: MessageList,
}

impl FolderReconcileTask {
    pub fn new(reconciler: Arc<MessageListReconciler>, folder: impl Into<String>, list: MessageList) -> Self {
        Self {
            reconciler,
            folder: folder.into(),
            list,
        }
    }
}

#[async_trait::async_trait]
impl PollTask for FolderReconcileTask {
    fn name(&self) -> String {
        format!("reconciler for {}", self.folder)
    }

    async fn run_cycle(&self, stop: &StopSignal) -> AsgardResult<()> {
        self.reconciler
            .reconcile_with_stop(&self.folder, &self.list, Some(stop))
            .await
            .map(|_| ())
    }

    fn report_failure(&self, error: &AsgardError) {
        self.reconciler.report_failure(&self.folder, error);
    }
}
