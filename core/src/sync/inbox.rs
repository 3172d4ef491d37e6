//! New-mail detection for the always-open inbox

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AsgardError, AsgardResult};
use crate::message::{sort_by_recency, MessageSummary};
use crate::notify::NotificationSink;
use crate::storage::MessageList;
use crate::store::MailStore;
use crate::sync::reconcile::{append_missing, MessageListReconciler};
use crate::sync::{checkpoint, PollTask, StopSignal};

/// Fetches messages appended to the inbox since the last check
///
/// Compares the remote count with the count seen by the previous check and
/// fetches only the tail. Never removes anything; the periodic full
/// reconcile handles that.
pub struct InboxWatcher {
    account_id: Uuid,
    inbox_path: String,
    list: MessageList,
    store: Arc<dyn MailStore>,
    sink: Arc<dyn NotificationSink>,
    reconciler: Arc<MessageListReconciler>,
    seen_count: Mutex<Option<usize>>,
}

impl InboxWatcher {
    /// Create a new watcher over the inbox list
    pub fn new(
        account_id: Uuid,
        inbox_path: impl Into<String>,
        list: MessageList,
        store: Arc<dyn MailStore>,
        sink: Arc<dyn NotificationSink>,
        reconciler: Arc<MessageListReconciler>,
    ) -> Self {
        Self {
            account_id,
            inbox_path: inbox_path.into(),
            list,
            store,
            sink,
            reconciler,
            seen_count: Mutex::new(None),
        }
    }

    /// Remote count the next check compares against
    ///
    /// Falls back to the cached size until a check completed, and restarts
    /// from zero once the list was emptied.
    fn baseline(&self) -> usize {
        if self.list.is_empty() {
            return 0;
        }
        self.seen_count.lock().unwrap_or_else(|| self.list.len())
    }

    /// Check for new mail once; returns how many messages were inserted
    pub async fn check_once(&self, stop: Option<&StopSignal>) -> AsgardResult<usize> {
        let generation = self.list.generation();
        let remote_count = self.store.message_count(&self.inbox_path).await?;
        let seen = self.baseline();
        if remote_count <= seen {
            if remote_count < seen {
                *self.seen_count.lock() = Some(remote_count);
            }
            debug!(account = %self.account_id, remote_count, seen, "No new mail");
            return Ok(0);
        }

        let headers = self.store.list_messages_from(&self.inbox_path, seen).await?;
        let mut fresh = Vec::with_capacity(headers.len());
        for header in &headers {
            checkpoint(stop)?;
            fresh.push(MessageSummary::from_header(header));
        }

        let mut current_generation = false;
        let added = self
            .list
            .merge(generation, |current, changes| {
                current_generation = true;
                let (mut merged, added) = append_missing(current, fresh, changes);
                if added == 0 {
                    return None;
                }
                sort_by_recency(&mut merged);
                Some((merged, added))
            })
            .unwrap_or(0);

        if current_generation {
            *self.seen_count.lock() = Some(remote_count);
        }
        if added > 0 {
            info!(account = %self.account_id, added, "New mail in inbox");
            self.sink.message_list_changed(self.account_id, &self.inbox_path);
        }
        Ok(added)
    }
}

#[async_trait::async_trait]
impl PollTask for InboxWatcher {
    fn name(&self) -> String {
        format!("inbox watcher for {}", self.account_id)
    }

    async fn run_cycle(&self, stop: &StopSignal) -> AsgardResult<()> {
        self.check_once(Some(stop)).await.map(|_| ())
    }

    fn report_failure(&self, error: &AsgardError) {
        self.reconciler.report_failure(&self.inbox_path, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RawMessageHeader;
    use crate::notify::{ChannelSink, SyncEvent};
    use crate::store::InMemoryMailStore;
    use time::macros::datetime;
    use time::OffsetDateTime;

    fn header(subject: &str, sent_at: OffsetDateTime) -> RawMessageHeader {
        RawMessageHeader::new("dave@example.com", None, Some(subject.to_string()), sent_at)
    }

    fn watcher() -> (
        Arc<InMemoryMailStore>,
        InboxWatcher,
        MessageList,
        tokio::sync::mpsc::UnboundedReceiver<SyncEvent>,
    ) {
        let store = Arc::new(InMemoryMailStore::new());
        store.add_folder("", "INBOX", true, false);
        let (sink, rx) = ChannelSink::new();
        let sink: Arc<dyn NotificationSink> = Arc::new(sink);
        let account_id = Uuid::new_v4();
        let reconciler = Arc::new(MessageListReconciler::new(account_id, "INBOX", store.clone(), sink.clone()));
        let list = MessageList::new();
        let watcher = InboxWatcher::new(account_id, "INBOX", list.clone(), store.clone(), sink, reconciler);
        (store, watcher, list, rx)
    }

    #[tokio::test]
    async fn test_equal_counts_do_nothing() {
        let (store, watcher, list, mut rx) = watcher();
        assert_eq!(watcher.check_once(None).await.unwrap(), 0);
        assert_eq!(store.list_calls("INBOX"), 0);
        assert!(list.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_new_mail_is_appended_and_sorted() {
        let (store, watcher, list, mut rx) = watcher();
        store.add_message("INBOX", header("first", datetime!(2024-07-01 9:00 UTC)));
        assert_eq!(watcher.check_once(None).await.unwrap(), 1);
        let _ = rx.try_recv();

        store.add_message("INBOX", header("third", datetime!(2024-07-03 9:00 UTC)));
        store.add_message("INBOX", header("second", datetime!(2024-07-02 9:00 UTC)));
        assert_eq!(watcher.check_once(None).await.unwrap(), 2);

        let subjects: Vec<_> = list.snapshot().iter().map(|m| m.subject().to_string()).collect();
        assert_eq!(subjects, vec!["third", "second", "first"]);
        assert!(matches!(rx.try_recv(), Ok(SyncEvent::MessageListChanged { .. })));
        assert_eq!(store.list_calls("INBOX"), 0);
    }

    #[tokio::test]
    async fn test_never_removes() {
        let (store, watcher, list, _rx) = watcher();
        let gone = store.add_message("INBOX", header("gone", datetime!(2024-07-01 9:00 UTC)));
        store.add_message("INBOX", header("stays", datetime!(2024-07-02 9:00 UTC)));
        watcher.check_once(None).await.unwrap();

        store.expunge("INBOX", gone);
        assert_eq!(watcher.check_once(None).await.unwrap(), 0);
        assert!(list.contains(gone));
    }

    #[tokio::test]
    async fn test_already_cached_tail_is_not_duplicated() {
        let (store, watcher, list, _rx) = watcher();
        let sent = datetime!(2024-07-01 9:00 UTC);
        store.add_message("INBOX", header("dup", sent));
        store.add_message("INBOX", header("dup", sent));

        assert_eq!(watcher.check_once(None).await.unwrap(), 1);
        assert_eq!(list.len(), 1);
        assert_eq!(store.tail_calls("INBOX"), 1);

        for _ in 0..3 {
            assert_eq!(watcher.check_once(None).await.unwrap(), 0);
        }
        assert_eq!(store.tail_calls("INBOX"), 1);

        store.add_message("INBOX", header("fresh", datetime!(2024-07-02 9:00 UTC)));
        assert_eq!(watcher.check_once(None).await.unwrap(), 1);
        assert_eq!(list.len(), 2);
        assert_eq!(store.tail_calls("INBOX"), 2);
    }

    #[tokio::test]
    async fn test_pending_delete_is_not_brought_back() {
        let (store, watcher, list, _rx) = watcher();
        let doomed = store.add_message("INBOX", header("doomed", datetime!(2024-07-01 9:00 UTC)));
        watcher.check_once(None).await.unwrap();

        let deleting = list.remove(doomed).unwrap();
        assert!(list.is_empty());
        store.add_message("INBOX", header("next", datetime!(2024-07-02 9:00 UTC)));
        assert_eq!(watcher.check_once(None).await.unwrap(), 1);
        assert!(!list.contains(doomed));

        drop(deleting);
        store.expunge("INBOX", doomed);
        assert_eq!(watcher.check_once(None).await.unwrap(), 0);
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_inbox_reports_access_error() {
        let (store, watcher, _list, _rx) = watcher();
        store.set_offline(true);
        assert!(watcher.check_once(None).await.unwrap_err().is_access_error());
    }
}
