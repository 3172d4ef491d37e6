//! Notifications from the sync core to the presentation layer

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::folder::FolderDescriptor;
use crate::tree::OrderedTree;

/// Receiver of sync events
///
/// Called from background loops; implementations must not block.
pub trait NotificationSink: Send + Sync {
    /// The folder hierarchy of an account changed; `tree` is the full new snapshot
    fn folder_tree_changed(&self, account_id: Uuid, tree: &OrderedTree<FolderDescriptor>);

    /// A reconciliation pass changed the cached list of a folder
    fn message_list_changed(&self, _account_id: Uuid, _folder_path: &str) {}

    /// A non-fatal problem worth a dismissable status message
    fn warning(&self, account_id: Uuid, message: &str);
}

/// Event forwarded by [`ChannelSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Folder hierarchy changed
    FolderTreeChanged {
        account_id: Uuid,
        tree: OrderedTree<FolderDescriptor>,
    },
    /// Cached message list changed
    MessageListChanged { account_id: Uuid, folder_path: String },
    /// Non-fatal warning
    Warning { account_id: Uuid, message: String },
}

/// Sink forwarding every event into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver its events arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SyncEvent) {
        // The receiver going away just means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

impl NotificationSink for ChannelSink {
    fn folder_tree_changed(&self, account_id: Uuid, tree: &OrderedTree<FolderDescriptor>) {
        self.send(SyncEvent::FolderTreeChanged {
            account_id,
            tree: tree.clone(),
        });
    }

    fn message_list_changed(&self, account_id: Uuid, folder_path: &str) {
        self.send(SyncEvent::MessageListChanged {
            account_id,
            folder_path: folder_path.to_string(),
        });
    }

    fn warning(&self, account_id: Uuid, message: &str) {
        self.send(SyncEvent::Warning {
            account_id,
            message: message.to_string(),
        });
    }
}

/// Sink that only writes log lines
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn folder_tree_changed(&self, account_id: Uuid, tree: &OrderedTree<FolderDescriptor>) {
        info!(account = %account_id, folders = tree.len(), "Folder hierarchy changed");
    }

    fn message_list_changed(&self, account_id: Uuid, folder_path: &str) {
        info!(account = %account_id, folder = folder_path, "Message list changed");
    }

    fn warning(&self, account_id: Uuid, message: &str) {
        warn!(account = %account_id, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::new();
        let account_id = Uuid::new_v4();

        let mut tree = OrderedTree::new();
        tree.add(FolderDescriptor::from_path("INBOX", '/'));
        sink.folder_tree_changed(account_id, &tree);
        sink.message_list_changed(account_id, "INBOX");
        sink.warning(account_id, "connection lost");

        assert_eq!(rx.recv().await, Some(SyncEvent::FolderTreeChanged { account_id, tree }));
        assert_eq!(
            rx.recv().await,
            Some(SyncEvent::MessageListChanged {
                account_id,
                folder_path: "INBOX".to_string()
            })
        );
        assert!(matches!(rx.recv().await, Some(SyncEvent::Warning { .. })));
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.warning(Uuid::new_v4(), "nobody listens");
    }
}
