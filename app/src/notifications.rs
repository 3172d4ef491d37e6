//! Prints sync events the way a presentation layer would consume them

use asgard_sync::{OrderedTree, SyncEvent, TreeNode};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Consume events until the channel closes
///
/// Warnings repeat at most once per `cooldown`.
pub fn spawn_event_printer(mut rx: UnboundedReceiver<SyncEvent>, cooldown: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_warning: Option<Instant> = None;
        while let Some(event) = rx.recv().await {
            match event {
                SyncEvent::FolderTreeChanged { account_id, tree } => {
                    println!("[{}] folder tree changed ({} folders)", account_id, tree.len());
                    for (depth, folder) in tree.iter() {
                        println!("{}{}", "  ".repeat(depth + 1), folder.name);
                    }
                }
                SyncEvent::MessageListChanged { account_id, folder_path } => {
                    println!("[{}] {} changed", account_id, folder_path);
                }
                SyncEvent::Warning { account_id, message } => {
                    if last_warning.is_some_and(|t| t.elapsed() < cooldown) {
                        continue;
                    }
                    last_warning = Some(Instant::now());
                    eprintln!("[{}] warning: {}", account_id, message);
                }
            }
        }
    })
}

/// Render the account forest as an indented outline
pub fn render_forest(forest: &OrderedTree<TreeNode>) -> String {
    let mut out = String::new();
    for (depth, node) in forest.iter() {
        out.push_str(&"  ".repeat(depth));
        match node {
            TreeNode::Account(info) => out.push_str(&info.to_string()),
            TreeNode::Folder(folder) => out.push_str(&format!("{} [{}]", folder.name, folder.kind())),
        }
        out.push('\n');
    }
    out
}
