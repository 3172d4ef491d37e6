//! Demo mail store contents and simulated activity from other clients

use asgard_sync::{InMemoryMailStore, RawMessageHeader};
use std::sync::Arc;
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio::task::JoinHandle;
use tracing::info;

const SENDERS: &[(&str, &str)] = &[
    ("manager@company.com", "Manager"),
    ("colleague1@company.com", "Colleague One"),
    ("alerts@ci.example.org", "CI"),
    ("newsletter@rust-lang.org", "This Week in Rust"),
];

/// Store with the default mailboxes, a small folder tree and sample messages
pub fn seeded_store() -> Arc<InMemoryMailStore> {
    let store = Arc::new(InMemoryMailStore::new());

    store.add_folder("", "INBOX", true, false);
    store.add_folder("", "Sent", true, false);
    store.add_folder("", "Drafts", true, false);
    store.add_folder("", "Work", true, true);
    store.add_folder("Work", "Projects", true, true);
    store.add_folder("Work/Projects", "Asgard", true, false);
    store.add_folder("Work", "Reports", true, false);
    store.add_folder("", "Trash", true, false);
    store.add_folder("", "Spam", true, false);

    let start = OffsetDateTime::now_utc() - TimeDuration::days(3);
    let samples = [
        ("INBOX", "Team Meeting Tomorrow"),
        ("INBOX", "Re: Team Meeting Tomorrow"),
        ("INBOX", "Build #412 failed"),
        ("Work", "Quarterly planning"),
        ("Work/Reports", "Weekly status"),
        ("Work/Projects/Asgard", "Folder sync design review"),
        ("Sent", "Re: Quarterly planning"),
    ];
    for (i, (folder, subject)) in samples.iter().enumerate() {
        let (from, name) = SENDERS[i % SENDERS.len()];
        let sent_at = start + TimeDuration::hours(i as i64 * 5);
        store.add_message(
            folder,
            RawMessageHeader::new(from, Some(name.to_string()), Some(subject.to_string()), sent_at),
        );
    }

    store
}

/// Deliver a new inbox message every `every`, the way another client would
pub fn spawn_incoming_mail(store: Arc<InMemoryMailStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        let mut n = 0usize;
        loop {
            ticker.tick().await;
            n += 1;
            let (from, name) = SENDERS[n % SENDERS.len()];
            let subject = format!("Incoming message #{}", n);
            store.add_message(
                "INBOX",
                RawMessageHeader::new(from, Some(name.to_string()), Some(subject.clone()), OffsetDateTime::now_utc()),
            );
            info!("Delivered \"{}\" from {}", subject, from);
        }
    })
}
