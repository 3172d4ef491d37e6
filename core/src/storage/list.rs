//! Shared, copy-on-write message list of one folder

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::message::{sort_by_recency, MessageIdentity, MessageSummary};

/// Local mutations whose remote half has not finished yet
#[derive(Debug, Default)]
struct PendingState {
    generation: u64,
    deletes: HashMap<MessageIdentity, usize>,
    flags: HashMap<MessageIdentity, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    Delete,
    Flag,
}

impl PendingState {
    fn counts(&mut self, kind: ChangeKind) -> &mut HashMap<MessageIdentity, usize> {
        match kind {
            ChangeKind::Delete => &mut self.deletes,
            ChangeKind::Flag => &mut self.flags,
        }
    }
}

/// Messages a merge must leave as the user last set them
#[derive(Debug, Clone, Default)]
pub struct LocalChanges {
    deleting: HashSet<MessageIdentity>,
    flagging: HashSet<MessageIdentity>,
}

impl LocalChanges {
    /// Deleted locally; the server may still list it
    pub fn is_deleting(&self, identity: MessageIdentity) -> bool {
        self.deleting.contains(&identity)
    }

    /// Flags changed locally; the server may still report the old ones
    pub fn is_flagging(&self, identity: MessageIdentity) -> bool {
        self.flagging.contains(&identity)
    }
}

/// Registration of a local mutation until its remote half completes
///
/// Dropping it releases the message back to the reconciler and bumps the
/// list generation, so a listing fetched while the change was in flight is
/// never merged.
#[must_use]
#[derive(Debug)]
pub(crate) struct PendingChange {
    pending: Arc<Mutex<PendingState>>,
    identity: MessageIdentity,
    kind: ChangeKind,
}

impl Drop for PendingChange {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        pending.generation += 1;
        let counts = pending.counts(self.kind);
        if let Some(count) = counts.get_mut(&self.identity) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&self.identity);
            }
        }
    }
}

/// Cached message list of one folder
///
/// Cloning the handle shares the list. Readers take an immutable snapshot;
/// writers publish a whole new vector under the lock, so a reader never sees
/// a half-applied reconciliation.
#[derive(Debug, Clone, Default)]
pub struct MessageList {
    inner: Arc<RwLock<Arc<Vec<MessageSummary>>>>,
    pending: Arc<Mutex<PendingState>>,
}

impl MessageList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a list holding `messages`, most recent first
    pub fn from_messages(mut messages: Vec<MessageSummary>) -> Self {
        sort_by_recency(&mut messages);
        Self {
            inner: Arc::new(RwLock::new(Arc::new(messages))),
            pending: Arc::default(),
        }
    }

    /// Current contents
    pub fn snapshot(&self) -> Arc<Vec<MessageSummary>> {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Check if a message with `identity` is cached
    pub fn contains(&self, identity: MessageIdentity) -> bool {
        self.inner.read().iter().any(|m| m.identity() == identity)
    }

    /// Cached copy of a message
    pub fn get(&self, identity: MessageIdentity) -> Option<MessageSummary> {
        self.inner.read().iter().find(|m| m.identity() == identity).cloned()
    }

    /// Check if two handles share the same underlying list
    pub fn same_list(&self, other: &MessageList) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Check if any local mutation still waits for the server
    pub fn has_pending_changes(&self) -> bool {
        let pending = self.pending.lock();
        !pending.deletes.is_empty() || !pending.flags.is_empty()
    }

    /// Counter bumped by every local mutation and every completed remote half
    ///
    /// Read it before fetching and hand it to [`merge`](Self::merge).
    pub(crate) fn generation(&self) -> u64 {
        self.pending.lock().generation
    }

    /// Merge server data fetched since `generation` into the list
    ///
    /// `f` runs under the write lock and sees the messages with a pending
    /// local change. Nothing is published if a local mutation happened after
    /// `generation` was read, or if `f` returns `None`.
    pub(crate) fn merge<R>(
        &self,
        generation: u64,
        f: impl FnOnce(&[MessageSummary], &LocalChanges) -> Option<(Vec<MessageSummary>, R)>,
    ) -> Option<R> {
        let mut guard = self.inner.write();
        let changes = {
            let pending = self.pending.lock();
            if pending.generation != generation {
                debug!(
                    fetched = generation,
                    current = pending.generation,
                    "Dropping listing older than a local change"
                );
                return None;
            }
            LocalChanges {
                deleting: pending.deletes.keys().copied().collect(),
                flagging: pending.flags.keys().copied().collect(),
            }
        };
        let (next, result) = f(guard.as_slice(), &changes)?;
        *guard = Arc::new(next);
        Some(result)
    }

    /// Apply a local mutation to one message and register it as pending
    fn change(
        &self,
        identity: MessageIdentity,
        kind: ChangeKind,
        f: impl FnOnce(&mut Vec<MessageSummary>, usize),
    ) -> Option<PendingChange> {
        let mut guard = self.inner.write();
        let pos = guard.iter().position(|m| m.identity() == identity)?;
        let mut next = guard.to_vec();
        f(&mut next, pos);
        *guard = Arc::new(next);

        let mut pending = self.pending.lock();
        pending.generation += 1;
        *pending.counts(kind).entry(identity).or_insert(0) += 1;
        Some(PendingChange {
            pending: self.pending.clone(),
            identity,
            kind,
        })
    }

    /// Set the read flag of a cached message; `None` if it is not cached
    pub(crate) fn set_read(&self, identity: MessageIdentity, read: bool) -> Option<PendingChange> {
        self.change(identity, ChangeKind::Flag, |next, pos| {
            next[pos] = next[pos].clone().with_read(read);
        })
    }

    /// Set the flagged flag of a cached message; `None` if it is not cached
    pub(crate) fn set_flagged(&self, identity: MessageIdentity, flagged: bool) -> Option<PendingChange> {
        self.change(identity, ChangeKind::Flag, |next, pos| {
            next[pos] = next[pos].clone().with_flagged(flagged);
        })
    }

    /// Drop a message from the cache; `None` if it is not cached
    pub(crate) fn remove(&self, identity: MessageIdentity) -> Option<PendingChange> {
        self.change(identity, ChangeKind::Delete, |next, pos| {
            next.remove(pos);
        })
    }

    pub(crate) fn clear(&self) {
        *self.inner.write() = Arc::new(Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn list() -> (MessageList, MessageSummary, MessageSummary) {
        let old = MessageSummary::new("a@x.org", "A", "old", datetime!(2024-01-01 8:00 UTC));
        let new = MessageSummary::new("b@x.org", "B", "new", datetime!(2024-02-01 8:00 UTC));
        (MessageList::from_messages(vec![old.clone(), new.clone()]), old, new)
    }

    #[test]
    fn test_from_messages_sorts_by_recency() {
        let (list, old, new) = list();
        assert_eq!(*list.snapshot(), vec![new, old]);
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_updates() {
        let (list, old, _) = list();
        let before = list.snapshot();
        assert!(list.set_read(old.identity(), true).is_some());
        assert!(!before.iter().any(|m| m.is_read()));
        assert!(list.get(old.identity()).unwrap().is_read());
    }

    #[test]
    fn test_flag_and_remove_operations() {
        let (list, old, new) = list();
        assert!(list.set_flagged(new.identity(), true).is_some());
        assert!(list.get(new.identity()).unwrap().is_flagged());

        assert!(list.remove(old.identity()).is_some());
        assert!(!list.contains(old.identity()));
        assert!(list.set_read(old.identity(), true).is_none());
        assert!(list.remove(old.identity()).is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_pending_change_is_released_on_drop() {
        let (list, old, new) = list();
        let start = list.generation();
        let deleting = list.remove(old.identity()).unwrap();
        let flagging = list.set_read(new.identity(), true).unwrap();
        assert!(list.has_pending_changes());

        let seen = list.generation();
        assert!(seen > start);
        let merged = list.merge(seen, |current, changes| {
            assert!(changes.is_deleting(old.identity()));
            assert!(changes.is_flagging(new.identity()));
            assert!(!changes.is_deleting(new.identity()));
            Some((current.to_vec(), ()))
        });
        assert!(merged.is_some());

        drop(deleting);
        drop(flagging);
        assert!(!list.has_pending_changes());
        assert!(list.generation() > seen);
    }

    #[test]
    fn test_merge_older_than_local_change_is_dropped() {
        let (list, old, _) = list();
        let fetched_at = list.generation();
        let _deleting = list.remove(old.identity()).unwrap();

        let merged = list.merge(fetched_at, |_, _| Some((vec![old.clone()], ())));
        assert!(merged.is_none());
        assert!(!list.contains(old.identity()));
    }

    #[test]
    fn test_clones_share_state() {
        let (list, _, new) = list();
        let other = list.clone();
        assert!(list.same_list(&other));
        assert!(!list.same_list(&MessageList::new()));
        other.clear();
        assert!(list.is_empty());
        assert!(!list.contains(new.identity()));
    }
}
