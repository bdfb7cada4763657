//! Notification inbox store.
//!
//! Owns the unread and read partitions. Every mutation builds new partition
//! vectors and swaps them in under a short write lock, so readers holding a
//! snapshot never observe a half-applied change.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::gateway::{GatewayError, NotificationGateway};
use crate::models::{sort_newest_first, Notification, ReadState};

/// Errors surfaced by inbox operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InboxError {
    #[error("Network error: {0}")]
    Network(#[from] GatewayError),

    #[error("Notification not found: {0}")]
    NotFound(String),
}

/// Outcome of [`NotificationStore::mark_as_read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkReadOutcome {
    /// The notification moved from unread to read.
    Marked,
    /// The notification was already read; nothing was sent.
    AlreadyRead,
}

/// Immutable view of both partitions.
#[derive(Debug, Clone, Default)]
pub struct InboxSnapshot {
    pub unread: Arc<[Notification]>,
    pub read: Arc<[Notification]>,
}

impl InboxSnapshot {
    pub fn unread_count(&self) -> usize {
        self.unread.len()
    }

    /// Looks a notification up in either partition.
    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.unread
            .iter()
            .chain(self.read.iter())
            .find(|n| n.id == id)
    }

    fn partition_of(&self, id: &str) -> Option<ReadState> {
        if self.unread.iter().any(|n| n.id == id) {
            Some(ReadState::Unread)
        } else if self.read.iter().any(|n| n.id == id) {
            Some(ReadState::Read)
        } else {
            None
        }
    }
}

/// Copy of `partition` without `id`.
fn without(partition: &[Notification], id: &str) -> Vec<Notification> {
    partition.iter().filter(|n| n.id != id).cloned().collect()
}

/// Copy of `partition` with `item` added, re-sorted.
fn with(partition: &[Notification], item: Notification) -> Arc<[Notification]> {
    let mut items = partition.to_vec();
    items.push(item);
    sort_newest_first(&mut items);
    items.into()
}

fn normalize(
    raws: Vec<Value>,
    read_state: ReadState,
    seen: &mut HashSet<String>,
) -> Vec<Notification> {
    let mut items: Vec<Notification> = raws
        .into_iter()
        .filter_map(|raw| {
            let normalized = Notification::from_raw(raw, read_state);
            if normalized.is_none() {
                warn!(partition = %read_state, "Skipping notification without an id");
            }
            normalized
        })
        .filter(|n| seen.insert(n.id.clone()))
        .collect();
    sort_newest_first(&mut items);
    items
}

/// Store for the two notification partitions.
pub struct NotificationStore {
    gateway: Arc<dyn NotificationGateway>,
    state: RwLock<InboxSnapshot>,
}

impl NotificationStore {
    /// Create an empty store backed by `gateway`.
    pub fn new(gateway: Arc<dyn NotificationGateway>) -> Self {
        Self {
            gateway,
            state: RwLock::new(InboxSnapshot::default()),
        }
    }

    /// Current partitions. Cheap: clones two `Arc`s.
    pub async fn snapshot(&self) -> InboxSnapshot {
        self.state.read().await.clone()
    }

    pub async fn unread_count(&self) -> usize {
        self.state.read().await.unread_count()
    }

    pub async fn get(&self, id: &str) -> Option<Notification> {
        self.state.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.partition_of(id).is_some()
    }

    /// Fetch both partitions and replace the store wholesale.
    ///
    /// If either fetch fails the previous state is kept and the error is
    /// returned; callers treat this as blocking for the whole inbox view.
    pub async fn load(&self) -> Result<InboxSnapshot, InboxError> {
        let (unread, read) =
            tokio::try_join!(self.gateway.list_unread(), self.gateway.list_read())?;

        // An id reported in both lists is read: there is no way back to unread.
        let mut seen = HashSet::new();
        let read = normalize(read, ReadState::Read, &mut seen);
        let unread = normalize(unread, ReadState::Unread, &mut seen);

        let snapshot = InboxSnapshot {
            unread: unread.into(),
            read: read.into(),
        };
        *self.state.write().await = snapshot.clone();

        info!(
            unread = snapshot.unread.len(),
            read = snapshot.read.len(),
            "Inbox loaded"
        );
        Ok(snapshot)
    }

    /// Mark a notification as read, optimistically.
    ///
    /// The notification moves to the read partition before the remote call.
    /// If the call fails it is put back into unread and the error returned.
    /// Calls for a notification that is already read return
    /// [`MarkReadOutcome::AlreadyRead`] without touching the gateway.
    pub async fn mark_as_read(&self, id: &str) -> Result<MarkReadOutcome, InboxError> {
        let original = {
            let mut state = self.state.write().await;
            match state.partition_of(id) {
                Some(ReadState::Read) => {
                    debug!(notification_id = %id, "Already read, skipping");
                    return Ok(MarkReadOutcome::AlreadyRead);
                }
                None => return Err(InboxError::NotFound(id.to_string())),
                Some(ReadState::Unread) => {}
            }

            let Some(original) = state.unread.iter().find(|n| n.id == id).cloned() else {
                return Err(InboxError::NotFound(id.to_string()));
            };

            let read = with(&state.read, original.with_read_state(ReadState::Read));
            *state = InboxSnapshot {
                unread: without(&state.unread, id).into(),
                read,
            };
            original
        };

        match self.gateway.mark_as_read(id).await {
            Ok(()) => {
                debug!(notification_id = %id, "Notification marked as read");
                Ok(MarkReadOutcome::Marked)
            }
            Err(e) => {
                self.rollback_mark_as_read(original).await;
                warn!(notification_id = %id, error = %e, "Mark as read failed, rolled back");
                metrics::counter!("inbox_mark_read_rollbacks_total").increment(1);
                Err(InboxError::Network(e))
            }
        }
    }

    async fn rollback_mark_as_read(&self, original: Notification) {
        let mut state = self.state.write().await;
        // Deleted or reloaded in the meantime: nothing to undo.
        if state.partition_of(&original.id) != Some(ReadState::Read) {
            debug!(notification_id = %original.id, "Nothing to roll back");
            return;
        }
        let unread = with(&state.unread, original.with_read_state(ReadState::Unread));
        *state = InboxSnapshot {
            unread,
            read: without(&state.read, &original.id).into(),
        };
    }

    /// Delete a notification after the gateway confirms.
    ///
    /// On failure nothing is removed and the error is returned.
    pub async fn delete(&self, id: &str) -> Result<(), InboxError> {
        if !self.contains(id).await {
            return Err(InboxError::NotFound(id.to_string()));
        }

        if let Err(e) = self.gateway.delete_notification(id).await {
            warn!(notification_id = %id, error = %e, "Delete failed");
            return Err(InboxError::Network(e));
        }

        let mut state = self.state.write().await;
        *state = InboxSnapshot {
            unread: without(&state.unread, id).into(),
            read: without(&state.read, id).into(),
        };
        info!(notification_id = %id, "Notification deleted");
        Ok(())
    }
}
