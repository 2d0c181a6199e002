// Storage seam consumed by the reconciler

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use super::types::{ChangeNotification, FavoriteEntry, OrderUpdate};
use crate::storage::StorageResult;

/// Source of truth for the favorites set
pub trait FavoritesStore: Send {
    /// Fetch every favorite, ordered by order key
    fn fetch_all(&self) -> StorageResult<Vec<FavoriteEntry>>;

    /// Write new order keys. Either all updates land or none do.
    fn persist_order(&self, updates: &[OrderUpdate]) -> StorageResult<()>;

    /// Register the sole change listener
    fn subscribe(&self) -> Subscription;
}

impl<S: FavoritesStore + Sync> FavoritesStore for Arc<S> {
    fn fetch_all(&self) -> StorageResult<Vec<FavoriteEntry>> {
        (**self).fetch_all()
    }

    fn persist_order(&self, updates: &[OrderUpdate]) -> StorageResult<()> {
        (**self).persist_order(updates)
    }

    fn subscribe(&self) -> Subscription {
        (**self).subscribe()
    }
}

/// Typed stream of change notifications from a store
#[derive(Debug)]
pub struct Subscription {
    receiver: UnboundedReceiver<ChangeNotification>,
}

impl Subscription {
    /// Create a linked sender/subscription pair
    pub fn channel() -> (UnboundedSender<ChangeNotification>, Subscription) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Subscription { receiver })
    }

    /// Next queued notification without waiting
    pub fn try_next(&mut self) -> Option<ChangeNotification> {
        match self.receiver.try_recv() {
            Ok(notification) => Some(notification),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next notification; `None` once the store side is gone
    pub async fn recv(&mut self) -> Option<ChangeNotification> {
        self.receiver.recv().await
    }
}
