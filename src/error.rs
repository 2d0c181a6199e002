// Reconciler error taxonomy
// None of these are fatal; the worst case is an empty or stale favorites view

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Failed to fetch favorites: {0}")]
    FetchFailed(#[source] StorageError),

    #[error("Invalid favorite entry {id}: {reason}")]
    InvalidEntry { id: String, reason: String },

    #[error("Move from {from} to {to} rejected: {source}")]
    MoveRejected {
        from: usize,
        to: usize,
        #[source]
        source: StorageError,
    },

    #[error("No favorite at position {position}")]
    NotFound { position: usize },

    #[error("Reconciler task is no longer running")]
    Closed,
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
