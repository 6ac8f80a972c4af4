use thiserror::Error;

use crate::{ComponentId, TransactionId};

/// Errors that can occur when interacting with the transaction store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the given transaction ID.
    #[error("transaction not found: {0}")]
    TxNotFound(TransactionId),

    /// The record exists but has no entry for the given component.
    #[error("transaction {tx_id} has no entry for component {component_id}")]
    UnknownEntry {
        tx_id: TransactionId,
        component_id: ComponentId,
    },

    /// The update would violate a state-transition invariant, usually
    /// because a concurrent coordinator already advanced the record.
    #[error("state conflict on transaction {tx_id}: {reason}")]
    StateConflict {
        tx_id: TransactionId,
        reason: String,
    },

    /// Another coordinator holds the recovery lease.
    #[error("recovery lease held by another coordinator")]
    LockHeld,

    /// The backend could not be reached or failed transiently.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for conflicts caused by a concurrent mutator; callers
    /// treat these as benign and re-read the record.
    pub fn is_state_conflict(&self) -> bool {
        matches!(self, StoreError::StateConflict { .. })
    }

    /// Returns true when the recovery lease is held elsewhere.
    pub fn is_lock_held(&self) -> bool {
        matches!(self, StoreError::LockHeld)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
