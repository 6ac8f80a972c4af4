//! Coordinator error types.

use thiserror::Error;
use tx_store::{ComponentId, StoreError};

/// Errors that can occur during coordinator operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A referenced component ID is not registered.
    #[error("unknown component: {0}")]
    UnknownComponent(ComponentId),

    /// A component with the same ID is already registered.
    #[error("component already registered: {0}")]
    DuplicateRegistration(ComponentId),

    /// Two request entries share a component ID in one transaction.
    #[error("duplicate component in request list: {0}")]
    DuplicateRequest(ComponentId),

    /// The request list was empty.
    #[error("transaction request list is empty")]
    EmptyTransaction,

    /// Operation attempted after `stop`.
    #[error("manager is stopped")]
    ManagerStopped,

    /// A component call failed. Never surfaced from `transaction` (a failed
    /// Try is a rejection); recovery uses it to defer a record to the next
    /// tick.
    #[error("component {component_id} failed: {reason}")]
    Component {
        component_id: ComponentId,
        reason: String,
    },

    /// Store error. Surfaced to the caller only when it prevents recording
    /// a decision; recovery still completes the transaction.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for coordinator results.
pub type Result<T> = std::result::Result<T, Error>;
