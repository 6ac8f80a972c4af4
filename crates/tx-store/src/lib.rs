//! Persistence contract for the TCC coordinator.
//!
//! A transaction record captures one distributed transaction: its globally
//! unique ID, lifecycle status, and the Try outcome of every participating
//! component. The [`TxStore`] trait is the full capability set the
//! coordinator consumes; [`InMemoryTxStore`] is the reference implementation
//! used in tests and by embedders that do not need a durable backend.

mod error;
mod memory;
mod record;
mod store;

pub use common::{ComponentId, TransactionId};
pub use error::{Result, StoreError};
pub use memory::InMemoryTxStore;
pub use record::{ComponentEntry, Payload, TryStatus, TxDraft, TxRecord, TxStatus};
pub use store::TxStore;
