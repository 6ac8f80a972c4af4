//! Try–Confirm–Cancel distributed transaction coordinator.
//!
//! This crate drives a set of business components, each exposing a
//! three-phase protocol, to a terminal outcome with eventual consistency:
//!
//! 1. **Try** is fanned out to every participant in parallel; each reply
//!    (or error, or timeout) is recorded in the transaction store.
//! 2. If every participant accepted, **Confirm** is issued everywhere and
//!    the record is marked successful; on any rejection **Cancel** is
//!    issued everywhere and the record is marked failed.
//! 3. A background recovery monitor rediscovers records that never reached
//!    a terminal state (crashes, component outages) and replays phase two
//!    under a process-wide store lease.
//!
//! Components must make Confirm and Cancel idempotent and eventually
//! successful; Cancel must also be safe when the paired Try never ran.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tcc::{InMemoryComponent, InMemoryTxStore, Manager, ManagerOptions, TxDraft};
//!
//! #[tokio::main]
//! async fn main() -> tcc::Result<()> {
//!     let manager = Manager::new(InMemoryTxStore::new(), ManagerOptions::default());
//!     manager.register(Arc::new(InMemoryComponent::new("inventory")))?;
//!     manager.register(Arc::new(InMemoryComponent::new("payment")))?;
//!
//!     let outcome = manager
//!         .transaction(vec![
//!             TxDraft::new("inventory").with_field("sku", serde_json::json!("SKU-1")),
//!             TxDraft::new("payment").with_field("cents", serde_json::json!(2500)),
//!         ])
//!         .await?;
//!     assert!(outcome.success);
//!
//!     manager.stop().await;
//!     Ok(())
//! }
//! ```

pub mod component;
pub mod config;
pub mod error;
pub mod manager;
mod monitor;
mod orchestrator;
pub mod registry;

pub use component::{Component, ComponentError, InMemoryComponent, TryReply, TryRequest};
pub use config::ManagerOptions;
pub use error::{Error, Result};
pub use manager::Manager;
pub use orchestrator::TransactionOutcome;
pub use registry::Registry;
pub use tx_store::{
    ComponentEntry, ComponentId, InMemoryTxStore, Payload, TransactionId, TryStatus, TxDraft,
    TxRecord, TxStatus, TxStore,
};
