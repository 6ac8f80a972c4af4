//! Identifier types shared across the coordinator crates.

mod types;

pub use types::{ComponentId, TransactionId};
