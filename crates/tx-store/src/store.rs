use std::time::Duration;

use async_trait::async_trait;

use crate::{ComponentId, Result, TransactionId, TxDraft, TxRecord};

/// Core trait for transaction-store implementations.
///
/// The store is the single source of truth for transaction outcomes and the
/// only cross-process coordination point: it must serialize concurrent
/// `tx_update` calls on the same `(tx_id, component_id)` and concurrent
/// `tx_submit` calls on the same `tx_id`. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait TxStore: Send + Sync {
    /// Persists a fresh `Hanging` record with one `Pending` entry per draft
    /// and returns the assigned transaction ID.
    async fn create_tx(&self, drafts: Vec<TxDraft>) -> Result<TransactionId>;

    /// Records a component's Try outcome, transitioning its entry from
    /// `Pending` to `Accepted` or `Rejected`.
    ///
    /// Re-application of the same value is a no-op; a conflicting
    /// re-application fails with [`StateConflict`](crate::StoreError::StateConflict).
    async fn tx_update(
        &self,
        tx_id: TransactionId,
        component_id: &ComponentId,
        accepted: bool,
    ) -> Result<()>;

    /// Transitions `Hanging → Successful` (`success = true`, requires every
    /// entry accepted) or `Hanging → Failed` (`success = false`,
    /// unconditional while hanging).
    ///
    /// Re-submitting the same terminal value is a no-op; a cross-terminal
    /// submit fails with [`StateConflict`](crate::StoreError::StateConflict).
    async fn tx_submit(&self, tx_id: TransactionId, success: bool) -> Result<()>;

    /// Returns a snapshot of the record, or `None` if it does not exist.
    async fn get_tx(&self, tx_id: TransactionId) -> Result<Option<TxRecord>>;

    /// Returns every record currently in `Hanging` status.
    ///
    /// The view may be stale but must include any record whose last write
    /// preceded the call.
    async fn hanging_txs(&self) -> Result<Vec<TxRecord>>;

    /// Acquires the process-wide recovery lease for `ttl`.
    ///
    /// At most one holder exists across every coordinator sharing the
    /// store; the lease expires after `ttl` even if the holder crashes.
    /// Fails with [`LockHeld`](crate::StoreError::LockHeld) while another
    /// holder is active.
    async fn lock(&self, ttl: Duration) -> Result<()>;

    /// Releases the recovery lease. Best-effort: the TTL remains the
    /// safety net if the holder dies before unlocking.
    async fn unlock(&self) -> Result<()>;
}
