use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::{
    ComponentId, Result, StoreError, TransactionId, TryStatus, TxDraft, TxRecord, TxStatus,
    store::TxStore,
};

/// In-memory transaction store.
///
/// Backs tests and embedders without a durable backend. Cloning shares the
/// underlying state, so several coordinator instances holding clones model
/// several processes sharing one store, including contention on the
/// recovery lease.
#[derive(Clone, Default)]
pub struct InMemoryTxStore {
    records: Arc<RwLock<HashMap<TransactionId, TxRecord>>>,
    lease: Arc<Mutex<Option<Instant>>>,
}

impl InMemoryTxStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl TxStore for InMemoryTxStore {
    async fn create_tx(&self, drafts: Vec<TxDraft>) -> Result<TransactionId> {
        let id = TransactionId::new();
        let record = TxRecord::new(id, drafts);
        self.records.write().await.insert(id, record);
        Ok(id)
    }

    async fn tx_update(
        &self,
        tx_id: TransactionId,
        component_id: &ComponentId,
        accepted: bool,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&tx_id).ok_or(StoreError::TxNotFound(tx_id))?;
        let entry = record
            .entry_mut(component_id)
            .ok_or_else(|| StoreError::UnknownEntry {
                tx_id,
                component_id: component_id.clone(),
            })?;

        let target = if accepted {
            TryStatus::Accepted
        } else {
            TryStatus::Rejected
        };

        match entry.try_status {
            TryStatus::Pending => {
                entry.try_status = target;
                record.updated_at = chrono::Utc::now();
                Ok(())
            }
            current if current == target => Ok(()),
            current => Err(StoreError::StateConflict {
                tx_id,
                reason: format!(
                    "entry {component_id} is already {current}, cannot record {target}"
                ),
            }),
        }
    }

    async fn tx_submit(&self, tx_id: TransactionId, success: bool) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&tx_id).ok_or(StoreError::TxNotFound(tx_id))?;

        let target = if success {
            TxStatus::Successful
        } else {
            TxStatus::Failed
        };

        match record.status {
            TxStatus::Hanging => {
                if success && !record.all_accepted() {
                    return Err(StoreError::StateConflict {
                        tx_id,
                        reason: "cannot mark successful while an entry is not accepted"
                            .to_string(),
                    });
                }
                record.status = target;
                record.updated_at = chrono::Utc::now();
                Ok(())
            }
            current if current == target => Ok(()),
            current => Err(StoreError::StateConflict {
                tx_id,
                reason: format!("record is already {current}, cannot submit {target}"),
            }),
        }
    }

    async fn get_tx(&self, tx_id: TransactionId) -> Result<Option<TxRecord>> {
        Ok(self.records.read().await.get(&tx_id).cloned())
    }

    async fn hanging_txs(&self) -> Result<Vec<TxRecord>> {
        let records = self.records.read().await;
        let mut hanging: Vec<_> = records
            .values()
            .filter(|r| r.status == TxStatus::Hanging)
            .cloned()
            .collect();
        hanging.sort_by_key(|r| r.created_at);
        Ok(hanging)
    }

    async fn lock(&self, ttl: Duration) -> Result<()> {
        let mut lease = self.lease.lock().await;
        if let Some(expiry) = *lease
            && Instant::now() < expiry
        {
            return Err(StoreError::LockHeld);
        }
        *lease = Some(Instant::now() + ttl);
        Ok(())
    }

    async fn unlock(&self) -> Result<()> {
        *self.lease.lock().await = None;
        Ok(())
    }
}
