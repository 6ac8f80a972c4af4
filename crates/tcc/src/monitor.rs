//! Hanging-transaction recovery.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Notify, watch};
use tx_store::{TxRecord, TxStore};

use crate::error::{Error, Result};
use crate::registry::Registry;

/// Background driver that rediscovers incomplete transactions and pushes
/// each one to a terminal state.
///
/// Wakes on a fixed tick or on the manager's wake signal after a foreground
/// decision. Each pass runs under the store's process-wide lease, so at
/// most one coordinator sharing the store mutates hanging records at a
/// time.
pub(crate) struct RecoveryMonitor<S> {
    store: S,
    registry: Arc<Registry>,
    tick: Duration,
    lease_ttl: Duration,
    tx_timeout: Duration,
    wake: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
}

impl<S: TxStore + Clone + 'static> RecoveryMonitor<S> {
    pub(crate) fn new(
        store: S,
        registry: Arc<Registry>,
        tick: Duration,
        lease_ttl: Duration,
        tx_timeout: Duration,
        wake: Arc<Notify>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            registry,
            tick,
            lease_ttl,
            tx_timeout,
            wake,
            shutdown,
        }
    }

    /// Runs until the shutdown flag flips or the manager is dropped. An
    /// in-flight pass completes before the loop exits.
    pub(crate) async fn run(mut self) {
        tracing::info!(tick_ms = self.tick.as_millis() as u64, "recovery monitor started");

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            self.run_once().await;
        }

        tracing::info!("recovery monitor stopped");
    }

    /// One recovery pass under the store lease. Errors are logged, never
    /// propagated: the next tick retries.
    #[tracing::instrument(skip(self))]
    pub(crate) async fn run_once(&self) {
        match self.store.lock(self.lease_ttl).await {
            Ok(()) => {}
            Err(err) if err.is_lock_held() => {
                metrics::counter!("tcc_recovery_lock_contended").increment(1);
                tracing::debug!("recovery lease held elsewhere, skipping tick");
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to acquire recovery lease");
                return;
            }
        }

        match self.store.hanging_txs().await {
            Ok(hanging) => {
                if !hanging.is_empty() {
                    tracing::debug!(count = hanging.len(), "processing hanging transactions");
                }
                for tx in &hanging {
                    if let Err(err) = self.recover(tx).await {
                        // Leave the record for the next tick.
                        metrics::counter!("tcc_recovery_retries").increment(1);
                        tracing::warn!(tx_id = %tx.id, error = %err, "recovery attempt failed, will retry");
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to list hanging transactions"),
        }

        if let Err(err) = self.store.unlock().await {
            tracing::debug!(error = %err, "lease release failed, ttl will reclaim it");
        }
    }

    /// Decides what a hanging record needs and replays phase two for it.
    ///
    /// Recovery never re-runs Try: an expired record that is not
    /// try-complete is cancelled, since a missing Try response is
    /// indistinguishable from a rejection after the deadline.
    async fn recover(&self, tx: &TxRecord) -> Result<()> {
        if tx.any_rejected() || tx.is_expired(self.tx_timeout) {
            self.replay(tx, false).await?;
            self.submit(tx, false).await?;
            metrics::counter!("tcc_recovery_cancelled").increment(1);
            tracing::info!(tx_id = %tx.id, "hanging transaction cancelled");
        } else if tx.all_accepted() {
            self.replay(tx, true).await?;
            self.submit(tx, true).await?;
            metrics::counter!("tcc_recovery_confirmed").increment(1);
            tracing::info!(tx_id = %tx.id, "hanging transaction confirmed");
        } else {
            // Try phase still collecting results; not ours to decide yet.
            tracing::debug!(tx_id = %tx.id, "transaction not yet decidable");
        }
        Ok(())
    }

    /// Re-issues Confirm (`success`) or Cancel to every participant in
    /// parallel. Both calls are idempotent on the component side, so
    /// replaying an already-delivered phase two is harmless.
    async fn replay(&self, tx: &TxRecord, success: bool) -> Result<()> {
        let handles = self
            .registry
            .lookup_all(tx.components.iter().map(|e| &e.component_id))?;

        let calls = handles.iter().map(|component| {
            let component = Arc::clone(component);
            let tx_id = tx.id;
            async move {
                if success {
                    component.confirm(tx_id).await
                } else {
                    component.cancel(tx_id).await
                }
            }
        });

        for (entry, result) in tx.components.iter().zip(join_all(calls).await) {
            if let Err(err) = result {
                return Err(Error::Component {
                    component_id: entry.component_id.clone(),
                    reason: err.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn submit(&self, tx: &TxRecord, success: bool) -> Result<()> {
        match self.store.tx_submit(tx.id, success).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_state_conflict() => {
                // Another coordinator finished the record between our read
                // and this submit.
                tracing::debug!(tx_id = %tx.id, error = %err, "record already terminal");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
