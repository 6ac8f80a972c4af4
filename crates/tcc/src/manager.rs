//! Coordinator facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tx_store::{TransactionId, TxDraft, TxRecord, TxStore};

use crate::component::Component;
use crate::config::ManagerOptions;
use crate::error::{Error, Result};
use crate::monitor::RecoveryMonitor;
use crate::orchestrator::{Orchestrator, TransactionOutcome};
use crate::registry::Registry;

/// Wires the registry, orchestrator, and recovery monitor into the public
/// coordinator surface: `register`, `transaction`, `stop`.
///
/// The manager owns the monitor's lifecycle: construction spawns it (a
/// Tokio runtime must be current), [`stop`](Manager::stop) joins it. If the
/// manager is dropped without `stop`, the monitor notices the closed
/// shutdown channel and exits on its own.
pub struct Manager<S: TxStore + Clone + 'static> {
    registry: Arc<Registry>,
    orchestrator: Orchestrator<S>,
    store: S,
    wake: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl<S: TxStore + Clone + 'static> Manager<S> {
    /// Creates a manager over the given store and starts its recovery
    /// monitor.
    pub fn new(store: S, options: ManagerOptions) -> Self {
        let registry = Arc::new(Registry::new());
        let wake = Arc::new(Notify::new());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let monitor = RecoveryMonitor::new(
            store.clone(),
            Arc::clone(&registry),
            options.monitor_tick,
            options.lease_ttl(),
            options.timeout,
            Arc::clone(&wake),
            shutdown_rx,
        );
        let handle = tokio::spawn(monitor.run());

        Self {
            orchestrator: Orchestrator::new(store.clone(), Arc::clone(&registry), options.timeout),
            registry,
            store,
            wake,
            shutdown,
            monitor: Mutex::new(Some(handle)),
            stopped: AtomicBool::new(false),
        }
    }

    /// Registers a business component.
    pub fn register(&self, component: Arc<dyn Component>) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::ManagerStopped);
        }
        let id = component.id().clone();
        self.registry.register(component)?;
        tracing::info!(component = %id, "component registered");
        Ok(())
    }

    /// Drives one transaction across the requested participants and
    /// returns its outcome.
    ///
    /// `success = false` covers every component-side failure (rejection,
    /// error, timeout); an `Err` means preflight failed or the store could
    /// not record the decision.
    pub async fn transaction(&self, requests: Vec<TxDraft>) -> Result<TransactionOutcome> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::ManagerStopped);
        }
        let result = self.orchestrator.execute(requests).await;
        // Nudge the monitor so any failed phase-two call retries promptly.
        // Notify keeps a single permit, so back-to-back decisions coalesce
        // into one extra pass.
        self.wake.notify_one();
        result
    }

    /// Returns the current record snapshot for a transaction.
    pub async fn transaction_record(&self, tx_id: TransactionId) -> Result<Option<TxRecord>> {
        Ok(self.store.get_tx(tx_id).await?)
    }

    /// Stops the recovery monitor and joins it. Any in-flight recovery
    /// pass completes first (releasing its lease). Safe to call multiple
    /// times; after the first call `register` and `transaction` fail with
    /// [`Error::ManagerStopped`].
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.monitor.lock().await.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "recovery monitor ended abnormally");
            }
        }
        tracing::info!("manager stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::InMemoryComponent;
    use std::time::Duration;
    use tx_store::InMemoryTxStore;

    fn options() -> ManagerOptions {
        ManagerOptions::new()
            .with_timeout(Duration::from_millis(200))
            .with_monitor_tick(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn register_rejects_duplicates() {
        let manager = Manager::new(InMemoryTxStore::new(), options());
        manager
            .register(Arc::new(InMemoryComponent::new("a")))
            .unwrap();

        let err = manager
            .register(Arc::new(InMemoryComponent::new("a")))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRegistration(_)));

        manager.stop().await;
    }

    #[tokio::test]
    async fn transaction_runs_registered_components() {
        let manager = Manager::new(InMemoryTxStore::new(), options());
        let comp = InMemoryComponent::new("a");
        manager.register(Arc::new(comp.clone())).unwrap();

        let outcome = manager
            .transaction(vec![TxDraft::new("a")])
            .await
            .unwrap();
        assert!(outcome.success);

        let record = manager
            .transaction_record(outcome.tx_id)
            .await
            .unwrap()
            .unwrap();
        assert!(record.status.is_terminal());

        manager.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_fences_operations() {
        let manager = Manager::new(InMemoryTxStore::new(), options());
        manager.stop().await;
        manager.stop().await;

        let err = manager
            .register(Arc::new(InMemoryComponent::new("a")))
            .unwrap_err();
        assert!(matches!(err, Error::ManagerStopped));

        let err = manager.transaction(vec![TxDraft::new("a")]).await.unwrap_err();
        assert!(matches!(err, Error::ManagerStopped));
    }

    #[tokio::test]
    async fn stop_joins_the_monitor_promptly() {
        let manager = Manager::new(InMemoryTxStore::new(), options());

        let stopped = tokio::time::timeout(Duration::from_secs(1), manager.stop()).await;
        assert!(stopped.is_ok());
    }
}
