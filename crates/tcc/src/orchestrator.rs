//! Foreground transaction driver.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tx_store::{StoreError, TransactionId, TxDraft, TxStatus, TxStore};

use crate::component::{Component, TryRequest};
use crate::error::{Error, Result};
use crate::registry::Registry;

/// Outcome of a foreground transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOutcome {
    /// Store-assigned transaction ID.
    pub tx_id: TransactionId,

    /// True iff the transaction reached `Successful`.
    pub success: bool,
}

/// Drives one transaction synchronously end-to-end: Try fan-out, decision,
/// Confirm/Cancel dispatch, terminal submit.
pub(crate) struct Orchestrator<S> {
    store: S,
    registry: Arc<Registry>,
    timeout: Duration,
}

impl<S: TxStore + Clone + 'static> Orchestrator<S> {
    pub(crate) fn new(store: S, registry: Arc<Registry>, timeout: Duration) -> Self {
        Self {
            store,
            registry,
            timeout,
        }
    }

    /// Executes a transaction over the given participants.
    ///
    /// Component failures never surface as errors: the returned outcome
    /// carries `success = false` instead. An `Err` means preflight failed
    /// or the store could not record the decision (recovery still
    /// completes the record).
    #[tracing::instrument(skip(self, drafts), fields(participants = drafts.len()))]
    pub(crate) async fn execute(&self, drafts: Vec<TxDraft>) -> Result<TransactionOutcome> {
        metrics::counter!("tcc_transactions_total").increment(1);
        let tx_start = std::time::Instant::now();

        let handles = self.preflight(&drafts)?;

        let tx_id = self.store.create_tx(drafts.clone()).await?;
        tracing::debug!(%tx_id, "transaction record created");

        let all_accepted = self.try_phase(tx_id, &drafts, &handles).await?;

        // The decision is made; phase two is dispatched, the terminal
        // status recorded, and any in-flight failure left to recovery.
        if all_accepted {
            self.dispatch_confirm(tx_id, &handles);
        } else {
            self.dispatch_cancel(tx_id, &handles);
        }

        let success = match self.store.tx_submit(tx_id, all_accepted).await {
            Ok(()) => all_accepted,
            Err(err) if err.is_state_conflict() => {
                // A concurrent recovery pass decided first; adopt its outcome.
                tracing::debug!(%tx_id, error = %err, "record already terminal, re-reading");
                match self.store.get_tx(tx_id).await? {
                    Some(record) => record.status == TxStatus::Successful,
                    None => false,
                }
            }
            Err(err) => return Err(err.into()),
        };

        let duration = tx_start.elapsed().as_secs_f64();
        metrics::histogram!("tcc_transaction_duration_seconds").record(duration);
        if success {
            metrics::counter!("tcc_transactions_successful").increment(1);
        } else {
            metrics::counter!("tcc_transactions_failed").increment(1);
        }
        tracing::info!(%tx_id, success, duration, "transaction decided");

        Ok(TransactionOutcome { tx_id, success })
    }

    /// Validates the request list and resolves every participant before any
    /// record is written.
    fn preflight(&self, drafts: &[TxDraft]) -> Result<Vec<Arc<dyn Component>>> {
        if drafts.is_empty() {
            return Err(Error::EmptyTransaction);
        }

        let mut seen = HashSet::new();
        for draft in drafts {
            if !seen.insert(&draft.component_id) {
                return Err(Error::DuplicateRequest(draft.component_id.clone()));
            }
        }

        self.registry
            .lookup_all(drafts.iter().map(|d| &d.component_id))
    }

    /// Fans Try out to every participant in parallel and records each
    /// outcome as it arrives.
    ///
    /// Every Try is awaited (bounded by the configured timeout) before the
    /// decision, so a later Cancel always pairs with a finished Try. A
    /// timeout, component error, or `ack = false` all count as rejection.
    async fn try_phase(
        &self,
        tx_id: TransactionId,
        drafts: &[TxDraft],
        handles: &[Arc<dyn Component>],
    ) -> Result<bool> {
        let tries = drafts.iter().zip(handles).map(|(draft, component)| {
            let store = self.store.clone();
            let component = Arc::clone(component);
            let component_id = draft.component_id.clone();
            let request = TryRequest {
                tx_id,
                component_id: component_id.clone(),
                payload: draft.payload.clone(),
            };
            let budget = self.timeout;
            async move {
                let accepted =
                    match tokio::time::timeout(budget, component.try_reserve(request)).await {
                        Ok(Ok(reply)) => reply.ack,
                        Ok(Err(err)) => {
                            tracing::debug!(%tx_id, component = %component_id, error = %err, "try errored");
                            false
                        }
                        Err(_) => {
                            tracing::debug!(%tx_id, component = %component_id, "try timed out");
                            false
                        }
                    };
                let update = store.tx_update(tx_id, &component_id, accepted).await;
                (accepted, update)
            }
        });

        let mut all_accepted = true;
        let mut store_failure: Option<StoreError> = None;
        for (accepted, update) in join_all(tries).await {
            if !accepted {
                all_accepted = false;
            }
            match update {
                Ok(()) => {}
                Err(err) if err.is_state_conflict() => {
                    // Concurrent recovery already recorded this entry.
                    tracing::debug!(%tx_id, error = %err, "try outcome already recorded");
                }
                Err(err) => store_failure = Some(err),
            }
        }

        // A store failure here means the decision inputs are not durably
        // recorded; surface it and let recovery finish the record.
        match store_failure {
            Some(err) => Err(err.into()),
            None => Ok(all_accepted),
        }
    }

    /// Issues Confirm to every participant without awaiting completion.
    /// Failures are logged and retried by the recovery monitor.
    fn dispatch_confirm(&self, tx_id: TransactionId, handles: &[Arc<dyn Component>]) {
        for component in handles {
            let component = Arc::clone(component);
            tokio::spawn(async move {
                if let Err(err) = component.confirm(tx_id).await {
                    metrics::counter!("tcc_confirm_failures").increment(1);
                    tracing::warn!(%tx_id, component = %component.id(), error = %err, "confirm failed, leaving to recovery");
                }
            });
        }
    }

    /// Issues Cancel to every participant without awaiting completion.
    /// Failures are logged and retried by the recovery monitor.
    fn dispatch_cancel(&self, tx_id: TransactionId, handles: &[Arc<dyn Component>]) {
        for component in handles {
            let component = Arc::clone(component);
            tokio::spawn(async move {
                if let Err(err) = component.cancel(tx_id).await {
                    metrics::counter!("tcc_cancel_failures").increment(1);
                    tracing::warn!(%tx_id, component = %component.id(), error = %err, "cancel failed, leaving to recovery");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::InMemoryComponent;
    use tx_store::{InMemoryTxStore, TryStatus};

    fn setup(ids: &[&str]) -> (Orchestrator<InMemoryTxStore>, Vec<InMemoryComponent>) {
        let store = InMemoryTxStore::new();
        let registry = Arc::new(Registry::new());
        let components: Vec<_> = ids.iter().map(|id| InMemoryComponent::new(*id)).collect();
        for component in &components {
            registry.register(Arc::new(component.clone())).unwrap();
        }
        let orchestrator = Orchestrator::new(store, registry, Duration::from_millis(200));
        (orchestrator, components)
    }

    fn drafts(ids: &[&str]) -> Vec<TxDraft> {
        ids.iter().map(|id| TxDraft::new(*id)).collect()
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn all_accepted_reaches_successful() {
        let (orchestrator, components) = setup(&["a", "b", "c"]);

        let outcome = orchestrator.execute(drafts(&["a", "b", "c"])).await.unwrap();
        assert!(outcome.success);

        let record = orchestrator
            .store
            .get_tx(outcome.tx_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, TxStatus::Successful);
        assert!(record.all_accepted());

        wait_for(|| components.iter().all(|c| c.confirm_calls() == 1)).await;
        assert!(components.iter().all(|c| c.cancel_calls() == 0));
    }

    #[tokio::test]
    async fn one_rejection_cancels_everyone() {
        let (orchestrator, components) = setup(&["a", "b", "c"]);
        components[1].set_reject_on_try(true);

        let outcome = orchestrator.execute(drafts(&["a", "b", "c"])).await.unwrap();
        assert!(!outcome.success);

        let record = orchestrator
            .store
            .get_tx(outcome.tx_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, TxStatus::Failed);
        assert_eq!(
            record.entry(&"b".into()).unwrap().try_status,
            TryStatus::Rejected
        );
        assert_eq!(
            record.entry(&"a".into()).unwrap().try_status,
            TryStatus::Accepted
        );

        wait_for(|| components.iter().all(|c| c.cancel_calls() == 1)).await;
        assert!(components.iter().all(|c| c.confirm_calls() == 0));
    }

    #[tokio::test]
    async fn component_error_counts_as_rejection_without_surfacing() {
        let (orchestrator, components) = setup(&["a", "b"]);
        components[0].set_fail_on_try(true);

        let outcome = orchestrator.execute(drafts(&["a", "b"])).await.unwrap();
        assert!(!outcome.success);

        wait_for(|| components.iter().all(|c| c.cancel_calls() == 1)).await;
    }

    #[tokio::test]
    async fn hanging_try_is_rejected_after_timeout() {
        let (orchestrator, components) = setup(&["a", "b"]);
        components[1].set_try_delay(Duration::from_secs(30));

        let started = std::time::Instant::now();
        let outcome = orchestrator.execute(drafts(&["a", "b"])).await.unwrap();
        assert!(!outcome.success);
        assert!(started.elapsed() < Duration::from_secs(5));

        let record = orchestrator
            .store
            .get_tx(outcome.tx_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            record.entry(&"b".into()).unwrap().try_status,
            TryStatus::Rejected
        );
        wait_for(|| components.iter().all(|c| c.cancel_calls() == 1)).await;
    }

    #[tokio::test]
    async fn preflight_rejects_bad_requests() {
        let (orchestrator, _) = setup(&["a"]);

        let err = orchestrator.execute(vec![]).await.unwrap_err();
        assert!(matches!(err, Error::EmptyTransaction));

        let err = orchestrator.execute(drafts(&["a", "a"])).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateRequest(_)));

        let err = orchestrator.execute(drafts(&["a", "ghost"])).await.unwrap_err();
        assert!(matches!(err, Error::UnknownComponent(_)));

        // Preflight failures never allocate a record.
        assert_eq!(orchestrator.store.record_count().await, 0);
    }

    #[tokio::test]
    async fn payload_reaches_the_component_record() {
        let (orchestrator, _) = setup(&["a"]);
        let request = vec![TxDraft::new("a").with_field("sku", serde_json::json!("SKU-1"))];

        let outcome = orchestrator.execute(request).await.unwrap();
        let record = orchestrator
            .store
            .get_tx(outcome.tx_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            record.entry(&"a".into()).unwrap().payload["sku"],
            serde_json::json!("SKU-1")
        );
    }
}
