//! Business component contract and in-memory implementation.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tx_store::{ComponentId, Payload, TransactionId};

/// Error returned by a component call.
///
/// Never propagated out of [`Manager::transaction`](crate::Manager::transaction);
/// a failed Try becomes a rejection and phase-two failures are retried by
/// the recovery monitor.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ComponentError(String);

impl ComponentError {
    /// Creates a component error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Request delivered to a component's Try call.
#[derive(Debug, Clone)]
pub struct TryRequest {
    /// Transaction the reservation belongs to.
    pub tx_id: TransactionId,

    /// The component being addressed.
    pub component_id: ComponentId,

    /// Named fields the caller attached for this component.
    pub payload: Payload,
}

/// Reply from a component call.
#[derive(Debug, Clone, Default)]
pub struct TryReply {
    /// True means resources are reserved (Try) or the phase-two action
    /// took effect.
    pub ack: bool,

    /// Component-specific response fields.
    pub payload: Payload,
}

impl TryReply {
    /// Builds an acknowledging reply with an empty payload.
    pub fn accepted() -> Self {
        Self {
            ack: true,
            payload: Payload::new(),
        }
    }

    /// Builds a declining reply with an empty payload.
    pub fn rejected() -> Self {
        Self {
            ack: false,
            payload: Payload::new(),
        }
    }
}

/// Trait for business components participating in transactions.
///
/// Confirm and Cancel are required to be idempotent and eventually
/// successful; Cancel must additionally be safe when the paired Try never
/// ran or failed, because the coordinator cancels every participant once
/// any of them rejects.
#[async_trait]
pub trait Component: Send + Sync + std::fmt::Debug {
    /// Stable identifier the registry and store key entries by.
    fn id(&self) -> &ComponentId;

    /// Reserves resources for the transaction. `ack = true` means reserved.
    async fn try_reserve(&self, request: TryRequest) -> Result<TryReply, ComponentError>;

    /// Consumes resources reserved by a successful Try.
    async fn confirm(&self, tx_id: TransactionId) -> Result<TryReply, ComponentError>;

    /// Releases resources reserved by Try, if any.
    async fn cancel(&self, tx_id: TransactionId) -> Result<TryReply, ComponentError>;
}

#[derive(Debug, Default)]
struct InMemoryComponentState {
    reject_on_try: bool,
    fail_on_try: bool,
    fail_on_confirm: bool,
    fail_on_cancel: bool,
    try_delay: Option<Duration>,
    try_calls: usize,
    confirm_calls: usize,
    cancel_calls: usize,
    confirmed: HashSet<TransactionId>,
    cancelled: HashSet<TransactionId>,
}

/// In-memory component for testing.
///
/// Behaves like a well-mannered participant (accept everything, idempotent
/// phase two) until a failure knob is flipped.
#[derive(Debug, Clone)]
pub struct InMemoryComponent {
    id: ComponentId,
    state: Arc<RwLock<InMemoryComponentState>>,
}

impl InMemoryComponent {
    /// Creates a component with the given identifier.
    pub fn new(id: impl Into<ComponentId>) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(RwLock::new(InMemoryComponentState::default())),
        }
    }

    /// Makes the next Try calls reply `ack = false`.
    pub fn set_reject_on_try(&self, reject: bool) {
        self.state.write().unwrap().reject_on_try = reject;
    }

    /// Makes the next Try calls return an error.
    pub fn set_fail_on_try(&self, fail: bool) {
        self.state.write().unwrap().fail_on_try = fail;
    }

    /// Makes the next Confirm calls return an error.
    pub fn set_fail_on_confirm(&self, fail: bool) {
        self.state.write().unwrap().fail_on_confirm = fail;
    }

    /// Makes the next Cancel calls return an error.
    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.state.write().unwrap().fail_on_cancel = fail;
    }

    /// Delays Try replies, e.g. to simulate a hanging participant.
    pub fn set_try_delay(&self, delay: Duration) {
        self.state.write().unwrap().try_delay = Some(delay);
    }

    /// Number of Try invocations received.
    pub fn try_calls(&self) -> usize {
        self.state.read().unwrap().try_calls
    }

    /// Number of Confirm invocations received.
    pub fn confirm_calls(&self) -> usize {
        self.state.read().unwrap().confirm_calls
    }

    /// Number of Cancel invocations received.
    pub fn cancel_calls(&self) -> usize {
        self.state.read().unwrap().cancel_calls
    }

    /// True if a Confirm for the transaction ever took effect.
    pub fn confirmed(&self, tx_id: TransactionId) -> bool {
        self.state.read().unwrap().confirmed.contains(&tx_id)
    }

    /// True if a Cancel for the transaction ever took effect.
    pub fn cancelled(&self, tx_id: TransactionId) -> bool {
        self.state.read().unwrap().cancelled.contains(&tx_id)
    }
}

#[async_trait]
impl Component for InMemoryComponent {
    fn id(&self) -> &ComponentId {
        &self.id
    }

    async fn try_reserve(&self, request: TryRequest) -> Result<TryReply, ComponentError> {
        let delay = {
            let mut state = self.state.write().unwrap();
            state.try_calls += 1;
            state.try_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.read().unwrap();
        if state.fail_on_try {
            return Err(ComponentError::new(format!(
                "try failed for {}",
                request.component_id
            )));
        }
        if state.reject_on_try {
            return Ok(TryReply::rejected());
        }
        Ok(TryReply::accepted())
    }

    async fn confirm(&self, tx_id: TransactionId) -> Result<TryReply, ComponentError> {
        let mut state = self.state.write().unwrap();
        state.confirm_calls += 1;
        if state.fail_on_confirm {
            return Err(ComponentError::new(format!("confirm failed for {}", self.id)));
        }
        state.confirmed.insert(tx_id);
        Ok(TryReply::accepted())
    }

    async fn cancel(&self, tx_id: TransactionId) -> Result<TryReply, ComponentError> {
        let mut state = self.state.write().unwrap();
        state.cancel_calls += 1;
        if state.fail_on_cancel {
            return Err(ComponentError::new(format!("cancel failed for {}", self.id)));
        }
        state.cancelled.insert(tx_id);
        Ok(TryReply::accepted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(component: &InMemoryComponent) -> TryRequest {
        TryRequest {
            tx_id: TransactionId::new(),
            component_id: component.id().clone(),
            payload: Payload::new(),
        }
    }

    #[tokio::test]
    async fn accepts_by_default_and_counts_calls() {
        let comp = InMemoryComponent::new("stock");
        let reply = comp.try_reserve(request(&comp)).await.unwrap();
        assert!(reply.ack);
        assert_eq!(comp.try_calls(), 1);
    }

    #[tokio::test]
    async fn reject_and_fail_knobs() {
        let comp = InMemoryComponent::new("stock");

        comp.set_reject_on_try(true);
        let reply = comp.try_reserve(request(&comp)).await.unwrap();
        assert!(!reply.ack);

        comp.set_fail_on_try(true);
        assert!(comp.try_reserve(request(&comp)).await.is_err());
        assert_eq!(comp.try_calls(), 2);
    }

    #[tokio::test]
    async fn confirm_and_cancel_are_idempotent() {
        let comp = InMemoryComponent::new("stock");
        let tx_id = TransactionId::new();

        comp.confirm(tx_id).await.unwrap();
        comp.confirm(tx_id).await.unwrap();
        assert!(comp.confirmed(tx_id));
        assert_eq!(comp.confirm_calls(), 2);

        comp.cancel(tx_id).await.unwrap();
        assert!(comp.cancelled(tx_id));
    }

    #[tokio::test]
    async fn cancel_is_safe_without_a_prior_try() {
        let comp = InMemoryComponent::new("stock");
        let tx_id = TransactionId::new();

        comp.cancel(tx_id).await.unwrap();
        assert!(comp.cancelled(tx_id));
        assert_eq!(comp.try_calls(), 0);
    }

    #[tokio::test]
    async fn try_delay_postpones_reply() {
        let comp = InMemoryComponent::new("slow");
        comp.set_try_delay(Duration::from_millis(50));

        let started = std::time::Instant::now();
        comp.try_reserve(request(&comp)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
