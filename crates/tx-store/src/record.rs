use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ComponentId, TransactionId};

/// Opaque named fields handed back to a component on Try.
pub type Payload = HashMap<String, serde_json::Value>;

/// Try-phase outcome for a single participant.
///
/// Once an entry leaves `Pending` it never changes again; re-application
/// of the same value is a no-op and a conflicting re-application is
/// rejected by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TryStatus {
    /// The component has not replied yet.
    #[default]
    Pending,

    /// The component acknowledged the reservation.
    Accepted,

    /// The component declined, errored, or timed out.
    Rejected,
}

impl TryStatus {
    /// Returns true once the entry has left `Pending`.
    pub fn is_decided(&self) -> bool {
        !matches!(self, TryStatus::Pending)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TryStatus::Pending => "Pending",
            TryStatus::Accepted => "Accepted",
            TryStatus::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for TryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a transaction record.
///
/// State transitions:
/// ```text
/// Hanging ──┬──► Successful
///           └──► Failed
/// ```
///
/// Terminal states are sticky: the store accepts a re-submit of the same
/// terminal value and rejects a cross-terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TxStatus {
    /// Created but not yet driven to an outcome.
    #[default]
    Hanging,

    /// All components accepted and Confirm was issued (terminal state).
    Successful,

    /// At least one component rejected, errored, or the transaction
    /// expired; Cancel was issued (terminal state).
    Failed,
}

impl TxStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Successful | TxStatus::Failed)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Hanging => "Hanging",
            TxStatus::Successful => "Successful",
            TxStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-supplied description of one participant, handed to the store at
/// record creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxDraft {
    /// Identifier of the component; must resolve through the registry.
    pub component_id: ComponentId,

    /// Named fields delivered to the component's Try call and re-derivable
    /// during recovery.
    pub payload: Payload,
}

impl TxDraft {
    /// Creates a draft with an empty payload.
    pub fn new(component_id: impl Into<ComponentId>) -> Self {
        Self {
            component_id: component_id.into(),
            payload: Payload::new(),
        }
    }

    /// Adds a named field to the payload.
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

/// One participant inside a persisted transaction record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentEntry {
    /// Identifier of the component.
    pub component_id: ComponentId,

    /// Outcome of the component's Try call.
    pub try_status: TryStatus,

    /// The payload the component received on Try.
    pub payload: Payload,
}

impl From<TxDraft> for ComponentEntry {
    fn from(draft: TxDraft) -> Self {
        Self {
            component_id: draft.component_id,
            try_status: TryStatus::Pending,
            payload: draft.payload,
        }
    }
}

/// The persisted state of one in-flight or terminated transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxRecord {
    /// Store-assigned, globally unique identifier.
    pub id: TransactionId,

    /// Lifecycle status.
    pub status: TxStatus,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last mutated.
    pub updated_at: DateTime<Utc>,

    /// Participant entries, in caller-supplied order.
    pub components: Vec<ComponentEntry>,
}

impl TxRecord {
    /// Creates a fresh `Hanging` record with one `Pending` entry per draft.
    pub fn new(id: TransactionId, drafts: Vec<TxDraft>) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TxStatus::Hanging,
            created_at: now,
            updated_at: now,
            components: drafts.into_iter().map(ComponentEntry::from).collect(),
        }
    }

    /// Returns true if every entry accepted its Try.
    ///
    /// An empty record never counts as accepted.
    pub fn all_accepted(&self) -> bool {
        !self.components.is_empty()
            && self
                .components
                .iter()
                .all(|e| e.try_status == TryStatus::Accepted)
    }

    /// Returns true if any entry rejected its Try.
    pub fn any_rejected(&self) -> bool {
        self.components
            .iter()
            .any(|e| e.try_status == TryStatus::Rejected)
    }

    /// Returns true once no entry is still `Pending`.
    pub fn try_complete(&self) -> bool {
        self.components.iter().all(|e| e.try_status.is_decided())
    }

    /// Returns true once the record has outlived the transaction timeout.
    pub fn is_expired(&self, timeout: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.created_at);
        match chrono::Duration::from_std(timeout) {
            Ok(limit) => age > limit,
            Err(_) => false,
        }
    }

    /// Looks up the entry for a component.
    pub fn entry(&self, component_id: &ComponentId) -> Option<&ComponentEntry> {
        self.components
            .iter()
            .find(|e| &e.component_id == component_id)
    }

    pub(crate) fn entry_mut(&mut self, component_id: &ComponentId) -> Option<&mut ComponentEntry> {
        self.components
            .iter_mut()
            .find(|e| &e.component_id == component_id)
    }
}
