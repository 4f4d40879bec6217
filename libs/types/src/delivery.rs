//! Delivery Envelopes
//!
//! A [`Delivery`] is the immutable envelope a hub mailbox carries: one
//! message plus sender, target, correlation id and processing state. State
//! transitions never mutate in place; each transition produces a new
//! envelope value so concurrent observers can hold earlier states safely.

use crate::Address;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Processing state of one delivery.
///
/// Every accepted envelope ends in exactly one of `Processed`, `Ignored` or
/// `Failed`; nothing is dropped without a state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Accepted by the sending hub, not yet at the target.
    Submitted,
    /// Enqueued in the target hub's mailbox.
    Delivered,
    /// A handler ran to completion.
    Processed,
    /// No handler matched and no default sink was configured.
    Ignored,
    /// Routing or handling failed; the reason travels with the state.
    Failed(String),
}

impl DeliveryState {
    /// Whether this state is terminal for the envelope.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryState::Processed | DeliveryState::Ignored | DeliveryState::Failed(_)
        )
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryState::Submitted => write!(f, "submitted"),
            DeliveryState::Delivered => write!(f, "delivered"),
            DeliveryState::Processed => write!(f, "processed"),
            DeliveryState::Ignored => write!(f, "ignored"),
            DeliveryState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Immutable message envelope.
///
/// The payload is type-erased so one mailbox can carry heterogeneous
/// messages; dispatch recovers the concrete type via [`Delivery::downcast`].
#[derive(Clone)]
pub struct Delivery {
    message: Arc<dyn Any + Send + Sync>,
    message_type: &'static str,
    type_id: TypeId,
    sender: Address,
    target: Address,
    correlation_id: Uuid,
    state: DeliveryState,
}

impl Delivery {
    /// Wrap a message into a submitted envelope with a fresh correlation id.
    pub fn new<T: Send + Sync + 'static>(message: T, sender: Address, target: Address) -> Self {
        Self {
            message: Arc::new(message),
            message_type: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            sender,
            target,
            correlation_id: Uuid::new_v4(),
            state: DeliveryState::Submitted,
        }
    }

    /// Wrap an already type-erased payload, preserving its erased identity.
    ///
    /// Used by the codec when reifying envelopes off the wire.
    pub fn from_erased(
        message: Arc<dyn Any + Send + Sync>,
        message_type: &'static str,
        type_id: TypeId,
        sender: Address,
        target: Address,
    ) -> Self {
        Self {
            message,
            message_type,
            type_id,
            sender,
            target,
            correlation_id: Uuid::new_v4(),
            state: DeliveryState::Submitted,
        }
    }

    /// Rebind the correlation id, e.g. to correlate a response to its request.
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = id;
        self
    }

    /// Rebind the sender, used when a hub forwards on behalf of a caller.
    pub fn with_sender(mut self, sender: Address) -> Self {
        self.sender = sender;
        self
    }

    /// Rebind the target to a concrete instance, used when kind-level
    /// addressing resolves to an owning hub.
    pub fn retargeted(&self, target: Address) -> Self {
        let mut next = self.clone();
        next.target = target;
        next
    }

    /// Typed view of the payload, if the concrete type matches.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.message.downcast_ref::<T>()
    }

    /// Shared handle to the erased payload.
    pub fn message(&self) -> Arc<dyn Any + Send + Sync> {
        Arc::clone(&self.message)
    }

    /// Rust type name of the payload (diagnostic; the wire name comes from
    /// the type registry).
    pub fn message_type(&self) -> &'static str {
        self.message_type
    }

    /// Erased type identity of the payload, the dispatch key.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn target(&self) -> &Address {
        &self.target
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn state(&self) -> &DeliveryState {
        &self.state
    }

    /// Transition to `Delivered` (enqueued at the target).
    pub fn delivered(&self) -> Self {
        self.with_state(DeliveryState::Delivered)
    }

    /// Transition to `Processed`.
    pub fn processed(&self) -> Self {
        self.with_state(DeliveryState::Processed)
    }

    /// Transition to `Ignored`.
    pub fn ignored(&self) -> Self {
        self.with_state(DeliveryState::Ignored)
    }

    /// Transition to `Failed` with a reason.
    pub fn failed(&self, reason: impl Into<String>) -> Self {
        self.with_state(DeliveryState::Failed(reason.into()))
    }

    fn with_state(&self, state: DeliveryState) -> Self {
        let mut next = self.clone();
        next.state = state;
        next
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message_type", &self.message_type)
            .field("sender", &self.sender)
            .field("target", &self.target)
            .field("correlation_id", &self.correlation_id)
            .field("state", &self.state)
            .finish()
    }
}
