//! Wire Envelope
//!
//! Serialized form of a delivery for transport across process boundaries.
//! The payload travels as JSON alongside the wire type-name; the receiving
//! side reifies it through its own [`TypeRegistry`].

use crate::registry::TypeRegistry;
use serde::{Deserialize, Serialize};
use types::{Address, Delivery, DeliveryState, HubError, Result};
use uuid::Uuid;

/// One delivery on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub sender: Address,
    pub target: Address,
    /// Stable wire type-name resolved through the type registry.
    pub message_type: String,
    pub payload: serde_json::Value,
    pub correlation_id: Uuid,
    pub state: DeliveryState,
}

impl TypeRegistry {
    /// Serialize a delivery for transport.
    ///
    /// Fails with a serialization error when the payload type was never
    /// registered for wire transfer.
    pub fn encode(&self, delivery: &Delivery) -> Result<WireEnvelope> {
        let (message_type, codec) = self.codec_for(delivery.type_id()).ok_or_else(|| {
            HubError::serialization(format!(
                "type {} not registered for wire transfer",
                delivery.message_type()
            ))
        })?;
        let payload = codec.encode(delivery.message().as_ref())?;

        Ok(WireEnvelope {
            sender: delivery.sender().clone(),
            target: delivery.target().clone(),
            message_type,
            payload,
            correlation_id: delivery.correlation_id(),
            state: delivery.state().clone(),
        })
    }

    /// Reify an envelope received from a transport back into a delivery.
    ///
    /// The result is a submitted envelope carrying the original correlation
    /// id; the receiving hub transitions it to delivered on enqueue.
    pub fn decode(&self, envelope: WireEnvelope) -> Result<Delivery> {
        let (type_id, codec) = self.codec_for_name(&envelope.message_type).ok_or_else(|| {
            HubError::serialization(format!(
                "unknown wire type-name '{}'",
                envelope.message_type
            ))
        })?;
        let message = codec.decode(envelope.payload)?;

        Ok(Delivery::from_erased(
            message,
            codec.rust_name(),
            type_id,
            envelope.sender,
            envelope.target,
        )
        .with_correlation_id(envelope.correlation_id))
    }
}
