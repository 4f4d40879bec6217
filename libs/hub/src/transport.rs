//! Transport Seams
//!
//! Hubs forward non-local deliveries through a named [`HubTransport`]. The
//! runtime only requires "take this envelope somewhere"; concrete wiring
//! (sockets, brokers, in-process loopback) is supplied by hosting code.
//!
//! In-process forwarding preserves per-hub ordering. Across nodes the
//! ordering guarantee is whatever the underlying provider gives; it is
//! best-effort, not assumed total.

use crate::arena::HubArena;
use async_trait::async_trait;
use codec::{TypeRegistry, WireEnvelope};
use std::sync::Arc;
use tracing::debug;
use types::{Address, HubError, Result};

/// One hop of cross-boundary forwarding.
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Forward an envelope, optionally keyed (a partition key from a routing
    /// rule's selector, or the owning node id from a catalog lookup).
    async fn forward(&self, routing_key: Option<&str>, envelope: WireEnvelope) -> Result<()>;
}

/// Maps an address to the id of the mesh node that owns it.
///
/// Implemented by the mesh catalog; kept as a seam here so the hub crate
/// does not depend on catalog internals.
#[async_trait]
pub trait NodeResolver: Send + Sync {
    async fn resolve_node(&self, address: &Address) -> Option<String>;
}

/// In-process transport delivering into another arena.
///
/// Serializes through the wire codec exactly like a real transport would, so
/// both ends exercise the envelope path; used for tests and single-process
/// multi-node setups.
pub struct LoopbackTransport {
    registry: Arc<TypeRegistry>,
    remote: HubArena,
}

impl LoopbackTransport {
    pub fn new(registry: Arc<TypeRegistry>, remote: HubArena) -> Self {
        Self { registry, remote }
    }
}

#[async_trait]
impl HubTransport for LoopbackTransport {
    async fn forward(&self, routing_key: Option<&str>, envelope: WireEnvelope) -> Result<()> {
        debug!(
            target_address = %envelope.target,
            routing_key = routing_key.unwrap_or("-"),
            message_type = %envelope.message_type,
            "Loopback forward"
        );
        let delivery = self.registry.decode(envelope)?;
        let target = delivery.target().clone();

        if let Some(hub) = self.remote.get(&target) {
            hub.enqueue(delivery.delivered());
            return Ok(());
        }

        // Kind-level addressing: the caller knows the owning node, not the
        // instance id minted there. Retarget to the live instance so its
        // mailbox (and any deferral gate on it) takes the delivery.
        if let Some(hub) = self.remote.get_by_kind(target.kind()) {
            let resolved = hub.address().clone();
            debug!(
                target_address = %target,
                resolved = %resolved,
                "Loopback kind resolution"
            );
            hub.enqueue(delivery.retargeted(resolved).delivered());
            return Ok(());
        }

        Err(HubError::transport(format!(
            "no hub serving {} on the remote side",
            target
        )))
    }
}
