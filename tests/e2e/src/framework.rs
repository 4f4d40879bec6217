//! Multi-node wiring helpers.

use messaging_hub::{HubStatus, HubTransport, LoopbackTransport, MessageHub};
use std::sync::Arc;
use std::time::Duration;

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// Transport delivering into the given node's arena, decoding with that
/// node's own type registry, just as a remote peer would.
pub fn transport_into(node: &MessageHub) -> Arc<dyn HubTransport> {
    Arc::new(LoopbackTransport::new(
        node.type_registry(),
        node.arena().clone(),
    ))
}

/// Poll a hub until it reaches the wanted status or the deadline passes.
pub async fn wait_for_status(hub: &MessageHub, status: HubStatus, deadline: Duration) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if hub.status() >= status {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    hub.status() >= status
}
