//! Mailbox Dispatch
//!
//! One task per hub drains the mailbox in FIFO order. For each delivery:
//! correlated responses complete their pending wait, deferred traffic is
//! buffered for replay, everything else goes through the dispatch table.
//! Handler failures are contained to their delivery; the loop never stalls
//! on one bad message.
//!
//! Non-local targets are routed here as well, on the sender's own task and
//! after any deferral gate clears: local arena lookup, then configured rules
//! in order (possibly cold-starting a hosted hub), then the mesh catalog,
//! and finally a failed delivery returned to the sender.

use crate::config::{MessageHubConfiguration, RouteRule};
use crate::hub::MessageHub;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};
use types::{Delivery, DeliveryState};

/// Mailbox commands. Deliveries dominate; the others drive the deferral
/// gate and disposal from outside the loop.
pub(crate) enum Command {
    Deliver(Delivery),
    ReleaseDeferral(u64),
    Dispose,
}

pub(crate) struct DispatchTask {
    hub: MessageHub,
    config: MessageHubConfiguration,
    rx: mpsc::UnboundedReceiver<Command>,
    /// Deliveries held back by active deferrals, replayed in order on
    /// release of the last gate.
    buffered: Vec<Delivery>,
}

impl DispatchTask {
    pub(crate) fn new(
        hub: MessageHub,
        config: MessageHubConfiguration,
        rx: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            hub,
            config,
            rx,
            buffered: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(address = %self.hub.address(), "Dispatch loop started");

        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Deliver(delivery) => self.process(delivery).await,
                Command::ReleaseDeferral(id) => self.release_deferral(id).await,
                Command::Dispose => break,
            }
        }

        if !self.buffered.is_empty() {
            warn!(
                address = %self.hub.address(),
                dropped = self.buffered.len(),
                "Disposal failed deliveries still buffered behind a deferral"
            );
            self.hub
                .metrics()
                .failed
                .fetch_add(self.buffered.len() as u64, Ordering::Relaxed);
        }
        debug!(address = %self.hub.address(), "Dispatch loop stopped");
    }

    async fn process(&mut self, delivery: Delivery) {
        // Failed deliveries are returns, never candidates for re-routing.
        if matches!(delivery.state(), DeliveryState::Failed(_)) {
            self.handle_failure_return(delivery).await;
            return;
        }

        // Correlated responses bypass deferral gates; a caller is waiting.
        if self.try_complete_pending(&delivery) {
            return;
        }

        // Gates apply to outbound routing too: traffic posted before the
        // hub (or its catalog) is ready waits instead of failing.
        if self.is_deferred(&delivery) {
            trace!(
                address = %self.hub.address(),
                message_type = delivery.message_type(),
                "Delivery buffered behind deferral"
            );
            self.hub.metrics().buffered.fetch_add(1, Ordering::Relaxed);
            self.buffered.push(delivery);
            return;
        }

        if delivery.target() != self.hub.address() {
            self.route(delivery).await;
            return;
        }

        self.dispatch(delivery).await;
    }

    /// Complete an outstanding response wait if this delivery correlates to
    /// one. The request's own payload pointer is excluded so a hub awaiting
    /// itself still dispatches the request to its handler.
    fn try_complete_pending(&self, delivery: &Delivery) -> bool {
        let correlation_id = delivery.correlation_id();
        let is_request = match self.hub.inner.pending.get(&correlation_id) {
            Some(entry) => Arc::ptr_eq(&entry.request, &delivery.message()),
            None => return false,
        };
        if is_request {
            return false;
        }
        if let Some((_, pending)) = self.hub.inner.pending.remove(&correlation_id) {
            trace!(
                address = %self.hub.address(),
                correlation_id = %correlation_id,
                "Correlated response completed a pending wait"
            );
            let _ = pending.tx.send(delivery.processed());
            self.hub.metrics().processed.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        false
    }

    fn is_deferred(&self, delivery: &Delivery) -> bool {
        self.hub
            .inner
            .deferrals
            .lock()
            .iter()
            .any(|entry| (entry.predicate)(delivery))
    }

    async fn release_deferral(&mut self, id: u64) {
        {
            let mut deferrals = self.hub.inner.deferrals.lock();
            let before = deferrals.len();
            deferrals.retain(|entry| entry.id != id);
            if deferrals.len() == before {
                return; // already released
            }
        }
        let remaining = self.hub.inner.deferral_count.fetch_sub(1, Ordering::AcqRel) - 1;
        debug!(
            address = %self.hub.address(),
            deferral_id = id,
            remaining,
            "Deferral released"
        );
        if remaining == 0 {
            self.hub.advance_status(crate::hub::HubStatus::Running);
        }

        // Replay ahead of new mailbox traffic; anything still gated by
        // another deferral re-buffers in order.
        let buffered = std::mem::take(&mut self.buffered);
        for delivery in buffered {
            Box::pin(self.process(delivery)).await;
        }
    }

    /// Run the delivery through the dispatch table.
    async fn dispatch(&mut self, delivery: Delivery) {
        let delivery = delivery.delivered();

        if let Some(handler) = self.config.handlers.get(&delivery.type_id()) {
            let handler = Arc::clone(handler);
            match handler(self.hub.clone(), delivery.clone()).await {
                Ok(()) => {
                    trace!(
                        address = %self.hub.address(),
                        message_type = delivery.message_type(),
                        "Delivery processed"
                    );
                    self.hub.metrics().processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    // Contained: the delivery is failed, the loop continues.
                    error!(
                        address = %self.hub.address(),
                        message_type = delivery.message_type(),
                        error = %e,
                        error_category = e.category(),
                        "Handler failed; delivery marked failed"
                    );
                    self.hub.metrics().failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            return;
        }

        match &self.config.default_sink {
            Some(sink) => {
                let sink = Arc::clone(sink);
                if let Err(e) = sink(self.hub.clone(), delivery.clone()).await {
                    error!(
                        address = %self.hub.address(),
                        message_type = delivery.message_type(),
                        error = %e,
                        "Default sink failed"
                    );
                    self.hub.metrics().failed.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.hub.metrics().processed.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => {
                debug!(
                    address = %self.hub.address(),
                    message_type = delivery.message_type(),
                    "No handler matched; delivery ignored"
                );
                self.hub.metrics().ignored.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Resolve a non-local target: arena, rules, catalog, fail.
    async fn route(&mut self, delivery: Delivery) {
        let target = delivery.target().clone();

        // (1) Hub already live in this process: in-process delivery, no
        // serialization, order preserved.
        if let Some(local) = self.hub.arena().get(&target) {
            trace!(address = %self.hub.address(), target = %target, "Delivered in-process");
            local.enqueue(delivery.delivered());
            self.hub.metrics().forwarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // (1b) Kind-level match: a live instance of the kind takes the
        // delivery, retargeted so its mailbox dispatches instead of
        // re-routing.
        if let Some(local) = self.hub.arena().get_by_kind(target.kind()) {
            let resolved = local.address().clone();
            trace!(
                address = %self.hub.address(),
                target = %target,
                resolved = %resolved,
                "Kind-level in-process delivery"
            );
            local.enqueue(delivery.retargeted(resolved).delivered());
            self.hub.metrics().forwarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // (2) Configured rules, first match wins.
        for rule in &self.config.routes.clone() {
            match rule {
                RouteRule::HostedHub { kind, factory } => {
                    if target.kind() != kind {
                        continue;
                    }
                    debug!(
                        address = %self.hub.address(),
                        target = %target,
                        "Cold-starting hosted hub for routed delivery"
                    );
                    match self.hub.host_at(target.clone(), factory(&target)) {
                        Ok(child) => {
                            // The child's own startup deferral buffers this
                            // first delivery until it is ready.
                            child.enqueue(delivery.delivered());
                            self.hub.metrics().forwarded.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            self.return_to_sender(
                                delivery,
                                format!("hosted hub start failed: {}", e),
                            )
                            .await;
                        }
                    }
                    return;
                }
                RouteRule::Transport {
                    transport,
                    key_selector,
                } => {
                    if let Some(key) = key_selector(&delivery) {
                        self.forward_via(transport, Some(key), delivery).await;
                        return;
                    }
                }
            }
        }

        // (3) Mesh catalog lookup across the configured transport.
        if let (Some(resolver), Some(transport)) =
            (&self.config.node_resolver, self.config.mesh_transport.clone())
        {
            if let Some(node_id) = resolver.resolve_node(&target).await {
                self.forward_via(&transport, Some(node_id), delivery).await;
                return;
            }
        }

        // (4) Unresolved: failed, returned to sender, never dropped.
        self.return_to_sender(delivery, format!("no route to {}", target))
            .await;
    }

    async fn forward_via(&mut self, transport_name: &str, key: Option<String>, delivery: Delivery) {
        let Some(transport) = self.config.transports.get(transport_name).cloned() else {
            self.return_to_sender(
                delivery,
                format!("transport '{}' not configured", transport_name),
            )
            .await;
            return;
        };

        let envelope = match self.hub.type_registry().encode(&delivery) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.return_to_sender(delivery, e.to_string()).await;
                return;
            }
        };

        match transport.forward(key.as_deref(), envelope).await {
            Ok(()) => {
                trace!(
                    address = %self.hub.address(),
                    transport = transport_name,
                    target = %delivery.target(),
                    "Delivery forwarded"
                );
                self.hub.metrics().forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.return_to_sender(
                    delivery,
                    format!("transport '{}' failed: {}", transport_name, e),
                )
                .await;
            }
        }
    }

    async fn return_to_sender(&mut self, delivery: Delivery, reason: String) {
        warn!(
            address = %self.hub.address(),
            target = %delivery.target(),
            message_type = delivery.message_type(),
            reason = %reason,
            "Delivery failed; returning to sender"
        );
        self.hub.metrics().failed.fetch_add(1, Ordering::Relaxed);

        let failed = delivery.failed(reason);
        let sender = failed.sender().clone();
        if sender == *self.hub.address() {
            self.handle_failure_return(failed).await;
        } else if let Some(sender_hub) = self.hub.arena().get(&sender) {
            sender_hub.enqueue(failed);
        } else {
            warn!(
                address = %self.hub.address(),
                sender = %sender,
                "Failure return undeliverable: sender not reachable"
            );
        }
    }

    /// A failed delivery arriving back at its sender: complete the awaiting
    /// caller if one exists, otherwise surface it through the default sink.
    async fn handle_failure_return(&mut self, delivery: Delivery) {
        if let Some((_, pending)) = self.hub.inner.pending.remove(&delivery.correlation_id()) {
            let _ = pending.tx.send(delivery);
            return;
        }

        if let Some(sink) = &self.config.default_sink {
            let sink = Arc::clone(sink);
            if let Err(e) = sink(self.hub.clone(), delivery).await {
                error!(address = %self.hub.address(), error = %e, "Default sink failed on failure return");
            }
        } else {
            debug!(
                address = %self.hub.address(),
                state = %delivery.state(),
                message_type = delivery.message_type(),
                "Failure returned with no awaiting caller"
            );
        }
    }
}
