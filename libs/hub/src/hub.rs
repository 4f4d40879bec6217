//! Message Hub
//!
//! The public hub handle: post, await a correlated response, register
//! startup deferrals, host child hubs, dispose. The handle is cheap to
//! clone; all hub-private state lives behind it and mutates only on the
//! hub's own dispatch task.

use crate::arena::HubArena;
use crate::config::MessageHubConfiguration;
use crate::dispatch::{Command, DispatchTask};
use codec::TypeRegistry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use sync_stream::SynchronizationStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use types::{Address, Delivery, DeliveryState, HubError, Result};
use uuid::Uuid;

/// Hub lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum HubStatus {
    Created = 0,
    /// Spawned but gated behind at least one startup deferral.
    Starting = 1,
    Running = 2,
    Disposing = 3,
    Disposed = 4,
}

impl HubStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => HubStatus::Created,
            1 => HubStatus::Starting,
            2 => HubStatus::Running,
            3 => HubStatus::Disposing,
            _ => HubStatus::Disposed,
        }
    }
}

/// Per-hub counters, updated on the dispatch path.
#[derive(Debug, Default)]
pub struct HubMetrics {
    pub posted: AtomicU64,
    pub processed: AtomicU64,
    pub ignored: AtomicU64,
    pub failed: AtomicU64,
    pub forwarded: AtomicU64,
    pub buffered: AtomicU64,
}

/// Point-in-time copy of [`HubMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubMetricsSnapshot {
    pub posted: u64,
    pub processed: u64,
    pub ignored: u64,
    pub failed: u64,
    pub forwarded: u64,
    pub buffered: u64,
}

impl HubMetrics {
    pub fn snapshot(&self) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            posted: self.posted.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            buffered: self.buffered.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct DeferralEntry {
    pub(crate) id: u64,
    pub(crate) predicate: Arc<dyn Fn(&Delivery) -> bool + Send + Sync>,
}

/// One outstanding `await_response` wait. The request payload pointer lets
/// the dispatcher tell the request itself apart from its response when a
/// hub requests from its own address.
pub(crate) struct PendingResponse {
    pub(crate) tx: oneshot::Sender<Delivery>,
    pub(crate) request: Arc<dyn std::any::Any + Send + Sync>,
}

pub(crate) struct HubInner {
    pub(crate) address: Address,
    pub(crate) parent: Option<Address>,
    pub(crate) tx: mpsc::UnboundedSender<Command>,
    pub(crate) pending: DashMap<Uuid, PendingResponse>,
    pub(crate) deferrals: Mutex<Vec<DeferralEntry>>,
    pub(crate) deferral_count: AtomicUsize,
    pub(crate) next_deferral_id: AtomicU64,
    pub(crate) children: Mutex<Vec<Address>>,
    pub(crate) arena: HubArena,
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) sync: OnceLock<SynchronizationStream>,
    pub(crate) status: AtomicU8,
    pub(crate) metrics: HubMetrics,
}

/// Handle to a running hub.
#[derive(Clone)]
pub struct MessageHub {
    pub(crate) inner: Arc<HubInner>,
}

/// Per-post options: target address, sender override, correlation binding.
#[derive(Debug, Clone, Default)]
pub struct PostOptions {
    pub(crate) target: Option<Address>,
    pub(crate) sender: Option<Address>,
    pub(crate) correlation_id: Option<Uuid>,
}

impl PostOptions {
    /// Address the delivery to a specific target.
    pub fn target(address: Address) -> Self {
        Self {
            target: Some(address),
            ..Default::default()
        }
    }

    /// Address a response back to a request's sender, correlated to it.
    pub fn reply_to(request: &Delivery) -> Self {
        Self {
            target: Some(request.sender().clone()),
            sender: None,
            correlation_id: Some(request.correlation_id()),
        }
    }

    pub fn with_sender(mut self, sender: Address) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }
}

impl MessageHub {
    /// Spawn a top-level hub from its configuration.
    ///
    /// Type registrations run here; a conflicting registration aborts
    /// startup synchronously. The hub gets a fresh arena and, unless the
    /// configuration shares one, a fresh type registry.
    pub fn spawn(config: MessageHubConfiguration) -> Result<MessageHub> {
        config.validate()?;
        let registry = config
            .registry
            .clone()
            .unwrap_or_else(|| Arc::new(TypeRegistry::new()));
        Self::spawn_with(config, registry, HubArena::new(), None)
    }

    pub(crate) fn spawn_with(
        config: MessageHubConfiguration,
        inherited_registry: Arc<TypeRegistry>,
        arena: HubArena,
        parent: Option<Address>,
    ) -> Result<MessageHub> {
        let registry = config.registry.clone().unwrap_or(inherited_registry);
        for registration in &config.type_registrations {
            registration(&registry)?;
        }

        let address = config
            .address
            .clone()
            .unwrap_or_else(|| Address::unique(&config.kind));
        if arena.contains(&address) {
            return Err(HubError::registration(format!(
                "address {} already in use",
                address
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(HubInner {
            address: address.clone(),
            parent,
            tx,
            pending: DashMap::new(),
            deferrals: Mutex::new(Vec::new()),
            deferral_count: AtomicUsize::new(0),
            next_deferral_id: AtomicU64::new(1),
            children: Mutex::new(Vec::new()),
            arena: arena.clone(),
            registry,
            sync: OnceLock::new(),
            status: AtomicU8::new(HubStatus::Created as u8),
            metrics: HubMetrics::default(),
        });
        let hub = MessageHub { inner };
        arena.register(hub.clone());

        let startup = config.startup.clone();
        let hosted = config.hosted.clone();

        tokio::spawn(DispatchTask::new(hub.clone(), config, rx).run());

        // Eagerly started children, registered for cascading disposal.
        for (child_address, child_config) in hosted {
            hub.host_at(child_address, child_config)?;
        }

        match startup {
            Some(startup) => {
                // Buffer all inbound traffic until initialization completes.
                let guard = hub.defer(|_| true);
                let startup_hub = hub.clone();
                tokio::spawn(async move {
                    if let Err(e) = startup(startup_hub.clone()).await {
                        error!(
                            address = %startup_hub.address(),
                            error = %e,
                            "Hub startup initialization failed"
                        );
                    }
                    guard.release();
                });
            }
            None => hub.advance_status(HubStatus::Running),
        }

        info!(address = %hub.address(), "Hub spawned");
        Ok(hub)
    }

    /// Host a child hub at the given address. The child shares this hub's
    /// arena and type registry, keeps its own mailbox, and is disposed when
    /// this hub disposes.
    pub fn host_at(
        &self,
        address: Address,
        config: MessageHubConfiguration,
    ) -> Result<MessageHub> {
        config.validate()?;
        let child = Self::spawn_with(
            config.at_address(address.clone()),
            Arc::clone(&self.inner.registry),
            self.inner.arena.clone(),
            Some(self.address().clone()),
        )?;
        self.inner.children.lock().push(address);
        Ok(child)
    }

    pub fn address(&self) -> &Address {
        &self.inner.address
    }

    pub fn parent(&self) -> Option<&Address> {
        self.inner.parent.as_ref()
    }

    pub fn status(&self) -> HubStatus {
        HubStatus::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    pub fn is_disposed(&self) -> bool {
        self.status() >= HubStatus::Disposing
    }

    pub fn metrics(&self) -> &HubMetrics {
        &self.inner.metrics
    }

    /// Shared type registry backing this hub's wire codec.
    pub fn type_registry(&self) -> Arc<TypeRegistry> {
        Arc::clone(&self.inner.registry)
    }

    /// Enqueue a delivery; returns immediately. Per-hub processing order
    /// equals post order.
    pub fn post<T: Send + Sync + 'static>(
        &self,
        message: T,
        options: PostOptions,
    ) -> Result<Delivery> {
        let delivery = self.make_delivery(message, options)?;
        self.inner.metrics.posted.fetch_add(1, Ordering::Relaxed);
        self.enqueue(delivery.clone());
        Ok(delivery)
    }

    fn make_delivery<T: Send + Sync + 'static>(
        &self,
        message: T,
        options: PostOptions,
    ) -> Result<Delivery> {
        if self.is_disposed() {
            return Err(HubError::Disposed);
        }
        let sender = options.sender.unwrap_or_else(|| self.address().clone());
        let target = options.target.unwrap_or_else(|| self.address().clone());
        let mut delivery = Delivery::new(message, sender, target);
        if let Some(id) = options.correlation_id {
            delivery = delivery.with_correlation_id(id);
        }
        Ok(delivery)
    }

    /// Post a request and await its correlated response.
    ///
    /// Completes with the response delivery, fails with `Timeout` after the
    /// deadline, `Disposed` if the hub winds down first, or `Routing` if the
    /// request came back unroutable. Dropping the future releases the
    /// pending correlation entry.
    pub async fn await_response<T: Send + Sync + 'static>(
        &self,
        message: T,
        options: PostOptions,
        timeout: Duration,
    ) -> Result<Delivery> {
        let correlation_id = options.correlation_id.unwrap_or_else(Uuid::new_v4);
        let delivery =
            self.make_delivery(message, options.with_correlation_id(correlation_id))?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(
            correlation_id,
            PendingResponse {
                tx,
                request: delivery.message(),
            },
        );
        let _guard = PendingGuard {
            hub: self.clone(),
            correlation_id,
        };

        self.inner.metrics.posted.fetch_add(1, Ordering::Relaxed);
        self.enqueue(delivery);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(delivery)) => match delivery.state() {
                DeliveryState::Failed(reason) => Err(HubError::routing(
                    delivery.target().clone(),
                    reason.clone(),
                )),
                _ => Ok(delivery),
            },
            Ok(Err(_closed)) => Err(HubError::Disposed),
            Err(_elapsed) => Err(HubError::Timeout(timeout)),
        }
    }

    /// Register a startup gate. Deliveries matching the predicate are
    /// buffered until every outstanding deferral releases, then replayed in
    /// their original order ahead of new traffic.
    pub fn defer<F>(&self, predicate: F) -> DeferralGuard
    where
        F: Fn(&Delivery) -> bool + Send + Sync + 'static,
    {
        let id = self.inner.next_deferral_id.fetch_add(1, Ordering::Relaxed);
        self.inner.deferrals.lock().push(DeferralEntry {
            id,
            predicate: Arc::new(predicate),
        });
        self.inner.deferral_count.fetch_add(1, Ordering::AcqRel);
        if self.status() < HubStatus::Running {
            self.advance_status(HubStatus::Starting);
        }
        debug!(address = %self.address(), deferral_id = id, "Deferral registered");

        DeferralGuard {
            tx: self.inner.tx.clone(),
            id,
            released: AtomicBool::new(false),
        }
    }

    /// Synchronization stream owned by this hub, created on first use and
    /// disposed with the hub.
    pub fn synchronization_stream(&self) -> SynchronizationStream {
        self.inner
            .sync
            .get_or_init(|| SynchronizationStream::new(serde_json::json!({})))
            .clone()
    }

    /// Dispose this hub: cascade to hosted children first, complete the
    /// synchronization stream and every pending response wait, then stop the
    /// dispatch task and drop the address from the arena.
    pub fn dispose(&self) -> BoxFuture<'static, ()> {
        let hub = self.clone();
        async move {
            loop {
                let current = hub.inner.status.load(Ordering::Acquire);
                if current >= HubStatus::Disposing as u8 {
                    return;
                }
                if hub
                    .inner
                    .status
                    .compare_exchange(
                        current,
                        HubStatus::Disposing as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    break;
                }
            }

            let children: Vec<Address> = hub.inner.children.lock().drain(..).collect();
            for child_address in children {
                if let Some(child) = hub.inner.arena.get(&child_address) {
                    child.dispose().await;
                }
            }

            if let Some(sync) = hub.inner.sync.get() {
                sync.dispose();
            }

            // Dropping the oneshot senders fails outstanding awaits with
            // `Disposed`.
            hub.inner.pending.clear();

            let _ = hub.inner.tx.send(Command::Dispose);
            hub.inner.arena.remove(&hub.inner.address);
            hub.inner
                .status
                .store(HubStatus::Disposed as u8, Ordering::Release);
            info!(address = %hub.inner.address, "Hub disposed");
        }
        .boxed()
    }

    /// Enqueue a delivery directly into the mailbox.
    pub(crate) fn enqueue(&self, delivery: Delivery) {
        if self.inner.tx.send(Command::Deliver(delivery)).is_err() {
            warn!(
                address = %self.address(),
                "Delivery dropped: mailbox closed during disposal"
            );
        }
    }

    /// Arena this hub shares with its hosted children. Handing it to a
    /// [`crate::transport::LoopbackTransport`] lets another in-process
    /// "node" deliver into this one.
    pub fn arena(&self) -> &HubArena {
        &self.inner.arena
    }

    /// Move the lifecycle forward; never regresses.
    pub(crate) fn advance_status(&self, status: HubStatus) {
        self.inner
            .status
            .fetch_max(status as u8, Ordering::AcqRel);
    }
}

impl fmt::Debug for MessageHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHub")
            .field("address", &self.inner.address)
            .field("status", &self.status())
            .finish()
    }
}

/// Handle to one registered deferral; releasing (or dropping) it lets the
/// hub replay buffered traffic once no other gate remains.
pub struct DeferralGuard {
    tx: mpsc::UnboundedSender<Command>,
    id: u64,
    released: AtomicBool,
}

impl DeferralGuard {
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(Command::ReleaseDeferral(self.id));
        }
    }
}

impl Drop for DeferralGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Removes a pending correlation entry when an `await_response` future is
/// dropped before completion (timeout or caller cancellation).
struct PendingGuard {
    hub: MessageHub,
    correlation_id: Uuid,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.hub.inner.pending.remove(&self.correlation_id);
    }
}
