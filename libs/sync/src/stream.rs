//! Stream Core
//!
//! The synchronization stream itself: snapshot + version under an update
//! mutex, and an explicit subscriber list for reactive fan-out delivered in
//! registration order.

use crate::Reference;
use futures::Stream;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use types::{Address, HubError, Result};

/// One projected value delivered to a reduction subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub value: Value,
    /// Stream version the projection was taken at.
    pub version: u64,
}

struct Subscriber {
    id: u64,
    reference: Reference,
    subscriber: Address,
    /// Last delivered projection, for change suppression.
    last: Option<Value>,
    tx: mpsc::UnboundedSender<Projection>,
}

struct Snapshot {
    value: Value,
    version: u64,
}

struct StreamInner {
    /// Serializes the read-modify-publish cycle. The sole guarded critical
    /// section in the runtime: no two updates may observe the same prior
    /// snapshot.
    update_lock: tokio::sync::Mutex<()>,
    subscribers: Mutex<Vec<Subscriber>>,
    state: RwLock<Snapshot>,
    next_subscriber_id: AtomicU64,
    disposed: AtomicBool,
}

/// Versioned state container with reactive scoped reductions.
///
/// Cheap to clone; clones share the same snapshot and subscriber set.
#[derive(Clone)]
pub struct SynchronizationStream {
    inner: Arc<StreamInner>,
}

impl SynchronizationStream {
    /// Create a stream over an initial snapshot at version 0.
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                update_lock: tokio::sync::Mutex::new(()),
                subscribers: Mutex::new(Vec::new()),
                state: RwLock::new(Snapshot {
                    value: initial,
                    version: 0,
                }),
                next_subscriber_id: AtomicU64::new(1),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Current snapshot value.
    pub fn snapshot(&self) -> Value {
        self.inner.state.read().value.clone()
    }

    /// Current version; increments exactly once per accepted update.
    pub fn version(&self) -> u64 {
        self.inner.state.read().version
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Atomically apply a pure function of the prior snapshot and publish
    /// the result.
    ///
    /// Concurrent callers are mutually excluded around the whole
    /// read-modify-publish cycle, so every accepted update observes a
    /// distinct prior snapshot and produces exactly one new version. A
    /// failing projector leaves snapshot and version untouched.
    pub async fn update<F>(&self, projector: F) -> Result<u64>
    where
        F: FnOnce(&Value) -> Result<Value>,
    {
        if self.is_disposed() {
            return Err(HubError::Disposed);
        }

        let _guard = self.inner.update_lock.lock().await;

        let prior = self.inner.state.read().value.clone();
        let next = projector(&prior)?;

        let mut subscribers = self.inner.subscribers.lock();
        let version = {
            let mut state = self.inner.state.write();
            state.value = next.clone();
            state.version += 1;
            state.version
        };
        trace!(version, "Published synchronization update");

        // Fan out in registration order; a closed receiver unsubscribes.
        subscribers.retain_mut(|sub| {
            let projected = sub.reference.project(&next);
            if sub.last.as_ref() == Some(&projected) {
                return true;
            }
            let delivered = sub
                .tx
                .send(Projection {
                    value: projected.clone(),
                    version,
                })
                .is_ok();
            if delivered {
                sub.last = Some(projected);
            } else {
                debug!(
                    subscriber = %sub.subscriber,
                    version,
                    "Reduction receiver gone; unsubscribed"
                );
            }
            delivered
        });

        Ok(version)
    }

    /// Subscribe to the projection at a sub-document reference.
    ///
    /// Emits the current projection immediately, then a new value after each
    /// update that changes it (structural equality suppresses the rest).
    /// A subscriber joining after N updates observes only the current value,
    /// never history. Dropping the returned stream unsubscribes just that
    /// one subscription.
    pub fn reduce(&self, reference: Reference, subscriber: Address) -> ReduceStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);

        if self.is_disposed() {
            // Completed stream: the sender is dropped without registering.
            return ReduceStream {
                rx,
                id,
                stream: Weak::new(),
            };
        }

        let mut subscribers = self.inner.subscribers.lock();
        let (initial, version) = {
            let state = self.inner.state.read();
            (reference.project(&state.value), state.version)
        };

        debug!(
            reference = %reference,
            subscriber = %subscriber,
            version,
            "Reduction subscribed"
        );

        // The initial value is buffered ahead of any later publish.
        let _ = tx.send(Projection {
            value: initial.clone(),
            version,
        });
        subscribers.push(Subscriber {
            id,
            reference,
            subscriber,
            last: Some(initial),
            tx,
        });

        ReduceStream {
            rx,
            id,
            stream: Arc::downgrade(&self.inner),
        }
    }

    /// Complete all outstanding subscriptions and refuse further updates.
    ///
    /// Invoked top-down from the owning hub's disposal.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let count = {
            let mut subscribers = self.inner.subscribers.lock();
            let count = subscribers.len();
            subscribers.clear();
            count
        };
        debug!(completed_subscriptions = count, "Synchronization stream disposed");
    }
}

/// Lazy, restartable sequence of projected values at one reference.
pub struct ReduceStream {
    rx: mpsc::UnboundedReceiver<Projection>,
    id: u64,
    stream: Weak<StreamInner>,
}

impl ReduceStream {
    /// Next projection, or `None` once the stream completes.
    pub async fn recv(&mut self) -> Option<Projection> {
        self.rx.recv().await
    }

    /// Non-blocking poll used by tests and draining consumers.
    pub fn try_recv(&mut self) -> Option<Projection> {
        self.rx.try_recv().ok()
    }
}

impl Stream for ReduceStream {
    type Item = Projection;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Projection>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ReduceStream {
    fn drop(&mut self) {
        if let Some(inner) = self.stream.upgrade() {
            inner.subscribers.lock().retain(|s| s.id != self.id);
        }
    }
}
