//! Handler Erasure
//!
//! Typed handlers are erased into a closed dispatch table keyed by the
//! message's `TypeId`. The table is built once at configuration time; at
//! dispatch the erased entry downcasts back to the concrete message type.

use crate::hub::MessageHub;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use types::{Delivery, HubError, Result};

/// Erased handler entry in the dispatch table.
pub(crate) type ErasedHandler =
    Arc<dyn Fn(MessageHub, Delivery) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Delivery with its payload recovered as a concrete type.
pub struct TypedDelivery<T> {
    delivery: Delivery,
    message: Arc<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> TypedDelivery<T> {
    pub(crate) fn new(delivery: Delivery) -> Result<Self> {
        let message = delivery.message().downcast::<T>().map_err(|_| {
            HubError::handler(
                delivery.message_type(),
                "payload type did not match the dispatch table entry",
            )
        })?;
        Ok(Self {
            delivery,
            message,
            _marker: PhantomData,
        })
    }

    /// The typed payload.
    pub fn message(&self) -> &T {
        &self.message
    }

    /// The underlying envelope, for correlation and reply addressing.
    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }
}

/// Erase a typed handler into a dispatch-table entry.
pub(crate) fn erase<T, F, Fut>(handler: F) -> ErasedHandler
where
    T: Send + Sync + 'static,
    F: Fn(MessageHub, TypedDelivery<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |hub, delivery| match TypedDelivery::<T>::new(delivery) {
        Ok(typed) => handler(hub, typed).boxed(),
        Err(e) => futures::future::ready(Err(e)).boxed(),
    })
}
