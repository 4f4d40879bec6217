//! Synchronization Stream
//!
//! A versioned state container for state-bearing hubs. One JSON document is
//! the snapshot; [`SynchronizationStream::update`] applies a pure function of
//! the prior snapshot under a mutex so concurrent producers serialize into a
//! total order with no lost updates. [`SynchronizationStream::reduce`] hands
//! out reactive projections scoped to a sub-document reference: the current
//! value immediately, then one value per update that actually changes the
//! projection.
//!
//! # Lock Ordering (CRITICAL for deadlock prevention)
//!
//! When acquiring multiple locks, ALWAYS follow this order:
//! 1. `update_lock` (async mutex, update path only)
//! 2. `subscribers`
//! 3. `state`
//!
//! Never acquire them in a different order.

pub mod reference;
pub mod stream;

pub use reference::Reference;
pub use stream::{Projection, ReduceStream, SynchronizationStream};
