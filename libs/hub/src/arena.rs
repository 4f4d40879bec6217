//! Hub Arena
//!
//! Address-keyed registry of live hubs in one process. Parent/child
//! relationships are held as explicit addresses into this arena rather than
//! back-pointers, which keeps disposal index-based and acyclic.

use crate::hub::MessageHub;
use dashmap::DashMap;
use std::sync::Arc;
use types::Address;

/// Shared registry mapping addresses to live hubs.
///
/// Cheap to clone; clones share the same map. Hosted hubs inherit their
/// parent's arena so local resolution stays one lookup.
#[derive(Clone, Default)]
pub struct HubArena {
    hubs: Arc<DashMap<Address, MessageHub>>,
}

impl HubArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, hub: MessageHub) {
        self.hubs.insert(hub.address().clone(), hub);
    }

    pub fn get(&self, address: &Address) -> Option<MessageHub> {
        self.hubs.get(address).map(|entry| entry.value().clone())
    }

    /// Kind-level lookup for deliveries addressed to a kind without knowing
    /// the concrete instance id. Exact lookups take precedence in callers;
    /// when several instances of the kind are live, any one of them may be
    /// returned.
    pub fn get_by_kind(&self, kind: &str) -> Option<MessageHub> {
        self.hubs
            .iter()
            .find(|entry| entry.key().kind() == kind)
            .map(|entry| entry.value().clone())
    }

    pub fn remove(&self, address: &Address) -> Option<MessageHub> {
        self.hubs.remove(address).map(|(_, hub)| hub)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.hubs.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.hubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty()
    }
}
