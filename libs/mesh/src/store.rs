//! Node Stores
//!
//! The catalog only needs get-by-id and upsert-by-id from its backing
//! store; anything keyed works (in memory, a keyed actor, a key-value
//! database). [`InMemoryNodeStore`] is the default and the test double.

use async_trait::async_trait;
use dashmap::DashMap;
use types::{MeshNode, Result};

/// Keyed persistence for mesh node descriptors.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Fetch a descriptor; unknown ids are `Ok(None)`, never errors.
    async fn get(&self, id: &str) -> Result<Option<MeshNode>>;

    /// Upsert a descriptor, last writer wins.
    async fn put(&self, node: MeshNode) -> Result<()>;
}

/// Process-local store backed by a concurrent map.
#[derive(Default)]
pub struct InMemoryNodeStore {
    nodes: DashMap<String, MeshNode>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn get(&self, id: &str) -> Result<Option<MeshNode>> {
        Ok(self.nodes.get(id).map(|entry| entry.value().clone()))
    }

    async fn put(&self, node: MeshNode) -> Result<()> {
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }
}
