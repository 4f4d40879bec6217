//! Mesh Node Descriptors
//!
//! A [`MeshNode`] describes one independently deployable module: where it
//! lives, what module provides it, and which address kinds it owns. The
//! catalog upserts descriptors with last-writer-wins semantics; nodes are
//! created on install, updated on redeploy, and never auto-deleted.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Descriptor of one mesh node, persisted by a pluggable keyed store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshNode {
    /// Stable node identity; the upsert key.
    pub id: String,
    /// Directory the node's module was deployed from.
    pub base_directory: PathBuf,
    /// Module reference (path or package name) that declared this node.
    pub module_ref: String,
    /// Address kinds this node owns; routing maps addresses of these kinds
    /// to the node id.
    pub address_kinds: Vec<String>,
}

impl MeshNode {
    pub fn new(id: impl Into<String>, base_directory: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            base_directory: base_directory.into(),
            module_ref: String::new(),
            address_kinds: Vec::new(),
        }
    }

    pub fn with_module_ref(mut self, module_ref: impl Into<String>) -> Self {
        self.module_ref = module_ref.into();
        self
    }

    pub fn with_address_kind(mut self, kind: impl Into<String>) -> Self {
        self.address_kinds.push(kind.into());
        self
    }

    /// Whether this node owns the given address kind.
    pub fn owns_kind(&self, kind: &str) -> bool {
        self.address_kinds.iter().any(|k| k == kind)
    }
}
