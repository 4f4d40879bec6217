//! Catalog Core
//!
//! Address→node resolution and node descriptor lookup, cache-through to the
//! backing store. Shared and read-mostly: the cache and kind index are
//! concurrent maps, the mapping chain sits behind a short RwLock.

use crate::config::MeshConfig;
use crate::module::ModuleLoader;
use crate::store::NodeStore;
use async_trait::async_trait;
use dashmap::DashMap;
use messaging_hub::{DeferralGuard, NodeResolver};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::{Address, MeshNode, Result};

type MappingFn = Arc<dyn Fn(&Address) -> Option<String> + Send + Sync>;

/// Distributed directory of mesh nodes.
pub struct MeshCatalog {
    store: Arc<dyn NodeStore>,
    loader: Arc<dyn ModuleLoader>,
    cache: DashMap<String, MeshNode>,
    /// Address kind → owning node id, maintained from installed descriptors.
    kind_index: DashMap<String, String>,
    /// Explicit mapping functions, consulted in registration order before
    /// the kind index.
    mappings: RwLock<Vec<MappingFn>>,
}

impl MeshCatalog {
    pub fn new(store: Arc<dyn NodeStore>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            store,
            loader,
            cache: DashMap::new(),
            kind_index: DashMap::new(),
            mappings: RwLock::new(Vec::new()),
        }
    }

    /// Register an address→node mapping function. Functions run in
    /// registration order; the first non-`None` answer wins.
    pub fn add_address_mapping<F>(&self, mapping: F)
    where
        F: Fn(&Address) -> Option<String> + Send + Sync + 'static,
    {
        self.mappings.write().push(Arc::new(mapping));
    }

    /// Id of the node owning an address, or `None` when nothing maps it.
    pub fn get_node_id(&self, address: &Address) -> Option<String> {
        for mapping in self.mappings.read().iter() {
            if let Some(id) = mapping(address) {
                return Some(id);
            }
        }
        self.kind_index
            .get(address.kind())
            .map(|entry| entry.value().clone())
    }

    /// Descriptor for a node id, cache-through to the store. Misses and
    /// store failures both come back as `None`.
    pub async fn get_node(&self, id: &str) -> Option<MeshNode> {
        if let Some(cached) = self.cache.get(id) {
            return Some(cached.value().clone());
        }
        match self.store.get(id).await {
            Ok(Some(node)) => {
                self.cache.insert(id.to_owned(), node.clone());
                Some(node)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(node_id = id, error = %e, "Node store lookup failed");
                None
            }
        }
    }

    /// Descriptor for the node owning an address.
    pub async fn get_node_by_address(&self, address: &Address) -> Option<MeshNode> {
        let id = self.get_node_id(address)?;
        self.get_node(&id).await
    }

    /// Upsert a node descriptor, last writer wins; no merge.
    pub async fn update(&self, node: MeshNode) -> Result<()> {
        debug!(node_id = %node.id, "Catalog upsert");
        self.store.put(node.clone()).await?;
        for kind in &node.address_kinds {
            self.kind_index.insert(kind.clone(), node.id.clone());
        }
        self.cache.insert(node.id.clone(), node);
        Ok(())
    }

    /// Install one module: load in an isolated context, upsert every node
    /// it declares, then release the context.
    ///
    /// Returns the number of nodes installed. A failure aborts only this
    /// module's contribution.
    pub async fn install_module(&self, path: &Path) -> Result<usize> {
        let module = self.loader.load(path).await?;
        let nodes = module.nodes();
        let count = nodes.len();
        for node in nodes {
            self.update(node).await?;
        }
        drop(module); // release the loading context, image not retained
        info!(module = %path.display(), installed_nodes = count, "Module installed");
        Ok(count)
    }

    /// Process configured startup modules sequentially, each isolated, then
    /// release the hub's startup deferral.
    ///
    /// Best-effort: one failing module is logged and skipped, the remaining
    /// modules still install, and the deferral releases regardless.
    pub async fn initialize(&self, config: &MeshConfig, startup_deferral: DeferralGuard) {
        let mut installed = 0usize;
        let mut failed = 0usize;
        for module in &config.startup_modules {
            match self.install_module(&module.path).await {
                Ok(count) => installed += count,
                Err(e) => {
                    failed += 1;
                    warn!(
                        module = %module.path.display(),
                        error = %e,
                        "Startup module skipped"
                    );
                }
            }
        }
        startup_deferral.release();
        info!(
            installed_nodes = installed,
            failed_modules = failed,
            "Mesh catalog initialized"
        );
    }
}

#[async_trait]
impl NodeResolver for MeshCatalog {
    async fn resolve_node(&self, address: &Address) -> Option<String> {
        self.get_node_id(address)
    }
}
