//! Module Loading
//!
//! The install contract is deliberately small: given a path, load the
//! module in an isolated context, enumerate the nodes it declares, and
//! release the context so the binary image is not retained. The loading
//! mechanism itself (dynamic library, subprocess, restart-to-reload) stays
//! behind [`ModuleLoader`]; [`StaticModuleLoader`] serves in-process
//! embedding and tests with path-keyed factories.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use types::{HubError, MeshNode, Result};

/// An isolated, loaded module. Dropping it releases the loading context.
pub trait LoadedModule: Send + Sync {
    /// The nodes this module declares; zero or more.
    fn nodes(&self) -> Vec<MeshNode>;
}

/// Loads modules into isolated, droppable contexts.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Box<dyn LoadedModule>>;
}

type ModuleFactory = Arc<dyn Fn() -> Result<Vec<MeshNode>> + Send + Sync>;

/// Loader resolving module paths against pre-registered factories.
#[derive(Default)]
pub struct StaticModuleLoader {
    factories: DashMap<PathBuf, ModuleFactory>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the module available at a path.
    pub fn register<F>(&self, path: impl Into<PathBuf>, factory: F)
    where
        F: Fn() -> Result<Vec<MeshNode>> + Send + Sync + 'static,
    {
        self.factories.insert(path.into(), Arc::new(factory));
    }
}

struct StaticModule {
    path: PathBuf,
    nodes: Vec<MeshNode>,
}

impl LoadedModule for StaticModule {
    fn nodes(&self) -> Vec<MeshNode> {
        self.nodes.clone()
    }
}

impl Drop for StaticModule {
    fn drop(&mut self) {
        debug!(module = %self.path.display(), "Module context released");
    }
}

#[async_trait]
impl ModuleLoader for StaticModuleLoader {
    async fn load(&self, path: &Path) -> Result<Box<dyn LoadedModule>> {
        let factory = self
            .factories
            .get(path)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                HubError::module_install(path.display().to_string(), "module not found")
            })?;
        let nodes = factory()
            .map_err(|e| HubError::module_install(path.display().to_string(), e.to_string()))?;

        debug!(
            module = %path.display(),
            declared_nodes = nodes.len(),
            "Module loaded"
        );
        Ok(Box::new(StaticModule {
            path: path.to_owned(),
            nodes,
        }))
    }
}
