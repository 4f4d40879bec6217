//! Mesh Catalog
//!
//! Distributed directory mapping node identity to a deployable node
//! descriptor. The catalog answers two questions for the router: which node
//! owns an address, and what is known about that node. Descriptors live in a
//! pluggable keyed store behind a cache; modules install their declared
//! nodes through an isolated, unloadable loading context.
//!
//! Failure posture is best-effort bring-up: a failing module install aborts
//! only its own contribution, catalog misses return `None` rather than
//! erroring, and the hub's startup deferral releases whether or not every
//! startup module made it.

pub mod catalog;
pub mod config;
pub mod module;
pub mod store;

pub use catalog::MeshCatalog;
pub use config::MeshConfig;
pub use module::{LoadedModule, ModuleLoader, StaticModuleLoader};
pub use store::{InMemoryNodeStore, NodeStore};
