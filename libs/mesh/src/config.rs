//! Mesh Configuration
//!
//! TOML-based configuration for catalog bring-up: which module paths to
//! install at startup and which named transport carries catalog-resolved
//! forwards.
//!
//! ```toml
//! transport = "cluster"
//!
//! [[startup_modules]]
//! path = "modules/chat"
//!
//! [[startup_modules]]
//! path = "modules/billing"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use types::{HubError, Result};

/// One startup module entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupModule {
    pub path: PathBuf,
}

/// Catalog bring-up configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Module paths installed sequentially at startup, each isolated.
    #[serde(default)]
    pub startup_modules: Vec<StartupModule>,

    /// Named transport the router uses for catalog-resolved forwards.
    #[serde(default)]
    pub transport: Option<String>,
}

impl MeshConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            HubError::registration(format!(
                "cannot read mesh config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: MeshConfig = toml::from_str(raw)
            .map_err(|e| HubError::registration(format!("invalid mesh config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration-time validation; errors here abort startup.
    pub fn validate(&self) -> Result<()> {
        for module in &self.startup_modules {
            if module.path.as_os_str().is_empty() {
                return Err(HubError::registration("startup module with empty path"));
            }
        }
        if let Some(transport) = &self.transport {
            if transport.is_empty() {
                return Err(HubError::registration("mesh transport name is empty"));
            }
        }
        Ok(())
    }

    pub fn with_startup_module(mut self, path: impl Into<PathBuf>) -> Self {
        self.startup_modules.push(StartupModule { path: path.into() });
        self
    }
}
