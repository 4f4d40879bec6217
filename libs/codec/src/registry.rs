//! Type Registry
//!
//! Bidirectional mapping between runtime types and stable wire type-names.
//! Names are assigned once per process lifetime and never change afterwards;
//! alias collisions are configuration errors raised at registration, not at
//! first use on the wire.
//!
//! The registry is shared and read-mostly. A `parking_lot::RwLock` guards
//! the maps; lookups take the read path, registration the write path.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use types::{HubError, Result};

type EncodeFn =
    Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<serde_json::Value> + Send + Sync>;
type DecodeFn =
    Arc<dyn Fn(serde_json::Value) -> Result<Arc<dyn Any + Send + Sync>> + Send + Sync>;

/// Per-type serialize/deserialize vtable captured at registration.
#[derive(Clone)]
struct TypeCodec {
    rust_name: &'static str,
    encode: EncodeFn,
    decode: DecodeFn,
}

#[derive(Default)]
struct Maps {
    by_name: HashMap<String, TypeId>,
    by_id: HashMap<TypeId, String>,
    codecs: HashMap<TypeId, TypeCodec>,
}

/// Registry of wire type-names.
///
/// `with_type` registers a type for wire transfer (derived name),
/// `with_type_alias` under an explicit name. `get_or_add_type_name` assigns
/// a deterministic name without requiring serde bounds, for types that stay
/// in-process but still need a stable identity.
#[derive(Default)]
pub struct TypeRegistry {
    maps: RwLock<Maps>,
}

/// Deterministic wire name for a type: the full Rust path with whitespace
/// normalized away. Closed generics embed their type arguments, so e.g.
/// `Echo<i32>` and `Echo<u64>` get distinct, stable names.
fn derived_name<T: 'static>() -> String {
    std::any::type_name::<T>().replace(' ', "")
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` for wire transfer under its derived name.
    pub fn with_type<T>(&self) -> Result<String>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.register::<T>(derived_name::<T>())
    }

    /// Register `T` for wire transfer under an explicit alias.
    ///
    /// Fails synchronously if the alias already names a different type, or
    /// if `T` already carries a different name.
    pub fn with_type_alias<T>(&self, alias: impl Into<String>) -> Result<String>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.register::<T>(alias.into())
    }

    /// Name for `T`, deriving and caching one on first use.
    ///
    /// Once assigned, the name is stable for the process lifetime. Does not
    /// register a wire codec; use [`TypeRegistry::with_type`] for types that
    /// cross transports.
    pub fn get_or_add_type_name<T: 'static>(&self) -> Result<String> {
        let type_id = TypeId::of::<T>();
        if let Some(name) = self.maps.read().by_id.get(&type_id) {
            return Ok(name.clone());
        }

        let name = derived_name::<T>();
        let mut maps = self.maps.write();
        // Racing caller may have assigned between the read and write locks.
        if let Some(existing) = maps.by_id.get(&type_id) {
            return Ok(existing.clone());
        }
        if let Some(other) = maps.by_name.get(&name) {
            if *other != type_id {
                return Err(HubError::registration(format!(
                    "derived name '{}' already assigned to another type",
                    name
                )));
            }
        }
        maps.by_name.insert(name.clone(), type_id);
        maps.by_id.insert(type_id, name.clone());
        Ok(name)
    }

    /// Resolve a wire name back to the runtime type, if registered.
    /// Total and non-throwing.
    pub fn try_get_type(&self, name: &str) -> Option<TypeId> {
        self.maps.read().by_name.get(name).copied()
    }

    /// Resolve a runtime type to its wire name, if assigned.
    /// Total and non-throwing.
    pub fn try_get_type_name(&self, type_id: TypeId) -> Option<String> {
        self.maps.read().by_id.get(&type_id).cloned()
    }

    fn register<T>(&self, name: String) -> Result<String>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<T>();
        let mut maps = self.maps.write();

        if let Some(existing) = maps.by_id.get(&type_id) {
            if *existing != name {
                return Err(HubError::registration(format!(
                    "type {} already registered as '{}', refusing rename to '{}'",
                    std::any::type_name::<T>(),
                    existing,
                    name
                )));
            }
        }
        if let Some(other) = maps.by_name.get(&name) {
            if *other != type_id {
                return Err(HubError::registration(format!(
                    "wire name '{}' already assigned to another type",
                    name
                )));
            }
        }

        maps.by_name.insert(name.clone(), type_id);
        maps.by_id.insert(type_id, name.clone());
        maps.codecs.insert(
            type_id,
            TypeCodec {
                rust_name: std::any::type_name::<T>(),
                encode: Arc::new(|payload| {
                    let typed = payload.downcast_ref::<T>().ok_or_else(|| {
                        HubError::serialization("payload type did not match registration")
                    })?;
                    serde_json::to_value(typed)
                        .map_err(|e| HubError::serialization(e.to_string()))
                }),
                decode: Arc::new(|value| {
                    let typed: T = serde_json::from_value(value)
                        .map_err(|e| HubError::serialization(e.to_string()))?;
                    Ok(Arc::new(typed) as Arc<dyn Any + Send + Sync>)
                }),
            },
        );

        debug!(wire_name = %name, rust_type = std::any::type_name::<T>(), "Registered wire type");
        Ok(name)
    }

    pub(crate) fn codec_for(&self, type_id: TypeId) -> Option<(String, TypeCodecHandle)> {
        let maps = self.maps.read();
        let name = maps.by_id.get(&type_id)?.clone();
        let codec = maps.codecs.get(&type_id)?.clone();
        Some((name, TypeCodecHandle(codec)))
    }

    pub(crate) fn codec_for_name(&self, name: &str) -> Option<(TypeId, TypeCodecHandle)> {
        let maps = self.maps.read();
        let type_id = *maps.by_name.get(name)?;
        let codec = maps.codecs.get(&type_id)?.clone();
        Some((type_id, TypeCodecHandle(codec)))
    }
}

/// Crate-internal handle exposing the codec vtable to the envelope module.
pub(crate) struct TypeCodecHandle(TypeCodec);

impl TypeCodecHandle {
    pub(crate) fn rust_name(&self) -> &'static str {
        self.0.rust_name
    }

    pub(crate) fn encode(&self, payload: &(dyn Any + Send + Sync)) -> Result<serde_json::Value> {
        (self.0.encode)(payload)
    }

    pub(crate) fn decode(&self, value: serde_json::Value) -> Result<Arc<dyn Any + Send + Sync>> {
        (self.0.decode)(value)
    }
}
