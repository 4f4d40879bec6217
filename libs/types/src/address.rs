//! Hub Endpoint Addresses
//!
//! An [`Address`] is the opaque identity of one hub endpoint. It is cheap to
//! clone, equality-comparable, and hashable so it can key registries and
//! routing tables. The textual form is `kind/id`, e.g. `chat/a3f9...`.
//!
//! Addresses are scoped to a single hub instance: they are minted when a hub
//! is constructed and never reused once the hub is disposed.

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque identity of a hub endpoint.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Address {
    kind: Arc<str>,
    id: Arc<str>,
}

impl Address {
    /// Create an address from an explicit kind and id.
    pub fn new(kind: impl AsRef<str>, id: impl AsRef<str>) -> Self {
        Self {
            kind: Arc::from(kind.as_ref()),
            id: Arc::from(id.as_ref()),
        }
    }

    /// Mint a fresh address of the given kind with a generated id.
    ///
    /// Used at hub construction time; the id is unique for the process
    /// lifetime and never handed out twice.
    pub fn unique(kind: impl AsRef<str>) -> Self {
        Self::new(kind, Uuid::new_v4().simple().to_string())
    }

    /// Address kind, the routing-relevant half of the identity.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Instance id within the kind.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}/{})", self.kind, self.id)
    }
}

/// Parse the `kind/id` textual form. The id may itself contain slashes;
/// only the first separator splits.
impl FromStr for Address {
    type Err = crate::HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((kind, id)) if !kind.is_empty() && !id.is_empty() => {
                Ok(Address::new(kind, id))
            }
            _ => Err(crate::HubError::registration(format!(
                "invalid address '{}': expected kind/id",
                s
            ))),
        }
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AddressVisitor;

        impl Visitor<'_> for AddressVisitor {
            type Value = Address;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an address string of the form kind/id")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Address, E> {
                value.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(AddressVisitor)
    }
}
