//! Wire Codec
//!
//! Encoding/decoding rules for deliveries that cross a process boundary.
//! Two pieces live here:
//!
//! - [`TypeRegistry`]: a bidirectional mapping between runtime types and
//!   stable wire type-names, plus the per-type serialize/deserialize vtable
//!   captured at registration.
//! - [`WireEnvelope`]: the serialized form of a delivery:
//!   `{sender, target, messageTypeName, payload, correlationId, state}`.
//!
//! In-process delivery never touches this crate; payloads move as `Arc`s.
//! Only forwarding across a transport pays for serialization.

pub mod envelope;
pub mod registry;

pub use envelope::WireEnvelope;
pub use registry::TypeRegistry;
