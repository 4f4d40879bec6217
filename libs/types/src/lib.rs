//! Shared Type System
//!
//! Common vocabulary for the hubmesh runtime: endpoint addresses, delivery
//! envelopes with their state machine, mesh node descriptors, and the error
//! taxonomy used across every crate in the workspace.
//!
//! Nothing here spawns tasks or touches the network. Higher layers
//! (`messaging-hub`, `mesh`, `codec`) build on these values.

pub mod address;
pub mod delivery;
pub mod error;
pub mod node;

pub use address::Address;
pub use delivery::{Delivery, DeliveryState};
pub use error::{HubError, Result};
pub use node::MeshNode;
