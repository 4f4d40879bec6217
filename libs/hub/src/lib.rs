//! Message Hub Runtime
//!
//! Addressable actor-like units ("hubs") exchanging typed messages over
//! ordered mailboxes. Each hub drains its mailbox on one dedicated task, so
//! hub-private state mutates only on that task and cross-hub communication
//! is message passing, never shared-memory writes.
//!
//! ```text
//! ┌──────────────────────┐        ┌───────────────────────┐
//! │     MessageHub       │        │   Router/Forwarding   │
//! │                      │        │                       │
//! │  post ─▶ mailbox ─▶  │  miss  │  hosted-hub factory   │
//! │  dispatch ─▶ handler ├───────▶│  named transport      │
//! │         │            │        │  mesh node lookup     │
//! │  defer ─┤ (buffered) │        │  no route → returned  │
//! └──────────────────────┘        └───────────────────────┘
//! ```
//!
//! Resolution order for a non-local target: hosted hub in the local arena,
//! first-matching configured routing rule (which may cold-start a hosted
//! hub), mesh catalog node lookup over the configured transport, and finally
//! a `Failed("no route ...")` delivery returned to the sender. Nothing is
//! silently dropped.

pub mod arena;
pub mod config;
pub mod dispatch;
pub mod handler;
pub mod hub;
pub mod transport;

pub use arena::HubArena;
pub use config::{MessageHubConfiguration, RouteRule};
pub use handler::TypedDelivery;
pub use hub::{DeferralGuard, HubMetrics, HubStatus, MessageHub, PostOptions};
pub use transport::{HubTransport, LoopbackTransport, NodeResolver};
