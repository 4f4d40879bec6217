//! End-to-End Test Support
//!
//! Shared fixtures and wiring helpers for multi-node scenarios. A "node"
//! here is one root hub with its own arena and type registry; nodes talk to
//! each other through loopback transports, exercising the same envelope
//! path a real cross-process transport would.

pub mod fixtures;
pub mod framework;
