//! Error Taxonomy
//!
//! One shared error type for the runtime. The variants map one-to-one onto
//! the failure classes the hubs deal in:
//!
//! - `Routing`: no route for a target; returned to the sender as a failed
//!   delivery, never thrown across a hub boundary.
//! - `Handler`: a handler failed; contained to that delivery.
//! - `Timeout`: an awaited response missed its deadline; surfaced only to
//!   the awaiting caller.
//! - `Registration`: duplicate or conflicting configuration; raised
//!   synchronously at registration time.
//! - `ModuleInstall`: one module failed to install; logged and skipped
//!   without aborting catalog bring-up.
//!
//! Only configuration-time errors abort startup; everything else stays local
//! to the delivery that produced it.

use std::time::Duration;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, HubError>;

/// Unified runtime error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HubError {
    #[error("No route to {target}: {reason}")]
    Routing { target: String, reason: String },

    #[error("Handler for {message_type} failed: {reason}")]
    Handler {
        message_type: String,
        reason: String,
    },

    #[error("Timed out after {0:?} waiting for response")]
    Timeout(Duration),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Module install failed for {module}: {reason}")]
    ModuleInstall { module: String, reason: String },

    #[error("Hub disposed")]
    Disposed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl HubError {
    /// Create a routing error for an unresolvable target.
    pub fn routing(target: impl ToString, reason: impl Into<String>) -> Self {
        HubError::Routing {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a handler failure for one delivery.
    pub fn handler(message_type: impl Into<String>, reason: impl Into<String>) -> Self {
        HubError::Handler {
            message_type: message_type.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration-time registration error.
    pub fn registration(reason: impl Into<String>) -> Self {
        HubError::Registration(reason.into())
    }

    /// Create a module install error scoped to one module path.
    pub fn module_install(module: impl Into<String>, reason: impl Into<String>) -> Self {
        HubError::ModuleInstall {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport-level error.
    pub fn transport(reason: impl Into<String>) -> Self {
        HubError::Transport(reason.into())
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        HubError::Serialization(reason.into())
    }

    /// Whether this error stays local to a single delivery.
    ///
    /// Per-delivery errors transition that delivery's state and let the hub
    /// keep running; only non-delivery errors abort anything larger.
    pub fn is_per_delivery(&self) -> bool {
        matches!(
            self,
            HubError::Routing { .. } | HubError::Handler { .. } | HubError::Timeout(_)
        )
    }

    /// Whether this error aborts startup (configuration-time class).
    pub fn is_configuration(&self) -> bool {
        matches!(self, HubError::Registration(_))
    }

    /// Short stable category label for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            HubError::Routing { .. } => "routing",
            HubError::Handler { .. } => "handler",
            HubError::Timeout(_) => "timeout",
            HubError::Registration(_) => "registration",
            HubError::ModuleInstall { .. } => "module_install",
            HubError::Disposed => "disposed",
            HubError::Transport(_) => "transport",
            HubError::Serialization(_) => "serialization",
        }
    }
}
