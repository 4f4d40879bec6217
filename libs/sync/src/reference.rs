//! Sub-document References
//!
//! A [`Reference`] scopes a reduction to one part of the snapshot document,
//! addressed by JSON pointer (`/counters/clicks`). The empty pointer refers
//! to the whole document.

use serde_json::Value;
use std::fmt;

/// JSON-pointer reference into a snapshot document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference(String);

impl Reference {
    /// Reference to the whole document.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Reference at a JSON pointer, e.g. `/counters/clicks`.
    pub fn pointer(pointer: impl Into<String>) -> Self {
        Self(pointer.into())
    }

    /// Project the referenced sub-document out of a snapshot.
    ///
    /// Missing paths project to `Null`; projections never mutate the root.
    pub fn project(&self, snapshot: &Value) -> Value {
        if self.0.is_empty() {
            snapshot.clone()
        } else {
            snapshot.pointer(&self.0).cloned().unwrap_or(Value::Null)
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            f.write_str(&self.0)
        }
    }
}
