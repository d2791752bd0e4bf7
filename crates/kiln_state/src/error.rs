//! Error types for kiln_state

use crate::scope::Scope;
use thiserror::Error;

/// Errors raised by state handles and their combinators
///
/// Every variant that concerns a particular handle carries the physical key
/// of that handle.
#[derive(Error, Debug)]
pub enum StateError {
    /// A state key was empty
    #[error("state key must not be empty")]
    EmptyKey,

    /// The scene exposes no store for the requested scope
    #[error("state '{key}': no {scope} store is reachable from this scene")]
    MissingStore { key: String, scope: Scope },

    /// The scene exposes no scheduler for deferred writes
    #[error("debounced state '{key}': no scheduler is reachable from this scene")]
    MissingScheduler { key: String },

    /// A validator rejected a candidate value
    ///
    /// `context` names the kind of handle that rejected it: `state`,
    /// `debounced`, `persistent` or `undoable`.
    #[error("{context} '{key}': validation failed: {message}")]
    Validation {
        context: &'static str,
        key: String,
        message: String,
    },

    /// `patch` was called on a value that is not an object
    #[error("state '{key}': cannot patch, current value is not an object")]
    NotAnObject { key: String },

    /// The patched value could not be converted back into the state type
    #[error("state '{key}': patch failed: {source}")]
    Patch {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A write was attempted on a computed state
    #[error("computed state '{key}' is read-only; update its source state instead")]
    ReadOnly { key: String },

    /// An operation needed the current value but the slot is empty
    #[error("state '{key}' has no value")]
    Uninitialized { key: String },
}

/// Result type for state operations
pub type Result<T> = std::result::Result<T, StateError>;
