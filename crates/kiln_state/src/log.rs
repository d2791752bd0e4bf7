//! Namespaced diagnostics for state handles
//!
//! Debug traces are only emitted when the handle was created with
//! `debug: true` (or the scene's defaults enable it). Warnings and errors
//! always go out. Logging never influences control flow.

use std::fmt;
use std::rc::Rc;

/// A namespaced diagnostic emitter bound to one state key
#[derive(Clone, Debug)]
pub struct Logger {
    namespace: &'static str,
    key: Rc<str>,
    enabled: bool,
}

impl Logger {
    pub fn new(namespace: &'static str, key: &str, enabled: bool) -> Self {
        Self {
            namespace,
            key: Rc::from(key),
            enabled,
        }
    }

    /// Same key and switch, different namespace
    pub fn scoped(&self, namespace: &'static str) -> Self {
        Self {
            namespace,
            key: self.key.clone(),
            enabled: self.enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Debug trace, emitted only when enabled
    pub fn debug(&self, message: impl fmt::Display) {
        if self.enabled {
            tracing::debug!(namespace = self.namespace, key = %self.key, "{message}");
        }
    }

    pub fn warn(&self, message: impl fmt::Display) {
        tracing::warn!(namespace = self.namespace, key = %self.key, "{message}");
    }

    pub fn error(&self, message: impl fmt::Display) {
        tracing::error!(namespace = self.namespace, key = %self.key, "{message}");
    }
}
