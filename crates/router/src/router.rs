//! Target-name dispatch table.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

type Handler = Box<dyn Fn(&[Value]) + Send>;

/// Exact-match dispatch from invocation target names to handlers.
///
/// Unregistered targets are a logged no-op so new server pushes never
/// break an older client.
#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<String, Handler>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one for the target.
    pub fn register(
        &mut self,
        target: impl Into<String>,
        handler: impl Fn(&[Value]) + Send + 'static,
    ) {
        self.handlers.insert(target.into(), Box::new(handler));
    }

    /// Runs the handler registered for `target`, if any.
    pub fn dispatch(&self, target: &str, arguments: &[Value]) {
        match self.handlers.get(target) {
            Some(handler) => handler(arguments),
            None => debug!(target, "no handler registered, ignoring invocation"),
        }
    }

    pub fn is_registered(&self, target: &str) -> bool {
        self.handlers.contains_key(target)
    }
}
