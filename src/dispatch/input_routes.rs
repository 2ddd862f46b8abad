//! Named input-route registry (§4.7, §6): modules demultiplex messages by
//! logical input-queue name. A registry entry is keyed by an optional name;
//! `None` is the default (nameless) route.

use std::collections::HashMap;

use crate::dispatch::message::MessageCallback;

#[derive(Default)]
pub struct InputRouteRegistry {
    routes: HashMap<Option<String>, MessageCallback>,
}

impl InputRouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Register (or replace in place) the handler for `input_name`. Returns
    /// `true` if this was the first entry added to an empty registry, so the
    /// caller knows to subscribe the transport's input queue.
    pub fn register(&mut self, input_name: Option<String>, callback: MessageCallback) -> bool {
        let was_empty = self.routes.is_empty();
        self.routes.insert(input_name, callback);
        was_empty
    }

    /// Remove the handler for `input_name`. Returns `true` if the registry
    /// is now empty, so the caller knows to unsubscribe.
    pub fn deregister(&mut self, input_name: &Option<String>) -> bool {
        self.routes.remove(input_name);
        self.routes.is_empty()
    }

    /// Resolve a handler for an inbound message's input name: exact match
    /// first, falling back to the default (nameless) route (§4.7's
    /// "Named-input path").
    pub fn resolve(&mut self, input_name: &Option<String>) -> Option<&mut MessageCallback> {
        if self.routes.contains_key(input_name) {
            return self.routes.get_mut(input_name);
        }
        self.routes.get_mut(&None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Disposition;

    #[test]
    fn s6_exact_match_then_default_fallback() {
        let mut registry = InputRouteRegistry::new();
        registry.register(
            Some("alpha".to_owned()),
            MessageCallback::Sync(Box::new(|_| Disposition::Accepted)),
        );
        registry.register(
            None,
            MessageCallback::Sync(Box::new(|_| Disposition::Rejected)),
        );

        assert!(registry.resolve(&Some("alpha".to_owned())).is_some());
        assert!(registry.resolve(&Some("beta".to_owned())).is_some());
        assert!(registry.resolve(&None).is_some());
    }

    #[test]
    fn registering_same_name_replaces_in_place() {
        let mut registry = InputRouteRegistry::new();
        let first_is_new = registry.register(
            Some("alpha".to_owned()),
            MessageCallback::Sync(Box::new(|_| Disposition::Accepted)),
        );
        assert!(first_is_new);
        let second_is_new = registry.register(
            Some("alpha".to_owned()),
            MessageCallback::Sync(Box::new(|_| Disposition::Rejected)),
        );
        assert!(!second_is_new);
        assert_eq!(registry.routes.len(), 1);
    }

    #[test]
    fn deregister_reports_when_registry_becomes_empty() {
        let mut registry = InputRouteRegistry::new();
        registry.register(
            Some("alpha".to_owned()),
            MessageCallback::Sync(Box::new(|_| Disposition::Accepted)),
        );
        assert!(registry.deregister(&Some("alpha".to_owned())));
        assert!(registry.is_empty());
    }
}
