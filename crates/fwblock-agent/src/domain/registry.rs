//! # Endpoint Registry
//!
//! One process-wide list owns every endpoint that ever completed a
//! check-in. Each configuration consumer (a rule option, a CLI session)
//! keeps its own list of handles into it, so an agent named by several
//! consumers is contacted and keyed once. Evicting through any list is
//! visible through all of them.

use std::sync::Arc;

use parking_lot::Mutex;

use super::endpoint::{Endpoint, EndpointId};

/// Shared handle to an endpoint.
pub type EndpointHandle = Arc<Mutex<Endpoint>>;

/// Ordered collection of endpoint handles.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    entries: Vec<EndpointHandle>,
}

impl EndpointRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `candidate` unless an endpoint with the same id is present.
    ///
    /// Returns the handle that is now in the registry, which is the
    /// existing one on a duplicate.
    pub fn register(&mut self, candidate: EndpointHandle) -> EndpointHandle {
        let id = candidate.lock().id();
        if let Some(existing) = self.find(id) {
            return existing;
        }
        self.entries.push(Arc::clone(&candidate));
        candidate
    }

    /// Handle for `id`, if registered.
    pub fn find(&self, id: EndpointId) -> Option<EndpointHandle> {
        self.entries.iter().find(|h| h.lock().id() == id).cloned()
    }

    /// Live endpoints, in registration order.
    pub fn live(&self) -> impl Iterator<Item = &EndpointHandle> + '_ {
        self.entries.iter().filter(|h| h.lock().is_alive())
    }

    /// Every endpoint, evicted ones included.
    pub fn all(&self) -> impl Iterator<Item = &EndpointHandle> + '_ {
        self.entries.iter()
    }

    /// Mark `id` as given up. Returns false if not registered.
    pub fn evict(&self, id: EndpointId) -> bool {
        match self.find(id) {
            Some(handle) => {
                handle.lock().evict();
                true
            }
            None => false,
        }
    }

    /// Number of registered endpoints.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of endpoints not yet given up.
    pub fn live_count(&self) -> usize {
        self.live().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwblock_crypto::SessionKey;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn handle(last_octet: u8) -> EndpointHandle {
        let id = SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, last_octet), 898);
        let ep = Endpoint::with_state(id, SessionKey::from_passphrase("k"), 100, [1; 4]).unwrap();
        Arc::new(Mutex::new(ep))
    }

    #[test]
    fn test_register_deduplicates_by_id() {
        let mut registry = EndpointRegistry::new();
        let first = registry.register(handle(1));
        let again = registry.register(handle(1));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn test_register_same_handle_twice() {
        let mut registry = EndpointRegistry::new();
        let h = handle(1);
        registry.register(Arc::clone(&h));
        registry.register(Arc::clone(&h));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_iteration_keeps_registration_order() {
        let mut registry = EndpointRegistry::new();
        for octet in [5, 3, 9] {
            registry.register(handle(octet));
        }
        let order: Vec<u8> = registry
            .live()
            .map(|h| h.lock().id().ip().octets()[3])
            .collect();
        assert_eq!(order, vec![5, 3, 9]);
    }

    #[test]
    fn test_evicted_endpoints_skipped() {
        let mut registry = EndpointRegistry::new();
        registry.register(handle(1));
        registry.register(handle(2));

        let id = SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 1), 898);
        assert!(registry.evict(id));
        assert_eq!(registry.live_count(), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.all().count(), 2);
    }

    #[test]
    fn test_eviction_visible_through_other_lists() {
        let mut global = EndpointRegistry::new();
        let mut consumer = EndpointRegistry::new();
        let shared = global.register(handle(1));
        consumer.register(shared);

        let id = SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 1), 898);
        consumer.evict(id);
        assert_eq!(global.live_count(), 0);
    }

    #[test]
    fn test_evict_unknown() {
        let registry = EndpointRegistry::new();
        assert!(!registry.evict(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1)));
    }
}
