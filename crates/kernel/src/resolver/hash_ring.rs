use std::{
    collections::HashMap,
    hash::Hasher,
    sync::Arc,
};

use affinitygate_model::{Endpoint, ResolverConfig};
use crossbeam_utils::sync::ShardedLock;

use super::{read, write, Resolver};
use crate::{
    reconcile::{reconcile, Change, MemberTable},
    ring::{HashRing, RingHasher},
};

/// Plain consistent hashing: a key always goes to the endpoint owning it on the ring, whatever its load.
#[derive(Debug)]
pub struct HashRingResolver<H = RingHasher> {
    state: ShardedLock<RingState<H>>,
}

#[derive(Debug)]
struct RingState<H> {
    ring: HashRing<H>,
    endpoints: HashMap<Arc<str>, Endpoint>,
}

impl<H> MemberTable for RingState<H>
where
    H: Hasher + Default,
{
    fn members(&self) -> Vec<Endpoint> {
        self.endpoints.values().cloned().collect()
    }

    fn remove_member(&mut self, endpoint: &Endpoint) {
        self.ring.remove(endpoint.address());
        self.endpoints.remove(endpoint.address());
    }

    fn add_member(&mut self, endpoint: &Endpoint) {
        self.endpoints.insert(endpoint.shared_address().clone(), endpoint.clone());
        self.ring.add(endpoint);
    }
}

impl HashRingResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self::with_hasher(config)
    }
}

impl<H> HashRingResolver<H>
where
    H: Hasher + Default,
{
    pub fn with_hasher(config: &ResolverConfig) -> Self {
        Self {
            state: ShardedLock::new(RingState {
                ring: HashRing::with_hasher(config.replicas, config.partitions),
                endpoints: HashMap::new(),
            }),
        }
    }
}

impl<H> Resolver for HashRingResolver<H>
where
    H: Hasher + Default + std::fmt::Debug,
{
    fn set_endpoints(&self, snapshot: &[Endpoint]) -> Vec<Change> {
        let mut state = write(&self.state);
        reconcile(&mut *state, snapshot)
    }

    fn resolve(&self, key: &str) -> Option<Endpoint> {
        let state = read(&self.state);
        let address = state.ring.locate(key)?;
        state.endpoints.get(address).cloned()
    }

    fn release(&self, _endpoint: &Endpoint) {}

    fn endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints = read(&self.state).members();
        endpoints.sort();
        endpoints
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn eps(addresses: &[&str]) -> Vec<Endpoint> {
        addresses.iter().map(|a| Endpoint::from(*a)).collect()
    }

    #[test]
    fn test_resolve_ignores_load() {
        let resolver = HashRingResolver::new(&ResolverConfig::default());
        assert_eq!(resolver.resolve("k1"), None);
        resolver.set_endpoints(&eps(&["10.0.0.1:80", "10.0.0.2:80"]));
        let first = resolver.resolve("k1").expect("endpoint");
        for _ in 0..100 {
            assert_eq!(resolver.resolve("k1").as_ref(), Some(&first));
        }
        resolver.release(&first);
        resolver.release(&Endpoint::from("10.0.0.9:80"));
    }

    #[test]
    fn test_set_endpoints_is_idempotent() {
        let resolver = HashRingResolver::new(&ResolverConfig::default());
        let snapshot = eps(&["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]);
        assert_eq!(resolver.set_endpoints(&snapshot).len(), 3);
        let keys: Vec<String> = (0..200).map(|i| format!("k{i}")).collect();
        let before: Vec<_> = keys.iter().map(|k| resolver.resolve(k)).collect();
        assert!(resolver.set_endpoints(&snapshot).is_empty());
        let after: Vec<_> = keys.iter().map(|k| resolver.resolve(k)).collect();
        assert_eq!(before, after);
        assert_eq!(resolver.endpoints(), snapshot);
    }

    #[test]
    fn test_removed_endpoint_is_never_resolved() {
        let resolver = HashRingResolver::new(&ResolverConfig::default());
        resolver.set_endpoints(&eps(&["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]));
        resolver.set_endpoints(&eps(&["10.0.0.1:80", "10.0.0.3:80"]));
        for i in 0..500 {
            let endpoint = resolver.resolve(&format!("k{i}")).expect("endpoint");
            assert_ne!(endpoint.address(), "10.0.0.2:80");
        }
        resolver.set_endpoints(&[]);
        assert_eq!(resolver.resolve("k1"), None);
    }
}
