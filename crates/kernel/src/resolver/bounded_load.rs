//! Consistent hashing with bounded loads.
//!
//! A key goes to the first endpoint clockwise from its ring position whose in-flight load is below
//! `ceil(total * (1 + load_slack) / members)`. The total counts the request being placed, so while requests are
//! placed one after another some endpoint always has room.

use std::{
    collections::HashMap,
    hash::Hasher,
    sync::Arc,
};

use affinitygate_model::{Endpoint, OverloadPolicy, ResolverConfig};
use crossbeam_utils::sync::ShardedLock;

use super::{read, write, Resolver};
use crate::{
    load::LoadTable,
    reconcile::{reconcile, Change, MemberTable},
    ring::{HashRing, RingHasher},
};

/// Walks over the ring before the overload policy applies.
const WALK_ATTEMPTS: usize = 3;

/// Largest in-flight load an endpoint may reach once `total` requests are counted over `members` endpoints.
pub fn capacity(total: usize, members: usize, load_slack: f64) -> usize {
    let average = total as f64 / members.max(1) as f64;
    (average * (1.0 + load_slack)).ceil() as usize
}

#[derive(Debug)]
pub struct BoundedLoadResolver<H = RingHasher> {
    state: ShardedLock<BoundedState<H>>,
    load_slack: f64,
    overload: OverloadPolicy,
}

#[derive(Debug)]
struct BoundedState<H> {
    ring: HashRing<H>,
    endpoints: HashMap<Arc<str>, Endpoint>,
    loads: LoadTable,
}

impl<H> MemberTable for BoundedState<H>
where
    H: Hasher + Default,
{
    fn members(&self) -> Vec<Endpoint> {
        self.endpoints.values().cloned().collect()
    }

    fn remove_member(&mut self, endpoint: &Endpoint) {
        self.ring.remove(endpoint.address());
        self.endpoints.remove(endpoint.address());
        if let Some(outstanding) = self.loads.remove(endpoint.address()).filter(|outstanding| *outstanding > 0) {
            tracing::debug!(address = %endpoint, outstanding, "[AG.Ring] dropped in-flight load of removed endpoint");
        }
    }

    /// The member endpoint shares the load table's allocation of its address, which is what releases match on.
    fn add_member(&mut self, endpoint: &Endpoint) {
        let Some(member) = self.loads.insert(endpoint.address()) else {
            return;
        };
        let endpoint = Endpoint::new(member.clone());
        self.ring.add(&endpoint);
        self.endpoints.insert(member, endpoint);
    }
}

impl BoundedLoadResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self::with_hasher(config)
    }
}

impl<H> BoundedLoadResolver<H>
where
    H: Hasher + Default,
{
    pub fn with_hasher(config: &ResolverConfig) -> Self {
        Self {
            state: ShardedLock::new(BoundedState {
                ring: HashRing::with_hasher(config.replicas, config.partitions),
                endpoints: HashMap::new(),
                loads: LoadTable::new(),
            }),
            load_slack: if config.load_slack.is_finite() { config.load_slack.max(0.0) } else { 0.0 },
            overload: config.overload,
        }
    }

    /// In-flight load of one member.
    pub fn load(&self, address: &str) -> Option<usize> {
        read(&self.state).loads.load(address)
    }

    /// In-flight load over all members.
    pub fn total_load(&self) -> usize {
        read(&self.state).loads.total()
    }

    /// In-flight load per member, sorted by address.
    pub fn loads(&self) -> Vec<(Arc<str>, usize)> {
        read(&self.state).loads.snapshot()
    }

    /// Every member walked was full. Settles the reservation already taken for this request.
    fn overflow(&self, state: &BoundedState<H>, key: &str) -> Option<Endpoint> {
        match self.overload {
            OverloadPolicy::Fallback => {
                let endpoint = state.ring.locate(key).and_then(|address| state.endpoints.get(address));
                match endpoint {
                    Some(endpoint) if state.loads.acquire(endpoint.address()) => {
                        tracing::debug!(key, address = %endpoint, "[AG.Ring] every endpoint at capacity, falling back to ring owner");
                        Some(endpoint.clone())
                    }
                    _ => {
                        state.loads.unreserve();
                        None
                    }
                }
            }
            OverloadPolicy::Reject => {
                tracing::debug!(key, "[AG.Ring] every endpoint at capacity, rejecting");
                state.loads.unreserve();
                None
            }
        }
    }
}

impl<H> Resolver for BoundedLoadResolver<H>
where
    H: Hasher + Default + std::fmt::Debug,
{
    fn set_endpoints(&self, snapshot: &[Endpoint]) -> Vec<Change> {
        let mut state = write(&self.state);
        reconcile(&mut *state, snapshot)
    }

    fn resolve(&self, key: &str) -> Option<Endpoint> {
        let state = read(&self.state);
        if state.ring.is_empty() {
            return None;
        }
        state.loads.reserve();
        let members = state.ring.len();
        let load_slack = self.load_slack;
        let capacity = move |total| capacity(total, members, load_slack);
        // with the request counted, some member is always under capacity: a full walk only loses races
        for _ in 0..WALK_ATTEMPTS {
            for address in state.ring.walk(key) {
                let Some(endpoint) = state.endpoints.get(address) else {
                    continue;
                };
                if state.loads.try_acquire(address, capacity) {
                    return Some(endpoint.clone());
                }
            }
        }
        self.overflow(&state, key)
    }

    fn release(&self, endpoint: &Endpoint) {
        if !read(&self.state).loads.release(endpoint.shared_address()) {
            tracing::trace!(address = %endpoint, "[AG.Ring] release ignored, endpoint gone, rejoined or idle");
        }
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints = read(&self.state).members();
        endpoints.sort();
        endpoints
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    const A: &str = "10.0.0.1:8080";
    const B: &str = "10.0.0.2:8080";
    const C: &str = "10.0.0.3:8080";

    fn eps(addresses: &[&str]) -> Vec<Endpoint> {
        addresses.iter().map(|a| Endpoint::from(*a)).collect()
    }

    fn resolver(load_slack: f64) -> BoundedLoadResolver {
        BoundedLoadResolver::new(&ResolverConfig {
            replicas: 20,
            partitions: 0,
            load_slack,
            ..Default::default()
        })
    }

    fn sum_of_loads(resolver: &BoundedLoadResolver) -> usize {
        resolver.loads().iter().map(|(_, load)| load).sum()
    }

    #[test]
    fn test_capacity() {
        assert_eq!(capacity(1, 2, 0.25), 1);
        assert_eq!(capacity(2, 2, 0.25), 2);
        assert_eq!(capacity(3, 2, 0.25), 2);
        assert_eq!(capacity(100, 4, 0.0), 25);
        assert_eq!(capacity(101, 4, 0.0), 26);
        assert_eq!(capacity(5, 0, 0.25), 7);
    }

    #[test]
    fn test_empty_resolver() {
        let resolver = resolver(0.25);
        assert_eq!(resolver.resolve("k1"), None);
        assert_eq!(resolver.total_load(), 0);
        resolver.release(&Endpoint::from(A));
        assert_eq!(resolver.total_load(), 0);
    }

    #[test]
    fn test_idle_keys_are_sticky() {
        let resolver = resolver(0.25);
        resolver.set_endpoints(&eps(&[A, B, C]));
        for i in 0..100 {
            let key = format!("session-{i}");
            let first = resolver.resolve(&key).expect("endpoint");
            resolver.release(&first);
            for _ in 0..5 {
                let next = resolver.resolve(&key).expect("endpoint");
                assert_eq!(next, first);
                resolver.release(&next);
            }
        }
        assert_eq!(resolver.total_load(), 0);
    }

    #[test]
    fn test_hot_key_spills_over_and_new_member_takes_load() {
        let resolver = resolver(0.25);
        resolver.set_endpoints(&eps(&[A, B]));

        let mut held = Vec::new();
        for _ in 0..100 {
            held.push(resolver.resolve("k1").expect("endpoint"));
            for (address, load) in resolver.loads() {
                assert!(load <= capacity(resolver.total_load(), 2, 0.25), "{address} over capacity");
            }
        }
        let used: HashSet<&str> = held.iter().map(|e| e.address()).collect();
        assert_eq!(used.len(), 2, "a hot key must spill over to the second endpoint");
        assert_eq!(resolver.total_load(), 100);

        resolver.set_endpoints(&eps(&[A, B, C]));
        assert_eq!(resolver.load(C), Some(0));
        let mut to_c = 0;
        for i in 0..50 {
            let endpoint = resolver.resolve(&format!("fresh-{i}")).expect("endpoint");
            if endpoint.address() == C {
                to_c += 1;
            }
            held.push(endpoint);
        }
        assert!(to_c >= 20, "only {to_c} of 50 new requests reached the new endpoint");

        resolver.set_endpoints(&eps(&[A, C]));
        assert_eq!(resolver.load(B), None);
        for i in 0..200 {
            let endpoint = resolver.resolve(&format!("after-{i}")).expect("endpoint");
            assert_ne!(endpoint.address(), B);
            resolver.release(&endpoint);
        }
        for endpoint in held {
            resolver.release(&endpoint);
        }
        assert_eq!(resolver.total_load(), 0);
        assert_eq!(sum_of_loads(&resolver), 0);
    }

    #[test]
    fn test_release_after_removal_is_ignored() {
        let resolver = resolver(0.25);
        resolver.set_endpoints(&eps(&[A]));
        let endpoint = resolver.resolve("k1").expect("endpoint");
        assert_eq!(resolver.total_load(), 1);
        resolver.set_endpoints(&eps(&[B]));
        assert_eq!(resolver.total_load(), 0);
        resolver.release(&endpoint);
        assert_eq!(resolver.total_load(), 0);

        // re-added endpoints start from zero, stale releases cannot go below it
        resolver.set_endpoints(&eps(&[A, B]));
        resolver.release(&endpoint);
        assert_eq!(resolver.load(A), Some(0));
        assert_eq!(resolver.total_load(), 0);
    }

    #[test]
    fn test_stale_release_after_rejoin_is_ignored() {
        let resolver = resolver(0.25);
        resolver.set_endpoints(&eps(&[A]));
        let before = resolver.resolve("k1").expect("endpoint");
        resolver.set_endpoints(&eps(&[B]));
        resolver.set_endpoints(&eps(&[A]));
        let after = resolver.resolve("k1").expect("endpoint");
        assert_eq!(after, before);
        assert_eq!(resolver.load(A), Some(1));

        resolver.release(&before);
        assert_eq!(resolver.load(A), Some(1), "a release from the earlier membership consumed a newer request");
        assert_eq!(resolver.total_load(), 1);
        resolver.release(&after);
        assert_eq!(resolver.load(A), Some(0));
        assert_eq!(resolver.total_load(), 0);
    }

    #[test]
    fn test_accepted_endpoint_within_capacity_under_random_interleavings() {
        let pool = ["10.0.1.1:80", "10.0.1.2:80", "10.0.1.3:80", "10.0.1.4:80", "10.0.1.5:80", "10.0.1.6:80"];
        for seed in [1u64, 7, 42] {
            let mut rng = StdRng::seed_from_u64(seed);
            let resolver = resolver(0.25);
            resolver.set_endpoints(&eps(&pool[..4]));
            let mut held: Vec<Endpoint> = Vec::new();
            for step in 0..5000 {
                if step % 500 == 499 {
                    let mut members: Vec<&str> = pool.iter().copied().filter(|_| rng.random_bool(0.6)).collect();
                    if members.is_empty() {
                        members.push(pool[0]);
                    }
                    resolver.set_endpoints(&eps(&members));
                }
                if held.is_empty() || rng.random_bool(0.6) {
                    let key = format!("session-{}", rng.random_range(0..50));
                    let endpoint = resolver.resolve(&key).expect("membership is never empty");
                    let members = resolver.endpoints().len();
                    let load = resolver.load(endpoint.address()).expect("resolved endpoint is a member");
                    assert!(load <= capacity(resolver.total_load(), members, 0.25), "seed {seed} step {step}: {endpoint} over capacity");
                    held.push(endpoint);
                } else {
                    let index = rng.random_range(0..held.len());
                    let endpoint = held.swap_remove(index);
                    resolver.release(&endpoint);
                }
                assert_eq!(resolver.total_load(), sum_of_loads(&resolver), "seed {seed} step {step}");
            }
            for endpoint in held {
                resolver.release(&endpoint);
            }
            assert_eq!(resolver.total_load(), 0);
            assert_eq!(sum_of_loads(&resolver), 0);
        }
    }

    #[test]
    fn test_overflow_policies() {
        let mut config = ResolverConfig {
            overload: OverloadPolicy::Reject,
            ..Default::default()
        };
        let rejecting = BoundedLoadResolver::new(&config);
        rejecting.set_endpoints(&eps(&[A, B]));
        {
            let state = read(&rejecting.state);
            state.loads.reserve();
            assert_eq!(rejecting.overflow(&state, "k1"), None);
        }
        assert_eq!(rejecting.total_load(), 0);

        config.overload = OverloadPolicy::Fallback;
        let falling_back = BoundedLoadResolver::new(&config);
        falling_back.set_endpoints(&eps(&[A, B]));
        let owner = {
            let state = read(&falling_back.state);
            state.loads.reserve();
            let owner = state.ring.locate("k1").cloned().expect("owner");
            assert_eq!(falling_back.overflow(&state, "k1").map(|e| e.shared_address().clone()), Some(owner.clone()));
            owner
        };
        assert_eq!(falling_back.load(&owner), Some(1));
        assert_eq!(falling_back.total_load(), 1);
    }

    #[test]
    fn test_bound_holds_at_every_snapshot_under_concurrent_resolves() {
        const WORKERS: usize = 8;
        const RESOLVES: usize = 500;
        let resolver = resolver(0.25);
        resolver.set_endpoints(&eps(&[A, B, C, "10.0.0.4:8080"]));
        let finished = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for worker in 0..WORKERS as u64 {
                let resolver = &resolver;
                let finished = &finished;
                scope.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(worker);
                    for _ in 0..RESOLVES {
                        let key = format!("session-{}", rng.random_range(0..20));
                        resolver.resolve(&key).expect("membership is never empty");
                    }
                    finished.fetch_add(1, Ordering::AcqRel);
                });
            }
            scope.spawn(|| {
                let mut snapshots = 0;
                loop {
                    let done = finished.load(Ordering::Acquire) == WORKERS;
                    {
                        // the writer lock waits for every resolve in progress to settle
                        let state = write(&resolver.state);
                        let total = state.loads.total();
                        let members = state.ring.len();
                        let loads = state.loads.snapshot();
                        assert_eq!(total, loads.iter().map(|(_, load)| load).sum::<usize>());
                        for (address, load) in loads {
                            assert!(load <= capacity(total, members, 0.25), "snapshot {snapshots}: {address} holds {load} of {total}");
                        }
                    }
                    snapshots += 1;
                    if done {
                        break;
                    }
                    std::thread::yield_now();
                }
                assert!(snapshots > 1);
            });
        });

        assert_eq!(resolver.total_load(), WORKERS * RESOLVES);
    }

    #[test]
    fn test_concurrent_resolve_release_and_churn() {
        let resolver = resolver(0.25);
        let snapshots = [eps(&[A, B, C]), eps(&[A, C]), eps(&[B, C, "10.0.0.4:8080"])];
        let known: HashSet<Endpoint> = snapshots.iter().flatten().cloned().collect();
        resolver.set_endpoints(&snapshots[0]);

        std::thread::scope(|scope| {
            for worker in 0..8u64 {
                let resolver = &resolver;
                let known = &known;
                scope.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(worker);
                    for _ in 0..2000 {
                        let key = format!("session-{}", rng.random_range(0..100));
                        let endpoint = resolver.resolve(&key).expect("membership is never empty");
                        assert!(known.contains(&endpoint));
                        resolver.release(&endpoint);
                    }
                });
            }
            scope.spawn(|| {
                for round in 0..200 {
                    resolver.set_endpoints(&snapshots[round % snapshots.len()]);
                    std::thread::yield_now();
                }
            });
        });

        resolver.set_endpoints(&snapshots[0]);
        assert_eq!(resolver.total_load(), 0);
        assert_eq!(sum_of_loads(&resolver), 0);
    }
}
