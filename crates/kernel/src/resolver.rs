use std::sync::{Arc, PoisonError};

use affinitygate_model::{Endpoint, ResolverConfig, ResolverKind};
use crossbeam_utils::sync::{ShardedLock, ShardedLockReadGuard, ShardedLockWriteGuard};

use crate::reconcile::Change;

pub mod bounded_load;
pub use bounded_load::BoundedLoadResolver;
pub mod hash_ring;
pub use hash_ring::HashRingResolver;

/// Resolves a sticky key into one endpoint of a changing pool.
///
/// Every endpoint returned by [`Resolver::resolve`] must be given back exactly once with
/// [`Resolver::release`], once the request it was resolved for is done.
pub trait Resolver: Send + Sync + std::fmt::Debug {
    /// Converge membership to `snapshot`, the full set of endpoints alive right now.
    ///
    /// Returns the changes that were applied, none if the snapshot matches the current membership.
    fn set_endpoints(&self, snapshot: &[Endpoint]) -> Vec<Change>;
    /// The endpoint `key` should go to, `None` when no endpoint is available.
    fn resolve(&self, key: &str) -> Option<Endpoint>;
    /// Hand back the very endpoint obtained from [`Resolver::resolve`], not an equal one built elsewhere.
    ///
    /// Endpoints no longer members are ignored, and so are those resolved before their address left and rejoined.
    fn release(&self, endpoint: &Endpoint);
    /// Current members, sorted by address.
    fn endpoints(&self) -> Vec<Endpoint>;
}

/// Build the resolver selected by `config`.
pub fn build_resolver(config: &ResolverConfig) -> Arc<dyn Resolver> {
    match config.kind {
        ResolverKind::BoundedLoad => Arc::new(BoundedLoadResolver::new(config)),
        ResolverKind::HashRing => Arc::new(HashRingResolver::new(config)),
    }
}

pub(crate) fn read<T>(lock: &ShardedLock<T>) -> ShardedLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &ShardedLock<T>) -> ShardedLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
