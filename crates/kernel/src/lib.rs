//! # Affinitygate kernel crate.
//!
//! Placement of sticky keys on a pool of endpoints, and the proxy serving requests with it.

#![deny(clippy::unwrap_used, clippy::dbg_macro, clippy::unimplemented, clippy::todo, clippy::missing_safety_doc)]
#![warn(
    clippy::missing_errors_doc,
    clippy::indexing_slicing,
    clippy::inline_always,
    clippy::fn_params_excessive_bools,
    missing_debug_implementations
)]
/// response bodies
pub mod body;
/// endpoint leases released on drop
pub mod lease;
/// tcp listener
pub mod listener;
/// in-flight load accounting
pub mod load;
/// the proxy service
pub mod proxy;
/// membership reconciliation
pub mod reconcile;
/// sticky key resolvers
pub mod resolver;
/// consistent hashing ring
pub mod ring;
/// per key and endpoint request counters
pub mod stats;

pub use affinitygate_model::{BoxError, BoxResult};
pub use body::AgBody;
pub use lease::EndpointLease;
pub use listener::AffinityListen;
pub use proxy::AffinityDispatcher;
pub use reconcile::Change;
pub use resolver::{build_resolver, BoundedLoadResolver, HashRingResolver, Resolver};
pub use ring::{HashRing, RingHasher};
pub use stats::RequestStats;
pub use tokio_util::sync::CancellationToken;
