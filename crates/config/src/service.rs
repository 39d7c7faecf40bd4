/// Membership file format
pub mod config_format;
/// File system feed
#[cfg(feature = "fs")]
pub mod fs;
/// Kubernetes feed
#[cfg(feature = "k8s")]
pub mod k8s;
/// In-memory feed
pub mod memory;

use affinitygate_model::{BoxResult, Endpoint};
use futures_util::{stream::BoxStream, Future};

/// Successive snapshots of a pool, each one the full set of endpoints alive at that time.
pub type SnapshotStream = BoxStream<'static, BoxResult<Vec<Endpoint>>>;

/// A source of membership snapshots.
///
/// An error item is a transient failure: consumers log it and keep the membership they have.
pub trait MembershipFeed: Send {
    const FEED_NAME: &'static str;
    /// Start observing the pool.
    fn subscribe(self) -> impl Future<Output = BoxResult<SnapshotStream>> + Send;
}
