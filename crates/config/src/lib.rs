#![warn(clippy::indexing_slicing, clippy::unwrap_used, clippy::dbg_macro, clippy::undocumented_unsafe_blocks)]
//! Membership feeds of the affinitygate proxy: where the current set of endpoints comes from.

/// Membership feeds and their trait
pub mod service;

pub use affinitygate_model::*;
pub use service::{MembershipFeed, SnapshotStream};
