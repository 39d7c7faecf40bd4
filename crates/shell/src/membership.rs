use std::sync::Arc;

use affinitygate_config::SnapshotStream;
use affinitygate_kernel::{Change, Resolver};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Feed every snapshot of `snapshots` to the resolver until the stream ends or `shutdown_signal` fires.
///
/// Failed snapshots are logged and skipped, the resolver keeps its membership until the next good one.
pub async fn watch(feed_name: &'static str, mut snapshots: SnapshotStream, resolver: Arc<dyn Resolver>, shutdown_signal: CancellationToken) {
    info!("[AG.Membership] Entering listening on feed {feed_name}");
    loop {
        let next = tokio::select! {
            () = shutdown_signal.cancelled() => {
                info!("[AG.Membership] feed {feed_name} shutdown");
                return;
            }
            next = snapshots.next() => next,
        };
        match next {
            Some(Ok(snapshot)) => {
                let changes = resolver.set_endpoints(&snapshot);
                if !changes.is_empty() {
                    let removed = changes.iter().filter(|change| matches!(change, Change::Remove(_))).count();
                    info!(
                        feed = feed_name,
                        added = changes.len() - removed,
                        removed,
                        members = snapshot.len(),
                        "[AG.Membership] membership updated"
                    );
                }
            }
            Some(Err(e)) => {
                warn!("[AG.Membership] feed {feed_name} error, keeping current membership: {e}");
            }
            None => {
                info!("[AG.Membership] feed {feed_name} event stream end");
                return;
            }
        }
    }
}
