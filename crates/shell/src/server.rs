use std::sync::Arc;

use affinitygate_config::{AffinityConfig, BoxError, MembershipFeed};
use affinitygate_kernel::{build_resolver, AffinityDispatcher, AffinityListen, RequestStats};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::membership;

/// Run the proxy fed by `feed` until `shutdown_signal` fires.
///
/// # Errors
/// If the config is invalid, the feed cannot be subscribed or the listen address cannot be bound.
#[instrument(fields(feed = (F::FEED_NAME)), skip(feed, shutdown_signal))]
pub async fn startup_with_shutdown_signal<F>(feed: F, config: AffinityConfig, shutdown_signal: CancellationToken) -> Result<(), BoxError>
where
    F: MembershipFeed + 'static,
{
    config.validate()?;
    let dispatcher = AffinityDispatcher::new(&config, build_resolver(&config.resolver), Arc::new(RequestStats::new()))?;
    let snapshots = feed.subscribe().await?;
    let membership = tokio::spawn(membership::watch(F::FEED_NAME, snapshots, dispatcher.resolver().clone(), shutdown_signal.child_token()));
    #[cfg(unix)]
    tokio::spawn(dump_stats_on_signal(dispatcher.stats().clone(), shutdown_signal.child_token()));

    info!(listen = %config.listen, header = %config.header, resolver = %config.resolver.kind, "[AG.Listen] Starting proxy...");
    let result = AffinityListen::new(config.listen, dispatcher, shutdown_signal.clone()).listen().await;
    // a listener failing to bind takes the membership task down with it
    shutdown_signal.cancel();
    if let Err(e) = membership.await {
        warn!("[AG.Membership] membership task failed: {e}");
    }
    result
}

/// Print the request stats every time the process receives `SIGUSR1`.
#[cfg(unix)]
async fn dump_stats_on_signal(stats: Arc<RequestStats>, shutdown_signal: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};
    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(usr1) => usr1,
        Err(e) => {
            warn!("[AG.Proxy] fail to install SIGUSR1 handler, stats dump disabled: {e}");
            return;
        }
    };
    loop {
        tokio::select! {
            () = shutdown_signal.cancelled() => return,
            received = usr1.recv() => {
                if received.is_none() {
                    return;
                }
                stats.dump();
            }
        }
    }
}
