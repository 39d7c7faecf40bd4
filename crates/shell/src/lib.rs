//! **A session-affinity layer-7 proxy**
//!
//! Requests carrying the same sticky key header go to the same endpoint, as long as it stays in the pool
//! and is not overloaded. Endpoints are placed on a consistent hashing ring, and the bounded-load resolver
//! spills keys over to the next endpoint on the ring once one holds more than its share of in-flight requests.
//!
//! ## startup
//! ### static endpoints
//! see [`startup_static`]
//! ### by membership file
//! see [`startup_file`]
//! ### by k8s endpoints
//! see [`startup_k8s`]
//!
//! Sending `SIGUSR1` to the process prints how many requests went to each `key-endpoint` pair.
#![warn(clippy::unwrap_used)]

pub use affinitygate_config as config;
pub use affinitygate_config::{AffinityConfig, BoxError, BoxResult, Endpoint};
pub use affinitygate_kernel as kernel;
use affinitygate_config::MembershipFeed;
use tracing::{info, instrument};

pub mod membership;
pub mod server;

pub use server::startup_with_shutdown_signal;

#[cfg(feature = "fs")]
/// # Startup the proxy by membership file
/// The file is json if its extension is `json`, toml otherwise. It is watched for changes.
pub async fn startup_file(path: impl AsRef<std::path::Path>, config: AffinityConfig) -> Result<(), BoxError> {
    use affinitygate_config::service::{
        config_format::{Json, Toml},
        fs::Fs,
    };
    let path = path.as_ref();
    if is_json(path) {
        startup(Fs::new(path, Json::default()), config).await
    } else {
        startup(Fs::new(path, Toml::default()), config).await
    }
}

#[cfg(feature = "fs")]
fn is_json(path: &std::path::Path) -> bool {
    use affinitygate_config::service::config_format::{ConfigFormat, Json};
    path.extension() == Some(Json::default().extension())
}

#[cfg(feature = "k8s")]
/// # Startup the proxy by k8s endpoints
/// The endpoints of `service` are watched through a kube client built from `kubeconfig` when given,
/// from the environment (`KUBECONFIG`, `~/.kube/config` or the in-cluster service account) otherwise.
pub async fn startup_k8s(service: affinitygate_config::Service, kubeconfig: Option<std::path::PathBuf>, config: AffinityConfig) -> Result<(), BoxError> {
    use affinitygate_config::service::k8s::K8s;
    let feed = match kubeconfig {
        Some(path) => K8s::with_kubeconfig(service, path).await?,
        None => K8s::with_default_client(service).await?,
    };
    startup(feed, config).await
}

/// # Startup the proxy with a fixed set of endpoints
pub async fn startup_static(endpoints: Vec<Endpoint>, config: AffinityConfig) -> Result<(), BoxError> {
    use affinitygate_config::service::memory::Memory;
    startup(Memory::new(endpoints), config).await
}

/// # Startup the proxy
/// The `feed` could be any type that implements [`affinitygate_config::MembershipFeed`]. Stops on ctrl+c.
///
/// ## Errors
/// If the config is invalid, it will return a BoxError.
#[instrument(fields(feed = (F::FEED_NAME)), skip(feed))]
pub async fn startup<F>(feed: F, config: AffinityConfig) -> Result<(), BoxError>
where
    F: MembershipFeed + 'static,
{
    info!("Affinitygate Meta Info: {:?}", Meta::new());
    info!("Starting proxy...");
    startup_with_shutdown_signal(feed, config, ctrl_c_cancel_token()).await
}

#[derive(Debug, Clone, Copy)]
pub struct Meta {
    pub version: &'static str,
}

impl Meta {
    const DEFAULT: Meta = Self {
        version: env!("CARGO_PKG_VERSION"),
    };
    pub const fn new() -> Self {
        Self::DEFAULT
    }
}

impl Default for Meta {
    fn default() -> Self {
        Self::DEFAULT
    }
}

pub fn ctrl_c_cancel_token() -> tokio_util::sync::CancellationToken {
    let cancel_token = tokio_util::sync::CancellationToken::new();
    {
        let cancel_token = cancel_token.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received ctrl+c signal, shutting down...");
            cancel_token.cancel();
        });
    }
    cancel_token
}

#[cfg(all(test, feature = "fs"))]
mod test {
    use std::path::Path;

    use super::is_json;

    #[test]
    fn test_membership_file_format() {
        assert!(is_json(Path::new("/etc/affinitygate/members.json")));
        assert!(!is_json(Path::new("/etc/affinitygate/members.toml")));
        assert!(!is_json(Path::new("members")));
        assert!(!is_json(Path::new("members.json.bak")));
    }
}
