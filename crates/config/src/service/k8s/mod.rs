use std::path::Path;

use affinitygate_model::{BoxResult, Endpoint, PortSelector, Service};
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Endpoints;
use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    runtime::{watcher, WatchStreamExt},
};

use super::{MembershipFeed, SnapshotStream};

/// Endpoints of a kubernetes service, followed through its `Endpoints` object.
pub struct K8s {
    pub service: Service,
    client: kube::Client,
}

impl std::fmt::Debug for K8s {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("K8s").field("service", &self.service).finish_non_exhaustive()
    }
}

impl K8s {
    pub fn new(service: Service, client: kube::Client) -> Self {
        Self { service, client }
    }

    pub async fn with_default_client(service: Service) -> Result<Self, kube::Error> {
        Ok(Self {
            service,
            client: kube::Client::try_default().await?,
        })
    }

    /// Connect with the kubeconfig file at `path`, using its current context.
    pub async fn with_kubeconfig(service: Service, path: impl AsRef<Path>) -> BoxResult<Self> {
        let kubeconfig = Kubeconfig::read_from(path.as_ref())?;
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        tracing::debug!(path = %path.as_ref().display(), cluster = %config.cluster_url, "[AG.Feed] kubeconfig loaded");
        Ok(Self::new(service, kube::Client::try_from(config)?))
    }

    fn get_namespace_api(&self) -> kube::Api<Endpoints> {
        kube::Api::namespaced(self.client.clone(), &self.service.namespace)
    }
}

/// Every ready address paired with every port the selector matches.
pub fn endpoints_from_subsets(port: &PortSelector, endpoints: &Endpoints) -> Vec<Endpoint> {
    let mut collector = vec![];
    for subset in endpoints.subsets.iter().flatten() {
        let ports = subset.ports.as_deref().unwrap_or_default();
        for address in subset.addresses.iter().flatten() {
            for endpoint_port in ports {
                if !port.matches(endpoint_port.port, endpoint_port.name.as_deref()) {
                    continue;
                }
                let Ok(number) = u16::try_from(endpoint_port.port) else { continue };
                collector.push(Endpoint::from_host_port(&address.ip, number));
            }
        }
    }
    collector
}

impl MembershipFeed for K8s {
    const FEED_NAME: &'static str = "k8s";

    async fn subscribe(self) -> BoxResult<SnapshotStream> {
        let api = self.get_namespace_api();
        let config = watcher::Config::default().fields(&format!("metadata.name={}", self.service.name));
        let Service { name, port, .. } = self.service;
        tracing::info!(%name, %port, "[AG.Feed] watching kubernetes endpoints");
        let stream = watcher(api, config).default_backoff().map(move |event| match event {
            Ok(watcher::Event::Applied(endpoints)) => Ok(endpoints_from_subsets(&port, &endpoints)),
            Ok(watcher::Event::Deleted(_)) => {
                tracing::info!(%name, "[AG.Feed] endpoints object deleted");
                Ok(Vec::new())
            }
            Ok(watcher::Event::Restarted(listed)) => {
                let current = listed.iter().find(|endpoints| endpoints.metadata.name.as_deref() == Some(name.as_str()));
                Ok(current.map(|endpoints| endpoints_from_subsets(&port, endpoints)).unwrap_or_default())
            }
            Err(e) => Err(e.into()),
        });
        Ok(stream.boxed())
    }
}
