#[cfg(feature = "fs")]
use std::path::PathBuf;
use std::{net::SocketAddr, str::FromStr};

use affinitygate_shell::config::{constants, service::memory::Memory, AffinityConfig, OverloadPolicy, ResolverConfig, ResolverKind};
use clap::{ArgAction, Parser};
use serde::{Deserialize, Serialize};

/// Where the endpoints of the pool come from.
#[derive(Debug, Clone)]
pub enum Feed {
    Static(Memory),
    #[cfg(feature = "fs")]
    File(PathBuf),
    #[cfg(feature = "k8s")]
    K8s(affinitygate_shell::config::Service),
}

impl FromStr for Feed {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((kind, resource)) = s.split_once(':') {
            match kind {
                "static" => resource.parse().map(Feed::Static).map_err(|e| format!("invalid static endpoints: {e}")),
                "file" => {
                    #[cfg(feature = "fs")]
                    {
                        Ok(Feed::File(PathBuf::from(resource)))
                    }
                    #[cfg(not(feature = "fs"))]
                    {
                        Err(format!("feed kind {} not enabled, please select a correct build", kind))
                    }
                }
                "k8s" => {
                    #[cfg(feature = "k8s")]
                    {
                        resource.parse().map(Feed::K8s).map_err(|e| format!("invalid service {resource}: {e}"))
                    }
                    #[cfg(not(feature = "k8s"))]
                    {
                        Err(format!("feed kind {} not enabled, please select a correct build", kind))
                    }
                }
                _ => Err(format!("unknown feed kind: {}", kind)),
            }
        } else {
            Err("missing feed kind".to_string())
        }
    }
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feed::Static(memory) => write!(f, "static:{}", memory),
            #[cfg(feature = "fs")]
            Feed::File(path) => write!(f, "file:{}", path.display()),
            #[cfg(feature = "k8s")]
            Feed::K8s(service) => write!(f, "k8s:{}", service),
        }
    }
}

impl Serialize for Feed {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Feed {
    fn deserialize<D>(deserializer: D) -> Result<Feed, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Feed::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Affinitygate start up arguments
#[derive(Debug, Serialize, Deserialize, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Where the endpoints come from
    ///
    /// # Example
    /// ## Static
    /// `-f static:10.0.0.1:8080,10.0.0.2:8080`
    /// ## File
    /// `-f file:/path/to/members.toml`
    /// ## K8s
    /// `-f k8s:namespace/service:port`
    #[arg(short, long, env)]
    pub feed: Feed,
    /// Kubeconfig file for the k8s feed, the environment's kube config when absent
    #[cfg(feature = "k8s")]
    #[arg(long, env)]
    pub kubeconfig: Option<std::path::PathBuf>,
    /// The address to listen on
    #[arg(short, long, env, default_value = "[::]:8081")]
    pub listen: SocketAddr,
    /// The request header carrying the sticky key
    #[arg(long, env, default_value = constants::DEFAULT_AFFINITY_HEADER)]
    pub header: String,
    /// Keep connections to endpoints alive between requests
    #[arg(long, env, default_value_t = true, action = ArgAction::Set)]
    pub keep_alive: bool,
    /// Resolve and release without forwarding, answering 200
    #[arg(long, env)]
    pub no_forward: bool,
    /// `bounded-load` or `hash-ring`
    #[arg(long, env, default_value_t = ResolverKind::default())]
    pub resolver: ResolverKind,
    /// Virtual positions per endpoint on the ring
    #[arg(long, env, default_value_t = constants::DEFAULT_REPLICAS)]
    pub replicas: u16,
    /// Partitions keys are folded into before placement, 0 to hash keys directly
    #[arg(long, env, default_value_t = constants::DEFAULT_PARTITIONS)]
    pub partitions: u32,
    /// How far above the average load an endpoint may go
    #[arg(long, env, default_value_t = constants::DEFAULT_LOAD_SLACK)]
    pub load_slack: f64,
    /// `fallback` or `reject`, when every endpoint is at capacity
    #[arg(long, env, default_value_t = OverloadPolicy::default())]
    pub overload: OverloadPolicy,
}

impl Args {
    pub fn to_config(&self) -> AffinityConfig {
        AffinityConfig {
            listen: self.listen,
            header: self.header.clone(),
            keep_alive: self.keep_alive,
            no_forward: self.no_forward,
            resolver: ResolverConfig {
                kind: self.resolver,
                replicas: self.replicas,
                partitions: self.partitions,
                load_slack: self.load_slack,
                overload: self.overload,
            },
        }
    }
}
