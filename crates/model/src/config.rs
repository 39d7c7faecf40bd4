use std::{
    fmt,
    net::{IpAddr, Ipv6Addr, SocketAddr},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{constants, BoxError};

/// Which resolver answers the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverKind {
    /// Consistent hashing with a bound on in-flight requests per endpoint.
    #[default]
    BoundedLoad,
    /// Plain consistent hashing, no load accounting.
    HashRing,
}

impl FromStr for ResolverKind {
    type Err = BoxError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bounded-load" => Ok(Self::BoundedLoad),
            "hash-ring" => Ok(Self::HashRing),
            _ => Err(format!("unknown resolver kind: {s}").into()),
        }
    }
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BoundedLoad => write!(f, "bounded-load"),
            Self::HashRing => write!(f, "hash-ring"),
        }
    }
}

/// What the bounded-load resolver does when every endpoint is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverloadPolicy {
    /// Use the endpoint plain hashing points at, exceeding the bound.
    #[default]
    Fallback,
    /// Resolve nothing, the request is answered as unavailable.
    Reject,
}

impl FromStr for OverloadPolicy {
    type Err = BoxError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fallback" => Ok(Self::Fallback),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("unknown overload policy: {s}").into()),
        }
    }
}

impl fmt::Display for OverloadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fallback => write!(f, "fallback"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Knobs of the placement ring and of the bounded-load rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub kind: ResolverKind,
    /// Virtual positions per endpoint.
    pub replicas: u16,
    /// Number of partitions keys are folded into before placement, `0` hashes keys directly.
    pub partitions: u32,
    /// ε in `ceil(average_load * (1 + ε))`.
    pub load_slack: f64,
    pub overload: OverloadPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            kind: ResolverKind::default(),
            replicas: constants::DEFAULT_REPLICAS,
            partitions: constants::DEFAULT_PARTITIONS,
            load_slack: constants::DEFAULT_LOAD_SLACK,
            overload: OverloadPolicy::default(),
        }
    }
}

impl ResolverConfig {
    /// # Errors
    /// If there are no replicas or the load slack is negative or not finite.
    pub fn validate(&self) -> Result<(), BoxError> {
        if self.replicas == 0 {
            return Err("replicas must be at least 1".into());
        }
        if !self.load_slack.is_finite() || self.load_slack < 0.0 {
            return Err(format!("invalid load slack: {}", self.load_slack).into());
        }
        Ok(())
    }
}

/// Proxy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffinityConfig {
    pub listen: SocketAddr,
    /// Name of the request header carrying the sticky key.
    pub header: String,
    /// Keep connections to endpoints alive between requests.
    pub keep_alive: bool,
    /// Resolve and release without forwarding, for debugging affinity.
    pub no_forward: bool,
    pub resolver: ResolverConfig,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), constants::DEFAULT_LISTEN_PORT),
            header: constants::DEFAULT_AFFINITY_HEADER.to_string(),
            keep_alive: true,
            no_forward: false,
            resolver: ResolverConfig::default(),
        }
    }
}

impl AffinityConfig {
    /// # Errors
    /// If the header name is empty or the resolver config is invalid.
    pub fn validate(&self) -> Result<(), BoxError> {
        if self.header.is_empty() {
            return Err("empty affinity header name".into());
        }
        self.resolver.validate()
    }
}
