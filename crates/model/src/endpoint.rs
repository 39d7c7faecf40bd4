use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// One concrete backend instance, identified by its network address.
///
/// Endpoints compare, hash and order by address only. Cloning is cheap, the address is shared.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    address: Arc<str>,
}

impl Endpoint {
    pub fn new(address: impl Into<Arc<str>>) -> Self {
        Self { address: address.into() }
    }

    /// Build an endpoint from a host and a port, bracketing IPv6 hosts.
    pub fn from_host_port(host: &str, port: u16) -> Self {
        Self::new(join_host_port(host, port))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The shared address, used as key by the ring and the load table.
    pub fn shared_address(&self) -> &Arc<str> {
        &self.address
    }
}

/// `host:port`, or `[host]:port` when the host is an IPv6 literal.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Endpoint").field(&self.address).finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

impl From<&str> for Endpoint {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Endpoint {
    fn from(address: String) -> Self {
        Self::new(address)
    }
}

impl Serialize for Endpoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        self.address().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D>(deserializer: D) -> Result<Endpoint, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let address = String::deserialize(deserializer)?;
        if address.is_empty() {
            return Err(serde::de::Error::custom("empty endpoint address"));
        }
        Ok(Endpoint::from(address))
    }
}
