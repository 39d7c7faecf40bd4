use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{constants, BoxError};

/// Selects the backend port of a service, either by number or by port name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PortSelector {
    Number(u16),
    Named(String),
}

impl PortSelector {
    /// Whether an endpoint port (number and optional name) is the one this selector points at.
    pub fn matches(&self, port: i32, name: Option<&str>) -> bool {
        match self {
            PortSelector::Number(number) => i32::from(*number) == port,
            PortSelector::Named(selector) => name == Some(selector.as_str()),
        }
    }
}

impl FromStr for PortSelector {
    type Err = BoxError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty port selector".into());
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            match s.parse::<u16>() {
                Ok(0) | Err(_) => Err(format!("invalid port number: {s}").into()),
                Ok(number) => Ok(PortSelector::Number(number)),
            }
        } else {
            Ok(PortSelector::Named(s.to_string()))
        }
    }
}

impl fmt::Display for PortSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSelector::Number(number) => write!(f, "{number}"),
            PortSelector::Named(name) => f.write_str(name),
        }
    }
}

/// A logical backend group: the endpoints of one kubernetes service, on one port.
///
/// # Format
/// `[namespace/]name[:port]`, namespace defaults to `default` and port to `8080`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Service {
    pub namespace: String,
    pub name: String,
    pub port: PortSelector,
}

impl Service {
    /// # Errors
    /// If the name is empty or the port selector is invalid.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, port: &str) -> Result<Self, BoxError> {
        let namespace = namespace.into();
        let name = name.into();
        if name.is_empty() {
            return Err("empty service name".into());
        }
        if namespace.is_empty() {
            return Err(format!("empty namespace for service {name}").into());
        }
        Ok(Self {
            namespace,
            name,
            port: port.parse()?,
        })
    }
}

impl FromStr for Service {
    type Err = BoxError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, rest) = s.split_once('/').unwrap_or((constants::DEFAULT_NAMESPACE, s));
        let (name, port) = rest.split_once(':').unwrap_or((rest, constants::DEFAULT_SERVICE_PORT));
        Service::new(namespace, name, port)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.name, self.port)
    }
}

impl Serialize for Service {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Service {
    fn deserialize<D>(deserializer: D) -> Result<Service, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Service::from_str(&s).map_err(serde::de::Error::custom)
    }
}
