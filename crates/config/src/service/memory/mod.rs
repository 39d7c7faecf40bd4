use std::str::FromStr;

use affinitygate_model::{BoxError, BoxResult, Endpoint};
use futures_util::{stream, StreamExt};

use super::{MembershipFeed, SnapshotStream};

/// In-memory static membership
///
/// # Format
/// Comma separated addresses: `10.0.0.1:8080,10.0.0.2:8080`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memory {
    pub endpoints: Vec<Endpoint>,
}

impl Memory {
    pub fn new(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        Self {
            endpoints: endpoints.into_iter().collect(),
        }
    }
}

impl FromStr for Memory {
    type Err = BoxError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let endpoints = s.split(',').map(str::trim).filter(|address| !address.is_empty()).map(Endpoint::from).collect::<Vec<_>>();
        if endpoints.is_empty() {
            return Err("static membership without any endpoint".into());
        }
        Ok(Self { endpoints })
    }
}

impl std::fmt::Display for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{endpoint}")?;
        }
        Ok(())
    }
}

impl MembershipFeed for Memory {
    const FEED_NAME: &'static str = "static";

    async fn subscribe(self) -> BoxResult<SnapshotStream> {
        Ok(stream::iter([Ok(self.endpoints)]).boxed())
    }
}
