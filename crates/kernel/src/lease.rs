use std::sync::Arc;

use affinitygate_model::Endpoint;

use crate::resolver::Resolver;

/// An endpoint handed out by a resolver, released back to it when dropped.
///
/// Dropping covers every way a request can end, including its future being cancelled.
#[derive(Debug)]
pub struct EndpointLease {
    resolver: Arc<dyn Resolver>,
    endpoint: Endpoint,
}

impl EndpointLease {
    /// Resolve `key`, `None` when the resolver has nothing to offer.
    pub fn acquire(resolver: &Arc<dyn Resolver>, key: &str) -> Option<Self> {
        let endpoint = resolver.resolve(key)?;
        Some(Self {
            resolver: resolver.clone(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Drop for EndpointLease {
    fn drop(&mut self) {
        self.resolver.release(&self.endpoint);
    }
}
