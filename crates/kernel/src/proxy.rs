use std::{convert::Infallible, sync::Arc, time::Duration};

use affinitygate_model::{AffinityConfig, Endpoint};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use hyper::{
    body::Body,
    header::{HeaderName, HeaderValue, HOST},
    http::uri::Scheme,
    Request, Response, StatusCode, Uri, Version,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::{
    body::{self, AgBody, LeasedBody},
    lease::EndpointLease,
    resolver::Resolver,
    stats::RequestStats,
    BoxError, BoxResult,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

/// Routes every request to the endpoint its sticky key resolves to.
///
/// Cheap to clone, clones share the resolver, the stats and the connection pool.
#[derive(Clone)]
pub struct AffinityDispatcher {
    resolver: Arc<dyn Resolver>,
    stats: Arc<RequestStats>,
    header: HeaderName,
    missing_key: Bytes,
    no_forward: bool,
    client: Client<HttpConnector, AgBody>,
}

impl std::fmt::Debug for AffinityDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffinityDispatcher")
            .field("resolver", &self.resolver)
            .field("header", &self.header)
            .field("no_forward", &self.no_forward)
            .finish_non_exhaustive()
    }
}

impl AffinityDispatcher {
    /// # Errors
    /// If the configured header is not a valid header name.
    pub fn new(config: &AffinityConfig, resolver: Arc<dyn Resolver>, stats: Arc<RequestStats>) -> BoxResult<Self> {
        let header = HeaderName::from_bytes(config.header.as_bytes()).map_err(|e| -> BoxError { format!("invalid affinity header {:?}: {e}", config.header).into() })?;
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(CONNECT_TIMEOUT));
        connector.set_keepalive(Some(TCP_KEEPALIVE));
        connector.set_nodelay(true);
        let mut builder = Client::builder(TokioExecutor::new());
        if !config.keep_alive {
            builder.pool_max_idle_per_host(0);
        }
        Ok(Self {
            resolver,
            stats,
            missing_key: Bytes::from(format!("unable to find {} header", config.header)),
            header,
            no_forward: config.no_forward,
            client: builder.build(connector),
        })
    }

    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }

    pub fn stats(&self) -> &Arc<RequestStats> {
        &self.stats
    }

    fn sticky_key<B>(&self, req: &Request<B>) -> Option<String> {
        let value = req.headers().get(&self.header)?.to_str().ok()?;
        (!value.is_empty()).then(|| value.to_string())
    }

    pub async fn dispatch(&self, req: Request<AgBody>) -> Response<AgBody> {
        let Some(key) = self.sticky_key(&req) else {
            tracing::debug!(header = %self.header, "[AG.Proxy] request without sticky key");
            return body::with_code_message(StatusCode::BAD_REQUEST, self.missing_key.clone());
        };
        let Some(lease) = EndpointLease::acquire(&self.resolver, &key) else {
            tracing::warn!(%key, "[AG.Proxy] no endpoint available");
            return body::with_code_message(StatusCode::SERVICE_UNAVAILABLE, "no endpoint available");
        };
        self.stats.record(&key, lease.endpoint());
        tracing::debug!("[AG.Proxy] {key} -> {}", lease.endpoint());
        if self.no_forward {
            return body::with_code_empty(StatusCode::OK);
        }
        match self.forward(req, lease.endpoint()).await {
            Ok(response) => response.map(|body| body::boxed(LeasedBody::new(body, lease))),
            Err(e) => {
                tracing::warn!(%key, endpoint = %lease.endpoint(), "[AG.Proxy] client error: {e}");
                body::with_code_message(StatusCode::BAD_GATEWAY, format!("[AG.Proxy] client error: {e}"))
            }
        }
    }

    async fn forward(&self, mut req: Request<AgBody>, endpoint: &Endpoint) -> BoxResult<Response<AgBody>> {
        let path_and_query = req.uri().path_and_query().map_or("/", |p| p.as_str());
        let uri = Uri::builder().scheme(Scheme::HTTP).authority(endpoint.address()).path_and_query(path_and_query).build()?;
        *req.uri_mut() = uri;
        // endpoints are spoken to in http/1.1 whatever the client used
        *req.version_mut() = Version::HTTP_11;
        req.headers_mut().insert(HOST, HeaderValue::from_str(endpoint.address())?);
        let response = self.client.request(req).await?;
        Ok(response.map(body::boxed))
    }
}

impl<B> hyper::service::Service<Request<B>> for AffinityDispatcher
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = Response<AgBody>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move { Ok(dispatcher.dispatch(req.map(body::boxed)).await) })
    }
}
