use futures_util::future::BoxFuture;
use hyper::{body::Incoming, Request, Response};
use hyper_util::rt::{self, TokioIo};

use std::{convert::Infallible, net::SocketAddr, time::Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{body::AgBody, BoxError};

/// Accepts connections on the proxy's listen address and serves each one with the proxy service.
#[derive(Clone)]
pub struct AffinityListen<S> {
    conn_builder: hyper_util::server::conn::auto::Builder<rt::TokioExecutor>,
    pub socket_addr: SocketAddr,
    pub service: S,
    pub cancel_token: CancellationToken,
}

impl<S> std::fmt::Debug for AffinityListen<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffinityListen").field("socket_addr", &self.socket_addr).finish_non_exhaustive()
    }
}

impl<S> AffinityListen<S> {
    pub fn new(socket_addr: SocketAddr, service: S, cancel_token: CancellationToken) -> Self {
        Self {
            conn_builder: hyper_util::server::conn::auto::Builder::new(rt::TokioExecutor::new()),
            socket_addr,
            service,
            cancel_token,
        }
    }
}

#[derive(Clone)]
struct HyperServiceAdapter<S> {
    service: S,
    peer: SocketAddr,
}

impl<S> hyper::service::Service<Request<Incoming>> for HyperServiceAdapter<S>
where
    S: hyper::service::Service<Request<Incoming>, Error = Infallible, Response = Response<AgBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<AgBody>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    #[inline]
    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let enter_time = Instant::now();
        let peer = self.peer;
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let fut = self.service.call(req);
        Box::pin(async move {
            let resp = fut.await?;
            let status = resp.status();
            if status.is_server_error() {
                tracing::warn!(%peer, %method, %path, status = ?status, "[AG.Listen] server error response");
            } else if status.is_client_error() {
                tracing::debug!(%peer, %method, %path, status = ?status, "[AG.Listen] client error response");
            } else {
                tracing::trace!(%peer, %method, %path, status = ?status, "[AG.Listen] response");
            }
            tracing::trace!(latency = ?enter_time.elapsed(), "[AG.Listen] request finished");
            Ok(resp)
        })
    }
}

impl<S> AffinityListen<S>
where
    S: hyper::service::Service<Request<Incoming>, Error = Infallible, Response = Response<AgBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    #[instrument(skip(stream, service, conn_builder))]
    async fn accept(conn_builder: hyper_util::server::conn::auto::Builder<rt::TokioExecutor>, stream: TcpStream, peer_addr: SocketAddr, service: S) {
        tracing::debug!("[AG.Listen] Accepted connection");
        let service = HyperServiceAdapter { service, peer: peer_addr };
        let io = TokioIo::new(stream);
        let conn_result = conn_builder.serve_connection(io, service).await;
        if let Err(e) = conn_result {
            tracing::warn!("[AG.Listen] Connection closed with error {e}")
        } else {
            tracing::debug!("[AG.Listen] Connection closed");
        }
    }

    /// Bind the listen address and serve until cancelled.
    ///
    /// # Errors
    /// If the address cannot be bound.
    #[instrument()]
    pub async fn listen(self) -> Result<(), BoxError> {
        tracing::debug!("[AG.Listen] start binding...");
        let listener = TcpListener::bind(self.socket_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections accepted by an already bound listener until cancelled.
    ///
    /// # Errors
    /// Never for now, accept errors are logged and the loop goes on.
    #[instrument(skip(listener))]
    pub async fn serve(self, listener: TcpListener) -> Result<(), BoxError> {
        tracing::info!(local_addr = ?listener.local_addr().ok(), "[AG.Listen] start listening...");
        let cancel_token = self.cancel_token;
        loop {
            let accepted = tokio::select! {
                () = cancel_token.cancelled() => {
                    tracing::info!("[AG.Listen] cancelled");
                    return Ok(());
                },
                accepted = listener.accept() => accepted
            };
            match accepted {
                Ok((stream, peer_addr)) => {
                    let service = self.service.clone();
                    let builder = self.conn_builder.clone();
                    tokio::spawn(Self::accept(builder, stream, peer_addr, service));
                }
                Err(e) => {
                    tracing::warn!("[AG.Listen] Accept tcp connection error: {:?}", e);
                }
            }
        }
    }
}
