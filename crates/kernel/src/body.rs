use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, Full};
use hyper::{
    body::{Body, Frame, SizeHint},
    Response, StatusCode,
};

use crate::{lease::EndpointLease, BoxError};

/// Body type of every response the proxy produces.
pub type AgBody = UnsyncBoxBody<Bytes, BoxError>;

pub fn full(data: impl Into<Bytes>) -> AgBody {
    Full::new(data.into()).map_err(|never: Infallible| match never {}).boxed_unsync()
}

pub fn empty() -> AgBody {
    Empty::<Bytes>::new().map_err(|never: Infallible| match never {}).boxed_unsync()
}

/// Box any body whose errors convert into [`BoxError`].
pub fn boxed<B>(body: B) -> AgBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(|e| -> BoxError { e.into() }).boxed_unsync()
}

pub fn with_code_message(code: StatusCode, message: impl Into<Bytes>) -> Response<AgBody> {
    let mut response = Response::new(full(message));
    *response.status_mut() = code;
    response
}

pub fn with_code_empty(code: StatusCode) -> Response<AgBody> {
    let mut response = Response::new(empty());
    *response.status_mut() = code;
    response
}

/// A response body holding the lease of the endpoint that produced it.
///
/// The endpoint stays counted as loaded until the body is fully sent or dropped.
#[derive(Debug)]
pub struct LeasedBody {
    inner: AgBody,
    _lease: EndpointLease,
}

impl LeasedBody {
    pub fn new(inner: AgBody, lease: EndpointLease) -> Self {
        Self { inner, _lease: lease }
    }
}

impl Body for LeasedBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.get_mut().inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
