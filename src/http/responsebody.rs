//! Response body streaming.

use crate::base::neterror::NetError;
use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Response body wrapper for streaming.
///
/// Transports hand responses back as `http::Response<ResponseBody>` whatever
/// their wire body type is.
pub struct ResponseBody {
    inner: UnsyncBoxBody<Bytes, NetError>,
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("size_hint", &self.inner.size_hint())
            .finish()
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::new(Full::new(bytes).map_err(|never| match never {}))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(s: &'static str) -> Self {
        Self::from(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for ResponseBody {
    fn from(s: String) -> Self {
        Self::from(Bytes::from(s))
    }
}

impl ResponseBody {
    /// Wrap any body producing `Bytes`.
    pub fn new<B>(body: B) -> Self
    where
        B: Body<Data = Bytes, Error = NetError> + Send + 'static,
    {
        Self {
            inner: UnsyncBoxBody::new(body),
        }
    }

    /// A body with no content.
    pub fn empty() -> Self {
        Self::new(Empty::<Bytes>::new().map_err(|never| match never {}))
    }

    /// Wrap a hyper body read from the network.
    pub fn from_incoming(body: Incoming) -> Self {
        Self::new(body.map_err(|_| NetError::HttpBodyError))
    }

    /// Read entire body as bytes.
    pub async fn bytes(self) -> Result<Bytes, NetError> {
        let collected = self.inner.collect().await?;
        Ok(collected.to_bytes())
    }

    /// Read body as UTF-8 string.
    pub async fn text(self) -> Result<String, NetError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| NetError::InvalidUtf8)
    }

    /// Read and discard the remaining body.
    pub async fn drain(mut self) -> Result<(), NetError> {
        while let Some(frame) = self.inner.frame().await {
            frame?;
        }
        Ok(())
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = NetError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
