//! Request body for POST/PUT operations.
//!
//! A digest exchange may send the same request up to three times (probe,
//! authorized request, stale-cache retry), so bodies know whether they can be
//! produced again.

use crate::base::neterror::NetError;
use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Factory producing a fresh copy of a request body.
pub type GetBody = Arc<dyn Fn() -> Result<RequestBody, NetError> + Send + Sync>;

enum Kind {
    Empty,
    Bytes(Bytes),
    Streaming(BoxBody<Bytes, NetError>),
}

/// Request body for HTTP methods that send data.
///
/// `Empty` and in-memory bodies can always be replayed. Streaming bodies can
/// be replayed only when a [`GetBody`] factory is attached; otherwise they are
/// buffered once by [`drain_body`].
pub struct RequestBody {
    kind: Kind,
    get_body: Option<GetBody>,
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            Kind::Empty => "Empty",
            Kind::Bytes(_) => "Bytes",
            Kind::Streaming(_) => "Streaming",
        };
        f.debug_struct("RequestBody")
            .field("kind", &kind)
            .field("len", &self.len())
            .field("replayable", &self.is_replayable())
            .finish()
    }
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::from(Bytes::from(s))
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        RequestBody::from(Bytes::from(v))
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        RequestBody::from(Bytes::from(s.to_owned()))
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        Self {
            kind: Kind::Bytes(b),
            get_body: None,
        }
    }
}

impl RequestBody {
    /// No body (GET, HEAD, DELETE).
    pub fn empty() -> Self {
        Self {
            kind: Kind::Empty,
            get_body: None,
        }
    }

    /// One-shot streaming body.
    pub fn stream<B>(body: B) -> Self
    where
        B: Body<Data = Bytes, Error = NetError> + Send + Sync + 'static,
    {
        Self {
            kind: Kind::Streaming(BoxBody::new(body)),
            get_body: None,
        }
    }

    /// Attach a factory that can produce the body again.
    pub fn with_get_body<F>(mut self, get_body: F) -> Self
    where
        F: Fn() -> Result<RequestBody, NetError> + Send + Sync + 'static,
    {
        self.get_body = Some(Arc::new(get_body));
        self
    }

    /// Check if the body is empty.
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            Kind::Empty => true,
            Kind::Bytes(b) => b.is_empty(),
            Kind::Streaming(body) => body.is_end_stream(),
        }
    }

    /// Get the length of the body in bytes, if known.
    pub fn len(&self) -> Option<u64> {
        match &self.kind {
            Kind::Empty => Some(0),
            Kind::Bytes(b) => Some(b.len() as u64),
            Kind::Streaming(body) => body.size_hint().exact(),
        }
    }

    /// Whether a fresh copy can be produced without buffering.
    pub fn is_replayable(&self) -> bool {
        !matches!(self.kind, Kind::Streaming(_)) || self.get_body.is_some()
    }

    /// Produce a fresh copy of this body.
    ///
    /// Returns `None` for a streaming body without a [`GetBody`] factory.
    pub fn try_clone_fresh(&self) -> Option<Result<RequestBody, NetError>> {
        let fresh = match (&self.kind, &self.get_body) {
            (Kind::Empty, _) => Ok(Self::empty()),
            (Kind::Bytes(b), _) => Ok(Self::from(b.clone())),
            (Kind::Streaming(_), Some(get_body)) => get_body(),
            (Kind::Streaming(_), None) => return None,
        };

        Some(fresh.map(|mut body| {
            if body.get_body.is_none() {
                body.get_body = self.get_body.clone();
            }
            body
        }))
    }

    /// Read the whole body into memory.
    pub async fn collect_bytes(self) -> Result<Bytes, NetError> {
        match self.kind {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Bytes(b) => Ok(b),
            Kind::Streaming(body) => Ok(body.collect().await?.to_bytes()),
        }
    }
}

/// Buffer `body` once and return two independent copies of it.
///
/// An empty body stays empty on both sides without reading anything.
pub async fn drain_body(body: RequestBody) -> Result<(RequestBody, RequestBody), NetError> {
    if matches!(body.kind, Kind::Empty) {
        return Ok((RequestBody::empty(), RequestBody::empty()));
    }

    let bytes = body.collect_bytes().await?;
    Ok((RequestBody::from(bytes.clone()), RequestBody::from(bytes)))
}

impl Body for RequestBody {
    type Data = Bytes;
    type Error = NetError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match &mut this.kind {
            Kind::Empty => Poll::Ready(None),
            Kind::Bytes(bytes) => {
                let data = std::mem::take(bytes);
                this.kind = Kind::Empty;
                if data.is_empty() {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Ok(Frame::data(data))))
                }
            }
            Kind::Streaming(body) => Pin::new(body).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Empty => true,
            Kind::Bytes(b) => b.is_empty(),
            Kind::Streaming(body) => body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Empty => SizeHint::with_exact(0),
            Kind::Bytes(b) => SizeHint::with_exact(b.len() as u64),
            Kind::Streaming(body) => body.size_hint(),
        }
    }
}
