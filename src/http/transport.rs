//! The "send one request, receive one response" capability.
//!
//! [`RoundTrip`] is the seam every transport in this crate plugs into: the
//! digest transports decorate any implementation of it and implement it
//! themselves, so they stack transparently.

use crate::base::neterror::NetError;
use crate::http::requestbody::RequestBody;
use crate::http::responsebody::ResponseBody;
use crate::socket::connectjob::ConnectJob;
use http::header::HOST;
use http::uri::PathAndQuery;
use http::{HeaderValue, Request, Response, Uri};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Alias for the `Future` type returned by a transport.
pub type RoundTripping =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, NetError>> + Send>>;

/// Trait for executing a single HTTP request.
///
/// Implementations must be thread-safe; one instance is shared by every
/// concurrent caller.
///
/// # Design Notes
///
/// - Uses `&self` so concurrent requests need no mutable access.
/// - Returns boxed futures for trait object compatibility.
/// - No retries or timeouts are implied; those belong to the implementation.
pub trait RoundTrip: Send + Sync {
    /// Send `req` and resolve to the response or a transport error.
    fn round_trip(&self, req: Request<RequestBody>) -> RoundTripping;
}

/// Blanket implementation for Arc-wrapped transports.
impl<T: RoundTrip + ?Sized> RoundTrip for Arc<T> {
    fn round_trip(&self, req: Request<RequestBody>) -> RoundTripping {
        (**self).round_trip(req)
    }
}

/// Plain HTTP/1.1 transport over tokio TCP.
///
/// Opens one connection per request. Only `http://` URIs are accepted; TLS
/// and pooling are left to caller-provided transports.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    connect_timeout: Option<Duration>,
}

impl HttpTransport {
    /// Create a transport with no connect timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound DNS resolution plus TCP connect.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    async fn send(
        connect_timeout: Option<Duration>,
        req: Request<RequestBody>,
    ) -> Result<Response<ResponseBody>, NetError> {
        let (mut parts, body) = req.into_parts();

        match parts.uri.scheme_str() {
            Some("http") => {}
            Some(_) => return Err(NetError::DisallowedUrlScheme),
            None => return Err(NetError::InvalidUrl),
        }
        let authority = parts.uri.authority().cloned().ok_or(NetError::InvalidUrl)?;
        let host = authority.host();
        let port = authority.port_u16().unwrap_or(80);

        if !parts.headers.contains_key(HOST) {
            let value =
                HeaderValue::from_str(authority.as_str()).map_err(|_| NetError::InvalidUrl)?;
            parts.headers.insert(HOST, value);
        }

        // Origin-form request target.
        let path = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        parts.uri = Uri::builder()
            .path_and_query(path)
            .build()
            .map_err(|_| NetError::InvalidUrl)?;

        let socket = ConnectJob::connect(host, port, connect_timeout).await?;
        let io = TokioIo::new(socket);

        let (mut sender, conn) = http1::handshake(io).await.map_err(|e| {
            tracing::debug!(error = %e, "http1 handshake failed");
            NetError::ConnectionFailed
        })?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "connection driver failed");
            }
        });

        let response = sender
            .send_request(Request::from_parts(parts, body))
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "request failed");
                if e.is_incomplete_message() {
                    NetError::EmptyResponse
                } else {
                    NetError::ConnectionClosed
                }
            })?;

        Ok(response.map(ResponseBody::from_incoming))
    }
}

impl RoundTrip for HttpTransport {
    fn round_trip(&self, req: Request<RequestBody>) -> RoundTripping {
        let connect_timeout = self.connect_timeout;
        Box::pin(Self::send(connect_timeout, req))
    }
}

/// The request-URI for `uri`: path plus query, `/` when empty.
pub fn request_uri(uri: &Uri) -> &str {
    match uri.path_and_query().map(|pq| pq.as_str()) {
        Some(pq) if !pq.is_empty() => pq,
        _ => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_request_uri() {
        let uri: Uri = "http://example.com/json_rpc?x=1".parse().unwrap();
        assert_eq!(request_uri(&uri), "/json_rpc?x=1");

        let uri: Uri = "http://example.com".parse().unwrap();
        assert_eq!(request_uri(&uri), "/");
    }

    #[tokio::test]
    async fn test_rejects_https() {
        let req = Request::get("https://example.com/")
            .body(RequestBody::empty())
            .unwrap();
        let err = HttpTransport::new().round_trip(req).await.unwrap_err();
        assert_eq!(err, NetError::DisallowedUrlScheme);
    }

    #[tokio::test]
    async fn test_rejects_relative_uri() {
        let req = Request::get("/relative").body(RequestBody::empty()).unwrap();
        let err = HttpTransport::new().round_trip(req).await.unwrap_err();
        assert_eq!(err, NetError::InvalidUrl);
    }

    #[tokio::test]
    async fn test_round_trip_sends_origin_form_and_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";
            socket.write_all(response.as_bytes()).await.unwrap();
            request
        });

        let req = Request::get(format!("http://{}/path?q=1", addr))
            .body(RequestBody::empty())
            .unwrap();
        let resp = HttpTransport::new()
            .with_connect_timeout(Duration::from_secs(5))
            .round_trip(req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.into_body().text().await.unwrap(), "ok");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /path?q=1 HTTP/1.1\r\n"));
        assert!(request.to_lowercase().contains(&format!("host: {}", addr)));
    }
}
