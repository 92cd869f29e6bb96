//! Probing digest transport.
//!
//! Every request is sent twice: once without credentials to obtain the
//! server's challenge, then again with an `Authorization` header computed
//! from it.

use crate::base::neterror::NetError;
use crate::http::digestauth::{Challenge, DigestInput};
use crate::http::requestbody::{drain_body, RequestBody};
use crate::http::responsebody::ResponseBody;
use crate::http::transport::{request_uri, HttpTransport, RoundTrip, RoundTripping};
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use std::fmt;
use std::sync::Arc;
use zeroize::{Zeroize, Zeroizing};

/// Produces the client nonce for each authorized request.
///
/// Returning an empty string lets the digest engine generate a random one.
pub type CnonceGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Result of the unauthenticated probe.
pub(crate) enum ProbeOutcome {
    /// The server did not ask for credentials; this is the final response.
    Passthrough(Response<ResponseBody>),
    /// 401 received. Holds the response headers, body already drained.
    Challenged(HeaderMap),
}

/// Transport that authenticates every request with HTTP Digest.
///
/// Wraps any [`RoundTrip`] implementation and implements it itself.
///
/// # Example
/// ```rust,ignore
/// use digestnet::http::{DigestTransport, RequestBody, RoundTrip};
///
/// let transport = DigestTransport::new("john", "hello");
/// let req = http::Request::get("http://127.0.0.1:18081/json_rpc")
///     .body(RequestBody::empty())?;
/// let resp = transport.round_trip(req).await?;
/// ```
#[derive(Clone)]
pub struct DigestTransport {
    username: String,
    password: Zeroizing<String>,
    transport: Arc<dyn RoundTrip>,
    cnonce_gen: Option<CnonceGenerator>,
}

impl fmt::Debug for DigestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestTransport")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("cnonce_gen", &self.cnonce_gen.is_some())
            .finish()
    }
}

fn default_transport() -> Arc<dyn RoundTrip> {
    Arc::new(HttpTransport::default())
}

fn default_cnonce_generator() -> CnonceGenerator {
    Arc::new(String::new)
}

impl DigestTransport {
    /// Create a transport over the bundled plain HTTP/1.1 transport.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
            transport: default_transport(),
            cnonce_gen: Some(default_cnonce_generator()),
        }
    }

    /// Use `transport` for the underlying requests.
    pub fn with_transport(mut self, transport: Arc<dyn RoundTrip>) -> Self {
        self.transport = transport;
        self
    }

    /// Replace the underlying transport. `None` restores the default.
    pub fn set_transport(&mut self, transport: Option<Arc<dyn RoundTrip>>) {
        self.transport = transport.unwrap_or_else(default_transport);
    }

    /// Use `cnonce_gen` for the client nonce.
    pub fn with_cnonce_generator(mut self, cnonce_gen: CnonceGenerator) -> Self {
        self.cnonce_gen = Some(cnonce_gen);
        self
    }

    /// Replace the cnonce generator.
    ///
    /// With `None`, requests fail with [`NetError::TransportUnavailable`].
    pub fn set_cnonce_generator(&mut self, cnonce_gen: Option<CnonceGenerator>) {
        self.cnonce_gen = cnonce_gen;
    }

    /// Switch the credentials used for later requests.
    pub fn set_credentials(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.username = username.into();
        self.password = Zeroizing::new(password.into());
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    pub(crate) fn transport(&self) -> &Arc<dyn RoundTrip> {
        &self.transport
    }

    /// Checked before any network activity.
    pub(crate) fn preconditions(&self) -> Result<&CnonceGenerator, NetError> {
        self.cnonce_gen.as_ref().ok_or(NetError::TransportUnavailable)
    }

    /// Set the `Authorization` header answering `challenge` on `req`.
    pub(crate) fn authorize(
        &self,
        req: &mut Request<RequestBody>,
        challenge: &Challenge,
        cnonce_gen: &CnonceGenerator,
    ) -> Result<(), NetError> {
        let mut input = DigestInput {
            username: self.username.clone(),
            password: self.password.to_string(),
            digest_uri: request_uri(req.uri()).to_string(),
            method: req.method().as_str().to_string(),
            cnonce: cnonce_gen(),
            nonce_count: 1,
        };
        let credentials = challenge.digest(&input);
        input.password.zeroize();

        let value = HeaderValue::from_str(&credentials?)
            .map_err(|_| NetError::InvalidAuthCredentials)?;
        req.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Send `req` on the underlying transport.
    pub(crate) async fn send(
        &self,
        req: Request<RequestBody>,
    ) -> Result<Response<ResponseBody>, NetError> {
        tracing::trace!(method = %req.method(), uri = %req.uri(), headers = ?req.headers(), "digest request");
        let resp = self.transport.round_trip(req).await?;
        tracing::trace!(status = %resp.status(), headers = ?resp.headers(), "digest response");
        Ok(resp)
    }

    async fn execute(&self, mut req: Request<RequestBody>) -> Result<Response<ResponseBody>, NetError> {
        let cnonce_gen = self.preconditions()?;

        let probe_req = clone_request(&mut req).await?;
        let headers = match probe(self.transport.as_ref(), probe_req).await? {
            ProbeOutcome::Passthrough(resp) => return Ok(resp),
            ProbeOutcome::Challenged(headers) => headers,
        };

        let challenge = challenge_from(&headers)?;
        tracing::debug!(
            realm = %challenge.realm,
            algorithm = %challenge.algorithm,
            "answering digest challenge"
        );

        self.authorize(&mut req, &challenge, cnonce_gen)?;
        self.send(req).await
    }
}

impl RoundTrip for DigestTransport {
    fn round_trip(&self, req: Request<RequestBody>) -> RoundTripping {
        let this = self.clone();
        Box::pin(async move { this.execute(req).await })
    }
}

/// Copy method, URI, version and headers of `req` into a new request.
///
/// The copy gets a fresh body. One-shot bodies are buffered and `req` keeps
/// its own buffered copy.
pub(crate) async fn clone_request(
    req: &mut Request<RequestBody>,
) -> Result<Request<RequestBody>, NetError> {
    let body = match req.body().try_clone_fresh() {
        Some(fresh) => fresh?,
        None => {
            let (copy, keep) = drain_body(std::mem::take(req.body_mut())).await?;
            *req.body_mut() = keep;
            copy
        }
    };

    let mut clone = Request::new(body);
    *clone.method_mut() = req.method().clone();
    *clone.uri_mut() = req.uri().clone();
    *clone.version_mut() = req.version();
    *clone.headers_mut() = req.headers().clone();
    Ok(clone)
}

/// Send the unauthenticated probe.
pub(crate) async fn probe(
    transport: &dyn RoundTrip,
    req: Request<RequestBody>,
) -> Result<ProbeOutcome, NetError> {
    let resp = transport.round_trip(req).await?;
    if resp.status() != StatusCode::UNAUTHORIZED {
        tracing::debug!(status = %resp.status(), "probe not challenged, returning response");
        return Ok(ProbeOutcome::Passthrough(resp));
    }

    let (parts, body) = resp.into_parts();
    if let Err(e) = body.drain().await {
        tracing::debug!(error = %e, "failed to drain probe body");
    }
    Ok(ProbeOutcome::Challenged(parts.headers))
}

/// Parse the first digest challenge in `headers`.
pub(crate) fn challenge_from(headers: &HeaderMap) -> Result<Challenge, NetError> {
    let mut values = headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok());

    let header = values
        .find(|value| value.trim_start().starts_with("Digest "))
        .ok_or(NetError::MalformedChallenge)?;
    Challenge::parse(header)
}
