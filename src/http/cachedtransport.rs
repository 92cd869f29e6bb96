//! Digest transport with a challenge cache.
//!
//! After the first exchange with a host, later requests reuse the stored
//! challenge and authenticate in a single round trip. When the server
//! rejects a cached challenge (typically an expired nonce), the entry is
//! dropped and the request is retried once through the probing path.

use crate::base::neterror::NetError;
use crate::http::digestauth::Challenge;
use crate::http::digesttransport::{
    challenge_from, clone_request, probe, CnonceGenerator, DigestTransport, ProbeOutcome,
};
use crate::http::requestbody::RequestBody;
use crate::http::responsebody::ResponseBody;
use crate::http::transport::{RoundTrip, RoundTripping};
use crate::socket::authcache::{AuthCacheConfig, DigestAuthCache};
use http::header::AUTHORIZATION;
use http::{Request, Response, StatusCode};
use std::sync::Arc;

/// [`DigestTransport`] that remembers challenges per host and credentials.
///
/// Clones share one cache.
#[derive(Debug, Clone)]
pub struct CachedDigestTransport {
    inner: DigestTransport,
    cache: Arc<DigestAuthCache>,
}

impl CachedDigestTransport {
    /// Create a transport with the default cache sizing.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self, NetError> {
        Self::with_config(username, password, AuthCacheConfig::default())
    }

    /// Create a transport with an explicit cache configuration.
    pub fn with_config(
        username: impl Into<String>,
        password: impl Into<String>,
        config: AuthCacheConfig,
    ) -> Result<Self, NetError> {
        Ok(Self {
            inner: DigestTransport::new(username, password),
            cache: Arc::new(DigestAuthCache::new(config)?),
        })
    }

    /// Use `transport` for the underlying requests.
    pub fn with_transport(mut self, transport: Arc<dyn RoundTrip>) -> Self {
        self.inner = self.inner.with_transport(transport);
        self
    }

    /// Replace the underlying transport. `None` restores the default.
    pub fn set_transport(&mut self, transport: Option<Arc<dyn RoundTrip>>) {
        self.inner.set_transport(transport);
    }

    pub fn with_cnonce_generator(mut self, cnonce_gen: CnonceGenerator) -> Self {
        self.inner = self.inner.with_cnonce_generator(cnonce_gen);
        self
    }

    pub fn set_cnonce_generator(&mut self, cnonce_gen: Option<CnonceGenerator>) {
        self.inner.set_cnonce_generator(cnonce_gen);
    }

    /// Switch credentials. Entries of the previous user stay cached under
    /// their own key.
    pub fn set_credentials(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.inner.set_credentials(username, password);
    }

    pub fn username(&self) -> &str {
        self.inner.username()
    }

    /// The shared challenge cache.
    pub fn cache(&self) -> &DigestAuthCache {
        &self.cache
    }

    /// Forget every cached challenge.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Release the cache. Every clone shares it, so every clone is closed.
    ///
    /// Using the transport after close is a precondition violation: requests
    /// fail with [`NetError::TransportClosed`] before any I/O.
    pub fn close(&self) {
        self.cache.close();
    }

    async fn execute(&self, mut req: Request<RequestBody>) -> Result<Response<ResponseBody>, NetError> {
        if self.cache.is_closed() {
            return Err(NetError::TransportClosed);
        }
        let cnonce_gen = self.inner.preconditions()?;
        let host = req.uri().host().unwrap_or_default().to_string();
        let key = DigestAuthCache::key(&host, self.inner.username(), self.inner.password());

        let mut allow_retry = true;
        loop {
            let (challenge, cached) = match self.cache.get(&key) {
                Some(challenge) => {
                    tracing::debug!(host = %host, "digest challenge cache hit");
                    (challenge, true)
                }
                None => {
                    tracing::debug!(host = %host, "digest challenge cache miss");
                    let probe_req = clone_request(&mut req).await?;
                    let headers = match probe(self.inner.transport().as_ref(), probe_req).await? {
                        ProbeOutcome::Passthrough(resp) => return Ok(resp),
                        ProbeOutcome::Challenged(headers) => headers,
                    };
                    let challenge: Arc<Challenge> = Arc::new(challenge_from(&headers)?);
                    self.cache.set(key.clone(), Arc::clone(&challenge), 1);
                    (challenge, false)
                }
            };

            // Keep a copy for the retry; `req` itself is consumed by the send.
            let replay = if cached && allow_retry {
                Some(clone_request(&mut req).await?)
            } else {
                None
            };

            self.inner.authorize(&mut req, &challenge, cnonce_gen)?;
            let resp = self.inner.send(req).await?;

            match replay {
                Some(mut replay) if resp.status() == StatusCode::UNAUTHORIZED => {
                    tracing::debug!(host = %host, "cached digest challenge rejected, retrying");
                    if let Err(e) = resp.into_body().drain().await {
                        tracing::debug!(error = %e, "failed to drain rejected response body");
                    }
                    self.cache.del(&key);
                    replay.headers_mut().remove(AUTHORIZATION);
                    req = replay;
                    allow_retry = false;
                }
                _ => return Ok(resp),
            }
        }
    }
}

impl RoundTrip for CachedDigestTransport {
    fn round_trip(&self, req: Request<RequestBody>) -> RoundTripping {
        let this = self.clone();
        Box::pin(async move { this.execute(req).await })
    }
}
