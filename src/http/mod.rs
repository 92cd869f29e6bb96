//! HTTP digest authentication and the transports that carry it.
//!
//! - [`digestauth`]: challenge parsing and `Authorization` computation
//! - [`digesttransport`]: probe-then-authorize transport
//! - [`cachedtransport`]: the same, skipping the probe for known hosts
//! - [`transport`]: the [`RoundTrip`] seam and a plain HTTP/1.1 transport

pub mod cachedtransport;
pub mod digestauth;
pub mod digesttransport;
pub mod requestbody;
pub mod responsebody;
pub mod transport;

// Re-exports for convenience
pub use cachedtransport::CachedDigestTransport;
pub use digestauth::{Challenge, DigestInput};
pub use digesttransport::{CnonceGenerator, DigestTransport};
pub use requestbody::RequestBody;
pub use responsebody::ResponseBody;
pub use transport::{HttpTransport, RoundTrip, RoundTripping};
