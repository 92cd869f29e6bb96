//! # digestnet
//!
//! HTTP Digest authentication (RFC 2617) as a transparent client transport.
//!
//! `digestnet` wraps any request/response transport and answers digest
//! challenges on the caller's behalf. The cached variant remembers the
//! challenge per host and credentials so repeated requests skip the
//! unauthenticated probe.
//!
//! ## Features
//!
//! - **Challenge parsing**: quoted values, escapes and commas inside quotes
//! - **Digest computation**: `MD5` and `MD5-sess` with `qop=auth`
//! - **Probing transport**: unauthenticated probe, then one authorized request
//! - **Cached transport**: bounded, cost-based challenge cache with a single
//!   self-healing retry when a cached nonce goes stale
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use digestnet::http::{CachedDigestTransport, RequestBody, RoundTrip};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = CachedDigestTransport::new("john", "hello").unwrap();
//!     let req = http::Request::post("http://127.0.0.1:18081/json_rpc")
//!         .body(RequestBody::from(r#"{"jsonrpc":"2.0","id":"0","method":"get_info"}"#))
//!         .unwrap();
//!     let response = transport.round_trip(req).await.unwrap();
//!     println!("Status: {}", response.status());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error definitions
//! - [`http`] - Digest engine, transports and body types
//! - [`socket`] - TCP connect and the challenge cache

pub mod base;
pub mod http;
pub mod socket;

pub use crate::base::neterror::NetError;
pub use crate::http::{
    CachedDigestTransport, Challenge, DigestTransport, HttpTransport, RequestBody, ResponseBody,
    RoundTrip,
};
pub use crate::socket::authcache::{AuthCacheConfig, CacheMetrics, DigestAuthCache};
