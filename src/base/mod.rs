//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): error codes shared by the transports,
//!   the digest engine and the auth cache.

pub mod neterror;
