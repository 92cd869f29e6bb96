//! Connection setup and shared per-host state.
//!
//! - [`connectjob`]: DNS → TCP connection flow
//! - [`authcache`]: bounded cache of digest challenges per host and credentials

pub mod authcache;
pub mod connectjob;
