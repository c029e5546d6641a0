//! Client for the mentoring platform.
//!
//! - Config (endpoints, retry policy, credentials)
//! - Token cache (login reuse between runs)
//! - Connector (login, bearer-authenticated GETs with 429 retries)
//! - Sources (HTTP session feed and profile pages)

pub mod config;
pub mod connector;
pub mod sources;
pub mod token;

pub use config::{Credentials, PlatformConfig};
pub use connector::Connector;
pub use sources::{HttpProfileSource, HttpSessionFeed};
pub use token::{CachedToken, TOKEN_TTL_SECS};
