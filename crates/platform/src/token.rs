//! On-disk cache of the login token.

use chrono::{DateTime, Duration, Utc};
use invoice_core::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Token lifetime assumed after a fresh login.
pub const TOKEN_TTL_SECS: i64 = 3500;

/// Cached login state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedToken {
    pub token: String,
    pub user_id: String,
    pub expires: DateTime<Utc>,
    /// Cookie header for the website, as `name=value; name=value`
    #[serde(default)]
    pub cookies: Option<String>,
}

impl CachedToken {
    /// Token obtained just now.
    pub fn fresh(token: String, user_id: String, cookies: Option<String>) -> Self {
        Self {
            token,
            user_id,
            expires: Utc::now() + Duration::seconds(TOKEN_TTL_SECS),
            cookies,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires <= Utc::now()
    }

    /// Loads a still-valid token.
    ///
    /// Missing, expired or unreadable caches all yield `None` so the caller
    /// logs in again.
    pub fn load(path: &Path) -> Option<Self> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No token cache");
                return None;
            }
        };

        let cached: Self = match serde_json::from_slice(&raw) {
            Ok(cached) => cached,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable token cache");
                return None;
            }
        };

        if cached.is_expired() {
            debug!(expired_at = %cached.expires, "Cached token expired");
            return None;
        }

        Some(cached)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Splits the cookie header into individual `name=value` pairs.
    pub fn cookie_pairs(&self) -> Vec<&str> {
        self.cookies
            .as_deref()
            .map(split_cookie_header)
            .unwrap_or_default()
    }
}

pub(crate) fn split_cookie_header(header: &str) -> Vec<&str> {
    header
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect()
}

/// Extracts one cookie value from a `name=value; name=value` header.
pub(crate) fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    split_cookie_header(header).into_iter().find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then_some(value)
    })
}
