//! Platform client configuration.

use invoice_core::{Error, Result, StudentId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Platform endpoints and HTTP behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Website base URL (login and HTML pages)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// JSON API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Where the bearer token and cookies are cached between runs
    #[serde(default = "default_token_cache_path")]
    pub token_cache_path: PathBuf,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retries on 429 responses
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff step between retries in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Feed perspective, the mentor side of sessions
    #[serde(default = "default_actor")]
    pub actor: String,
}

fn default_base_url() -> String {
    "https://openclassrooms.com".to_string()
}

fn default_api_base_url() -> String {
    "https://api.openclassrooms.com".to_string()
}

fn default_token_cache_path() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_user_agent() -> String {
    "Google Chrome".to_string()
}

fn default_actor() -> String {
    "expert".to_string()
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_base_url: default_api_base_url(),
            token_cache_path: default_token_cache_path(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            user_agent: default_user_agent(),
            actor: default_actor(),
        }
    }
}

impl PlatformConfig {
    /// Checks that both base URLs parse.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("base_url", &self.base_url), ("api_base_url", &self.api_base_url)] {
            Url::parse(value).map_err(|e| Error::config(format!("invalid {name} {value:?}: {e}")))?;
        }
        Ok(())
    }

    pub fn base(&self) -> Result<Url> {
        Url::parse(&self.base_url).map_err(|e| Error::config(format!("invalid base_url: {e}")))
    }

    pub fn csrf_url(&self) -> String {
        format!("{}/login_ajax", self.base_url.trim_end_matches('/'))
    }

    pub fn login_url(&self) -> String {
        format!("{}/login_check", self.base_url.trim_end_matches('/'))
    }

    pub fn me_url(&self) -> String {
        format!("{}/me", self.api_base_url.trim_end_matches('/'))
    }

    pub fn sessions_url(&self, user_id: &str) -> String {
        format!(
            "{}/users/{}/sessions",
            self.api_base_url.trim_end_matches('/'),
            user_id
        )
    }

    pub fn student_url(&self, student_id: &StudentId) -> String {
        format!(
            "{}/fr/mentorship/students/{}/dashboard",
            self.base_url.trim_end_matches('/'),
            student_id
        )
    }
}

/// Mentor login.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Reads `OC_USERNAME` and `OC_PASSWORD`. Both must be set and non-empty.
    pub fn from_env() -> Option<Self> {
        let username = std::env::var("OC_USERNAME").ok().filter(|v| !v.is_empty())?;
        let password = std::env::var("OC_PASSWORD").ok().filter(|v| !v.is_empty())?;
        Some(Self { username, password })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
