//! Authenticated HTTP connector.
//!
//! Logs in once (or reuses a cached token), then issues GET requests with the
//! bearer token and the website cookies. 429 responses are retried with a
//! linear backoff before giving up with a rate-limit error.

use crate::config::{Credentials, PlatformConfig};
use crate::token::{cookie_value, CachedToken};
use invoice_core::{Error, Result};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics;
use tracing::{debug, info, warn};

/// The login endpoint rejects a post sent right after the CSRF request.
const LOGIN_DELAY: Duration = Duration::from_millis(200);

const ACCESS_TOKEN_COOKIE: &str = "access_token";

#[derive(Debug, Deserialize)]
struct CsrfResponse {
    csrf: String,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    id: serde_json::Value,
}

/// Authenticated client for the mentoring platform.
pub struct Connector {
    config: PlatformConfig,
    http: reqwest::Client,
    jar: Arc<Jar>,
    token: String,
    user_id: String,
}

impl Connector {
    /// Connects to the platform.
    ///
    /// Reuses the cached token when it is still valid, otherwise logs in with
    /// `credentials` and refreshes the cache.
    pub async fn connect(config: PlatformConfig, credentials: Option<Credentials>) -> Result<Self> {
        config.validate()?;

        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {e}")))?;

        let mut connector = Self {
            config,
            http,
            jar,
            token: String::new(),
            user_id: String::new(),
        };

        if let Some(cached) = CachedToken::load(&connector.config.token_cache_path) {
            connector.restore(cached)?;
            info!(user_id = %connector.user_id, "Reusing cached login");
            return Ok(connector);
        }

        let credentials = credentials.ok_or_else(|| {
            Error::config("no credentials provided (set OC_USERNAME and OC_PASSWORD)")
        })?;
        connector.authenticate(&credentials).await?;

        let cached = CachedToken::fresh(
            connector.token.clone(),
            connector.user_id.clone(),
            connector.cookie_header()?,
        );
        cached.save(&connector.config.token_cache_path)?;

        info!(user_id = %connector.user_id, "Logged in");
        Ok(connector)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    fn restore(&mut self, cached: CachedToken) -> Result<()> {
        let base = self.config.base()?;
        for pair in cached.cookie_pairs() {
            self.jar.add_cookie_str(pair, &base);
        }
        self.token = cached.token;
        self.user_id = cached.user_id;
        Ok(())
    }

    fn cookie_header(&self) -> Result<Option<String>> {
        let base = self.config.base()?;
        Ok(self
            .jar
            .cookies(&base)
            .and_then(|value| value.to_str().ok().map(str::to_string)))
    }

    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        debug!("Fetching CSRF token");
        let csrf: CsrfResponse = self
            .http
            .get(self.config.csrf_url())
            .send()
            .await
            .map_err(|e| Error::http(format!("CSRF request failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::authentication(format!("invalid CSRF response: {e}")))?;

        tokio::time::sleep(LOGIN_DELAY).await;

        debug!(username = %credentials.username, "Logging in");
        self.http
            .post(self.config.login_url())
            .form(&[
                ("_username", credentials.username.as_str()),
                ("_password", credentials.password.as_str()),
                ("state", csrf.csrf.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::http(format!("login request failed: {e}")))?;

        let cookies = self.cookie_header()?.unwrap_or_default();
        let token = cookie_value(&cookies, ACCESS_TOKEN_COOKIE).ok_or_else(|| {
            Error::authentication("login rejected: no access_token cookie returned")
        })?;
        self.token = token.to_string();

        let me: MeResponse = self.get_json(&self.config.me_url(), &[]).await?;
        self.user_id = match me.id {
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => s,
            other => {
                return Err(Error::authentication(format!(
                    "unexpected user id in profile: {other}"
                )))
            }
        };

        Ok(())
    }

    /// GET with bearer auth, retrying on 429.
    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        let params = query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        debug!(url = %url, params = %params, "Accessing");

        let mut attempt = 0;
        loop {
            metrics().http_requests.inc();
            let response = self
                .http
                .get(url)
                .bearer_auth(&self.token)
                .query(query)
                .send()
                .await
                .map_err(|e| Error::http(format!("GET {url} failed: {e}")))?;

            let status = response.status();
            let retry_after = retry_after_secs(response.headers());
            match next_step(&self.config, url, status, attempt, retry_after)? {
                Step::Accept => return Ok(response),
                Step::Retry(backoff) => {
                    attempt += 1;
                    warn!(
                        attempt = attempt,
                        backoff_ms = %backoff.as_millis(),
                        url = %url,
                        "Rate limited, retrying"
                    );
                    metrics().rate_limit_retries.inc();
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.get(url, query)
            .await?
            .json()
            .await
            .map_err(|e| Error::parse(format!("invalid JSON from {url}: {e}")))
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.get(url, &[])
            .await?
            .text()
            .await
            .map_err(|e| Error::http(format!("failed to read body of {url}: {e}")))
    }
}

/// What `Connector::get` does after a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Accept,
    /// Sleep, then send the request again
    Retry(Duration),
}

/// Maps the status of the `attempt`-th try (0-based) to the next step.
///
/// 429 is retried `max_retries` times with a linear backoff, then reported
/// as `RateLimited`. 401 and 403 are `Authentication`, any other failure is
/// `Http`.
fn next_step(
    config: &PlatformConfig,
    url: &str,
    status: StatusCode,
    attempt: u32,
    retry_after: Option<u64>,
) -> Result<Step> {
    match status {
        s if s.is_success() => Ok(Step::Accept),
        StatusCode::TOO_MANY_REQUESTS if attempt < config.max_retries => Ok(Step::Retry(
            Duration::from_millis(config.retry_backoff_ms) * (attempt + 1),
        )),
        StatusCode::TOO_MANY_REQUESTS => Err(Error::rate_limited(
            format!("GET {url} still throttled after {} retries", config.max_retries),
            retry_after,
        )),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::authentication(format!(
            "GET {url} returned {status}; the cached login may be stale"
        ))),
        _ => Err(Error::http(format!("GET {url} returned {status}"))),
    }
}

/// `Retry-After` in seconds. The HTTP-date form is ignored.
fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}
