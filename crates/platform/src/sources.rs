//! HTTP implementations of the feed and profile traits.

use crate::connector::Connector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use invoice_core::{ProfileSource, RawSession, Result, SessionFeed, StudentId};
use std::sync::Arc;

/// Format of the `before` query parameter.
const BEFORE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub(crate) fn format_before(before: DateTime<Utc>) -> String {
    before.format(BEFORE_FORMAT).to_string()
}

/// The mentor's session history from the JSON API.
#[derive(Clone)]
pub struct HttpSessionFeed {
    connector: Arc<Connector>,
}

impl HttpSessionFeed {
    pub fn new(connector: Arc<Connector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl SessionFeed for HttpSessionFeed {
    async fn fetch_sessions(&self, before: DateTime<Utc>) -> Result<Vec<RawSession>> {
        let config = self.connector.config();
        let url = config.sessions_url(self.connector.user_id());
        let query = [
            ("actor", config.actor.clone()),
            ("before", format_before(before)),
        ];
        self.connector.get_json(&url, &query).await
    }
}

/// Student dashboard pages from the website.
#[derive(Clone)]
pub struct HttpProfileSource {
    connector: Arc<Connector>,
}

impl HttpProfileSource {
    pub fn new(connector: Arc<Connector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl ProfileSource for HttpProfileSource {
    async fn fetch_profile_html(&self, student_id: &StudentId) -> Result<String> {
        let url = self.connector.config().student_url(student_id);
        self.connector.get_text(&url).await
    }
}
