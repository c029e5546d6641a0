//! Boundary traits for the platform collaborators.
//!
//! The pipeline only sees these traits; the HTTP implementations live in
//! `platform-client` and tests plug in scripted ones.

use crate::error::Result;
use crate::ids::StudentId;
use crate::record::RawSession;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Paginated session history, newest first.
#[async_trait]
pub trait SessionFeed: Send + Sync {
    /// Fetches one page of sessions strictly older than `before`.
    ///
    /// Page size and ordering inside the page are up to the feed.
    async fn fetch_sessions(&self, before: DateTime<Utc>) -> Result<Vec<RawSession>>;
}

/// Student profile pages.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetches the HTML dashboard page of a student.
    async fn fetch_profile_html(&self, student_id: &StudentId) -> Result<String>;
}
