//! Session records as delivered by the platform feed.

use crate::error::{Error, Result};
use crate::ids::{SessionId, StudentId};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Marker found in the `type` field of final-defense sessions.
pub const PRESENTATION_MARKER: &str = "presentation";

/// Highest project level the platform uses.
pub const MAX_LEVEL: u8 = 3;

/// Session recipient as embedded in a feed record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub id: StudentId,
    #[serde(default)]
    pub displayable_name: Option<String>,
}

/// Project level, sent as a numeric string, a number, or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawLevel {
    Number(i64),
    Text(String),
}

/// One raw session from the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSession {
    pub id: SessionId,
    #[serde(alias = "timestamp")]
    pub session_date: String,
    pub recipient: Recipient,
    #[serde(default)]
    pub project_level: Option<RawLevel>,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Normalized session fields, ready for the aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub timestamp: DateTime<FixedOffset>,
    pub level: u8,
    pub status: String,
    pub is_presentation: bool,
    pub student_id: StudentId,
    pub student_name: Option<String>,
}

impl RawSession {
    /// Decodes the raw record into normalized fields.
    pub fn decode(&self) -> Result<SessionRecord> {
        let timestamp = parse_timestamp(&self.session_date)?;
        let level = parse_level(self.project_level.as_ref())
            .map_err(|e| Error::parse(format!("session {}: {}", self.id, e)))?;
        let is_presentation = self
            .kind
            .as_deref()
            .map(|k| k.to_lowercase().contains(PRESENTATION_MARKER))
            .unwrap_or(false);

        Ok(SessionRecord {
            id: self.id.clone(),
            timestamp,
            level,
            status: self.status.clone(),
            is_presentation,
            student_id: self.recipient.id.clone(),
            student_name: self.recipient.displayable_name.clone(),
        })
    }
}

/// Parses an ISO-8601 timestamp that carries an offset.
///
/// Accepts RFC 3339 as well as the compact `+0000` offset form.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map_err(|e| Error::parse(format!("invalid session date {raw:?}: {e}")))
}

fn parse_level(raw: Option<&RawLevel>) -> std::result::Result<u8, String> {
    let value = match raw {
        None => return Ok(0),
        Some(RawLevel::Number(n)) => *n,
        Some(RawLevel::Text(s)) if s.trim().is_empty() => return Ok(0),
        Some(RawLevel::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("invalid project level {s:?}"))?,
    };

    u8::try_from(value)
        .ok()
        .filter(|level| *level <= MAX_LEVEL)
        .ok_or_else(|| format!("project level {value} out of range"))
}
