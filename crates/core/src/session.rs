//! Mentoring sessions and the aggregate that collects them.

use crate::error::{Error, Result};
use crate::ids::SessionId;
use crate::pricing::{
    session_price, status_matches, ABSENT_MARKER, COMPLETED_MARKER, PENDING_MARKER,
};
use crate::record::SessionRecord;
use crate::student::{FinancedStatus, Student, StudentRegistry};
use chrono::{DateTime, Datelike, FixedOffset};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A mentoring session.
///
/// Fields are fixed once the session is built; only the shared student's
/// financing status may change afterwards.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    timestamp: DateTime<FixedOffset>,
    level: u8,
    status: String,
    is_presentation: bool,
    student: Arc<Student>,
}

impl Session {
    pub fn new(
        id: SessionId,
        timestamp: DateTime<FixedOffset>,
        level: u8,
        status: impl Into<String>,
        is_presentation: bool,
        student: Arc<Student>,
    ) -> Self {
        Self {
            id,
            timestamp,
            level,
            status: status.into(),
            is_presentation,
            student,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_presentation(&self) -> bool {
        self.is_presentation
    }

    pub fn student(&self) -> &Arc<Student> {
        &self.student
    }

    /// Student was marked absent.
    pub fn is_absent(&self) -> bool {
        status_matches(&self.status, ABSENT_MARKER)
    }

    pub fn is_completed(&self) -> bool {
        status_matches(&self.status, COMPLETED_MARKER)
    }

    pub fn is_pending(&self) -> bool {
        status_matches(&self.status, PENDING_MARKER)
    }

    /// Price in euros, using the student's current financing status.
    pub fn price(&self) -> f64 {
        session_price(
            self.level,
            self.student.financed(),
            self.is_presentation,
            &self.status,
        )
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{: <30} | {} | {} | {}",
            self.student.name(),
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.level,
            self.status
        )
    }
}

/// Predicates for [`SessionAggregate::filter`]. Unset predicates match
/// everything; set ones are combined with AND.
///
/// `noshow = Some(true)` keeps absences and `Some(false)` keeps completed
/// sessions; a session in neither bucket matches neither.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFilter {
    pub level: Option<u8>,
    pub financed: Option<bool>,
    pub noshow: Option<bool>,
    pub completed_only: bool,
    pub no_charge: Option<bool>,
    pub pending: Option<bool>,
    /// Defaults to `Some(false)`: presentations are reported separately.
    pub is_presentation: Option<bool>,
}

impl Default for SessionFilter {
    fn default() -> Self {
        Self {
            level: None,
            financed: None,
            noshow: None,
            completed_only: false,
            no_charge: None,
            pending: None,
            is_presentation: Some(false),
        }
    }
}

impl SessionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    pub fn financed(mut self, financed: bool) -> Self {
        self.financed = Some(financed);
        self
    }

    pub fn noshow(mut self, noshow: bool) -> Self {
        self.noshow = Some(noshow);
        self
    }

    pub fn completed_only(mut self) -> Self {
        self.completed_only = true;
        self
    }

    pub fn no_charge(mut self, no_charge: bool) -> Self {
        self.no_charge = Some(no_charge);
        self
    }

    pub fn pending(mut self, pending: bool) -> Self {
        self.pending = Some(pending);
        self
    }

    pub fn presentation(mut self, is_presentation: bool) -> Self {
        self.is_presentation = Some(is_presentation);
        self
    }

    /// Match presentations and regular sessions alike.
    pub fn any_kind(mut self) -> Self {
        self.is_presentation = None;
        self
    }

    pub fn matches(&self, session: &Session) -> bool {
        if let Some(level) = self.level {
            if session.level != level {
                return false;
            }
        }

        if let Some(financed) = self.financed {
            let wanted = if financed {
                FinancedStatus::Financed
            } else {
                FinancedStatus::AutoFinanced
            };
            if session.student.financed() != wanted {
                return false;
            }
        }

        match self.noshow {
            Some(true) if !session.is_absent() => return false,
            Some(false) if !session.is_completed() => return false,
            _ => {}
        }

        if self.completed_only && !session.is_completed() {
            return false;
        }

        if let Some(no_charge) = self.no_charge {
            if (session.price() == 0.0) != no_charge {
                return false;
            }
        }

        if let Some(pending) = self.pending {
            if session.is_pending() != pending {
                return false;
            }
        }

        if let Some(is_presentation) = self.is_presentation {
            if session.is_presentation != is_presentation {
                return false;
            }
        }

        true
    }
}

/// All sessions of a billing run, keyed by session id.
///
/// Inserting the same id twice replaces the entry, so overlapping feed pages
/// never produce duplicates.
#[derive(Debug, Default)]
pub struct SessionAggregate {
    sessions: HashMap<SessionId, Session>,
    first_seen: Option<SessionId>,
}

impl SessionAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a decoded session, resolving its student through `registry`.
    ///
    /// Returns the student when its financing status is still unknown, which
    /// tells the caller it needs enrichment.
    pub fn add(
        &mut self,
        registry: &mut StudentRegistry,
        record: SessionRecord,
    ) -> Result<Option<Arc<Student>>> {
        let student = registry
            .get_or_create(&record.student_id, record.student_name.as_deref())?
            .ok_or_else(|| {
                Error::parse(format!(
                    "session {} references unknown student {} without a name",
                    record.id, record.student_id
                ))
            })?;

        let session = Session::new(
            record.id.clone(),
            record.timestamp,
            record.level,
            record.status,
            record.is_presentation,
            student.clone(),
        );

        if self.first_seen.is_none() {
            self.first_seen = Some(record.id.clone());
        }
        self.sessions.insert(record.id, session);

        if student.financed().is_resolved() {
            Ok(None)
        } else {
            Ok(Some(student))
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions matching `filter`, by ascending timestamp.
    pub fn filter(&self, filter: &SessionFilter) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self
            .sessions
            .values()
            .filter(|s| filter.matches(s))
            .collect();
        sessions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// Calendar month of the first session inserted.
    pub fn month(&self) -> Result<u32> {
        Ok(self.first_session()?.timestamp.month())
    }

    /// Calendar year of the first session inserted.
    pub fn year(&self) -> Result<i32> {
        Ok(self.first_session()?.timestamp.year())
    }

    fn first_session(&self) -> Result<&Session> {
        self.first_seen
            .as_ref()
            .and_then(|id| self.sessions.get(id))
            .ok_or(Error::EmptyAggregate)
    }

    /// Sum of all session prices, presentations included.
    pub fn total(&self) -> f64 {
        self.sessions.values().map(Session::price).sum()
    }
}
