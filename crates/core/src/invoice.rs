//! Invoice projection: groups a run's sessions into billing buckets.

use crate::error::Result;
use crate::record::MAX_LEVEL;
use crate::session::{Session, SessionAggregate, SessionFilter};
use crate::student::Student;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A labelled group of sessions billed together.
#[derive(Debug, Clone)]
pub struct ReportBucket<'a> {
    pub label: String,
    pub level: u8,
    pub is_presentation: bool,
    pub noshow: bool,
    pub sessions: Vec<&'a Session>,
}

impl ReportBucket<'_> {
    pub fn subtotal(&self) -> f64 {
        self.sessions.iter().map(|s| s.price()).sum()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Everything a report needs for one billing month.
#[derive(Debug, Clone)]
pub struct Invoice<'a> {
    pub year: i32,
    pub month: u32,
    pub buckets: Vec<ReportBucket<'a>>,
    /// Self-funded students, by name.
    pub auto_financed_students: Vec<Arc<Student>>,
    pub no_charge: Vec<&'a Session>,
    /// Sessions still waiting for the mentor to fill in their outcome.
    pub to_complete: Vec<&'a Session>,
    pub duration: Duration,
    pub generated_at: DateTime<Utc>,
}

impl<'a> Invoice<'a> {
    /// Builds the projection. Fails on an empty aggregate since the billing
    /// month is taken from the sessions themselves.
    pub fn build(aggregate: &'a SessionAggregate, duration: Duration) -> Result<Self> {
        let year = aggregate.year()?;
        let month = aggregate.month()?;

        let mut buckets = Vec::new();
        for level in 0..=MAX_LEVEL {
            let level_buckets = level_buckets(aggregate, level);
            // Level 0 only shows up for sessions without a project level
            if level == 0 && level_buckets.iter().all(ReportBucket::is_empty) {
                continue;
            }
            buckets.extend(level_buckets);
        }

        let mut by_id: HashMap<&str, Arc<Student>> = HashMap::new();
        for session in aggregate.filter(&SessionFilter::new().financed(false)) {
            by_id
                .entry(session.student().id().as_str())
                .or_insert_with(|| session.student().clone());
        }
        let mut auto_financed_students: Vec<Arc<Student>> = by_id.into_values().collect();
        auto_financed_students.sort_by(|a, b| a.name().cmp(b.name()));

        Ok(Self {
            year,
            month,
            buckets,
            auto_financed_students,
            no_charge: aggregate.filter(&SessionFilter::new().any_kind().no_charge(true)),
            to_complete: aggregate.filter(&SessionFilter::new().any_kind().pending(true)),
            duration,
            generated_at: Utc::now(),
        })
    }

    /// Sum of every bucket.
    pub fn total(&self) -> f64 {
        self.buckets.iter().map(ReportBucket::subtotal).sum()
    }

    pub fn session_count(&self) -> usize {
        self.buckets.iter().map(ReportBucket::len).sum()
    }
}

fn level_buckets(aggregate: &SessionAggregate, level: u8) -> Vec<ReportBucket<'_>> {
    let mut buckets = Vec::with_capacity(6);

    for financed in [false, true] {
        let label_f = if financed { "F" } else { "AutoF" };
        for noshow in [false, true] {
            let filter = SessionFilter::new()
                .level(level)
                .financed(financed)
                .noshow(noshow)
                .presentation(false);
            buckets.push(ReportBucket {
                label: with_noshow(format!("LEVEL {level} / {label_f}"), noshow),
                level,
                is_presentation: false,
                noshow,
                sessions: aggregate.filter(&filter),
            });
        }
    }

    for noshow in [false, true] {
        let filter = SessionFilter::new()
            .level(level)
            .noshow(noshow)
            .presentation(true);
        buckets.push(ReportBucket {
            label: with_noshow(format!("PRESENTATIONS LEVEL {level}"), noshow),
            level,
            is_presentation: true,
            noshow,
            sessions: aggregate.filter(&filter),
        });
    }

    buckets
}

fn with_noshow(label: String, noshow: bool) -> String {
    if noshow {
        format!("{label} noshow")
    } else {
        label
    }
}
