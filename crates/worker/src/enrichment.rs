//! Student enrichment via profile page scraping.
//!
//! Resolves a student's financing status from the one descriptive text node
//! on their dashboard page. Each student is looked up at most once: a
//! resolved status short-circuits before any request is made.

use invoice_core::{Error, FinancedStatus, ProfileSource, Result, Student};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, info};

/// Enrichment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// CSS selector of the node holding the financing description
    #[serde(default = "default_details_selector")]
    pub details_selector: String,
    /// Token marking a self-funded student (locale specific)
    #[serde(default = "default_auto_financed_marker")]
    pub auto_financed_marker: String,
}

const DETAILS_SELECTOR: &str = "div.mentorshipStudent__details > p";

fn default_details_selector() -> String {
    DETAILS_SELECTOR.to_string()
}

static DEFAULT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(DETAILS_SELECTOR).expect("constant selector parses"));

fn default_auto_financed_marker() -> String {
    "Auto".to_string()
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            details_selector: default_details_selector(),
            auto_financed_marker: default_auto_financed_marker(),
        }
    }
}

/// Enrichment worker resolving financing statuses.
#[derive(Debug)]
pub struct EnrichmentWorker {
    selector: Selector,
    marker: String,
}

impl EnrichmentWorker {
    /// Creates a new enrichment worker with the default selector and marker.
    pub fn new() -> Self {
        Self {
            selector: DEFAULT_SELECTOR.clone(),
            marker: default_auto_financed_marker(),
        }
    }

    /// Creates a new enrichment worker with custom config.
    pub fn with_config(config: EnrichmentConfig) -> Result<Self> {
        let selector = Selector::parse(&config.details_selector).map_err(|e| {
            Error::config(format!(
                "invalid details selector {:?}: {:?}",
                config.details_selector, e
            ))
        })?;

        Ok(Self {
            selector,
            marker: config.auto_financed_marker,
        })
    }

    /// Resolves `student`'s financing status, fetching their profile page
    /// only if the status is still unknown.
    ///
    /// Returns the status in effect afterwards. Safe to call concurrently,
    /// including for the same student.
    pub async fn resolve(
        &self,
        student: &Student,
        profiles: &dyn ProfileSource,
    ) -> Result<FinancedStatus> {
        let current = student.financed();
        if current.is_resolved() {
            debug!(student_id = %student.id(), "Financing already resolved");
            return Ok(current);
        }

        let started = Instant::now();
        let html = profiles.fetch_profile_html(student.id()).await;
        metrics()
            .profile_fetch_latency_ms
            .observe(started.elapsed().as_millis() as u64);

        let status = html.and_then(|html| self.classify(&html)).map_err(|e| {
            metrics().enrichment_failures.inc();
            match e {
                Error::Parse(msg) => {
                    Error::parse(format!("cannot parse student page {}: {}", student.id(), msg))
                }
                other => other,
            }
        })?;

        let effective = student.resolve(status);
        metrics().students_enriched.inc();
        info!(
            student = %student.name(),
            financed = effective.label(),
            "Updated student"
        );

        Ok(effective)
    }

    /// Reads the financing status out of a profile page.
    pub fn classify(&self, html: &str) -> Result<FinancedStatus> {
        let document = Html::parse_document(html);
        let node = document
            .select(&self.selector)
            .next()
            .ok_or_else(|| Error::parse("financing details node not found"))?;

        // Leading text only, as nested markup is not part of the description
        let text = node
            .children()
            .next()
            .and_then(|child| child.value().as_text().map(|t| &**t))
            .unwrap_or_default();
        if text.trim().contains(&self.marker) {
            Ok(FinancedStatus::AutoFinanced)
        } else {
            Ok(FinancedStatus::Financed)
        }
    }
}

impl Default for EnrichmentWorker {
    fn default() -> Self {
        Self::new()
    }
}
