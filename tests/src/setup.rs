//! Common test setup functions.

use chrono::{TimeZone, Utc};
use invoice_core::{Result, StudentRegistry};
use std::sync::Arc;
use worker::{BillingWindow, IngestionPipeline, PipelineConfig, PipelineOutcome};

use crate::mocks::{MockFeed, MockProfiles};

/// Pipeline wired to mock collaborators.
///
/// Keeps handles on both mocks so tests can inspect what the pipeline asked
/// for after a run.
pub struct TestContext {
    pub feed: Arc<MockFeed>,
    pub profiles: Arc<MockProfiles>,
    pub pipeline: IngestionPipeline,
}

impl TestContext {
    pub fn new(feed: MockFeed, profiles: MockProfiles) -> Self {
        Self::with_workers(feed, profiles, PipelineConfig::default().workers)
    }

    pub fn with_workers(feed: MockFeed, profiles: MockProfiles, workers: usize) -> Self {
        let feed = Arc::new(feed);
        let profiles = Arc::new(profiles);
        let pipeline = IngestionPipeline::with_config(
            feed.clone(),
            profiles.clone(),
            PipelineConfig { workers },
        );

        Self {
            feed,
            profiles,
            pipeline,
        }
    }

    /// Runs June 2021 with a fresh in-memory registry.
    pub async fn run_june(&self) -> Result<PipelineOutcome> {
        self.pipeline.run(june(), StudentRegistry::new()).await
    }
}

/// June 2021, seen from July 2021 so the whole month is billable.
pub fn june() -> BillingWindow {
    BillingWindow::for_month(2021, 6)
        .expect("valid month")
        .with_now(Utc.with_ymd_and_hms(2021, 7, 10, 12, 0, 0).unwrap())
}
