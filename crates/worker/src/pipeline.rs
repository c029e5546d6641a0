//! Session ingestion pipeline.
//!
//! One producer task walks the session feed backward in time from the end of
//! the billing month and fills the aggregate. Every student it discovers with
//! an unknown financing status is handed over a channel to the consumer,
//! which fans enrichment out to a bounded pool:
//! 1. Fetch the page of sessions older than the cursor
//! 2. Move the cursor to the oldest session seen
//! 3. Insert sessions of the billing month, enqueue new students
//! 4. Stop once the cursor crosses the start of the month
//!
//! The producer dropping its sender is the end-of-stream marker. The first
//! failure on either side cancels the run.

use crate::enrichment::EnrichmentWorker;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Utc};
use invoice_core::{
    Error, ProfileSource, Result, SessionAggregate, SessionFeed, Student, StudentId,
    StudentRegistry,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum concurrent enrichment lookups
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// Largest UTC offset a feed timestamp can carry.
fn max_utc_offset() -> chrono::Duration {
    chrono::Duration::hours(14)
}

/// Time bounds of a billing run.
///
/// Membership is decided on the wall-clock month of each session, in the
/// offset the feed reported it with. The cursor walk covers the UTC month
/// widened by the largest possible offset on both sides so that sessions
/// near the boundaries are always seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingWindow {
    /// First instant of the billing month, in UTC
    pub after: DateTime<Utc>,
    /// First instant of the next month, in UTC
    pub before: DateTime<Utc>,
    /// Sessions later than this are provisional and left out
    pub now: DateTime<Utc>,
}

impl BillingWindow {
    /// Window covering `month` of `year`, in UTC.
    pub fn for_month(year: i32, month: u32) -> Result<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| Error::config(format!("invalid billing month {year}-{month}")))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| Error::config(format!("invalid billing month {year}-{month}")))?;

        Ok(Self {
            after: first.and_time(NaiveTime::MIN).and_utc(),
            before: next.and_time(NaiveTime::MIN).and_utc(),
            now: Utc::now(),
        })
    }

    /// Overrides the clock used by the future-date guard.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn month(&self) -> u32 {
        self.after.month()
    }

    pub fn year(&self) -> i32 {
        self.after.year()
    }

    /// Cursor of the first feed request.
    pub fn cursor_start(&self) -> DateTime<Utc> {
        self.before + max_utc_offset()
    }

    /// The walk stops once the cursor is at or below this instant.
    pub fn cursor_floor(&self) -> DateTime<Utc> {
        self.after - max_utc_offset()
    }

    /// Whether a session belongs to this billing run: its local month is the
    /// billing month and it is not in the future.
    pub fn accepts(&self, timestamp: DateTime<FixedOffset>) -> bool {
        timestamp.year() == self.year()
            && timestamp.month() == self.month()
            && timestamp.with_timezone(&Utc) <= self.now
    }
}

/// Result of a completed run.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub aggregate: SessionAggregate,
    pub registry: StudentRegistry,
    pub pages_fetched: u64,
    pub students_enriched: u64,
}

/// What the producer hands back when it finishes.
struct Produced {
    aggregate: SessionAggregate,
    registry: StudentRegistry,
    pages_fetched: u64,
}

/// Producer/consumer coordinator for one billing run.
pub struct IngestionPipeline {
    feed: Arc<dyn SessionFeed>,
    profiles: Arc<dyn ProfileSource>,
    enrichment: Arc<EnrichmentWorker>,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl IngestionPipeline {
    /// Creates a new pipeline.
    pub fn new(feed: Arc<dyn SessionFeed>, profiles: Arc<dyn ProfileSource>) -> Self {
        Self {
            feed,
            profiles,
            enrichment: Arc::new(EnrichmentWorker::new()),
            config: PipelineConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a new pipeline with custom config.
    pub fn with_config(
        feed: Arc<dyn SessionFeed>,
        profiles: Arc<dyn ProfileSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            config,
            ..Self::new(feed, profiles)
        }
    }

    pub fn with_enrichment(mut self, enrichment: EnrichmentWorker) -> Self {
        self.enrichment = Arc::new(enrichment);
        self
    }

    /// Token that cancels any run of this pipeline when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs ingestion and enrichment for `window`.
    ///
    /// Returns only once the producer has finished and every enrichment task
    /// has completed. Any error aborts the whole run.
    pub async fn run(
        &self,
        window: BillingWindow,
        registry: StudentRegistry,
    ) -> Result<PipelineOutcome> {
        let cancel = self.cancel.child_token();
        let (tx, rx) = mpsc::unbounded_channel();

        info!(
            after = %window.after,
            before = %window.before,
            workers = self.config.workers,
            "Starting session ingestion"
        );

        let producer = tokio::spawn(produce(
            self.feed.clone(),
            window,
            registry,
            tx,
            cancel.clone(),
        ));

        let consumed = self.consume(rx, &cancel).await;
        if consumed.is_err() {
            cancel.cancel();
        }

        let produced = producer.await.unwrap_or_else(|e| Err(task_failure("producer", e)));

        let (produced, students_enriched) = match (produced, consumed) {
            (Ok(produced), Ok(enriched)) => (produced, enriched),
            // Cancelled because the consumer failed: report the consumer's error
            (Err(Error::Cancelled), Err(e)) => return Err(e),
            (Err(e), _) => return Err(e),
            (Ok(_), Err(e)) => return Err(e),
        };

        produced.registry.save()?;

        info!(
            sessions = produced.aggregate.len(),
            students = produced.registry.len(),
            pages = produced.pages_fetched,
            enriched = students_enriched,
            "Session ingestion complete"
        );

        Ok(PipelineOutcome {
            aggregate: produced.aggregate,
            registry: produced.registry,
            pages_fetched: produced.pages_fetched,
            students_enriched,
        })
    }

    /// Drains the hand-off queue, dispatching each student to the pool.
    ///
    /// Keeps going until the producer closes the channel, then waits for
    /// outstanding lookups. Returns the number of lookups completed.
    async fn consume(
        &self,
        mut rx: mpsc::UnboundedReceiver<Arc<Student>>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        let mut completed = 0u64;

        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(student) => {
                        metrics().queue_depth.dec();
                        tasks.spawn(enrich(
                            self.enrichment.clone(),
                            self.profiles.clone(),
                            student,
                            semaphore.clone(),
                            cancel.clone(),
                        ));
                    }
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    settle(joined, cancel)?;
                    completed += 1;
                }
            }
        }

        debug!(outstanding = tasks.len(), "Feed done, waiting for enrichment");

        while let Some(joined) = tasks.join_next().await {
            settle(joined, cancel)?;
            completed += 1;
        }

        Ok(completed)
    }
}

/// Checks one finished enrichment task, cancelling the run on failure.
fn settle(
    joined: std::result::Result<Result<()>, JoinError>,
    cancel: &CancellationToken,
) -> Result<()> {
    let result = joined.unwrap_or_else(|e| Err(task_failure("enrichment", e)));
    if let Err(ref e) = result {
        if !matches!(e, Error::Cancelled) {
            error!(error = %e, "Enrichment failed, aborting run");
        }
        cancel.cancel();
    }
    result
}

fn task_failure(task: &str, e: JoinError) -> Error {
    if e.is_cancelled() {
        Error::Cancelled
    } else {
        Error::internal(format!("{task} task panicked: {e}"))
    }
}

async fn enrich(
    enrichment: Arc<EnrichmentWorker>,
    profiles: Arc<dyn ProfileSource>,
    student: Arc<Student>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) -> Result<()> {
    let _permit = tokio::select! {
        permit = semaphore.acquire_owned() => permit
            .map_err(|e| Error::internal(format!("worker pool closed: {e}")))?,
        _ = cancel.cancelled() => return Err(Error::Cancelled),
    };

    tokio::select! {
        result = enrichment.resolve(&student, profiles.as_ref()) => result.map(|_| ()),
        _ = cancel.cancelled() => Err(Error::Cancelled),
    }
}

async fn produce(
    feed: Arc<dyn SessionFeed>,
    window: BillingWindow,
    registry: StudentRegistry,
    tx: mpsc::UnboundedSender<Arc<Student>>,
    cancel: CancellationToken,
) -> Result<Produced> {
    let result = paginate(feed.as_ref(), window, registry, &tx, &cancel).await;
    if let Err(ref e) = result {
        if !matches!(e, Error::Cancelled) {
            error!(error = %e, "Session feed failed, aborting run");
        }
        cancel.cancel();
    }
    // Dropping the sender here closes the queue
    result
}

async fn paginate(
    feed: &dyn SessionFeed,
    window: BillingWindow,
    mut registry: StudentRegistry,
    tx: &mpsc::UnboundedSender<Arc<Student>>,
    cancel: &CancellationToken,
) -> Result<Produced> {
    let mut aggregate = SessionAggregate::new();
    let mut enqueued: HashSet<StudentId> = HashSet::new();
    let mut before = window.cursor_start();
    let floor = window.cursor_floor();
    let mut pages_fetched = 0u64;

    while before > floor {
        let started = Instant::now();
        let page = tokio::select! {
            page = feed.fetch_sessions(before) => page?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };
        pages_fetched += 1;
        metrics().pages_fetched.inc();
        metrics()
            .page_fetch_latency_ms
            .observe(started.elapsed().as_millis() as u64);

        if page.is_empty() {
            debug!(cursor = %before, "Session feed exhausted");
            break;
        }

        let previous = before;
        let mut inserted = 0usize;

        for raw in &page {
            let record = raw.decode()?;
            metrics().sessions_seen.inc();

            // Cursor is the oldest session seen, not the last one
            before = before.min(record.timestamp.with_timezone(&Utc));

            if !window.accepts(record.timestamp) {
                metrics().sessions_skipped.inc();
                continue;
            }

            let students_before = registry.len();
            let pending = aggregate.add(&mut registry, record)?;
            if registry.len() > students_before {
                metrics().students_created.inc();
            }
            inserted += 1;
            metrics().sessions_inserted.inc();

            if let Some(student) = pending {
                if enqueued.insert(student.id().clone()) {
                    metrics().queue_depth.inc();
                    metrics().students_enqueued.inc();
                    if tx.send(student).is_err() {
                        // Consumer is gone, it already failed
                        metrics().queue_depth.dec();
                        return Err(Error::Cancelled);
                    }
                }
            }
        }

        if before >= previous {
            warn!(cursor = %previous, "Feed page did not move the cursor");
            return Err(Error::pagination(format!(
                "page of {} sessions did not move the cursor below {}",
                page.len(),
                previous
            )));
        }

        debug!(
            page = pages_fetched,
            sessions = page.len(),
            inserted,
            cursor = %before,
            "Fetched session page"
        );
    }

    Ok(Produced {
        aggregate,
        registry,
        pages_fetched,
    })
}
