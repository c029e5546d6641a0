//! Ingestion pipeline against scripted feed and profile mocks.
//!
//! Every run bills June 2021 unless stated otherwise; see
//! `fixtures::june_history` for the session layout.

use chrono::{TimeZone, Utc};
use integration_tests::{
    fixtures,
    mocks::{MockFeed, MockProfiles},
    setup::{june, TestContext},
};
use invoice_core::{
    Error, FinancedStatus, SessionId, StudentId, StudentRegistry, StudentSnapshot,
};
use std::time::Duration;

fn session_ids(outcome: &worker::PipelineOutcome) -> Vec<String> {
    let mut ids: Vec<String> = outcome
        .aggregate
        .filter(&invoice_core::SessionFilter::new().any_kind())
        .iter()
        .map(|s| s.id().as_str().to_string())
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_only_billing_month_sessions_are_kept() {
    let ctx = TestContext::new(MockFeed::new(fixtures::june_history()), MockProfiles::new());

    let outcome = ctx.run_june().await.expect("run should succeed");

    assert_eq!(outcome.aggregate.len(), 7);
    for outside in [100, 101, 200, 201] {
        assert!(outcome.aggregate.get(&SessionId::from(outside)).is_none());
    }
    // Students only seen outside the month are never created
    assert_eq!(outcome.registry.len(), 3);
    assert!(outcome.registry.get(&StudentId::from(4)).is_none());
    assert!(outcome.registry.get(&StudentId::from(5)).is_none());
    assert_eq!(outcome.pages_fetched, 1);
}

#[tokio::test]
async fn test_cursor_walks_strictly_backward() {
    let ctx = TestContext::new(
        MockFeed::new(fixtures::june_history()).with_page_size(2),
        MockProfiles::new(),
    );

    let outcome = ctx.run_june().await.unwrap();
    let cursors = ctx.feed.cursors();

    // Starts past the end of the month to cover every UTC offset
    assert_eq!(cursors[0], Utc.with_ymd_and_hms(2021, 7, 1, 14, 0, 0).unwrap());
    assert!(cursors.windows(2).all(|w| w[1] < w[0]));
    // Stops once a page reaches far enough back into May
    assert_eq!(cursors.len(), 5);
    assert_eq!(outcome.pages_fetched, 5);
    assert_eq!(outcome.aggregate.len(), 7);
}

#[tokio::test]
async fn test_page_order_does_not_matter() {
    let ordered = TestContext::new(
        MockFeed::new(fixtures::june_history()).with_page_size(3),
        MockProfiles::new(),
    );
    let reversed = TestContext::new(
        MockFeed::new(fixtures::june_history())
            .with_page_size(3)
            .with_reversed_pages(),
        MockProfiles::new(),
    );

    let ordered = ordered.run_june().await.unwrap();
    let reversed = reversed.run_june().await.unwrap();

    assert_eq!(session_ids(&ordered), session_ids(&reversed));
    assert_eq!(ordered.aggregate.total(), reversed.aggregate.total());
}

#[tokio::test]
async fn test_month_follows_local_time() {
    let mut history = fixtures::june_history();
    // Late May and late June in UTC, early June and early July in Paris
    history.push(fixtures::session(900, "2021-06-01T00:30:00+0200", 1, "Alice Martin"));
    history.push(fixtures::session(901, "2021-07-01T00:30:00+0200", 1, "Alice Martin"));
    // Early July in UTC, still June in New York
    history.push(fixtures::session(902, "2021-06-30T22:00:00-0400", 3, "Chloe Petit"));
    let ctx = TestContext::new(
        MockFeed::new(history).with_page_size(2),
        MockProfiles::new(),
    );

    let outcome = ctx.run_june().await.unwrap();

    assert!(outcome.aggregate.get(&SessionId::from(900)).is_some());
    assert!(outcome.aggregate.get(&SessionId::from(901)).is_none());
    assert!(outcome.aggregate.get(&SessionId::from(902)).is_some());
    assert_eq!(outcome.aggregate.len(), 9);
}

#[tokio::test]
async fn test_future_sessions_are_left_out() {
    let ctx = TestContext::new(MockFeed::new(fixtures::june_history()), MockProfiles::new());
    let window = june().with_now(Utc.with_ymd_and_hms(2021, 6, 15, 12, 0, 0).unwrap());

    let outcome = ctx
        .pipeline
        .run(window, StudentRegistry::new())
        .await
        .unwrap();

    assert_eq!(session_ids(&outcome), vec!["1", "2", "3", "4", "5"]);
    assert!(outcome.registry.get(&StudentId::from(3)).is_none());
}

#[tokio::test]
async fn test_duplicate_records_are_merged() {
    let mut history = fixtures::june_history();
    history.push(fixtures::session_with(
        4,
        "2021-06-10T16:00:00+0000",
        2,
        "Bob Durand",
        2,
        "completed",
    ));
    let ctx = TestContext::new(MockFeed::new(history), MockProfiles::new());

    let outcome = ctx.run_june().await.unwrap();
    assert_eq!(outcome.aggregate.len(), 7);
}

#[tokio::test]
async fn test_each_student_enriched_once() {
    // Small pages spread Alice's sessions over several pages
    let ctx = TestContext::new(
        MockFeed::new(fixtures::june_history()).with_page_size(2),
        MockProfiles::new().auto_financed(2),
    );

    let outcome = ctx.run_june().await.unwrap();

    assert_eq!(ctx.profiles.calls_for(1), 1);
    assert_eq!(ctx.profiles.calls_for(2), 1);
    assert_eq!(ctx.profiles.calls_for(3), 1);
    assert_eq!(outcome.students_enriched, 3);

    let status = |id: u64| outcome.registry.get(&StudentId::from(id)).unwrap().financed();
    assert_eq!(status(1), FinancedStatus::Financed);
    assert_eq!(status(2), FinancedStatus::AutoFinanced);
    assert_eq!(status(3), FinancedStatus::Financed);
}

#[tokio::test]
async fn test_every_student_resolved_when_run_returns() {
    let ctx = TestContext::new(
        MockFeed::new(fixtures::june_history()),
        MockProfiles::new().with_delay(Duration::from_millis(30)),
    );

    let outcome = ctx.run_june().await.unwrap();

    for snapshot in outcome.registry.snapshot() {
        assert!(
            snapshot.financed.is_resolved(),
            "{} still unresolved",
            snapshot.name
        );
    }
}

#[tokio::test]
async fn test_enrichment_concurrency_is_bounded() {
    let history: Vec<_> = (1..=12)
        .map(|i| {
            fixtures::session(
                i,
                &format!("2021-06-{:02}T10:00:00+0000", i),
                i,
                &format!("Student {i}"),
            )
        })
        .collect();
    let ctx = TestContext::with_workers(
        MockFeed::new(history),
        MockProfiles::new().with_delay(Duration::from_millis(20)),
        2,
    );

    let outcome = ctx.run_june().await.unwrap();

    assert_eq!(ctx.profiles.total_calls(), 12);
    assert_eq!(outcome.students_enriched, 12);
    assert!(ctx.profiles.peak_in_flight() <= 2);
}

#[tokio::test]
async fn test_known_students_skip_enrichment() {
    let mut registry = StudentRegistry::new();
    registry.merge([
        StudentSnapshot {
            student_id: StudentId::from(1),
            name: "Alice Martin".into(),
            financed: FinancedStatus::Financed,
        },
        StudentSnapshot {
            student_id: StudentId::from(2),
            name: "Bob Durand".into(),
            financed: FinancedStatus::AutoFinanced,
        },
    ]);
    let ctx = TestContext::new(MockFeed::new(fixtures::june_history()), MockProfiles::new());

    let outcome = ctx.pipeline.run(june(), registry).await.unwrap();

    assert_eq!(ctx.profiles.calls_for(1), 0);
    assert_eq!(ctx.profiles.calls_for(2), 0);
    assert_eq!(ctx.profiles.calls_for(3), 1);
    assert_eq!(outcome.students_enriched, 1);
}

#[tokio::test]
async fn test_nameless_recipient_needs_a_known_student() {
    let history = vec![
        fixtures::session(1, "2021-06-01T08:00:00+0000", 1, "Alice Martin"),
        fixtures::anonymous_session(2, "2021-06-02T08:00:00+0000", 9),
    ];

    let ctx = TestContext::new(MockFeed::new(history.clone()), MockProfiles::new());
    assert!(matches!(ctx.run_june().await, Err(Error::Parse(_))));

    let mut registry = StudentRegistry::new();
    registry.merge([StudentSnapshot {
        student_id: StudentId::from(9),
        name: "Known Student".into(),
        financed: FinancedStatus::Financed,
    }]);
    let ctx = TestContext::new(MockFeed::new(history), MockProfiles::new());
    let outcome = ctx.pipeline.run(june(), registry).await.unwrap();
    assert_eq!(outcome.aggregate.len(), 2);
}

#[tokio::test]
async fn test_unparseable_profile_aborts_run() {
    let ctx = TestContext::new(
        MockFeed::new(fixtures::june_history()),
        MockProfiles::new().with_page(3, fixtures::BROKEN_PAGE),
    );

    let result = ctx.run_june().await;
    match result {
        Err(Error::Parse(msg)) => assert!(msg.contains('3'), "unexpected message: {msg}"),
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_profile_failure_aborts_run() {
    let ctx = TestContext::new(
        MockFeed::new(fixtures::june_history()).with_page_size(2),
        MockProfiles::new().failing_for(2),
    );

    assert!(matches!(ctx.run_june().await, Err(Error::Http(_))));
}

#[tokio::test]
async fn test_feed_failure_aborts_run() {
    let ctx = TestContext::new(
        MockFeed::new(fixtures::june_history())
            .with_page_size(2)
            .failing_on_call(2),
        MockProfiles::new(),
    );

    assert!(matches!(ctx.run_june().await, Err(Error::Http(_))));
    assert_eq!(ctx.feed.call_count(), 2);
}

#[tokio::test]
async fn test_malformed_record_aborts_run() {
    let mut history = fixtures::june_history();
    let mut bad = fixtures::session(50, "2021-06-20T10:00:00+0000", 1, "Alice Martin");
    bad["projectLevel"] = serde_json::json!("7");
    history.push(bad);
    let ctx = TestContext::new(MockFeed::new(history), MockProfiles::new());

    assert!(matches!(ctx.run_june().await, Err(Error::Parse(_))));
}

#[tokio::test]
async fn test_stalled_feed_is_detected() {
    let ctx = TestContext::new(
        MockFeed::new(fixtures::june_history())
            .with_page_size(3)
            .stuck(),
        MockProfiles::new(),
    );

    assert!(matches!(ctx.run_june().await, Err(Error::Pagination(_))));
    assert_eq!(ctx.feed.call_count(), 2);
}

#[tokio::test]
async fn test_empty_feed_ends_run() {
    let ctx = TestContext::new(MockFeed::new(Vec::new()), MockProfiles::new());

    let outcome = ctx.run_june().await.unwrap();
    assert!(outcome.aggregate.is_empty());
    assert_eq!(outcome.pages_fetched, 1);
}

#[tokio::test]
async fn test_cancellation_stops_run() {
    let ctx = TestContext::new(
        MockFeed::new(fixtures::june_history())
            .with_page_size(1)
            .with_delay(Duration::from_millis(200)),
        MockProfiles::new(),
    );

    let token = ctx.pipeline.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    assert!(matches!(ctx.run_june().await, Err(Error::Cancelled)));
}

#[tokio::test]
async fn test_resolved_students_persist_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("students.json");

    let first = TestContext::new(
        MockFeed::new(fixtures::june_history()),
        MockProfiles::new().auto_financed(2),
    );
    let registry = StudentRegistry::persistent(&path).unwrap();
    first.pipeline.run(june(), registry).await.unwrap();
    assert_eq!(first.profiles.total_calls(), 3);

    let reloaded = StudentRegistry::persistent(&path).unwrap();
    assert_eq!(reloaded.len(), 3);
    assert_eq!(
        reloaded.get(&StudentId::from(2)).unwrap().financed(),
        FinancedStatus::AutoFinanced
    );

    let second = TestContext::new(MockFeed::new(fixtures::june_history()), MockProfiles::new());
    let outcome = second.pipeline.run(june(), reloaded).await.unwrap();
    assert_eq!(second.profiles.total_calls(), 0);
    assert_eq!(outcome.students_enriched, 0);
}
