//! Invoice projection over a full pipeline run.

use integration_tests::{
    fixtures,
    mocks::{MockFeed, MockProfiles},
    setup::TestContext,
};
use invoice_core::{Error, Invoice};
use std::time::Duration;

#[tokio::test]
async fn test_june_invoice() {
    let ctx = TestContext::new(
        MockFeed::new(fixtures::june_history()).with_page_size(4),
        MockProfiles::new().auto_financed(2),
    );
    let outcome = ctx.run_june().await.unwrap();

    let invoice = Invoice::build(&outcome.aggregate, Duration::from_secs(3)).unwrap();
    assert_eq!(invoice.year, 2021);
    assert_eq!(invoice.month, 6);

    let subtotal = |label: &str| {
        invoice
            .buckets
            .iter()
            .find(|b| b.label == label)
            .map(|b| b.subtotal())
            .unwrap_or_else(|| panic!("missing bucket {label}"))
    };

    // Alice is financed: full price, absences halved
    assert_eq!(subtotal("LEVEL 1 / F"), 60.0);
    assert_eq!(subtotal("LEVEL 1 / F noshow"), 15.0);
    // Bob pays for himself: half price, except for his presentation
    assert_eq!(subtotal("LEVEL 2 / AutoF"), 35.0);
    assert_eq!(subtotal("PRESENTATIONS LEVEL 3"), 40.0);
    assert_eq!(subtotal("LEVEL 3 / F"), 0.0);

    assert_eq!(invoice.total(), 150.0);
    assert_eq!(invoice.session_count(), 6);

    let auto_financed: Vec<_> = invoice
        .auto_financed_students
        .iter()
        .map(|s| s.name().to_string())
        .collect();
    assert_eq!(auto_financed, vec!["Bob Durand"]);

    // Chloe's session is not filled in yet
    assert_eq!(invoice.to_complete.len(), 1);
    assert_eq!(invoice.to_complete[0].student().name(), "Chloe Petit");
    assert_eq!(invoice.no_charge.len(), 1);
}

#[tokio::test]
async fn test_invoice_total_matches_aggregate() {
    let ctx = TestContext::new(
        MockFeed::new(fixtures::june_history()),
        MockProfiles::new().auto_financed(1).auto_financed(3),
    );
    let outcome = ctx.run_june().await.unwrap();

    let invoice = Invoice::build(&outcome.aggregate, Duration::ZERO).unwrap();
    assert_eq!(invoice.total(), outcome.aggregate.total());
}

#[tokio::test]
async fn test_empty_month_has_no_invoice() {
    let ctx = TestContext::new(
        MockFeed::new(vec![fixtures::session(
            1,
            "2021-05-12T10:00:00+0000",
            1,
            "Alice Martin",
        )]),
        MockProfiles::new(),
    );
    let outcome = ctx.run_june().await.unwrap();

    assert!(outcome.aggregate.is_empty());
    assert!(matches!(
        Invoice::build(&outcome.aggregate, Duration::ZERO),
        Err(Error::EmptyAggregate)
    ));
}
