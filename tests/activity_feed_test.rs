mod common;

use std::collections::HashSet;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use clientdesk::entities::activity::{ActivityPayload, EntityKind};

use common::TestApp;

fn sample_payload(kind: EntityKind, n: i64) -> ActivityPayload {
    match kind {
        EntityKind::Contact => ActivityPayload::ContactCreated {
            name: format!("Contact {n}"),
        },
        EntityKind::Enquiry => ActivityPayload::StageChanged {
            from: "NEW".into(),
            to: "QUOTED".into(),
        },
        EntityKind::Booking => ActivityPayload::BookingStatusChanged {
            from: "SCHEDULED".into(),
            to: "CONFIRMED".into(),
        },
        EntityKind::Invoice => ActivityPayload::PaymentRecorded {
            amount: dec!(10.00),
            method: "CARD".into(),
            invoice_number: format!("INV-2025-{n:04}"),
        },
    }
}

#[tokio::test]
async fn one_page_holds_all_sources_in_global_order() {
    let app = TestApp::new().await;
    let base = Utc::now();

    // four sources, three items each, interleaved in time
    let kinds = [
        EntityKind::Contact,
        EntityKind::Enquiry,
        EntityKind::Booking,
        EntityKind::Invoice,
    ];
    for (k, kind) in kinds.iter().enumerate() {
        for i in 0..3 {
            let created_at = base - Duration::minutes((i * 4 + k as i64) * 7);
            app.seed_activity(Uuid::new_v4(), sample_payload(*kind, i), created_at)
                .await;
        }
    }

    let page = app
        .state
        .services
        .activity_feed
        .feed(1, 20, None)
        .await
        .unwrap();

    assert_eq!(page.total, 12);
    assert_eq!(page.items.len(), 12);
    assert!(!page.has_more);

    for window in page.items.windows(2) {
        assert!(
            window[0].created_at >= window[1].created_at,
            "feed must be createdAt-descending"
        );
    }

    let kinds_seen: HashSet<EntityKind> = page.items.iter().map(|i| i.entity_kind).collect();
    assert_eq!(kinds_seen.len(), 4);
}

#[tokio::test]
async fn pagination_is_exact_across_pages() {
    let app = TestApp::new().await;
    let base = Utc::now();

    let kinds = [
        EntityKind::Contact,
        EntityKind::Enquiry,
        EntityKind::Booking,
        EntityKind::Invoice,
    ];
    let mut seeded = HashSet::new();
    for (k, kind) in kinds.iter().enumerate() {
        for i in 0..3 {
            let created_at = base - Duration::seconds(i * 40 + k as i64);
            let row = app
                .seed_activity(Uuid::new_v4(), sample_payload(*kind, i), created_at)
                .await;
            seeded.insert(row.id);
        }
    }

    let first = app
        .state
        .services
        .activity_feed
        .feed(1, 10, None)
        .await
        .unwrap();
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total, 12);
    assert!(first.has_more);

    let second = app
        .state
        .services
        .activity_feed
        .feed(2, 10, None)
        .await
        .unwrap();
    assert_eq!(second.items.len(), 2);
    assert!(!second.has_more);

    let mut collected: Vec<_> = first.items;
    collected.extend(second.items);
    let ids: HashSet<Uuid> = collected.iter().map(|i| i.id).collect();
    assert_eq!(ids, seeded, "no item may be duplicated or dropped");
}

#[tokio::test]
async fn skewed_sources_do_not_starve_the_merge() {
    let app = TestApp::new().await;
    let base = Utc::now();

    // one source dominates the recent history; a naive over-fetch would
    // drop the sparse sources' older items from later pages
    let mut seeded = HashSet::new();
    for i in 0..25 {
        let row = app
            .seed_activity(
                Uuid::new_v4(),
                sample_payload(EntityKind::Invoice, i),
                base - Duration::seconds(i),
            )
            .await;
        seeded.insert(row.id);
    }
    for i in 0..5 {
        let row = app
            .seed_activity(
                Uuid::new_v4(),
                sample_payload(EntityKind::Contact, i),
                base - Duration::seconds(100 + i),
            )
            .await;
        seeded.insert(row.id);
    }

    let mut collected = Vec::new();
    let mut page_number = 1;
    loop {
        let page = app
            .state
            .services
            .activity_feed
            .feed(page_number, 10, None)
            .await
            .unwrap();
        assert_eq!(page.total, 30);
        collected.extend(page.items);
        if !page.has_more {
            break;
        }
        page_number += 1;
    }

    assert_eq!(collected.len(), 30);
    for window in collected.windows(2) {
        assert!(window[0].created_at >= window[1].created_at);
    }
    let ids: HashSet<Uuid> = collected.iter().map(|i| i.id).collect();
    assert_eq!(ids, seeded);
}

#[tokio::test]
async fn single_kind_filter_uses_source_pagination() {
    let app = TestApp::new().await;
    let base = Utc::now();

    for i in 0..7 {
        app.seed_activity(
            Uuid::new_v4(),
            sample_payload(EntityKind::Booking, i),
            base - Duration::seconds(i),
        )
        .await;
    }
    for i in 0..4 {
        app.seed_activity(
            Uuid::new_v4(),
            sample_payload(EntityKind::Contact, i),
            base - Duration::seconds(i),
        )
        .await;
    }

    let page = app
        .state
        .services
        .activity_feed
        .feed(2, 5, Some(EntityKind::Booking))
        .await
        .unwrap();

    assert_eq!(page.total, 7);
    assert_eq!(page.items.len(), 2);
    assert!(!page.has_more);
    assert!(page
        .items
        .iter()
        .all(|item| item.entity_kind == EntityKind::Booking));
}

#[tokio::test]
async fn feed_rejects_out_of_range_paging() {
    let app = TestApp::new().await;

    assert!(app
        .state
        .services
        .activity_feed
        .feed(0, 10, None)
        .await
        .is_err());
    assert!(app
        .state
        .services
        .activity_feed
        .feed(1, 0, None)
        .await
        .is_err());
    assert!(app
        .state
        .services
        .activity_feed
        .feed(1, 500, None)
        .await
        .is_err());
}

#[tokio::test]
async fn empty_feed_is_a_valid_page() {
    let app = TestApp::new().await;

    let page = app
        .state
        .services
        .activity_feed
        .feed(1, 10, None)
        .await
        .unwrap();
    assert_eq!(page.total, 0);
    assert!(page.items.is_empty());
    assert!(!page.has_more);
}
