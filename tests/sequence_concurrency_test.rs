mod common;

use std::collections::HashSet;

use common::TestApp;

// The issuer must hand out distinct, contiguous values under concurrent
// invocation for the same year: the increment is a single atomic upsert,
// never a read followed by a write.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_allocation_yields_distinct_contiguous_numbers() {
    let app = TestApp::new().await;
    let issuer = app.state.services.invoice_numbers.clone();

    let mut tasks = Vec::new();
    for _ in 0..1000 {
        let issuer = issuer.clone();
        tasks.push(tokio::spawn(
            async move { issuer.next_sequence(2025).await },
        ));
    }

    let mut numbers = Vec::with_capacity(1000);
    for task in tasks {
        numbers.push(task.await.expect("join").expect("allocate"));
    }

    let distinct: HashSet<i64> = numbers.iter().copied().collect();
    assert_eq!(distinct.len(), 1000, "no duplicates");

    let min = *numbers.iter().min().unwrap();
    let max = *numbers.iter().max().unwrap();
    assert_eq!(min, 1);
    assert_eq!(max, 1000, "no gaps");
}

#[tokio::test]
async fn years_count_independently() {
    let app = TestApp::new().await;
    let issuer = &app.state.services.invoice_numbers;

    assert_eq!(issuer.next_sequence(2024).await.unwrap(), 1);
    assert_eq!(issuer.next_sequence(2025).await.unwrap(), 1);
    assert_eq!(issuer.next_sequence(2025).await.unwrap(), 2);
    assert_eq!(issuer.next_sequence(2024).await.unwrap(), 2);

    assert_eq!(
        issuer.next_invoice_number(2025).await.unwrap(),
        "INV-2025-0003"
    );
}
