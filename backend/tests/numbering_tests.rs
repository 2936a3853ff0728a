//! Document numbering tests

use std::collections::HashSet;
use std::sync::Arc;

use backend::clock::FixedClock;
use backend::services::DocumentNumberGenerator;
use backend::store::{MemoryStore, SequenceStore};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use shared::numbering::{DocumentKind, DocumentNumber};

fn generator() -> (DocumentNumberGenerator<MemoryStore>, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 3, 7, 9, 30, 0).unwrap(),
    ));
    (
        DocumentNumberGenerator::new(MemoryStore::new(), clock.clone()),
        clock,
    )
}

#[tokio::test]
async fn test_numbers_count_per_kind_and_day() {
    let (numbers, clock) = generator();

    assert_eq!(
        numbers.next_number(DocumentKind::PartSale).await.unwrap(),
        "SAL-20240307-0001"
    );
    assert_eq!(
        numbers.next_number(DocumentKind::PartSale).await.unwrap(),
        "SAL-20240307-0002"
    );
    assert_eq!(
        numbers.next_number(DocumentKind::PartPurchase).await.unwrap(),
        "PUR-20240307-0001"
    );

    clock.advance(Duration::days(1));
    assert_eq!(
        numbers.next_number(DocumentKind::PartSale).await.unwrap(),
        "SAL-20240308-0001"
    );
}

#[tokio::test]
async fn test_seed_continues_after_legacy_numbers() {
    let (numbers, _) = generator();
    let day = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();

    let highest = numbers
        .seed_from_existing(
            DocumentKind::PartSalesOrder,
            day,
            ["SO-20240307-0004", "SO-20240307-0012", "SO-20240306-0099", "garbage"],
        )
        .await
        .unwrap();
    assert_eq!(highest, 12);

    assert_eq!(
        numbers.next_number(DocumentKind::PartSalesOrder).await.unwrap(),
        "SO-20240307-0013"
    );
}

#[tokio::test]
async fn test_sequence_widens_past_four_digits() {
    let store = MemoryStore::new();
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap()));
    let day = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
    store
        .seed_sequence(DocumentKind::ServiceOrder, day, 9999)
        .await
        .unwrap();

    let numbers = DocumentNumberGenerator::new(store, clock);
    let number = numbers.next_number(DocumentKind::ServiceOrder).await.unwrap();
    assert_eq!(number, "SRV-20240307-10000");

    let parsed: DocumentNumber = number.parse().unwrap();
    assert_eq!(parsed.sequence, 10000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_numbers_are_unique() {
    let (numbers, _) = generator();
    let numbers = Arc::new(numbers);

    let mut handles = Vec::new();
    for _ in 0..50 {
        let numbers = numbers.clone();
        handles.push(tokio::spawn(async move {
            numbers.next_number(DocumentKind::PurchaseOrder).await.unwrap()
        }));
    }

    let mut issued = HashSet::new();
    for handle in handles {
        assert!(issued.insert(handle.await.unwrap()));
    }
    assert_eq!(issued.len(), 50);
    assert!(issued.contains("PO-20240307-0050"));
}
