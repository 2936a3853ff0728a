//! FIFO allocation tests
//!
//! Sales draw from the oldest purchase batch first, are all-or-nothing and
//! report quantity-weighted cost and selling prices.

mod common;

use backend::services::SaleLineInput;
use backend::store::{ConsumptionFilter, InventoryStore};
use backend::AppError;
use common::Harness;
use rust_decimal_macros::dec;
use shared::{Margin, MovementType};

// ============================================================================
// Allocation Order
// ============================================================================

#[tokio::test]
async fn test_sale_spans_batches_oldest_first() {
    let h = Harness::new();
    let part = h.part("BRK-001", 0).await;
    let b1 = h.receive(part.id, 5, 100).await.movements[0].batch_id.unwrap();
    let b2 = h.receive(part.id, 5, 120).await.movements[0].batch_id.unwrap();

    let outcome = h.sell(part.id, 7).await.unwrap();

    let drawn: Vec<_> = outcome
        .allocations
        .iter()
        .map(|a| (a.batch_id, a.quantity, a.unit_cost))
        .collect();
    assert_eq!(drawn, vec![(b1, 5, 100), (b2, 2, 120)]);

    // (5 x 100 + 2 x 120) / 7 = 105.71
    let weighted = outcome.weighted.unwrap();
    assert_eq!(weighted.cost_price, 106);
    // no margin: every unit sells at the part's list price
    assert_eq!(weighted.selling_price, 150);

    assert_eq!(outcome.change.new_stock, 3);
    assert_eq!(outcome.change.movements.len(), 2);
    assert!(outcome
        .change
        .movements
        .iter()
        .all(|m| m.movement_type == MovementType::Sale));

    assert_eq!(h.store.batch_availability(b1).await.unwrap().remaining_quantity, 0);
    assert_eq!(h.store.batch_availability(b2).await.unwrap().remaining_quantity, 3);
    h.assert_ledger_consistent(part.id).await;
}

#[tokio::test]
async fn test_margin_prices_each_batch_from_its_cost() {
    let h = Harness::new();
    let part = h.part("BRK-002", 0).await;
    h.receive(part.id, 5, 100).await;
    h.receive(part.id, 5, 120).await;

    let outcome = h
        .sell_with_margin(part.id, 7, Some(Margin::Percent(dec!(20))))
        .await
        .unwrap();

    let prices: Vec<i64> = outcome
        .allocations
        .iter()
        .map(|a| a.unit_selling_price)
        .collect();
    assert_eq!(prices, vec![120, 144]);
    // (5 x 120 + 2 x 144) / 7 = 126.86
    assert_eq!(outcome.weighted.unwrap().selling_price, 127);
}

#[tokio::test]
async fn test_exhausted_batch_is_skipped() {
    let h = Harness::new();
    let part = h.part("BRK-003", 0).await;
    h.receive(part.id, 5, 100).await;
    let b2 = h.receive(part.id, 5, 120).await.movements[0].batch_id.unwrap();

    h.sell(part.id, 5).await.unwrap();
    let outcome = h.sell(part.id, 3).await.unwrap();

    assert_eq!(outcome.allocations.len(), 1);
    assert_eq!(outcome.allocations[0].batch_id, b2);
    assert_eq!(outcome.weighted.unwrap().cost_price, 120);
}

#[tokio::test]
async fn test_batches_received_in_the_same_instant_keep_write_order() {
    let h = Harness::new();
    let part = h.part("BRK-004", 0).await;

    // receive without moving the clock
    let mut batches = Vec::new();
    for cost in [100, 200] {
        let purchase_id = uuid::Uuid::new_v4();
        h.store
            .register_document(shared::MovementReference::PurchaseReceipt(purchase_id))
            .await;
        let change = h
            .engine
            .inventory
            .receive_purchase(backend::services::ReceivePurchase {
                part_id: part.id,
                purchase_id,
                purchase_number: None,
                quantity: 2,
                unit_cost: cost,
                supplier_id: None,
                actor_id: h.actor,
                notes: None,
            })
            .await
            .unwrap();
        batches.push(change.movements[0].batch_id.unwrap());
    }

    let plan = h
        .engine
        .inventory
        .allocator()
        .allocate_stock(part.id, 3, None)
        .await
        .unwrap();
    assert_eq!(plan[0].batch_id, batches[0]);
    assert_eq!(plan[0].quantity, 2);
    assert_eq!(plan[1].batch_id, batches[1]);
    assert_eq!(plan[1].quantity, 1);
}

// ============================================================================
// All-or-nothing
// ============================================================================

#[tokio::test]
async fn test_short_sale_writes_nothing() {
    let h = Harness::new();
    let part = h.part("BRK-005", 0).await;
    h.receive(part.id, 4, 100).await;
    h.receive(part.id, 6, 120).await;

    let err = h.sell(part.id, 11).await.unwrap_err();
    match err {
        AppError::InsufficientStock {
            part_id,
            requested,
            available,
        } => {
            assert_eq!(part_id, part.id);
            assert_eq!(requested, 11);
            assert_eq!(available, 10);
        }
        other => panic!("unexpected error {:?}", other),
    }

    assert_eq!(h.stock(part.id).await, 10);
    let ledger = h.store.part_ledger(part.id).await.unwrap();
    assert!(ledger.iter().all(|m| m.movement_type == MovementType::PurchaseReceived));
    let consumptions = h
        .store
        .list_consumptions(&ConsumptionFilter::default())
        .await
        .unwrap();
    assert!(consumptions.is_empty());
}

#[tokio::test]
async fn test_allocate_stock_is_read_only() {
    let h = Harness::new();
    let part = h.part("BRK-006", 0).await;
    let batch = h.receive(part.id, 5, 100).await.movements[0].batch_id.unwrap();

    let plan = h
        .engine
        .inventory
        .allocator()
        .allocate_stock(part.id, 4, Some(Margin::Fixed(25)))
        .await
        .unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].unit_selling_price, 125);

    assert_eq!(h.stock(part.id).await, 5);
    assert_eq!(h.store.batch_availability(batch).await.unwrap().remaining_quantity, 5);
}

#[tokio::test]
async fn test_multi_line_sale_rolls_back_every_line() {
    let h = Harness::new();
    let brake = h.part("BRK-007", 0).await;
    let filter = h.part("FLT-001", 0).await;
    h.receive(brake.id, 5, 100).await;
    h.receive(filter.id, 1, 300).await;

    let reference = h.sale_document().await;
    let err = h
        .engine
        .inventory
        .fulfil_sale_lines(
            reference,
            None,
            vec![
                SaleLineInput {
                    part_id: brake.id,
                    quantity: 3,
                    margin: None,
                },
                SaleLineInput {
                    part_id: filter.id,
                    quantity: 2,
                    margin: None,
                },
            ],
            h.actor,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InsufficientStock { .. }));
    assert_eq!(h.stock(brake.id).await, 5);
    assert_eq!(h.stock(filter.id).await, 1);
}

#[tokio::test]
async fn test_sale_needs_a_sale_reference() {
    let h = Harness::new();
    let part = h.part("BRK-008", 0).await;
    h.receive(part.id, 5, 100).await;

    let err = h
        .engine
        .inventory
        .record_sale(backend::services::RecordSale {
            part_id: part.id,
            quantity: 1,
            reference: shared::MovementReference::ManualAdjustment(uuid::Uuid::new_v4()),
            reference_number: None,
            margin: None,
            actor_id: h.actor,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidReference(_)));
}

#[tokio::test]
async fn test_negative_margin_rejected() {
    let h = Harness::new();
    let part = h.part("BRK-009", 0).await;
    h.receive(part.id, 5, 100).await;

    let err = h
        .sell_with_margin(part.id, 1, Some(Margin::Fixed(-1)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
}
