//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use backend::clock::FixedClock;
use backend::config::{AlertConfig, LedgerConfig};
use backend::services::{RecordSale, ReceivePurchase, SaleOutcome, StockChange};
use backend::store::MemoryStore;
use backend::{AppResult, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use shared::{Margin, MovementReference, NewPart, Part};
use uuid::Uuid;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
}

pub struct Harness {
    pub store: MemoryStore,
    pub clock: Arc<FixedClock>,
    pub engine: Engine<MemoryStore>,
    pub actor: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(FixedClock::new(start_time()));
        let engine = Engine::with_parts(
            store.clone(),
            clock.clone(),
            &LedgerConfig::default(),
            &AlertConfig::default(),
        );

        Self {
            store,
            clock,
            engine,
            actor: Uuid::new_v4(),
        }
    }

    pub fn tick(&self) {
        self.clock.advance(Duration::minutes(1));
    }

    pub async fn part(&self, sku: &str, minimal_stock: i64) -> Part {
        self.engine
            .inventory
            .create_part(NewPart {
                sku: sku.to_string(),
                name: format!("Part {}", sku),
                minimal_stock,
                buy_price: 100,
                sell_price: 150,
            })
            .await
            .unwrap()
    }

    /// Receive a new purchase batch one minute after the previous write
    pub async fn receive(&self, part_id: Uuid, quantity: i64, unit_cost: i64) -> StockChange {
        self.tick();
        let purchase_id = Uuid::new_v4();
        self.store
            .register_document(MovementReference::PurchaseReceipt(purchase_id))
            .await;

        self.engine
            .inventory
            .receive_purchase(ReceivePurchase {
                part_id,
                purchase_id,
                purchase_number: Some(format!("PUR-20240301-{}", &purchase_id.simple().to_string()[..4])),
                quantity,
                unit_cost,
                supplier_id: None,
                actor_id: self.actor,
                notes: None,
            })
            .await
            .unwrap()
    }

    pub async fn sale_document(&self) -> MovementReference {
        let reference = MovementReference::SaleDocument(Uuid::new_v4());
        self.store.register_document(reference).await;
        reference
    }

    pub async fn sell(&self, part_id: Uuid, quantity: i64) -> AppResult<SaleOutcome> {
        self.sell_with_margin(part_id, quantity, None).await
    }

    pub async fn sell_with_margin(
        &self,
        part_id: Uuid,
        quantity: i64,
        margin: Option<Margin>,
    ) -> AppResult<SaleOutcome> {
        self.tick();
        let reference = self.sale_document().await;
        self.engine
            .inventory
            .record_sale(RecordSale {
                part_id,
                quantity,
                reference,
                reference_number: Some("SAL-20240301-0001".to_string()),
                margin,
                actor_id: self.actor,
            })
            .await
    }

    pub async fn stock(&self, part_id: Uuid) -> i64 {
        self.engine.inventory.current_stock(part_id).await.unwrap()
    }

    pub async fn assert_ledger_consistent(&self, part_id: Uuid) {
        let audit = self.engine.reporting.verify_ledger(part_id).await.unwrap();
        assert!(audit.is_consistent(), "ledger out of sync: {:?}", audit);
    }
}
