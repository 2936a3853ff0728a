//! In-process store used by tests and local tooling
//!
//! A unit of work holds the single state lock for its whole lifetime and
//! edits a private copy; commit swaps the copy in, drop throws it away.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::numbering::DocumentKind;
use shared::{
    BatchAvailability, BatchConsumption, LowStockAlert, MovementReference, NewPart,
    PaginatedResponse, Part, PurchaseBatch, StockMovement,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    ConsumptionFilter, InventoryStore, MovementFilter, NewBatch, NewConsumption,
    NewMovementRecord, SequenceStore, StoreTx,
};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    parts: HashMap<Uuid, Part>,
    movements: Vec<StockMovement>,
    batches: Vec<PurchaseBatch>,
    consumptions: Vec<BatchConsumption>,
    alerts: HashMap<Uuid, LowStockAlert>,
    documents: HashSet<MovementReference>,
    last_sequence: i64,
}

impl MemoryState {
    fn next_sequence(&mut self) -> i64 {
        self.last_sequence += 1;
        self.last_sequence
    }

    fn availability(&self, batch: &PurchaseBatch) -> BatchAvailability {
        let consumed: i64 = self
            .consumptions
            .iter()
            .filter(|c| c.batch_id == batch.id)
            .map(|c| c.quantity)
            .sum();
        BatchAvailability {
            batch: batch.clone(),
            remaining_quantity: batch.quantity - consumed,
        }
    }

    fn movement_mut(&mut self, movement_id: Uuid) -> AppResult<&mut StockMovement> {
        self.movements
            .iter_mut()
            .find(|m| m.id == movement_id)
            .ok_or_else(|| AppError::NotFound(format!("Stock movement {}", movement_id)))
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    sequences: Arc<Mutex<HashMap<(DocumentKind, NaiveDate), u32>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a document visible to reference checks
    pub async fn register_document(&self, reference: MovementReference) {
        self.state.lock().await.documents.insert(reference);
    }

    /// Simulate deleting a document out from under its movements
    pub async fn remove_document(&self, reference: &MovementReference) {
        self.state.lock().await.documents.remove(reference);
    }

    pub async fn soft_delete_part(&self, part_id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let part = state
            .parts
            .get_mut(&part_id)
            .ok_or_else(|| AppError::NotFound(format!("Part {}", part_id)))?;
        part.deleted_at = Some(at);
        Ok(())
    }

    /// Overwrite stock without a movement, as a bulk import would
    pub async fn write_stock_bypassing_ledger(&self, part_id: Uuid, stock: i64) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let part = state
            .parts
            .get_mut(&part_id)
            .ok_or_else(|| AppError::NotFound(format!("Part {}", part_id)))?;
        part.stock = stock;
        part.version += 1;
        Ok(())
    }

    pub async fn batch_availability(&self, batch_id: Uuid) -> Option<BatchAvailability> {
        let state = self.state.lock().await;
        state
            .batches
            .iter()
            .find(|b| b.id == batch_id)
            .map(|b| state.availability(b))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl InventoryStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> AppResult<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTx { guard, work })
    }

    async fn find_part(&self, part_id: Uuid) -> AppResult<Option<Part>> {
        Ok(self.state.lock().await.parts.get(&part_id).cloned())
    }

    async fn list_movements(
        &self,
        filter: &MovementFilter,
    ) -> AppResult<PaginatedResponse<StockMovement>> {
        let state = self.state.lock().await;
        let mut movements: Vec<StockMovement> = state
            .movements
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        movements.sort_by(|a, b| (b.created_at, b.sequence).cmp(&(a.created_at, a.sequence)));
        Ok(PaginatedResponse::from_all(movements, filter.pagination))
    }

    async fn part_ledger(&self, part_id: Uuid) -> AppResult<Vec<StockMovement>> {
        let state = self.state.lock().await;
        let mut movements: Vec<StockMovement> = state
            .movements
            .iter()
            .filter(|m| m.part_id == part_id)
            .cloned()
            .collect();
        movements.sort_by_key(|m| m.sequence);
        Ok(movements)
    }

    async fn list_consumptions(
        &self,
        filter: &ConsumptionFilter,
    ) -> AppResult<Vec<BatchConsumption>> {
        let state = self.state.lock().await;
        Ok(state
            .consumptions
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    async fn list_alerts(&self, unread_only: bool) -> AppResult<Vec<LowStockAlert>> {
        let state = self.state.lock().await;
        let mut alerts: Vec<LowStockAlert> = state
            .alerts
            .values()
            .filter(|a| !unread_only || !a.is_read)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_part(&mut self, part: NewPart, at: DateTime<Utc>) -> AppResult<Part> {
        if self
            .work
            .parts
            .values()
            .any(|p| p.sku == part.sku && !p.is_deleted())
        {
            return Err(AppError::validation("sku", "SKU already exists"));
        }

        let part = Part {
            id: Uuid::new_v4(),
            sku: part.sku,
            name: part.name,
            stock: 0,
            minimal_stock: part.minimal_stock,
            buy_price: part.buy_price,
            sell_price: part.sell_price,
            version: 0,
            deleted_at: None,
            created_at: at,
            updated_at: at,
        };
        self.work.parts.insert(part.id, part.clone());
        Ok(part)
    }

    async fn lock_part(&mut self, part_id: Uuid) -> AppResult<Part> {
        self.work
            .parts
            .get(&part_id)
            .filter(|p| !p.is_deleted())
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Part {}", part_id)))
    }

    async fn write_part_stock(
        &mut self,
        part: &Part,
        new_stock: i64,
        at: DateTime<Utc>,
    ) -> AppResult<Part> {
        let stored = self
            .work
            .parts
            .get_mut(&part.id)
            .ok_or_else(|| AppError::NotFound(format!("Part {}", part.id)))?;
        if stored.version != part.version {
            return Err(AppError::ConcurrencyConflict(format!("Part {}", part.id)));
        }
        stored.stock = new_stock;
        stored.version += 1;
        stored.updated_at = at;
        Ok(stored.clone())
    }

    async fn write_minimal_stock(
        &mut self,
        part: &Part,
        minimal_stock: i64,
        at: DateTime<Utc>,
    ) -> AppResult<Part> {
        let stored = self
            .work
            .parts
            .get_mut(&part.id)
            .ok_or_else(|| AppError::NotFound(format!("Part {}", part.id)))?;
        if stored.version != part.version {
            return Err(AppError::ConcurrencyConflict(format!("Part {}", part.id)));
        }
        stored.minimal_stock = minimal_stock;
        stored.version += 1;
        stored.updated_at = at;
        Ok(stored.clone())
    }

    async fn list_parts(&mut self) -> AppResult<Vec<Part>> {
        let mut parts: Vec<Part> = self.work.parts.values().cloned().collect();
        parts.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(parts)
    }

    async fn append_movement(&mut self, movement: NewMovementRecord) -> AppResult<StockMovement> {
        let sequence = self.work.next_sequence();
        let movement = StockMovement {
            id: Uuid::new_v4(),
            sequence,
            part_id: movement.part_id,
            movement_type: movement.movement_type,
            quantity: movement.quantity,
            before_stock: movement.before_stock,
            after_stock: movement.after_stock,
            reference: movement.reference,
            reference_number: movement.reference_number,
            batch_id: movement.batch_id,
            reverses_movement_id: movement.reverses_movement_id,
            supplier_id: movement.supplier_id,
            notes: movement.notes,
            created_by: movement.created_by,
            created_at: movement.created_at,
            detached_reference: None,
        };
        self.work.movements.push(movement.clone());
        Ok(movement)
    }

    async fn find_movement(&mut self, movement_id: Uuid) -> AppResult<Option<StockMovement>> {
        Ok(self
            .work
            .movements
            .iter()
            .find(|m| m.id == movement_id)
            .cloned())
    }

    async fn find_reversal_of(&mut self, movement_id: Uuid) -> AppResult<Option<StockMovement>> {
        Ok(self
            .work
            .movements
            .iter()
            .find(|m| m.reverses_movement_id == Some(movement_id))
            .cloned())
    }

    async fn referenced_movements(&mut self) -> AppResult<Vec<StockMovement>> {
        Ok(self
            .work
            .movements
            .iter()
            .filter(|m| !m.reference.is_none())
            .cloned()
            .collect())
    }

    async fn detach_reference(&mut self, movement_id: Uuid) -> AppResult<StockMovement> {
        let movement = self.work.movement_mut(movement_id)?;
        if !movement.reference.is_none() {
            movement.detached_reference = Some(movement.reference);
            movement.reference = MovementReference::None;
        }
        Ok(movement.clone())
    }

    async fn reattach_reference(&mut self, movement_id: Uuid) -> AppResult<StockMovement> {
        let movement = self.work.movement_mut(movement_id)?;
        match movement.detached_reference.take() {
            Some(reference) => {
                movement.reference = reference;
                Ok(movement.clone())
            }
            None => Err(AppError::InvalidReference(format!(
                "Stock movement {} has no detached reference",
                movement_id
            ))),
        }
    }

    async fn reference_exists(&mut self, reference: &MovementReference) -> AppResult<bool> {
        Ok(match reference {
            MovementReference::None => false,
            MovementReference::ManualAdjustment(_) => true,
            other => self.work.documents.contains(other),
        })
    }

    async fn insert_batch(&mut self, batch: NewBatch) -> AppResult<PurchaseBatch> {
        let sequence = self.work.next_sequence();
        let batch = PurchaseBatch {
            id: Uuid::new_v4(),
            part_id: batch.part_id,
            purchase_id: batch.purchase_id,
            supplier_id: batch.supplier_id,
            quantity: batch.quantity,
            unit_cost: batch.unit_cost,
            sequence,
            created_at: batch.created_at,
        };
        self.work.batches.push(batch.clone());
        Ok(batch)
    }

    async fn lock_batches(&mut self, part_id: Uuid) -> AppResult<Vec<BatchAvailability>> {
        let mut batches: Vec<BatchAvailability> = self
            .work
            .batches
            .iter()
            .filter(|b| b.part_id == part_id)
            .map(|b| self.work.availability(b))
            .collect();
        batches.sort_by_key(|b| (b.batch.created_at, b.batch.sequence));
        Ok(batches)
    }

    async fn lock_batch(&mut self, batch_id: Uuid) -> AppResult<Option<BatchAvailability>> {
        Ok(self
            .work
            .batches
            .iter()
            .find(|b| b.id == batch_id)
            .map(|b| self.work.availability(b)))
    }

    async fn append_consumption(
        &mut self,
        consumption: NewConsumption,
    ) -> AppResult<BatchConsumption> {
        let consumption = BatchConsumption {
            id: Uuid::new_v4(),
            batch_id: consumption.batch_id,
            part_id: consumption.part_id,
            movement_id: consumption.movement_id,
            quantity: consumption.quantity,
            unit_cost: consumption.unit_cost,
            unit_selling_price: consumption.unit_selling_price,
            reference: consumption.reference,
            created_at: consumption.created_at,
        };
        self.work.consumptions.push(consumption.clone());
        Ok(consumption)
    }

    async fn consumptions_for_movement(
        &mut self,
        movement_id: Uuid,
    ) -> AppResult<Vec<BatchConsumption>> {
        Ok(self
            .work
            .consumptions
            .iter()
            .filter(|c| c.movement_id == movement_id)
            .cloned()
            .collect())
    }

    async fn find_alert(&mut self, part_id: Uuid) -> AppResult<Option<LowStockAlert>> {
        Ok(self.work.alerts.get(&part_id).cloned())
    }

    async fn all_alerts(&mut self) -> AppResult<Vec<LowStockAlert>> {
        Ok(self.work.alerts.values().cloned().collect())
    }

    async fn save_alert(&mut self, alert: &LowStockAlert) -> AppResult<()> {
        self.work.alerts.insert(alert.part_id, alert.clone());
        Ok(())
    }

    async fn delete_alert(&mut self, part_id: Uuid) -> AppResult<bool> {
        Ok(self.work.alerts.remove(&part_id).is_some())
    }

    async fn commit(self) -> AppResult<()> {
        let MemoryTx { mut guard, work } = self;
        *guard = work;
        Ok(())
    }
}

#[async_trait]
impl SequenceStore for MemoryStore {
    async fn next_sequence(&self, kind: DocumentKind, date: NaiveDate) -> AppResult<u32> {
        let mut sequences = self.sequences.lock().await;
        let counter = sequences.entry((kind, date)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn seed_sequence(&self, kind: DocumentKind, date: NaiveDate, value: u32) -> AppResult<()> {
        let mut sequences = self.sequences.lock().await;
        let counter = sequences.entry((kind, date)).or_insert(0);
        *counter = (*counter).max(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_part(sku: &str) -> NewPart {
        NewPart {
            sku: sku.to_string(),
            name: "Oil filter".to_string(),
            minimal_stock: 2,
            buy_price: 500,
            sell_price: 800,
        }
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_discards_writes() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_part(new_part("OIL-1"), Utc::now()).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.list_parts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_version_is_a_conflict() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let part = tx.insert_part(new_part("OIL-1"), Utc::now()).await.unwrap();
        tx.write_part_stock(&part, 4, Utc::now()).await.unwrap();

        let err = tx.write_part_stock(&part, 9, Utc::now()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_duplicate_live_sku_rejected() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_part(new_part("OIL-1"), Utc::now()).await.unwrap();
        assert!(tx.insert_part(new_part("OIL-1"), Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_sequences_are_per_kind_and_day() {
        let store = MemoryStore::new();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(store.next_sequence(DocumentKind::PartSale, day).await.unwrap(), 1);
        assert_eq!(store.next_sequence(DocumentKind::PartSale, day).await.unwrap(), 2);
        assert_eq!(store.next_sequence(DocumentKind::PartPurchase, day).await.unwrap(), 1);

        store.seed_sequence(DocumentKind::PartSale, day, 10).await.unwrap();
        store.seed_sequence(DocumentKind::PartSale, day, 3).await.unwrap();
        assert_eq!(store.next_sequence(DocumentKind::PartSale, day).await.unwrap(), 11);
    }
}
