//! Persistence seam for the stock ledger
//!
//! [`InventoryStore`] hands out [`StoreTx`] units of work. Everything written
//! through one `StoreTx` becomes visible atomically on [`StoreTx::commit`];
//! dropping it discards the writes. Locking methods (`lock_*`) serialize
//! concurrent units of work on the same part or batch until commit.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::numbering::DocumentKind;
use shared::{
    BatchAvailability, BatchConsumption, DateRange, LowStockAlert, LowStockEvent, MovementReference,
    MovementType, NewPart, PaginatedResponse, Pagination, Part, PurchaseBatch, StockMovement,
};
use uuid::Uuid;

use crate::error::AppResult;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A movement about to be appended
#[derive(Debug, Clone)]
pub struct NewMovementRecord {
    pub part_id: Uuid,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub before_stock: i64,
    pub after_stock: i64,
    pub reference: MovementReference,
    pub reference_number: Option<String>,
    pub batch_id: Option<Uuid>,
    pub reverses_movement_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A received purchase line about to become a batch
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub part_id: Uuid,
    pub purchase_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub quantity: i64,
    pub unit_cost: i64,
    pub created_at: DateTime<Utc>,
}

/// Batch consumption about to be appended
#[derive(Debug, Clone)]
pub struct NewConsumption {
    pub batch_id: Uuid,
    pub part_id: Uuid,
    pub movement_id: Uuid,
    pub quantity: i64,
    pub unit_cost: i64,
    pub unit_selling_price: i64,
    pub reference: MovementReference,
    pub created_at: DateTime<Utc>,
}

/// Movement query used by reporting
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub part_id: Option<Uuid>,
    /// Empty means every type
    pub movement_types: Vec<MovementType>,
    pub date_range: Option<DateRange>,
    pub reference: Option<MovementReference>,
    pub pagination: Pagination,
}

impl MovementFilter {
    pub fn matches(&self, movement: &StockMovement) -> bool {
        self.part_id.map_or(true, |id| movement.part_id == id)
            && (self.movement_types.is_empty()
                || self.movement_types.contains(&movement.movement_type))
            && self
                .date_range
                .map_or(true, |range| range.contains(movement.created_at))
            && self
                .reference
                .map_or(true, |reference| movement.reference == reference)
    }
}

/// Consumption query used by margin reports
#[derive(Debug, Clone, Default)]
pub struct ConsumptionFilter {
    pub part_id: Option<Uuid>,
    pub reference: Option<MovementReference>,
    pub date_range: Option<DateRange>,
}

impl ConsumptionFilter {
    pub fn matches(&self, consumption: &BatchConsumption) -> bool {
        self.part_id.map_or(true, |id| consumption.part_id == id)
            && self
                .reference
                .map_or(true, |reference| consumption.reference == reference)
            && self
                .date_range
                .map_or(true, |range| range.contains(consumption.created_at))
    }
}

#[async_trait]
pub trait InventoryStore: Clone + Send + Sync + 'static {
    type Tx: StoreTx;

    /// Open a unit of work
    async fn begin(&self) -> AppResult<Self::Tx>;

    async fn find_part(&self, part_id: Uuid) -> AppResult<Option<Part>>;

    /// Newest first
    async fn list_movements(
        &self,
        filter: &MovementFilter,
    ) -> AppResult<PaginatedResponse<StockMovement>>;

    /// Every movement of a part in write order
    async fn part_ledger(&self, part_id: Uuid) -> AppResult<Vec<StockMovement>>;

    async fn list_consumptions(&self, filter: &ConsumptionFilter)
        -> AppResult<Vec<BatchConsumption>>;

    async fn list_alerts(&self, unread_only: bool) -> AppResult<Vec<LowStockAlert>>;
}

#[async_trait]
pub trait StoreTx: Send + Sized {
    async fn insert_part(&mut self, part: NewPart, at: DateTime<Utc>) -> AppResult<Part>;

    /// Lock a live part for the rest of the unit of work; `NotFound` if missing or deleted
    async fn lock_part(&mut self, part_id: Uuid) -> AppResult<Part>;

    /// Version-checked stock write; `ConcurrencyConflict` when `part.version` is stale
    async fn write_part_stock(
        &mut self,
        part: &Part,
        new_stock: i64,
        at: DateTime<Utc>,
    ) -> AppResult<Part>;

    async fn write_minimal_stock(
        &mut self,
        part: &Part,
        minimal_stock: i64,
        at: DateTime<Utc>,
    ) -> AppResult<Part>;

    /// Every part, deleted ones included
    async fn list_parts(&mut self) -> AppResult<Vec<Part>>;

    async fn append_movement(&mut self, movement: NewMovementRecord) -> AppResult<StockMovement>;

    async fn find_movement(&mut self, movement_id: Uuid) -> AppResult<Option<StockMovement>>;

    async fn find_reversal_of(&mut self, movement_id: Uuid) -> AppResult<Option<StockMovement>>;

    /// Movements whose reference columns are still populated
    async fn referenced_movements(&mut self) -> AppResult<Vec<StockMovement>>;

    /// Move the live reference aside and null it
    async fn detach_reference(&mut self, movement_id: Uuid) -> AppResult<StockMovement>;

    /// Restore a previously detached reference
    async fn reattach_reference(&mut self, movement_id: Uuid) -> AppResult<StockMovement>;

    async fn reference_exists(&mut self, reference: &MovementReference) -> AppResult<bool>;

    async fn insert_batch(&mut self, batch: NewBatch) -> AppResult<PurchaseBatch>;

    /// All batches of a part, oldest first, locked
    async fn lock_batches(&mut self, part_id: Uuid) -> AppResult<Vec<BatchAvailability>>;

    async fn lock_batch(&mut self, batch_id: Uuid) -> AppResult<Option<BatchAvailability>>;

    async fn append_consumption(&mut self, consumption: NewConsumption)
        -> AppResult<BatchConsumption>;

    async fn consumptions_for_movement(
        &mut self,
        movement_id: Uuid,
    ) -> AppResult<Vec<BatchConsumption>>;

    async fn find_alert(&mut self, part_id: Uuid) -> AppResult<Option<LowStockAlert>>;

    async fn all_alerts(&mut self) -> AppResult<Vec<LowStockAlert>>;

    /// Insert or replace the alert for `alert.part_id`
    async fn save_alert(&mut self, alert: &LowStockAlert) -> AppResult<()>;

    async fn delete_alert(&mut self, part_id: Uuid) -> AppResult<bool>;

    async fn commit(self) -> AppResult<()>;
}

/// Atomic per-day document counters
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Increment and return the counter for `(kind, date)`, starting at 1
    async fn next_sequence(&self, kind: DocumentKind, date: NaiveDate) -> AppResult<u32>;

    /// Raise the counter to at least `value`
    async fn seed_sequence(&self, kind: DocumentKind, date: NaiveDate, value: u32)
        -> AppResult<()>;
}

/// A store transaction plus the low-stock events it will publish on commit
pub struct UnitOfWork<T: StoreTx> {
    tx: T,
    raised: Vec<LowStockEvent>,
}

impl<T: StoreTx> UnitOfWork<T> {
    pub fn new(tx: T) -> Self {
        Self {
            tx,
            raised: Vec::new(),
        }
    }

    pub fn tx(&mut self) -> &mut T {
        &mut self.tx
    }

    pub(crate) fn raise(&mut self, event: LowStockEvent) {
        self.raised.push(event);
    }

    /// Commit and hand back the events to publish
    pub async fn commit(self) -> AppResult<Vec<LowStockEvent>> {
        self.tx.commit().await?;
        Ok(self.raised)
    }
}
