//! PostgreSQL store
//!
//! Parts and batches are locked with `SELECT ... FOR UPDATE` for the rest of
//! the transaction. Stock writes also check `version` so a writer that
//! skipped the lock fails with a conflict instead of overwriting.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::numbering::DocumentKind;
use shared::{
    BatchAvailability, BatchConsumption, LowStockAlert, MovementReference, NewPart,
    PaginatedResponse, PaginationMeta, Part, PurchaseBatch, ReferenceKind, StockMovement,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    ConsumptionFilter, InventoryStore, MovementFilter, NewBatch, NewConsumption,
    NewMovementRecord, SequenceStore, StoreTx,
};
use crate::error::{AppError, AppResult};

const PART_COLUMNS: &str = "id, sku, name, stock, minimal_stock, buy_price, sell_price, \
                            version, deleted_at, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, sequence, part_id, movement_type, quantity, before_stock, \
                                after_stock, reference_type, reference_id, reference_number, \
                                batch_id, reverses_movement_id, supplier_id, notes, created_by, \
                                created_at, detached_reference_type, detached_reference_id";

const CONSUMPTION_COLUMNS: &str = "id, batch_id, part_id, movement_id, quantity, unit_cost, \
                                   unit_selling_price, reference_type, reference_id, created_at";

const ALERT_COLUMNS: &str =
    "id, part_id, current_stock, minimal_stock, is_read, created_at, updated_at";

#[derive(Debug, FromRow)]
struct PartRow {
    id: Uuid,
    sku: String,
    name: String,
    stock: i64,
    minimal_stock: i64,
    buy_price: i64,
    sell_price: i64,
    version: i64,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PartRow> for Part {
    fn from(row: PartRow) -> Self {
        Part {
            id: row.id,
            sku: row.sku,
            name: row.name,
            stock: row.stock,
            minimal_stock: row.minimal_stock,
            buy_price: row.buy_price,
            sell_price: row.sell_price,
            version: row.version,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    sequence: i64,
    part_id: Uuid,
    movement_type: String,
    quantity: i64,
    before_stock: i64,
    after_stock: i64,
    reference_type: Option<String>,
    reference_id: Option<Uuid>,
    reference_number: Option<String>,
    batch_id: Option<Uuid>,
    reverses_movement_id: Option<Uuid>,
    supplier_id: Option<Uuid>,
    notes: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    detached_reference_type: Option<String>,
    detached_reference_id: Option<Uuid>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let movement_type = row.movement_type.parse().map_err(AppError::Internal)?;
        let detached_reference = row.detached_reference_type.as_deref().map(|kind| {
            MovementReference::from_columns(Some(kind), row.detached_reference_id)
        });

        Ok(StockMovement {
            id: row.id,
            sequence: row.sequence,
            part_id: row.part_id,
            movement_type,
            quantity: row.quantity,
            before_stock: row.before_stock,
            after_stock: row.after_stock,
            reference: MovementReference::from_columns(row.reference_type.as_deref(), row.reference_id),
            reference_number: row.reference_number,
            batch_id: row.batch_id,
            reverses_movement_id: row.reverses_movement_id,
            supplier_id: row.supplier_id,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            detached_reference,
        })
    }
}

fn movements_from_rows(rows: Vec<MovementRow>) -> AppResult<Vec<StockMovement>> {
    rows.into_iter().map(StockMovement::try_from).collect()
}

#[derive(Debug, FromRow)]
struct BatchRow {
    id: Uuid,
    part_id: Uuid,
    purchase_id: Uuid,
    supplier_id: Option<Uuid>,
    quantity: i64,
    unit_cost: i64,
    sequence: i64,
    created_at: DateTime<Utc>,
    remaining_quantity: i64,
}

impl From<BatchRow> for BatchAvailability {
    fn from(row: BatchRow) -> Self {
        BatchAvailability {
            batch: PurchaseBatch {
                id: row.id,
                part_id: row.part_id,
                purchase_id: row.purchase_id,
                supplier_id: row.supplier_id,
                quantity: row.quantity,
                unit_cost: row.unit_cost,
                sequence: row.sequence,
                created_at: row.created_at,
            },
            remaining_quantity: row.remaining_quantity,
        }
    }
}

#[derive(Debug, FromRow)]
struct ConsumptionRow {
    id: Uuid,
    batch_id: Uuid,
    part_id: Uuid,
    movement_id: Uuid,
    quantity: i64,
    unit_cost: i64,
    unit_selling_price: i64,
    reference_type: Option<String>,
    reference_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<ConsumptionRow> for BatchConsumption {
    fn from(row: ConsumptionRow) -> Self {
        BatchConsumption {
            id: row.id,
            batch_id: row.batch_id,
            part_id: row.part_id,
            movement_id: row.movement_id,
            quantity: row.quantity,
            unit_cost: row.unit_cost,
            unit_selling_price: row.unit_selling_price,
            reference: MovementReference::from_columns(row.reference_type.as_deref(), row.reference_id),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct AlertRow {
    id: Uuid,
    part_id: Uuid,
    current_stock: i64,
    minimal_stock: i64,
    is_read: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AlertRow> for LowStockAlert {
    fn from(row: AlertRow) -> Self {
        LowStockAlert {
            id: row.id,
            part_id: row.part_id,
            current_stock: row.current_stock,
            minimal_stock: row.minimal_stock,
            is_read: row.is_read,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Table holding the documents of a reference kind
fn document_table(kind: ReferenceKind) -> Option<&'static str> {
    match kind {
        ReferenceKind::PurchaseReceipt => Some("part_purchases"),
        ReferenceKind::SaleDocument => Some("part_sales"),
        ReferenceKind::SalesOrder => Some("part_sales_orders"),
        ReferenceKind::PurchaseOrder => Some("purchase_orders"),
        ReferenceKind::ManualAdjustment => None,
    }
}

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl InventoryStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> AppResult<PgTx> {
        Ok(PgTx {
            tx: self.db.begin().await?,
        })
    }

    async fn find_part(&self, part_id: Uuid) -> AppResult<Option<Part>> {
        let row = sqlx::query_as::<_, PartRow>(&format!(
            "SELECT {} FROM parts WHERE id = $1",
            PART_COLUMNS
        ))
        .bind(part_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Part::from))
    }

    async fn list_movements(
        &self,
        filter: &MovementFilter,
    ) -> AppResult<PaginatedResponse<StockMovement>> {
        let types: Vec<String> = filter
            .movement_types
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();
        let (from, to) = match filter.date_range.map(|r| r.bounds()) {
            Some((from, to)) => (Some(from), Some(to)),
            None => (None, None),
        };
        let reference_type = filter.reference.and_then(|r| r.type_column());
        let reference_id = filter.reference.and_then(|r| r.id());

        let conditions = r#"
            ($1::uuid IS NULL OR part_id = $1)
            AND (cardinality($2::text[]) = 0 OR movement_type = ANY($2))
            AND ($3::timestamptz IS NULL OR created_at >= $3)
            AND ($4::timestamptz IS NULL OR created_at < $4)
            AND ($5::text IS NULL OR reference_type = $5)
            AND ($6::uuid IS NULL OR reference_id = $6)
        "#;

        let total_items = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM stock_movements WHERE {}",
            conditions
        ))
        .bind(filter.part_id)
        .bind(&types)
        .bind(from)
        .bind(to)
        .bind(reference_type)
        .bind(reference_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            "SELECT {} FROM stock_movements WHERE {} \
             ORDER BY created_at DESC, sequence DESC LIMIT $7 OFFSET $8",
            MOVEMENT_COLUMNS, conditions
        ))
        .bind(filter.part_id)
        .bind(&types)
        .bind(from)
        .bind(to)
        .bind(reference_type)
        .bind(reference_id)
        .bind(filter.pagination.limit() as i64)
        .bind(filter.pagination.offset() as i64)
        .fetch_all(&self.db)
        .await?;

        let total_items = total_items.max(0) as u64;
        let per_page = filter.pagination.limit() as u32;
        Ok(PaginatedResponse {
            data: movements_from_rows(rows)?,
            pagination: PaginationMeta {
                page: filter.pagination.page.max(1),
                per_page,
                total_items,
                total_pages: total_items.div_ceil(per_page as u64) as u32,
            },
        })
    }

    async fn part_ledger(&self, part_id: Uuid) -> AppResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            "SELECT {} FROM stock_movements WHERE part_id = $1 ORDER BY sequence",
            MOVEMENT_COLUMNS
        ))
        .bind(part_id)
        .fetch_all(&self.db)
        .await?;

        movements_from_rows(rows)
    }

    async fn list_consumptions(
        &self,
        filter: &ConsumptionFilter,
    ) -> AppResult<Vec<BatchConsumption>> {
        let (from, to) = match filter.date_range.map(|r| r.bounds()) {
            Some((from, to)) => (Some(from), Some(to)),
            None => (None, None),
        };

        let rows = sqlx::query_as::<_, ConsumptionRow>(&format!(
            r#"
            SELECT {} FROM batch_consumptions
            WHERE ($1::uuid IS NULL OR part_id = $1)
              AND ($2::text IS NULL OR reference_type = $2)
              AND ($3::uuid IS NULL OR reference_id = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at < $5)
            ORDER BY created_at
            "#,
            CONSUMPTION_COLUMNS
        ))
        .bind(filter.part_id)
        .bind(filter.reference.and_then(|r| r.type_column()))
        .bind(filter.reference.and_then(|r| r.id()))
        .bind(from)
        .bind(to)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(BatchConsumption::from).collect())
    }

    async fn list_alerts(&self, unread_only: bool) -> AppResult<Vec<LowStockAlert>> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {} FROM low_stock_alerts WHERE ($1 = FALSE OR is_read = FALSE) \
             ORDER BY created_at DESC",
            ALERT_COLUMNS
        ))
        .bind(unread_only)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(LowStockAlert::from).collect())
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_part(&mut self, part: NewPart, at: DateTime<Utc>) -> AppResult<Part> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM parts WHERE sku = $1 AND deleted_at IS NULL)",
        )
        .bind(&part.sku)
        .fetch_one(&mut *self.tx)
        .await?;

        if exists {
            return Err(AppError::validation("sku", "SKU already exists"));
        }

        let row = sqlx::query_as::<_, PartRow>(&format!(
            r#"
            INSERT INTO parts (sku, name, stock, minimal_stock, buy_price, sell_price, created_at, updated_at)
            VALUES ($1, $2, 0, $3, $4, $5, $6, $6)
            RETURNING {}
            "#,
            PART_COLUMNS
        ))
        .bind(&part.sku)
        .bind(&part.name)
        .bind(part.minimal_stock)
        .bind(part.buy_price)
        .bind(part.sell_price)
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn lock_part(&mut self, part_id: Uuid) -> AppResult<Part> {
        let row = sqlx::query_as::<_, PartRow>(&format!(
            "SELECT {} FROM parts WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
            PART_COLUMNS
        ))
        .bind(part_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Part {}", part_id)))?;

        Ok(row.into())
    }

    async fn write_part_stock(
        &mut self,
        part: &Part,
        new_stock: i64,
        at: DateTime<Utc>,
    ) -> AppResult<Part> {
        let row = sqlx::query_as::<_, PartRow>(&format!(
            r#"
            UPDATE parts SET stock = $2, version = version + 1, updated_at = $3
            WHERE id = $1 AND version = $4
            RETURNING {}
            "#,
            PART_COLUMNS
        ))
        .bind(part.id)
        .bind(new_stock)
        .bind(at)
        .bind(part.version)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| AppError::ConcurrencyConflict(format!("Part {}", part.id)))?;

        Ok(row.into())
    }

    async fn write_minimal_stock(
        &mut self,
        part: &Part,
        minimal_stock: i64,
        at: DateTime<Utc>,
    ) -> AppResult<Part> {
        let row = sqlx::query_as::<_, PartRow>(&format!(
            r#"
            UPDATE parts SET minimal_stock = $2, version = version + 1, updated_at = $3
            WHERE id = $1 AND version = $4
            RETURNING {}
            "#,
            PART_COLUMNS
        ))
        .bind(part.id)
        .bind(minimal_stock)
        .bind(at)
        .bind(part.version)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| AppError::ConcurrencyConflict(format!("Part {}", part.id)))?;

        Ok(row.into())
    }

    async fn list_parts(&mut self) -> AppResult<Vec<Part>> {
        let rows = sqlx::query_as::<_, PartRow>(&format!(
            "SELECT {} FROM parts ORDER BY sku",
            PART_COLUMNS
        ))
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Part::from).collect())
    }

    async fn append_movement(&mut self, movement: NewMovementRecord) -> AppResult<StockMovement> {
        let row = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            INSERT INTO stock_movements (
                part_id, movement_type, quantity, before_stock, after_stock,
                reference_type, reference_id, reference_number, batch_id,
                reverses_movement_id, supplier_id, notes, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(movement.part_id)
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity)
        .bind(movement.before_stock)
        .bind(movement.after_stock)
        .bind(movement.reference.type_column())
        .bind(movement.reference.id())
        .bind(&movement.reference_number)
        .bind(movement.batch_id)
        .bind(movement.reverses_movement_id)
        .bind(movement.supplier_id)
        .bind(&movement.notes)
        .bind(movement.created_by)
        .bind(movement.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into()
    }

    async fn find_movement(&mut self, movement_id: Uuid) -> AppResult<Option<StockMovement>> {
        let row = sqlx::query_as::<_, MovementRow>(&format!(
            "SELECT {} FROM stock_movements WHERE id = $1",
            MOVEMENT_COLUMNS
        ))
        .bind(movement_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(StockMovement::try_from).transpose()
    }

    async fn find_reversal_of(&mut self, movement_id: Uuid) -> AppResult<Option<StockMovement>> {
        let row = sqlx::query_as::<_, MovementRow>(&format!(
            "SELECT {} FROM stock_movements WHERE reverses_movement_id = $1",
            MOVEMENT_COLUMNS
        ))
        .bind(movement_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(StockMovement::try_from).transpose()
    }

    async fn referenced_movements(&mut self) -> AppResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            "SELECT {} FROM stock_movements WHERE reference_type IS NOT NULL ORDER BY sequence",
            MOVEMENT_COLUMNS
        ))
        .fetch_all(&mut *self.tx)
        .await?;

        movements_from_rows(rows)
    }

    async fn detach_reference(&mut self, movement_id: Uuid) -> AppResult<StockMovement> {
        let row = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            UPDATE stock_movements
            SET detached_reference_type = reference_type,
                detached_reference_id = reference_id,
                reference_type = NULL,
                reference_id = NULL
            WHERE id = $1 AND reference_type IS NOT NULL
            RETURNING {}
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(movement_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Stock movement {}", movement_id)))?;

        row.try_into()
    }

    async fn reattach_reference(&mut self, movement_id: Uuid) -> AppResult<StockMovement> {
        let row = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            UPDATE stock_movements
            SET reference_type = detached_reference_type,
                reference_id = detached_reference_id,
                detached_reference_type = NULL,
                detached_reference_id = NULL
            WHERE id = $1 AND detached_reference_type IS NOT NULL
            RETURNING {}
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(movement_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| {
            AppError::InvalidReference(format!(
                "Stock movement {} has no detached reference",
                movement_id
            ))
        })?;

        row.try_into()
    }

    async fn reference_exists(&mut self, reference: &MovementReference) -> AppResult<bool> {
        let (Some(kind), Some(id)) = (reference.kind(), reference.id()) else {
            return Ok(false);
        };
        let Some(table) = document_table(kind) else {
            return Ok(true);
        };

        let exists = sqlx::query_scalar::<_, bool>(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1 AND deleted_at IS NULL)",
            table
        ))
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn insert_batch(&mut self, batch: NewBatch) -> AppResult<PurchaseBatch> {
        let row = sqlx::query_as::<_, BatchRow>(
            r#"
            INSERT INTO purchase_batches (part_id, purchase_id, supplier_id, quantity, unit_cost, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, part_id, purchase_id, supplier_id, quantity, unit_cost, sequence,
                      created_at, quantity AS remaining_quantity
            "#,
        )
        .bind(batch.part_id)
        .bind(batch.purchase_id)
        .bind(batch.supplier_id)
        .bind(batch.quantity)
        .bind(batch.unit_cost)
        .bind(batch.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(BatchAvailability::from(row).batch)
    }

    async fn lock_batches(&mut self, part_id: Uuid) -> AppResult<Vec<BatchAvailability>> {
        let rows = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT b.id, b.part_id, b.purchase_id, b.supplier_id, b.quantity, b.unit_cost,
                   b.sequence, b.created_at,
                   (b.quantity - COALESCE(
                       (SELECT SUM(c.quantity) FROM batch_consumptions c WHERE c.batch_id = b.id),
                       0))::BIGINT AS remaining_quantity
            FROM purchase_batches b
            WHERE b.part_id = $1
            ORDER BY b.created_at, b.sequence
            FOR UPDATE OF b
            "#,
        )
        .bind(part_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(BatchAvailability::from).collect())
    }

    async fn lock_batch(&mut self, batch_id: Uuid) -> AppResult<Option<BatchAvailability>> {
        let row = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT b.id, b.part_id, b.purchase_id, b.supplier_id, b.quantity, b.unit_cost,
                   b.sequence, b.created_at,
                   (b.quantity - COALESCE(
                       (SELECT SUM(c.quantity) FROM batch_consumptions c WHERE c.batch_id = b.id),
                       0))::BIGINT AS remaining_quantity
            FROM purchase_batches b
            WHERE b.id = $1
            FOR UPDATE OF b
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(BatchAvailability::from))
    }

    async fn append_consumption(
        &mut self,
        consumption: NewConsumption,
    ) -> AppResult<BatchConsumption> {
        let row = sqlx::query_as::<_, ConsumptionRow>(&format!(
            r#"
            INSERT INTO batch_consumptions (
                batch_id, part_id, movement_id, quantity, unit_cost, unit_selling_price,
                reference_type, reference_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            CONSUMPTION_COLUMNS
        ))
        .bind(consumption.batch_id)
        .bind(consumption.part_id)
        .bind(consumption.movement_id)
        .bind(consumption.quantity)
        .bind(consumption.unit_cost)
        .bind(consumption.unit_selling_price)
        .bind(consumption.reference.type_column())
        .bind(consumption.reference.id())
        .bind(consumption.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn consumptions_for_movement(
        &mut self,
        movement_id: Uuid,
    ) -> AppResult<Vec<BatchConsumption>> {
        let rows = sqlx::query_as::<_, ConsumptionRow>(&format!(
            "SELECT {} FROM batch_consumptions WHERE movement_id = $1 ORDER BY created_at",
            CONSUMPTION_COLUMNS
        ))
        .bind(movement_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(BatchConsumption::from).collect())
    }

    async fn find_alert(&mut self, part_id: Uuid) -> AppResult<Option<LowStockAlert>> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {} FROM low_stock_alerts WHERE part_id = $1 FOR UPDATE",
            ALERT_COLUMNS
        ))
        .bind(part_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(LowStockAlert::from))
    }

    async fn all_alerts(&mut self) -> AppResult<Vec<LowStockAlert>> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {} FROM low_stock_alerts ORDER BY created_at",
            ALERT_COLUMNS
        ))
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(LowStockAlert::from).collect())
    }

    async fn save_alert(&mut self, alert: &LowStockAlert) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO low_stock_alerts (id, part_id, current_stock, minimal_stock, is_read, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (part_id) DO UPDATE
            SET current_stock = EXCLUDED.current_stock,
                minimal_stock = EXCLUDED.minimal_stock,
                is_read = EXCLUDED.is_read,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(alert.id)
        .bind(alert.part_id)
        .bind(alert.current_stock)
        .bind(alert.minimal_stock)
        .bind(alert.is_read)
        .bind(alert.created_at)
        .bind(alert.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_alert(&mut self, part_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM low_stock_alerts WHERE part_id = $1")
            .bind(part_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl SequenceStore for PgStore {
    async fn next_sequence(&self, kind: DocumentKind, date: NaiveDate) -> AppResult<u32> {
        let value = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO document_sequences (kind, sequence_date, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (kind, sequence_date)
            DO UPDATE SET last_value = document_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(kind.as_str())
        .bind(date)
        .fetch_one(&self.db)
        .await?;

        u32::try_from(value).map_err(|_| AppError::Internal(format!("Bad sequence {}", value)))
    }

    async fn seed_sequence(&self, kind: DocumentKind, date: NaiveDate, value: u32) -> AppResult<()> {
        let value = i32::try_from(value)
            .map_err(|_| AppError::validation("sequence", "Sequence out of range"))?;

        sqlx::query(
            r#"
            INSERT INTO document_sequences (kind, sequence_date, last_value)
            VALUES ($1, $2, $3)
            ON CONFLICT (kind, sequence_date)
            DO UPDATE SET last_value = GREATEST(document_sequences.last_value, EXCLUDED.last_value)
            "#,
        )
        .bind(kind.as_str())
        .bind(date)
        .bind(value)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
