//! Inventory service for receiving, selling and adjusting part stock

use serde::{Deserialize, Serialize};
use shared::{
    validate_adjustment_delta, validate_minimal_stock, validate_sku, validate_unit_amount,
    Allocation, Margin, MovementReference, MovementType, NewPart, Part, StockMovement,
    WeightedPrices,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::allocation::{ConsumedSale, FifoAllocator};
use super::ledger::{NewMovement, StockLedger};
use super::retry_on_conflict;
use crate::error::{AppError, AppResult};
use crate::store::{InventoryStore, NewBatch, StoreTx};

/// Inventory service for managing part stock
#[derive(Clone)]
pub struct InventoryService<S: InventoryStore> {
    ledger: StockLedger<S>,
    allocator: FifoAllocator<S>,
}

/// Result of any stock-changing call
#[derive(Debug, Clone, Serialize)]
pub struct StockChange {
    pub part_id: Uuid,
    pub new_stock: i64,
    pub movements: Vec<StockMovement>,
}

/// A sale line together with the batches it was drawn from
#[derive(Debug, Clone, Serialize)]
pub struct SaleOutcome {
    pub change: StockChange,
    pub allocations: Vec<Allocation>,
    pub weighted: Option<WeightedPrices>,
}

impl From<ConsumedSale> for SaleOutcome {
    fn from(sale: ConsumedSale) -> Self {
        SaleOutcome {
            change: StockChange {
                part_id: sale.part_id,
                new_stock: sale.new_stock,
                movements: sale.movements,
            },
            allocations: sale.allocations,
            weighted: sale.weighted,
        }
    }
}

/// Input for receiving a purchase line into stock
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReceivePurchase {
    pub part_id: Uuid,
    pub purchase_id: Uuid,
    pub purchase_number: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i64,
    #[validate(range(min = 0, message = "Unit cost cannot be negative"))]
    pub unit_cost: i64,
    pub supplier_id: Option<Uuid>,
    pub actor_id: Uuid,
    #[validate(length(max = 1000, message = "Notes are too long"))]
    pub notes: Option<String>,
}

/// Input for selling one part
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordSale {
    pub part_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i64,
    pub reference: MovementReference,
    pub reference_number: Option<String>,
    pub margin: Option<Margin>,
    pub actor_id: Uuid,
}

/// One line of a multi-line sale
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaleLineInput {
    pub part_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i64,
    pub margin: Option<Margin>,
}

/// Input for a manual stock correction
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdjustStock {
    pub part_id: Uuid,
    /// Positive adds stock, negative removes it
    pub delta: i64,
    #[validate(length(max = 1000, message = "Reason is too long"))]
    pub reason: Option<String>,
    pub actor_id: Uuid,
}

fn ensure_sale_reference(reference: &MovementReference) -> AppResult<()> {
    match reference {
        MovementReference::SaleDocument(_) | MovementReference::SalesOrder(_) => Ok(()),
        _ => Err(AppError::InvalidReference(
            "Sales must reference a sale or a sales order".to_string(),
        )),
    }
}

impl<S: InventoryStore> InventoryService<S> {
    /// Create a new InventoryService instance
    pub fn new(ledger: StockLedger<S>) -> Self {
        Self {
            allocator: FifoAllocator::new(ledger.clone()),
            ledger,
        }
    }

    pub fn ledger(&self) -> &StockLedger<S> {
        &self.ledger
    }

    pub fn allocator(&self) -> &FifoAllocator<S> {
        &self.allocator
    }

    /// Register a part with zero stock
    pub async fn create_part(&self, input: NewPart) -> AppResult<Part> {
        validate_sku(&input.sku).map_err(|msg| AppError::validation("sku", msg))?;
        if input.name.trim().is_empty() {
            return Err(AppError::validation("name", "Name is required"));
        }
        validate_minimal_stock(input.minimal_stock)
            .map_err(|msg| AppError::validation("minimal_stock", msg))?;
        validate_unit_amount(input.buy_price)
            .map_err(|msg| AppError::validation("buy_price", msg))?;
        validate_unit_amount(input.sell_price)
            .map_err(|msg| AppError::validation("sell_price", msg))?;

        let mut uow = self.ledger.begin().await?;
        let part = uow.tx().insert_part(input, self.ledger.clock().now()).await?;
        self.ledger.alerts().sync_alert(&mut uow, &part).await?;
        self.ledger.commit(uow).await?;

        info!(part_id = %part.id, sku = %part.sku, "Part created");
        Ok(part)
    }

    /// Receive a purchase line: one new batch plus a `purchase_received` movement
    pub async fn receive_purchase(&self, input: ReceivePurchase) -> AppResult<StockChange> {
        input.validate()?;

        retry_on_conflict(self.ledger.max_attempts(), "receive_purchase", move || {
            self.try_receive(input.clone())
        })
        .await
    }

    async fn try_receive(&self, input: ReceivePurchase) -> AppResult<StockChange> {
        let now = self.ledger.clock().now();
        let mut uow = self.ledger.begin().await?;

        // an unknown part fails here as NotFound, before the batch row is written
        uow.tx().lock_part(input.part_id).await?;

        let batch = uow
            .tx()
            .insert_batch(NewBatch {
                part_id: input.part_id,
                purchase_id: input.purchase_id,
                supplier_id: input.supplier_id,
                quantity: input.quantity,
                unit_cost: input.unit_cost,
                created_at: now,
            })
            .await?;

        let movement = self
            .ledger
            .apply_movement(
                &mut uow,
                NewMovement {
                    part_id: input.part_id,
                    movement_type: MovementType::PurchaseReceived,
                    quantity: input.quantity,
                    reference: MovementReference::PurchaseReceipt(input.purchase_id),
                    reference_number: input.purchase_number,
                    batch_id: Some(batch.id),
                    reverses_movement_id: None,
                    supplier_id: input.supplier_id,
                    notes: input.notes,
                    created_by: input.actor_id,
                },
            )
            .await?;

        self.ledger.commit(uow).await?;

        info!(
            part_id = %movement.part_id,
            batch_id = %batch.id,
            quantity = movement.quantity,
            unit_cost = batch.unit_cost,
            new_stock = movement.after_stock,
            "Purchase received"
        );

        Ok(StockChange {
            part_id: movement.part_id,
            new_stock: movement.after_stock,
            movements: vec![movement],
        })
    }

    /// Sell one part, drawing cost from the oldest batches first
    pub async fn record_sale(&self, input: RecordSale) -> AppResult<SaleOutcome> {
        input.validate()?;
        ensure_sale_reference(&input.reference)?;

        retry_on_conflict(self.ledger.max_attempts(), "record_sale", move || {
            let input = input.clone();
            async move {
                let mut uow = self.ledger.begin().await?;
                let sale = self
                    .allocator
                    .consume(
                        &mut uow,
                        input.part_id,
                        input.quantity,
                        input.margin,
                        input.reference,
                        input.reference_number,
                        input.actor_id,
                    )
                    .await?;
                self.ledger.commit(uow).await?;

                info!(
                    part_id = %sale.part_id,
                    quantity = input.quantity,
                    batches = sale.allocations.len(),
                    new_stock = sale.new_stock,
                    "Sale recorded"
                );
                Ok(SaleOutcome::from(sale))
            }
        })
        .await
    }

    /// Sell several lines of one document; either every line is fulfilled or none is
    pub async fn fulfil_sale_lines(
        &self,
        reference: MovementReference,
        reference_number: Option<String>,
        lines: Vec<SaleLineInput>,
        actor_id: Uuid,
    ) -> AppResult<Vec<SaleOutcome>> {
        ensure_sale_reference(&reference)?;
        if lines.is_empty() {
            return Err(AppError::validation("lines", "At least one line is required"));
        }
        for line in &lines {
            line.validate()?;
        }

        retry_on_conflict(self.ledger.max_attempts(), "fulfil_sale_lines", move || {
            let lines = lines.clone();
            let reference_number = reference_number.clone();
            async move {
                let mut uow = self.ledger.begin().await?;
                let mut outcomes = Vec::with_capacity(lines.len());
                for line in lines {
                    let sale = self
                        .allocator
                        .consume(
                            &mut uow,
                            line.part_id,
                            line.quantity,
                            line.margin,
                            reference,
                            reference_number.clone(),
                            actor_id,
                        )
                        .await?;
                    outcomes.push(SaleOutcome::from(sale));
                }
                self.ledger.commit(uow).await?;

                info!(
                    reference = ?reference,
                    lines = outcomes.len(),
                    "Sale lines fulfilled"
                );
                Ok(outcomes)
            }
        })
        .await
    }

    /// Manual correction; the sign of `delta` picks the movement type
    pub async fn adjust_stock(&self, input: AdjustStock) -> AppResult<StockChange> {
        input.validate()?;
        validate_adjustment_delta(input.delta)
            .map_err(|msg| AppError::validation("delta", msg))?;

        let movement_type = if input.delta > 0 {
            MovementType::AdjustmentIn
        } else {
            MovementType::AdjustmentOut
        };

        let movement = self
            .ledger
            .record_movement(NewMovement {
                notes: input.reason,
                ..NewMovement::new(
                    input.part_id,
                    movement_type,
                    input.delta.abs(),
                    MovementReference::ManualAdjustment(Uuid::new_v4()),
                    input.actor_id,
                )
            })
            .await?;

        Ok(StockChange {
            part_id: movement.part_id,
            new_stock: movement.after_stock,
            movements: vec![movement],
        })
    }

    pub async fn reverse_movement(
        &self,
        original_id: Uuid,
        actor_id: Uuid,
        notes: Option<String>,
    ) -> AppResult<StockChange> {
        let movement = self
            .ledger
            .reverse_movement(original_id, actor_id, notes)
            .await?;

        Ok(StockChange {
            part_id: movement.part_id,
            new_stock: movement.after_stock,
            movements: vec![movement],
        })
    }

    /// Change the reorder threshold and resync the part's alert with it
    pub async fn update_minimal_stock(&self, part_id: Uuid, minimal_stock: i64) -> AppResult<Part> {
        validate_minimal_stock(minimal_stock)
            .map_err(|msg| AppError::validation("minimal_stock", msg))?;

        retry_on_conflict(self.ledger.max_attempts(), "update_minimal_stock", move || async move {
            let mut uow = self.ledger.begin().await?;
            let part = uow.tx().lock_part(part_id).await?;
            let part = uow
                .tx()
                .write_minimal_stock(&part, minimal_stock, self.ledger.clock().now())
                .await?;
            self.ledger.alerts().sync_alert(&mut uow, &part).await?;
            self.ledger.commit(uow).await?;

            info!(part_id = %part_id, minimal_stock, "Minimal stock updated");
            Ok(part)
        })
        .await
    }

    pub async fn current_stock(&self, part_id: Uuid) -> AppResult<i64> {
        self.ledger
            .store()
            .find_part(part_id)
            .await?
            .filter(|p| !p.is_deleted())
            .map(|p| p.stock)
            .ok_or_else(|| AppError::NotFound(format!("Part {}", part_id)))
    }
}
