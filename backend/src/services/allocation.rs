//! FIFO consumption of purchase batches

use shared::fifo::{compute_weighted_prices, plan_allocation, SellingPriceRule, Shortage};
use shared::{
    validate_margin, validate_quantity, Allocation, Margin, MovementReference, MovementType, Part,
    StockMovement, WeightedPrices,
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::ledger::{NewMovement, StockLedger};
use crate::error::{AppError, AppResult};
use crate::store::{InventoryStore, NewConsumption, StoreTx, UnitOfWork};

/// Movements and cost basis written for one sale line
#[derive(Debug, Clone)]
pub struct ConsumedSale {
    pub part_id: Uuid,
    pub new_stock: i64,
    /// One `sale` movement per batch drawn from
    pub movements: Vec<StockMovement>,
    pub allocations: Vec<Allocation>,
    pub weighted: Option<WeightedPrices>,
}

#[derive(Clone)]
pub struct FifoAllocator<S: InventoryStore> {
    ledger: StockLedger<S>,
}

impl<S: InventoryStore> FifoAllocator<S> {
    pub fn new(ledger: StockLedger<S>) -> Self {
        Self { ledger }
    }

    fn check_request(quantity: i64, margin: Option<&Margin>) -> AppResult<()> {
        validate_quantity(quantity).map_err(|msg| AppError::validation("quantity", msg))?;
        if let Some(margin) = margin {
            validate_margin(margin).map_err(|msg| AppError::validation("margin", msg))?;
        }
        Ok(())
    }

    fn pricing(part: &Part, margin: Option<Margin>) -> SellingPriceRule {
        match margin {
            Some(margin) => SellingPriceRule::Margin(margin),
            None => SellingPriceRule::List(part.sell_price),
        }
    }

    fn shortage(part: &Part, shortage: Shortage) -> AppError {
        warn!(
            part_id = %part.id,
            sku = %part.sku,
            requested = shortage.requested,
            available = shortage.available,
            "Not enough batch stock for sale"
        );
        AppError::InsufficientStock {
            part_id: part.id,
            requested: shortage.requested,
            available: shortage.available,
        }
    }

    /// Plan which batches would cover `quantity` without writing anything
    pub async fn allocate_stock(
        &self,
        part_id: Uuid,
        quantity: i64,
        margin: Option<Margin>,
    ) -> AppResult<Vec<Allocation>> {
        Self::check_request(quantity, margin.as_ref())?;

        let mut uow = self.ledger.begin().await?;
        let part = uow.tx().lock_part(part_id).await?;
        let batches = uow.tx().lock_batches(part_id).await?;

        // the unit of work is dropped uncommitted
        plan_allocation(&batches, quantity, Self::pricing(&part, margin))
            .map_err(|shortage| Self::shortage(&part, shortage))
    }

    /// Take `quantity` units oldest batch first inside the caller's unit of work
    #[allow(clippy::too_many_arguments)]
    pub async fn consume(
        &self,
        uow: &mut UnitOfWork<S::Tx>,
        part_id: Uuid,
        quantity: i64,
        margin: Option<Margin>,
        reference: MovementReference,
        reference_number: Option<String>,
        actor_id: Uuid,
    ) -> AppResult<ConsumedSale> {
        Self::check_request(quantity, margin.as_ref())?;

        let part = uow.tx().lock_part(part_id).await?;
        let batches = uow.tx().lock_batches(part_id).await?;
        let allocations = plan_allocation(&batches, quantity, Self::pricing(&part, margin))
            .map_err(|shortage| Self::shortage(&part, shortage))?;

        let mut movements = Vec::with_capacity(allocations.len());
        for allocation in &allocations {
            let movement = self
                .ledger
                .apply_movement(
                    uow,
                    NewMovement {
                        part_id,
                        movement_type: MovementType::Sale,
                        quantity: allocation.quantity,
                        reference,
                        reference_number: reference_number.clone(),
                        batch_id: Some(allocation.batch_id),
                        reverses_movement_id: None,
                        supplier_id: None,
                        notes: Some(format!("FIFO from batch {}", allocation.batch_id)),
                        created_by: actor_id,
                    },
                )
                .await?;

            uow.tx()
                .append_consumption(NewConsumption {
                    batch_id: allocation.batch_id,
                    part_id,
                    movement_id: movement.id,
                    quantity: allocation.quantity,
                    unit_cost: allocation.unit_cost,
                    unit_selling_price: allocation.unit_selling_price,
                    reference,
                    created_at: movement.created_at,
                })
                .await?;

            debug!(
                part_id = %part_id,
                batch_id = %allocation.batch_id,
                quantity = allocation.quantity,
                unit_cost = allocation.unit_cost,
                "Batch consumed"
            );
            movements.push(movement);
        }

        let new_stock = movements
            .last()
            .map(|m| m.after_stock)
            .unwrap_or(part.stock);

        Ok(ConsumedSale {
            part_id,
            new_stock,
            weighted: compute_weighted_prices(&allocations),
            movements,
            allocations,
        })
    }
}
