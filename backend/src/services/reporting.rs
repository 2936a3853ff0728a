//! Read-only ledger reports

use std::collections::HashMap;

use serde::Serialize;
use shared::{MovementReference, PaginatedResponse, StockMovement};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{ConsumptionFilter, InventoryStore, MovementFilter};

/// Revenue and cost of goods for one sale document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarginLine {
    pub reference: MovementReference,
    pub quantity: i64,
    pub revenue: i64,
    pub cost: i64,
    pub profit: i64,
}

/// Ledger consistency check for one part
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerAudit {
    pub part_id: Uuid,
    pub stock: i64,
    pub ledger_sum: i64,
    /// Movements whose `before_stock` does not continue the previous `after_stock`,
    /// or whose snapshots disagree with their own quantity
    pub chain_breaks: Vec<Uuid>,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.stock == self.ledger_sum && self.chain_breaks.is_empty()
    }
}

#[derive(Clone)]
pub struct ReportingService<S: InventoryStore> {
    store: S,
}

impl<S: InventoryStore> ReportingService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Movements newest first
    pub async fn list_movements(
        &self,
        filter: &MovementFilter,
    ) -> AppResult<PaginatedResponse<StockMovement>> {
        self.store.list_movements(filter).await
    }

    /// Per-document margins from batch consumption. Returned units count negative.
    pub async fn margin_report(&self, filter: &ConsumptionFilter) -> AppResult<Vec<MarginLine>> {
        let consumptions = self.store.list_consumptions(filter).await?;

        let mut lines: Vec<MarginLine> = Vec::new();
        let mut index: HashMap<MovementReference, usize> = HashMap::new();

        for consumption in consumptions.iter().filter(|c| {
            matches!(
                c.reference,
                MovementReference::SaleDocument(_) | MovementReference::SalesOrder(_)
            )
        }) {
            let position = *index.entry(consumption.reference).or_insert_with(|| {
                lines.push(MarginLine {
                    reference: consumption.reference,
                    quantity: 0,
                    revenue: 0,
                    cost: 0,
                    profit: 0,
                });
                lines.len() - 1
            });

            let line = &mut lines[position];
            line.quantity += consumption.quantity;
            line.revenue += consumption.quantity * consumption.unit_selling_price;
            line.cost += consumption.quantity * consumption.unit_cost;
            line.profit = line.revenue - line.cost;
        }

        Ok(lines)
    }

    /// Check the part's stock against its ledger
    pub async fn verify_ledger(&self, part_id: Uuid) -> AppResult<LedgerAudit> {
        let part = self
            .store
            .find_part(part_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Part {}", part_id)))?;
        let movements = self.store.part_ledger(part_id).await?;

        let mut ledger_sum = 0;
        let mut chain_breaks = Vec::new();
        for movement in &movements {
            let continues = movement.before_stock == ledger_sum;
            let self_consistent =
                movement.after_stock == movement.before_stock + movement.signed_quantity();
            if !continues || !self_consistent {
                chain_breaks.push(movement.id);
            }
            ledger_sum += movement.signed_quantity();
        }

        Ok(LedgerAudit {
            part_id,
            stock: part.stock,
            ledger_sum,
            chain_breaks,
        })
    }
}
