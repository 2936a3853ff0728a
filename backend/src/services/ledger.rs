//! Append-only stock ledger
//!
//! Every change to `Part::stock` goes through [`StockLedger::apply_movement`]:
//! the part row is locked, the new level is checked against zero, the part is
//! written and a movement carrying both snapshots is appended, all inside the
//! caller's unit of work. Low-stock alerts are synchronized before commit.

use std::sync::Arc;

use serde::Deserialize;
use shared::{MovementReference, MovementType, StockMovement};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::alerts::AlertSynchronizer;
use super::retry_on_conflict;
use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};
use crate::store::{InventoryStore, NewConsumption, NewMovementRecord, StoreTx, UnitOfWork};

/// Input for a single stock movement
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewMovement {
    pub part_id: Uuid,
    pub movement_type: MovementType,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i64,
    #[serde(default)]
    pub reference: MovementReference,
    #[validate(length(max = 64, message = "Reference number is too long"))]
    pub reference_number: Option<String>,
    pub batch_id: Option<Uuid>,
    pub reverses_movement_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    #[validate(length(max = 1000, message = "Notes are too long"))]
    pub notes: Option<String>,
    pub created_by: Uuid,
}

impl NewMovement {
    pub fn new(
        part_id: Uuid,
        movement_type: MovementType,
        quantity: i64,
        reference: MovementReference,
        created_by: Uuid,
    ) -> Self {
        Self {
            part_id,
            movement_type,
            quantity,
            reference,
            reference_number: None,
            batch_id: None,
            reverses_movement_id: None,
            supplier_id: None,
            notes: None,
            created_by,
        }
    }
}

#[derive(Clone)]
pub struct StockLedger<S: InventoryStore> {
    store: S,
    clock: Arc<dyn Clock>,
    alerts: AlertSynchronizer,
    max_attempts: u32,
}

impl<S: InventoryStore> StockLedger<S> {
    pub fn new(
        store: S,
        clock: Arc<dyn Clock>,
        alerts: AlertSynchronizer,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            alerts,
            max_attempts: config.max_attempts,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn alerts(&self) -> &AlertSynchronizer {
        &self.alerts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn begin(&self) -> AppResult<UnitOfWork<S::Tx>> {
        Ok(UnitOfWork::new(self.store.begin().await?))
    }

    /// Commit and publish any low-stock events raised on the way
    pub async fn commit(&self, uow: UnitOfWork<S::Tx>) -> AppResult<()> {
        let events = uow.commit().await?;
        self.alerts.publish(events);
        Ok(())
    }

    /// Record one manual movement in its own unit of work.
    ///
    /// Purchases, sales and reversals carry batch bookkeeping and go through
    /// their dedicated operations instead.
    pub async fn record_movement(&self, input: NewMovement) -> AppResult<StockMovement> {
        input.validate()?;
        match input.movement_type {
            MovementType::PurchaseReceived | MovementType::Sale => {
                return Err(AppError::validation(
                    "movement_type",
                    "Purchases and sales must be recorded with their batches",
                ));
            }
            t if t.is_reversal() => {
                return Err(AppError::validation(
                    "movement_type",
                    "Reversals must be created from the original movement",
                ));
            }
            _ => {}
        }

        retry_on_conflict(self.max_attempts, "record_movement", move || {
            self.try_record(input.clone())
        })
        .await
    }

    async fn try_record(&self, input: NewMovement) -> AppResult<StockMovement> {
        let mut uow = self.begin().await?;
        let movement = self.apply_movement(&mut uow, input).await?;
        self.commit(uow).await?;

        info!(
            movement_id = %movement.id,
            part_id = %movement.part_id,
            movement_type = %movement.movement_type,
            quantity = movement.quantity,
            after_stock = movement.after_stock,
            "Stock movement recorded"
        );
        Ok(movement)
    }

    /// Apply one movement inside the caller's unit of work
    pub async fn apply_movement(
        &self,
        uow: &mut UnitOfWork<S::Tx>,
        input: NewMovement,
    ) -> AppResult<StockMovement> {
        input.validate()?;

        // reversals inherit the original's reference, which may since have been detached
        if input.reverses_movement_id.is_none() {
            match input.reference {
                MovementReference::None => {
                    return Err(AppError::InvalidReference(
                        "A movement must reference its source document".to_string(),
                    ));
                }
                reference => {
                    if !uow.tx().reference_exists(&reference).await? {
                        return Err(AppError::InvalidReference(format!(
                            "{} {} does not exist",
                            reference.kind().map(|k| k.label()).unwrap_or("Document"),
                            reference.id().unwrap_or_default()
                        )));
                    }
                }
            }
        }

        let part = uow.tx().lock_part(input.part_id).await?;
        let before_stock = part.stock;
        let after_stock = before_stock + input.movement_type.signed(input.quantity);

        if after_stock < 0 {
            warn!(
                part_id = %part.id,
                sku = %part.sku,
                requested = input.quantity,
                available = before_stock,
                "Insufficient stock"
            );
            return Err(AppError::InsufficientStock {
                part_id: part.id,
                requested: input.quantity,
                available: before_stock,
            });
        }

        let now = self.clock.now();
        let part = uow.tx().write_part_stock(&part, after_stock, now).await?;
        let movement = uow
            .tx()
            .append_movement(NewMovementRecord {
                part_id: part.id,
                movement_type: input.movement_type,
                quantity: input.quantity,
                before_stock,
                after_stock,
                reference: input.reference,
                reference_number: input.reference_number,
                batch_id: input.batch_id,
                reverses_movement_id: input.reverses_movement_id,
                supplier_id: input.supplier_id,
                notes: input.notes,
                created_by: input.created_by,
                created_at: now,
            })
            .await?;

        let transition = self.alerts.sync_alert(uow, &part).await?;
        debug!(part_id = %part.id, ?transition, "Low-stock alert synchronized");

        Ok(movement)
    }

    /// Append the compensating movement for `original_id`
    pub async fn reverse_movement(
        &self,
        original_id: Uuid,
        actor_id: Uuid,
        notes: Option<String>,
    ) -> AppResult<StockMovement> {
        retry_on_conflict(self.max_attempts, "reverse_movement", move || {
            let notes = notes.clone();
            async move {
                let mut uow = self.begin().await?;
                let movement = self.reverse_in(&mut uow, original_id, actor_id, notes).await?;
                self.commit(uow).await?;

                info!(
                    movement_id = %movement.id,
                    reverses = %original_id,
                    movement_type = %movement.movement_type,
                    "Stock movement reversed"
                );
                Ok(movement)
            }
        })
        .await
    }

    /// Reverse inside the caller's unit of work
    pub async fn reverse_in(
        &self,
        uow: &mut UnitOfWork<S::Tx>,
        original_id: Uuid,
        actor_id: Uuid,
        notes: Option<String>,
    ) -> AppResult<StockMovement> {
        let original = uow
            .tx()
            .find_movement(original_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Stock movement {}", original_id)))?;

        let Some(reversal_type) = original.movement_type.reversal() else {
            return Err(AppError::InvalidReference(format!(
                "Stock movement {} is itself a reversal",
                original_id
            )));
        };

        // part before batch, the same order a sale takes its locks in
        uow.tx().lock_part(original.part_id).await?;

        if let Some(existing) = uow.tx().find_reversal_of(original_id).await? {
            return Err(AppError::InvalidReference(format!(
                "Stock movement {} was already reversed by {}",
                original_id, existing.id
            )));
        }

        // units already sold out of a batch cannot be un-received
        let received_batch = match (original.movement_type, original.batch_id) {
            (MovementType::PurchaseReceived, Some(batch_id)) => {
                let batch = uow
                    .tx()
                    .lock_batch(batch_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Purchase batch {}", batch_id)))?;
                if batch.remaining_quantity < original.quantity {
                    warn!(
                        batch_id = %batch_id,
                        remaining = batch.remaining_quantity,
                        requested = original.quantity,
                        "Purchase reversal blocked by consumed batch"
                    );
                    return Err(AppError::InsufficientStock {
                        part_id: original.part_id,
                        requested: original.quantity,
                        available: batch.remaining_quantity,
                    });
                }
                Some(batch)
            }
            _ => None,
        };

        let reversal = self
            .apply_movement(
                uow,
                NewMovement {
                    part_id: original.part_id,
                    movement_type: reversal_type,
                    quantity: original.quantity,
                    reference: original.reference,
                    reference_number: original.reference_number.clone(),
                    batch_id: original.batch_id,
                    reverses_movement_id: Some(original.id),
                    supplier_id: original.supplier_id,
                    notes,
                    created_by: actor_id,
                },
            )
            .await?;

        if let Some(batch) = received_batch {
            uow.tx()
                .append_consumption(NewConsumption {
                    batch_id: batch.batch.id,
                    part_id: original.part_id,
                    movement_id: reversal.id,
                    quantity: original.quantity,
                    unit_cost: batch.batch.unit_cost,
                    unit_selling_price: batch.batch.unit_cost,
                    reference: original.reference,
                    created_at: reversal.created_at,
                })
                .await?;
        }

        if original.movement_type == MovementType::Sale {
            let consumed_batches = uow.tx().consumptions_for_movement(original.id).await?;
            for consumed in consumed_batches {
                uow.tx()
                    .append_consumption(NewConsumption {
                        batch_id: consumed.batch_id,
                        part_id: consumed.part_id,
                        movement_id: reversal.id,
                        quantity: -consumed.quantity,
                        unit_cost: consumed.unit_cost,
                        unit_selling_price: consumed.unit_selling_price,
                        reference: consumed.reference,
                        created_at: reversal.created_at,
                    })
                    .await?;
            }
        }

        Ok(reversal)
    }

    /// Detach references whose document no longer exists.
    ///
    /// Returns the ids of the movements that were detached.
    pub async fn detach_orphaned_references(&self, actor_id: Uuid) -> AppResult<Vec<Uuid>> {
        let mut uow = self.begin().await?;
        let candidates = uow.tx().referenced_movements().await?;

        let mut detached = Vec::new();
        for movement in candidates {
            let orphaned = match movement.reference {
                // populated columns naming a document type that no longer exists
                MovementReference::None => true,
                reference => !uow.tx().reference_exists(&reference).await?,
            };
            if !orphaned {
                continue;
            }

            uow.tx().detach_reference(movement.id).await?;
            warn!(
                movement_id = %movement.id,
                reference = ?movement.reference,
                reference_number = ?movement.reference_number,
                actor_id = %actor_id,
                "Detached orphaned movement reference"
            );
            detached.push(movement.id);
        }

        self.commit(uow).await?;
        Ok(detached)
    }

    /// Undo a detach once the referenced document is back
    pub async fn reattach_reference(&self, movement_id: Uuid) -> AppResult<StockMovement> {
        let mut uow = self.begin().await?;
        let movement = uow
            .tx()
            .find_movement(movement_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Stock movement {}", movement_id)))?;

        let Some(reference) = movement.detached_reference else {
            return Err(AppError::InvalidReference(format!(
                "Stock movement {} has no detached reference",
                movement_id
            )));
        };
        if !uow.tx().reference_exists(&reference).await? {
            return Err(AppError::InvalidReference(format!(
                "Detached reference of movement {} still does not exist",
                movement_id
            )));
        }

        let movement = uow.tx().reattach_reference(movement_id).await?;
        self.commit(uow).await?;

        info!(movement_id = %movement_id, "Movement reference reattached");
        Ok(movement)
    }
}
