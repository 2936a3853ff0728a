//! Low-stock alerts
//!
//! An alert exists for a part exactly when `minimal_stock > 0` and
//! `stock <= minimal_stock`. The ledger keeps this true on every stock write;
//! [`AlertService::reconcile_all`] repairs drift from writes that bypassed it.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use shared::{LowStockAlert, LowStockEvent, Part};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::AlertConfig;
use crate::error::{AppError, AppResult};
use crate::store::{InventoryStore, StoreTx, UnitOfWork};

/// What a sync did to a part's alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertTransition {
    Raised,
    Refreshed,
    Unchanged,
    Cleared,
    None,
}

/// Counts from one reconciliation sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub raised: usize,
    pub refreshed: usize,
    pub cleared: usize,
    pub unchanged: usize,
}

impl SweepReport {
    fn record(&mut self, transition: AlertTransition) {
        match transition {
            AlertTransition::Raised => self.raised += 1,
            AlertTransition::Refreshed => self.refreshed += 1,
            AlertTransition::Cleared => self.cleared += 1,
            AlertTransition::Unchanged => self.unchanged += 1,
            AlertTransition::None => {}
        }
    }

    pub fn changed(&self) -> usize {
        self.raised + self.refreshed + self.cleared
    }
}

#[derive(Clone)]
pub struct AlertSynchronizer {
    events: broadcast::Sender<LowStockEvent>,
    clock: Arc<dyn Clock>,
}

impl AlertSynchronizer {
    pub fn new(clock: Arc<dyn Clock>, config: &AlertConfig) -> Self {
        let (events, _) = broadcast::channel(config.channel_capacity.max(1));
        Self { events, clock }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LowStockEvent> {
        self.events.subscribe()
    }

    /// Bring the alert for `part` in line with its stock
    pub async fn sync_alert<T: StoreTx>(
        &self,
        uow: &mut UnitOfWork<T>,
        part: &Part,
    ) -> AppResult<AlertTransition> {
        let existing = uow.tx().find_alert(part.id).await?;

        if part.is_deleted() || !part.is_low_stock() {
            return match existing {
                Some(_) => {
                    uow.tx().delete_alert(part.id).await?;
                    Ok(AlertTransition::Cleared)
                }
                None => Ok(AlertTransition::None),
            };
        }

        let now = self.clock.now();
        match existing {
            Some(alert) if alert.matches(part) => Ok(AlertTransition::Unchanged),
            Some(mut alert) => {
                alert.current_stock = part.stock;
                alert.minimal_stock = part.minimal_stock;
                alert.updated_at = now;
                uow.tx().save_alert(&alert).await?;
                Ok(AlertTransition::Refreshed)
            }
            None => {
                let alert = LowStockAlert {
                    id: Uuid::new_v4(),
                    part_id: part.id,
                    current_stock: part.stock,
                    minimal_stock: part.minimal_stock,
                    is_read: false,
                    created_at: now,
                    updated_at: now,
                };
                uow.tx().save_alert(&alert).await?;
                uow.raise(LowStockEvent {
                    part_id: part.id,
                    sku: part.sku.clone(),
                    current_stock: part.stock,
                    minimal_stock: part.minimal_stock,
                    raised_at: now,
                });
                Ok(AlertTransition::Raised)
            }
        }
    }

    /// Fan committed events out to subscribers
    pub fn publish(&self, events: Vec<LowStockEvent>) {
        for event in events {
            let part_id = event.part_id;
            if self.events.send(event).is_err() {
                debug!(part_id = %part_id, "No low-stock subscribers");
            }
        }
    }
}

#[derive(Clone)]
pub struct AlertService<S: InventoryStore> {
    store: S,
    synchronizer: AlertSynchronizer,
    clock: Arc<dyn Clock>,
}

impl<S: InventoryStore> AlertService<S> {
    pub fn new(store: S, synchronizer: AlertSynchronizer, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            synchronizer,
            clock,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LowStockEvent> {
        self.synchronizer.subscribe()
    }

    /// Re-derive every alert from current part state
    pub async fn reconcile_all(&self) -> AppResult<SweepReport> {
        let parts = {
            let mut tx = self.store.begin().await?;
            tx.list_parts().await?
        };

        let mut report = SweepReport::default();
        let mut live = HashSet::new();

        for candidate in parts.iter().filter(|p| !p.is_deleted()) {
            let mut uow = UnitOfWork::new(self.store.begin().await?);
            let part = match uow.tx().lock_part(candidate.id).await {
                Ok(part) => part,
                // deleted since the listing
                Err(AppError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            live.insert(part.id);

            let transition = self.synchronizer.sync_alert(&mut uow, &part).await?;
            let events = uow.commit().await?;
            self.synchronizer.publish(events);
            report.record(transition);
        }

        let mut uow = UnitOfWork::new(self.store.begin().await?);
        let alerts = uow.tx().all_alerts().await?;
        for alert in alerts.iter().filter(|a| !live.contains(&a.part_id)) {
            // the part may have been created after the listing
            match uow.tx().lock_part(alert.part_id).await {
                Ok(part) => {
                    let transition = self.synchronizer.sync_alert(&mut uow, &part).await?;
                    report.record(transition);
                }
                Err(AppError::NotFound(_)) => {
                    uow.tx().delete_alert(alert.part_id).await?;
                    report.record(AlertTransition::Cleared);
                }
                Err(err) => return Err(err),
            }
        }
        let events = uow.commit().await?;
        self.synchronizer.publish(events);

        info!(
            raised = report.raised,
            refreshed = report.refreshed,
            cleared = report.cleared,
            unchanged = report.unchanged,
            "Low-stock sweep finished"
        );
        Ok(report)
    }

    pub async fn list_alerts(&self, unread_only: bool) -> AppResult<Vec<LowStockAlert>> {
        self.store.list_alerts(unread_only).await
    }

    pub async fn mark_read(&self, part_id: Uuid) -> AppResult<LowStockAlert> {
        let mut uow = UnitOfWork::new(self.store.begin().await?);
        let mut alert = uow
            .tx()
            .find_alert(part_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Low-stock alert for part {}", part_id)))?;

        alert.is_read = true;
        alert.updated_at = self.clock.now();
        uow.tx().save_alert(&alert).await?;
        uow.commit().await?;

        Ok(alert)
    }
}
