//! Parts inventory engine - stock ledger, FIFO costing and low-stock alerts
//!
//! Services in [`services`] run over any [`store::InventoryStore`]: the
//! PostgreSQL store in production, the in-memory store in tests.

pub mod clock;
pub mod config;
pub mod error;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};

use std::sync::Arc;

use clock::Clock;
use services::{
    AlertService, AlertSynchronizer, InventoryService, ReportingService, StockLedger,
};
use store::InventoryStore;

/// Every service wired over one store and one alert channel
#[derive(Clone)]
pub struct Engine<S: InventoryStore> {
    pub inventory: InventoryService<S>,
    pub alerts: AlertService<S>,
    pub reporting: ReportingService<S>,
}

impl<S: InventoryStore> Engine<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self::with_parts(store, clock, &config.ledger, &config.alerts)
    }

    pub fn with_parts(
        store: S,
        clock: Arc<dyn Clock>,
        ledger: &config::LedgerConfig,
        alerts: &config::AlertConfig,
    ) -> Self {
        let synchronizer = AlertSynchronizer::new(clock.clone(), alerts);
        let ledger = StockLedger::new(store.clone(), clock.clone(), synchronizer.clone(), ledger);

        Self {
            inventory: InventoryService::new(ledger),
            alerts: AlertService::new(store.clone(), synchronizer, clock),
            reporting: ReportingService::new(store),
        }
    }

    pub fn ledger(&self) -> &StockLedger<S> {
        self.inventory.ledger()
    }
}
