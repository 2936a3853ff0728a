//! Shared types and pure costing logic for the parts inventory engine
//!
//! Everything in this crate is free of I/O: money helpers, the discount/tax
//! calculator, FIFO planning, document totals and numbering. The backend
//! crate layers persistence and locking on top.

pub mod fifo;
pub mod models;
pub mod money;
pub mod numbering;
pub mod pricing;
pub mod totals;
pub mod types;
pub mod validation;

pub use models::*;
pub use pricing::{Adjustment, AdjustmentType, PricingError, TotalBreakdown};
pub use totals::RecalculateTotals;
pub use types::*;
pub use validation::*;
