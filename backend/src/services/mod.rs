//! Stock services for the parts inventory engine

pub mod alerts;
pub mod allocation;
pub mod inventory;
pub mod ledger;
pub mod numbering;
pub mod reporting;

use std::future::Future;

pub use alerts::{AlertService, AlertSynchronizer, AlertTransition, SweepReport};
pub use allocation::{ConsumedSale, FifoAllocator};
pub use inventory::{
    AdjustStock, InventoryService, ReceivePurchase, RecordSale, SaleLineInput, SaleOutcome,
    StockChange,
};
pub use ledger::{NewMovement, StockLedger};
pub use numbering::DocumentNumberGenerator;
pub use reporting::{LedgerAudit, MarginLine, ReportingService};

use crate::error::AppResult;

/// Re-run `op` while it fails with a retryable conflict, up to `max_attempts` times
pub(crate) async fn retry_on_conflict<T, F, Fut>(
    max_attempts: u32,
    operation: &'static str,
    mut op: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                tracing::warn!(operation, attempt, error = %err, "Retrying after concurrent update");
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_stops_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: AppResult<()> = retry_on_conflict(3, "flaky_write", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::ConcurrencyConflict("part".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_other_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: AppResult<()> = retry_on_conflict(3, "flaky_write", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::NotFound("part".into()))
        })
        .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_returns_first_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_on_conflict(5, "flaky_write", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::ConcurrencyConflict("part".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
