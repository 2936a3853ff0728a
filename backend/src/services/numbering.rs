//! Document number generation

use std::sync::Arc;

use chrono::NaiveDate;
use shared::numbering::{format_document_number, max_sequence_in, DocumentKind};
use tracing::info;

use crate::clock::Clock;
use crate::error::AppResult;
use crate::store::SequenceStore;

/// Issues `{PREFIX}-{YYYYMMDD}-{NNNN}` numbers from an atomic per-day counter
#[derive(Clone)]
pub struct DocumentNumberGenerator<Q: SequenceStore> {
    sequences: Q,
    clock: Arc<dyn Clock>,
}

impl<Q: SequenceStore> DocumentNumberGenerator<Q> {
    pub fn new(sequences: Q, clock: Arc<dyn Clock>) -> Self {
        Self { sequences, clock }
    }

    /// Next number for today
    pub async fn next_number(&self, kind: DocumentKind) -> AppResult<String> {
        self.next_number_on(kind, self.clock.today()).await
    }

    pub async fn next_number_on(&self, kind: DocumentKind, date: NaiveDate) -> AppResult<String> {
        let sequence = self.sequences.next_sequence(kind, date).await?;
        Ok(format_document_number(kind, date, sequence))
    }

    /// Move the counter past numbers issued before it existed.
    ///
    /// Returns the highest sequence found.
    pub async fn seed_from_existing<'a>(
        &self,
        kind: DocumentKind,
        date: NaiveDate,
        existing: impl IntoIterator<Item = &'a str>,
    ) -> AppResult<u32> {
        let highest = max_sequence_in(existing, kind, date);
        if highest > 0 {
            self.sequences.seed_sequence(kind, date, highest).await?;
            info!(kind = %kind, date = %date, highest, "Document counter seeded");
        }
        Ok(highest)
    }
}
