//! Batched insert-or-update with per-record fallback.
use tracing::{error, info, instrument, warn};

use super::store::RecordStore;
use crate::error::{FailureReason, RecordFailure};
use crate::normalization::{EntityDescriptor, NormalizedRecord};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct WriteReport {
    pub written: u64,
    pub failed: u64,
    pub batches: usize,
    /// Batches that were rejected whole and retried record by record.
    pub fallback_batches: usize,
    pub failures: Vec<RecordFailure>,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchWriter {
    batch_size: usize,
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BatchWriter {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Writes every record, never aborting on a store rejection. Partially written
    /// runs are not rolled back.
    #[instrument(skip_all, fields(entity = descriptor.kind.label(), records = records.len()))]
    pub async fn write<S>(
        &self,
        store: &S,
        descriptor: &EntityDescriptor,
        records: &[NormalizedRecord],
    ) -> WriteReport
    where
        S: RecordStore + ?Sized,
    {
        let mut report = WriteReport::default();
        let total_batches = records.len().div_ceil(self.batch_size);
        for (idx, batch) in records.chunks(self.batch_size).enumerate() {
            report.batches += 1;
            match store.upsert_batch(descriptor, batch).await {
                Ok(n) => {
                    report.written += n;
                    info!(
                        batch = idx + 1,
                        of = total_batches,
                        rows = n,
                        "batch upserted"
                    );
                }
                Err(e) => {
                    error!(batch = idx + 1, rows = batch.len(), error = %e, "batch upsert failed; retrying per record");
                    report.fallback_batches += 1;
                    self.write_each(store, descriptor, batch, &mut report).await;
                }
            }
        }
        report
    }

    async fn write_each<S>(
        &self,
        store: &S,
        descriptor: &EntityDescriptor,
        batch: &[NormalizedRecord],
        report: &mut WriteReport,
    ) where
        S: RecordStore + ?Sized,
    {
        for record in batch {
            match store.upsert_batch(descriptor, std::slice::from_ref(record)).await {
                Ok(n) => report.written += n,
                Err(e) => {
                    let key = record.key(descriptor).unwrap_or_default();
                    warn!(%key, error = %e, "record upsert failed");
                    report.failed += 1;
                    report.failures.push(RecordFailure {
                        key,
                        reason: FailureReason::from(e),
                    });
                }
            }
        }
    }
}
