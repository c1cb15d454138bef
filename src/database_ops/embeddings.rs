//! Resumable backfill of embedding vectors for source rows that lack one.
//!
//! The pending set is re-derived from the store on every run, so an interrupted run
//! leaves nothing to clean up: the next run picks up whatever is still missing.
use std::fmt;

use futures::stream::{self, StreamExt};
use tracing::{error, info, instrument, warn};

use super::embedder::EmbeddingClient;
use super::store::{EmbeddingRecord, EmbeddingSource, EmbeddingStore};
use crate::config::BackfillConfig;
use crate::error::{IngestError, RecordFailure};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BackfillReport {
    pub pending: usize,
    pub attempted: usize,
    pub embedded: u64,
    pub failed: usize,
    pub skipped_empty: usize,
    /// Batches whose bulk insert was rejected.
    pub persist_failures: usize,
    pub batches: usize,
    pub total_embeddings: u64,
    pub failures: Vec<RecordFailure>,
}

impl fmt::Display for BackfillReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pending={} attempted={} embedded={} failed={} skipped_empty={} persist_failures={} batches={} total_embeddings={}",
            self.pending,
            self.attempted,
            self.embedded,
            self.failed,
            self.skipped_empty,
            self.persist_failures,
            self.batches,
            self.total_embeddings
        )
    }
}

#[instrument(skip_all, fields(batch_size = config.batch_size, concurrency = config.concurrency))]
pub async fn run_backfill<S, C>(
    store: &S,
    client: &C,
    config: &BackfillConfig,
) -> Result<BackfillReport, IngestError>
where
    S: EmbeddingStore + ?Sized,
    C: EmbeddingClient + ?Sized,
{
    let done = store.embedded_source_ids().await?;
    let sources = store.embedding_sources().await?;
    let pending: Vec<EmbeddingSource> = sources
        .into_iter()
        .filter(|s| !done.contains(&s.id))
        .collect();

    let mut report = BackfillReport {
        pending: pending.len(),
        ..Default::default()
    };
    info!(done = done.len(), pending = pending.len(), "backfill candidates");

    let batch_size = config.batch_size.max(1);
    let concurrency = config.concurrency.max(1);
    let total_batches = pending.len().div_ceil(batch_size);

    for (idx, batch) in pending.chunks(batch_size).enumerate() {
        report.batches += 1;
        let work: Vec<(i64, &str)> = batch
            .iter()
            .filter_map(|s| match s.text.as_deref().map(str::trim) {
                Some(t) if !t.is_empty() => Some((s.id, t)),
                _ => None,
            })
            .collect();
        report.skipped_empty += batch.len() - work.len();
        report.attempted += work.len();

        let results: Vec<_> = stream::iter(work)
            .map(|(id, text)| async move { (id, client.embed(text).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut rows = Vec::with_capacity(results.len());
        for (id, result) in results {
            match result {
                Ok(vector) => rows.push(EmbeddingRecord {
                    source_id: id,
                    vector,
                }),
                Err(reason) => {
                    warn!(source_id = id, reason = %reason, "embedding failed");
                    report.failed += 1;
                    report.failures.push(RecordFailure {
                        key: id.to_string(),
                        reason,
                    });
                }
            }
        }
        // insertion order independent of completion order
        rows.sort_by_key(|r| r.source_id);

        match store.insert_embeddings(&rows).await {
            Ok(n) => {
                report.embedded += n;
                info!(batch = idx + 1, of = total_batches, inserted = n, "embedding batch stored");
            }
            Err(e) => {
                report.persist_failures += 1;
                error!(batch = idx + 1, rows = rows.len(), error = %e, "embedding batch insert failed");
            }
        }

        if idx + 1 < total_batches && !config.delay.is_zero() {
            tokio::time::sleep(config.delay).await;
        }
    }

    report.total_embeddings = store.count_embeddings().await?;
    info!(
        embedded = report.embedded,
        failed = report.failed,
        total = report.total_embeddings,
        "backfill complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::memory::MemoryStore;
    use crate::database_ops::store::RecordStore;
    use crate::error::FailureReason;
    use crate::normalization::{entities, FieldValue, NormalizedRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeClient {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl EmbeddingClient for FakeClient {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, FailureReason> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail_on == Some(text) {
                return Err(FailureReason::ServiceStatus { status: 429 });
            }
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    fn config(batch_size: usize, concurrency: usize) -> BackfillConfig {
        BackfillConfig {
            batch_size,
            concurrency,
            delay: Duration::ZERO,
        }
    }

    async fn seeded(n: usize) -> MemoryStore {
        let store = MemoryStore::default();
        let d = entities::subject_line();
        let records: Vec<_> = (0..n)
            .map(|i| {
                NormalizedRecord::new()
                    .with("subject_line", FieldValue::Text(format!("subject {i}")))
                    .with("open_rate", FieldValue::Decimal(bigdecimal::BigDecimal::from(1)))
                    .with("line_key", FieldValue::Text(format!("k{i}")))
            })
            .collect();
        store.upsert_batch(&d, &records).await.unwrap();
        store
    }

    #[tokio::test]
    async fn processes_only_pending_and_resumes() {
        let store = seeded(10).await;
        let existing: Vec<_> = (1..=4)
            .map(|id| EmbeddingRecord {
                source_id: id,
                vector: vec![0.0, 0.0],
            })
            .collect();
        store.insert_embeddings(&existing).await.unwrap();

        let client = FakeClient::default();
        let first = run_backfill(&store, &client, &config(4, 2)).await.unwrap();
        assert_eq!(first.pending, 6);
        assert_eq!(first.embedded, 6);
        assert_eq!(first.batches, 2);
        assert_eq!(first.total_embeddings, 10);
        assert_eq!(client.calls.load(Ordering::SeqCst), 6);

        let second = run_backfill(&store, &client, &config(4, 2)).await.unwrap();
        assert_eq!(second.pending, 0);
        assert_eq!(second.attempted, 0);
        assert_eq!(second.batches, 0);
        assert_eq!(client.calls.load(Ordering::SeqCst), 6);
        assert_eq!(store.embedding(1), Some(vec![0.0, 0.0]));
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_between_batches_but_not_after_last() {
        let store = seeded(6).await;
        let config = BackfillConfig {
            batch_size: 2,
            concurrency: 2,
            delay: Duration::from_secs(1),
        };
        let started = tokio::time::Instant::now();
        let report = run_backfill(&store, &FakeClient::default(), &config)
            .await
            .unwrap();
        assert_eq!(report.batches, 3);
        assert_eq!(report.embedded, 6);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn failed_calls_stay_pending() {
        let store = seeded(3).await;
        let client = FakeClient {
            fail_on: Some("subject 1"),
            ..Default::default()
        };
        let report = run_backfill(&store, &client, &config(100, 8)).await.unwrap();
        assert_eq!(report.embedded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].key, "2");
        assert_eq!(report.failures[0].reason.code(), "service_status");

        let retry = run_backfill(&store, &FakeClient::default(), &config(100, 8))
            .await
            .unwrap();
        assert_eq!(retry.pending, 1);
        assert_eq!(retry.total_embeddings, 3);
    }

    #[tokio::test]
    async fn concurrency_is_capped_below_batch_width() {
        let store = seeded(12).await;
        let client = Arc::new(FakeClient::default());
        let report = run_backfill(&store, client.as_ref(), &config(12, 3)).await.unwrap();
        assert_eq!(report.embedded, 12);
        assert!(client.peak.load(Ordering::SeqCst) <= 3);
    }
}
