//! Persistence seams shared by the Postgres store and the in-memory store.
use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::normalization::{EntityDescriptor, NormalizedRecord};

/// Insert-or-update of normalized records keyed by the descriptor's business key.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Upsert every record as one operation. Either all rows land or the call errors.
    /// Returns the number of rows inserted or updated.
    async fn upsert_batch(
        &self,
        descriptor: &EntityDescriptor,
        records: &[NormalizedRecord],
    ) -> Result<u64, StoreError>;
}

/// A source row that may receive an embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSource {
    pub id: i64,
    pub text: Option<String>,
}

/// One embedding vector attached to its source row.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub source_id: i64,
    pub vector: Vec<f32>,
}

#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Ids of source rows that already have an embedding.
    async fn embedded_source_ids(&self) -> Result<HashSet<i64>, StoreError>;

    /// Every source row, ordered by id.
    async fn embedding_sources(&self) -> Result<Vec<EmbeddingSource>, StoreError>;

    /// Bulk insert; rows whose source already has an embedding are skipped.
    /// Returns the number of rows actually inserted.
    async fn insert_embeddings(&self, rows: &[EmbeddingRecord]) -> Result<u64, StoreError>;

    async fn count_embeddings(&self) -> Result<u64, StoreError>;
}

/// Where embeddings come from and where they go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingTarget {
    pub source_table: &'static str,
    pub text_field: &'static str,
    pub embedding_table: &'static str,
    pub source_fk: &'static str,
}

impl EmbeddingTarget {
    pub const SUBJECT_LINES: EmbeddingTarget = EmbeddingTarget {
        source_table: "subject_lines",
        text_field: "subject_line",
        embedding_table: "subject_line_embeddings",
        source_fk: "subject_line_id",
    };
}
