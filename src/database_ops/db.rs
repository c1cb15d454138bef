use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, instrument};

use super::store::{
    EmbeddingRecord, EmbeddingSource, EmbeddingStore, EmbeddingTarget, RecordStore,
};
use crate::error::{IngestError, StoreError};
use crate::normalization::{EntityDescriptor, FieldType, FieldValue, NormalizedRecord};

/// Postgres-backed store. Statements are never prepared so the pool works behind
/// a transaction-mode pooler.
#[derive(Clone, Debug)]
pub struct PgStore {
    pub pool: PgPool,
    target: EmbeddingTarget,
}

impl PgStore {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, IngestError> {
        let mut connect_options = PgConnectOptions::from_str(database_url)?;
        if database_url.contains("sslmode=require") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }
        connect_options = connect_options.statement_cache_capacity(0);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await?;
        info!("connected to db");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            target: EmbeddingTarget::SUBJECT_LINES,
        }
    }

    pub fn with_embedding_target(mut self, target: EmbeddingTarget) -> Self {
        self.target = target;
        self
    }
}

fn bind_field(b: &mut Separated<'_, 'static, Postgres, &'static str>, value: &FieldValue, ty: FieldType) {
    match (ty, value) {
        (FieldType::Text, FieldValue::Text(s)) => b.push_bind(Some(s.clone())),
        (FieldType::Text, _) => b.push_bind(None::<String>),
        (FieldType::Integer, FieldValue::Integer(n)) => b.push_bind(Some(*n)),
        (FieldType::Integer, _) => b.push_bind(None::<i64>),
        (FieldType::Decimal, FieldValue::Decimal(d)) => b.push_bind(Some(d.clone())),
        (FieldType::Decimal, _) => b.push_bind(None::<bigdecimal::BigDecimal>),
        (FieldType::Boolean, FieldValue::Boolean(v)) => b.push_bind(Some(*v)),
        (FieldType::Boolean, _) => b.push_bind(None::<bool>),
        (FieldType::Date | FieldType::DatePrefix, FieldValue::Date(d)) => b.push_bind(Some(*d)),
        (FieldType::Date | FieldType::DatePrefix, _) => b.push_bind(None::<chrono::NaiveDate>),
    };
}

/// `INSERT ... VALUES ... ON CONFLICT (key) DO UPDATE SET` for one batch.
pub(crate) fn build_upsert(
    descriptor: &EntityDescriptor,
    records: &[NormalizedRecord],
) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    let types = descriptor.field_types();
    for record in records {
        for (field, value) in record.iter() {
            match types.get(field) {
                Some(ty) if value.fits(*ty) => {}
                Some(_) => {
                    return Err(StoreError::Rejected(format!(
                        "value {value} does not fit column {field}"
                    )))
                }
                None => {
                    return Err(StoreError::Rejected(format!(
                        "unknown column {field} for {}",
                        descriptor.table
                    )))
                }
            }
        }
    }

    let columns: Vec<&str> = types.keys().copied().collect();
    let mut qb: QueryBuilder<'static, Postgres> =
        QueryBuilder::new(format!("INSERT INTO {} ({}) ", descriptor.table, columns.join(", ")));
    qb.push_values(records.iter(), |mut b, record| {
        for (field, ty) in &types {
            bind_field(&mut b, record.get(field), *ty);
        }
    });
    qb.push(format!(" ON CONFLICT ({}) DO UPDATE SET ", descriptor.business_key));
    for field in &descriptor.update_fields {
        qb.push(format!("{field} = EXCLUDED.{field}, "));
    }
    qb.push("updated_at = now()");
    Ok(qb)
}

/// pgvector text form: `[0.1,0.2,...]`.
pub(crate) fn vector_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

#[async_trait]
impl RecordStore for PgStore {
    #[instrument(skip(self, descriptor, records), fields(table = descriptor.table, rows = records.len()))]
    async fn upsert_batch(
        &self,
        descriptor: &EntityDescriptor,
        records: &[NormalizedRecord],
    ) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut qb = build_upsert(descriptor, records)?;
        let res = qb.build().persistent(false).execute(&self.pool).await?;
        debug!(rows_affected = res.rows_affected(), "upsert executed");
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl EmbeddingStore for PgStore {
    async fn embedded_source_ids(&self) -> Result<HashSet<i64>, StoreError> {
        let sql = format!(
            "SELECT {}::bigint FROM {}",
            self.target.source_fk, self.target.embedding_table
        );
        let ids: Vec<i64> = sqlx::query_scalar(&sql)
            .persistent(false)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn embedding_sources(&self) -> Result<Vec<EmbeddingSource>, StoreError> {
        let sql = format!(
            "SELECT id::bigint, {}::text FROM {} ORDER BY id",
            self.target.text_field, self.target.source_table
        );
        let rows: Vec<(i64, Option<String>)> = sqlx::query_as(&sql)
            .persistent(false)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, text)| EmbeddingSource { id, text })
            .collect())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn insert_embeddings(&self, rows: &[EmbeddingRecord]) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<'static, Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}, embedding) ",
            self.target.embedding_table, self.target.source_fk
        ));
        qb.push_values(rows.iter(), |mut b, row| {
            b.push_bind(row.source_id);
            b.push_bind(vector_literal(&row.vector))
                .push_unseparated("::vector");
        });
        qb.push(format!(" ON CONFLICT ({}) DO NOTHING", self.target.source_fk));
        let res = qb.build().persistent(false).execute(&self.pool).await?;
        Ok(res.rows_affected())
    }

    async fn count_embeddings(&self) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.target.embedding_table);
        let n: i64 = sqlx::query_scalar(&sql)
            .persistent(false)
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }
}
