//! In-process store with the same constraints as the Postgres schema:
//! unique business key, NOT NULL on required fields, typed columns, and a
//! foreign key from embeddings to their source rows.
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use super::store::{
    EmbeddingRecord, EmbeddingSource, EmbeddingStore, EmbeddingTarget, RecordStore,
};
use crate::error::StoreError;
use crate::normalization::{EntityDescriptor, NormalizedRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub id: i64,
    pub fields: NormalizedRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<&'static str, IndexMap<String, StoredRow>>,
    embeddings: IndexMap<i64, Vec<f32>>,
    next_id: i64,
    upsert_calls: usize,
}

#[derive(Debug)]
pub struct MemoryStore {
    target: EmbeddingTarget,
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(EmbeddingTarget::SUBJECT_LINES)
    }
}

impl MemoryStore {
    pub fn new(target: EmbeddingTarget) -> Self {
        Self {
            target,
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".into()))
    }

    /// Rows of `table` in insertion order.
    pub fn rows(&self, table: &str) -> Vec<StoredRow> {
        self.lock()
            .map(|s| {
                s.tables
                    .get(table)
                    .map(|t| t.values().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    pub fn row(&self, table: &str, key: &str) -> Option<StoredRow> {
        self.lock()
            .ok()?
            .tables
            .get(table)
            .and_then(|t| t.get(key).cloned())
    }

    /// Number of `upsert_batch` calls made, successful or not.
    pub fn upsert_calls(&self) -> usize {
        self.lock().map(|s| s.upsert_calls).unwrap_or_default()
    }

    pub fn embedding(&self, source_id: i64) -> Option<Vec<f32>> {
        self.lock().ok()?.embeddings.get(&source_id).cloned()
    }

    fn validate(
        descriptor: &EntityDescriptor,
        records: &[NormalizedRecord],
    ) -> Result<Vec<String>, StoreError> {
        let types = descriptor.field_types();
        let mut seen = HashSet::new();
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            let key = record.key(descriptor).ok_or_else(|| {
                StoreError::Rejected(format!(
                    "null value in column \"{}\" violates not-null constraint",
                    descriptor.business_key
                ))
            })?;
            if !seen.insert(key.clone()) {
                return Err(StoreError::Rejected(format!(
                    "ON CONFLICT DO UPDATE command cannot affect row a second time (key {key})"
                )));
            }
            for (field, value) in record.iter() {
                let Some(ty) = types.get(field) else {
                    return Err(StoreError::Rejected(format!(
                        "column \"{field}\" of relation \"{}\" does not exist",
                        descriptor.table
                    )));
                };
                if !value.fits(*ty) {
                    return Err(StoreError::Rejected(format!(
                        "invalid input for column \"{field}\": {value}"
                    )));
                }
            }
            if let Some(missing) = descriptor.required_fields().find(|f| record.get(f).is_null()) {
                return Err(StoreError::Rejected(format!(
                    "null value in column \"{missing}\" violates not-null constraint"
                )));
            }
            keys.push(key);
        }
        Ok(keys)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert_batch(
        &self,
        descriptor: &EntityDescriptor,
        records: &[NormalizedRecord],
    ) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        state.upsert_calls += 1;
        let keys = Self::validate(descriptor, records)?;
        let types = descriptor.field_types();
        let now = Utc::now();
        let mut next_id = state.next_id;
        let table = state.tables.entry(descriptor.table).or_default();
        for (key, record) in keys.into_iter().zip(records) {
            match table.get_mut(&key) {
                Some(existing) => {
                    for field in &descriptor.update_fields {
                        existing.fields.set(field, record.get(field).clone());
                    }
                    existing.updated_at = now;
                }
                None => {
                    next_id += 1;
                    // every column exists, absent ones as NULL
                    let fields = types.keys().fold(NormalizedRecord::new(), |row, field| {
                        row.with(*field, record.get(field).clone())
                    });
                    table.insert(
                        key,
                        StoredRow {
                            id: next_id,
                            fields,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                }
            }
        }
        state.next_id = next_id;
        Ok(records.len() as u64)
    }
}

#[async_trait]
impl EmbeddingStore for MemoryStore {
    async fn embedded_source_ids(&self) -> Result<HashSet<i64>, StoreError> {
        Ok(self.lock()?.embeddings.keys().copied().collect())
    }

    async fn embedding_sources(&self) -> Result<Vec<EmbeddingSource>, StoreError> {
        let state = self.lock()?;
        let mut out: Vec<EmbeddingSource> = state
            .tables
            .get(self.target.source_table)
            .map(|t| {
                t.values()
                    .map(|row| EmbeddingSource {
                        id: row.id,
                        text: row.fields.get(self.target.text_field).as_text().map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by_key(|s| s.id);
        Ok(out)
    }

    async fn insert_embeddings(&self, rows: &[EmbeddingRecord]) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let known: HashSet<i64> = state
            .tables
            .get(self.target.source_table)
            .map(|t| t.values().map(|r| r.id).collect())
            .unwrap_or_default();
        if let Some(orphan) = rows.iter().find(|r| !known.contains(&r.source_id)) {
            return Err(StoreError::Rejected(format!(
                "insert on \"{}\" violates foreign key: {} = {} not present",
                self.target.embedding_table, self.target.source_fk, orphan.source_id
            )));
        }
        let mut inserted = 0u64;
        for row in rows {
            if !state.embeddings.contains_key(&row.source_id) {
                state.embeddings.insert(row.source_id, row.vector.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn count_embeddings(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.embeddings.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::entities;
    use crate::normalization::FieldValue;
    use chrono::NaiveDate;

    fn campaign(id: &str, date: (i32, u32, u32), spend: Option<i64>) -> NormalizedRecord {
        let (y, m, d) = date;
        let mut rec = NormalizedRecord::new()
            .with("campaign_id", FieldValue::Text(id.into()))
            .with(
                "campaign_observation_date",
                FieldValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap()),
            )
            .with("media_channel", FieldValue::Text("email".into()))
            .with("marketing_company", FieldValue::Text("Acme".into()))
            .with("industry", FieldValue::Text("Finance".into()))
            .with("brand", FieldValue::Text("first brand".into()));
        if let Some(v) = spend {
            rec.set("estimated_volume", FieldValue::Integer(v));
        }
        rec
    }

    #[tokio::test]
    async fn update_touches_only_configured_fields() {
        let store = MemoryStore::default();
        let d = entities::campaign();
        store
            .upsert_batch(&d, &[campaign("X1", (2025, 1, 1), Some(10))])
            .await
            .unwrap();
        let mut second = campaign("X1", (2025, 2, 1), Some(20));
        second.set("brand", FieldValue::Text("second brand".into()));
        store.upsert_batch(&d, &[second]).await.unwrap();

        let rows = store.rows("marketing_campaigns");
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, 1);
        assert_eq!(row.fields.get("estimated_volume"), &FieldValue::Integer(20));
        // brand is not in the update set
        assert_eq!(
            row.fields.get("brand"),
            &FieldValue::Text("first brand".into())
        );
        assert!(row.updated_at >= row.created_at);
    }

    #[tokio::test]
    async fn inserted_rows_carry_every_column() {
        let store = MemoryStore::default();
        let d = entities::campaign();
        let rec = campaign("X1", (2025, 1, 1), None);
        store.upsert_batch(&d, &[rec.clone()]).await.unwrap();
        let first = store.row("marketing_campaigns", "X1").unwrap().fields;
        assert_eq!(first.iter().count(), d.field_types().len());
        assert!(first.get("estimated_spend").is_null());

        store.upsert_batch(&d, &[rec]).await.unwrap();
        let second = store.row("marketing_campaigns", "X1").unwrap().fields;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn rejects_whole_batch_on_type_mismatch() {
        let store = MemoryStore::default();
        let d = entities::campaign();
        let mut bad = campaign("X2", (2025, 1, 1), None);
        bad.set("estimated_volume", FieldValue::Text("lots".into()));
        let err = store
            .upsert_batch(&d, &[campaign("X1", (2025, 1, 1), None), bad])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        assert!(store.rows("marketing_campaigns").is_empty());
    }

    #[tokio::test]
    async fn embeddings_require_existing_source() {
        let store = MemoryStore::default();
        let err = store
            .insert_embeddings(&[EmbeddingRecord {
                source_id: 42,
                vector: vec![0.1],
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        assert_eq!(store.count_embeddings().await.unwrap(), 0);
    }
}
