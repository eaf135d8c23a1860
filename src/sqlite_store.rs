//! SQLite-backed [`VectorStore`].
//!
//! Vectors are stored as little-endian `f32` BLOBs next to their JSON
//! metadata. Metadata filters are translated to `json_extract`
//! predicates so only matching rows are loaded; scoring is brute-force
//! cosine over those rows.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use docvec_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use docvec_core::filter::Filter;
use docvec_core::models::{IndexInfo, IndexRecord, RecordMetadata, ScoredRecord};
use docvec_core::search::{top_k, Candidate};
use docvec_core::store::{IndexCreation, StoredFingerprint, VectorStore};
use docvec_core::{Error, Result};

#[derive(Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn index_dims(&self, name: &str) -> Result<Option<usize>> {
        let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM vector_indexes WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?;
        Ok(dims.map(|d| d as usize))
    }

    async fn require_dims(&self, name: &str) -> Result<usize> {
        self.index_dims(name)
            .await?
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn create_index(&self, name: &str, dims: usize) -> Result<IndexCreation> {
        if dims == 0 {
            return Err(Error::Configuration(format!(
                "index '{}' needs a positive dimensionality",
                name
            )));
        }
        let inserted = sqlx::query(
            "INSERT INTO vector_indexes (name, dims, created_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(dims as i64)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(Error::store)?
        .rows_affected();

        if inserted == 1 {
            return Ok(IndexCreation::Created);
        }
        let existing = self.require_dims(name).await?;
        if existing == dims {
            Ok(IndexCreation::AlreadyExists)
        } else {
            Err(Error::Configuration(format!(
                "index '{}' exists with dimensionality {}, requested {}",
                name, existing, dims
            )))
        }
    }

    async fn describe_index(&self, name: &str) -> Result<Option<IndexInfo>> {
        let Some(dims) = self.index_dims(name).await? else {
            return Ok(None);
        };
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_records WHERE index_name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::store)?;
        Ok(Some(IndexInfo {
            name: name.to_string(),
            dims,
            record_count: count as usize,
        }))
    }

    async fn upsert(&self, index: &str, records: &[IndexRecord]) -> Result<()> {
        let dims = self.require_dims(index).await?;
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dims) {
            return Err(Error::DimensionMismatch {
                index: index.to_string(),
                expected: dims,
                actual: bad.vector.len(),
            });
        }

        let mut tx = self.pool.begin().await.map_err(Error::store)?;
        for record in records {
            let metadata_json = serde_json::to_string(&record.metadata).map_err(Error::store)?;
            sqlx::query(
                r#"
                INSERT INTO index_records
                    (index_name, id, source_id, sequence_index, content_hash,
                     embedding_model, metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(index_name, id) DO UPDATE SET
                    source_id = excluded.source_id,
                    sequence_index = excluded.sequence_index,
                    content_hash = excluded.content_hash,
                    embedding_model = excluded.embedding_model,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding
                "#,
            )
            .bind(index)
            .bind(&record.id)
            .bind(&record.metadata.source_id)
            .bind(record.metadata.sequence_index as i64)
            .bind(&record.metadata.content_hash)
            .bind(&record.metadata.embedding_model)
            .bind(metadata_json)
            .bind(vec_to_blob(&record.vector))
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;
        }
        tx.commit().await.map_err(Error::store)?;
        Ok(())
    }

    async fn query(
        &self,
        index: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredRecord>> {
        if let Some(f) = filter {
            f.validate()?;
        }
        let dims = self.require_dims(index).await?;
        if vector.len() != dims {
            return Err(Error::DimensionMismatch {
                index: index.to_string(),
                expected: dims,
                actual: vector.len(),
            });
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT ord, id, metadata_json, embedding FROM index_records WHERE index_name = ");
        qb.push_bind(index);
        if let Some(f) = filter {
            qb.push(" AND ");
            push_filter(&mut qb, f);
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(Error::store)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let ord: i64 = row.get("ord");
            let metadata_json: String = row.get("metadata_json");
            let blob: Vec<u8> = row.get("embedding");
            let metadata: RecordMetadata =
                serde_json::from_str(&metadata_json).map_err(Error::store)?;
            candidates.push(Candidate {
                ordinal: ord as u64,
                record: ScoredRecord {
                    id: row.get("id"),
                    score: cosine_similarity(vector, &blob_to_vec(&blob)) as f64,
                    metadata,
                },
            });
        }

        Ok(top_k(candidates, k))
    }

    async fn content_hashes(
        &self,
        index: &str,
        source_id: &str,
    ) -> Result<HashMap<String, StoredFingerprint>> {
        let rows = sqlx::query(
            "SELECT id, content_hash, embedding_model,
                    CAST(json_extract(metadata_json, '$.char_offset') AS INTEGER) AS char_offset
             FROM index_records
             WHERE index_name = ? AND source_id = ?",
        )
        .bind(index)
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.get("id"),
                    StoredFingerprint {
                        content_hash: row.get("content_hash"),
                        embedding_model: row.get("embedding_model"),
                        char_offset: row.get::<i64, _>("char_offset") as usize,
                    },
                )
            })
            .collect())
    }

    async fn prune_source(&self, index: &str, source_id: &str, keep: usize) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM index_records
             WHERE index_name = ? AND source_id = ? AND sequence_index >= ?",
        )
        .bind(index)
        .bind(source_id)
        .bind(keep as i64)
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        Ok(result.rows_affected())
    }
}

/// Append `filter` as a SQL boolean expression.
///
/// Leaves are wrapped in `COALESCE(.., 0)` so a missing field is false
/// rather than NULL, which keeps `NOT` consistent with
/// [`Filter::matches`]. Field names must already be validated.
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    match filter {
        Filter::Eq { field, value } => {
            qb.push("COALESCE(");
            push_field(qb, field);
            qb.push(" = ");
            qb.push_bind(value.clone());
            qb.push(", 0)");
        }
        Filter::Contains { field, value } => {
            qb.push("COALESCE(instr(");
            push_field(qb, field);
            qb.push(", ");
            qb.push_bind(value.clone());
            qb.push(") > 0, 0)");
        }
        Filter::StartsWith { field, value } => {
            qb.push("COALESCE(substr(");
            push_field(qb, field);
            qb.push(", 1, ");
            qb.push_bind(value.chars().count() as i64);
            qb.push(") = ");
            qb.push_bind(value.clone());
            qb.push(", 0)");
        }
        Filter::In { field, values } => {
            if values.is_empty() {
                qb.push("0");
                return;
            }
            qb.push("COALESCE(");
            push_field(qb, field);
            qb.push(" IN (");
            let mut list = qb.separated(", ");
            for value in values {
                list.push_bind(value.clone());
            }
            qb.push("), 0)");
        }
        Filter::And { filters } => push_group(qb, filters, " AND ", "1"),
        Filter::Or { filters } => push_group(qb, filters, " OR ", "0"),
        Filter::Not { filter } => {
            qb.push("NOT (");
            push_filter(qb, filter);
            qb.push(")");
        }
    }
}

fn push_group(qb: &mut QueryBuilder<'_, Sqlite>, filters: &[Filter], op: &str, empty: &str) {
    if filters.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push("(");
    for (i, f) in filters.iter().enumerate() {
        if i > 0 {
            qb.push(op);
        }
        push_filter(qb, f);
    }
    qb.push(")");
}

fn push_field(qb: &mut QueryBuilder<'_, Sqlite>, field: &str) {
    qb.push(format!(
        "CAST(json_extract(metadata_json, '$.{}') AS TEXT)",
        field
    ));
}
