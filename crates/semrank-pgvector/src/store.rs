use async_trait::async_trait;
use pgvector::Vector;
use semrank_core::{EmbeddingStore, EntityEmbedding, SearchFilter, SemRankError};
use sqlx::PgPool;
use tracing::debug;

use crate::reconcile::{validate_table_name, PgSchemaConfig};

/// An [`EmbeddingStore`] backed by PostgreSQL with the pgvector extension.
///
/// Assumes the backing table has been reconciled at startup (see
/// [`SchemaReconciler`](crate::SchemaReconciler)); none of these methods
/// issue DDL. Similarity is cosine (`<=>`), returned as `1 - distance`.
pub struct PgEntityEmbeddingStore {
    pool: PgPool,
    config: PgSchemaConfig,
}

impl PgEntityEmbeddingStore {
    /// Create a store from an existing connection pool and config.
    pub fn new(pool: PgPool, config: PgSchemaConfig) -> Self {
        Self { pool, config }
    }

    /// Return a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &PgSchemaConfig {
        &self.config
    }
}

#[async_trait]
impl EmbeddingStore for PgEntityEmbeddingStore {
    async fn insert(&self, records: &[EntityEmbedding]) -> Result<Vec<i64>, SemRankError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        validate_table_name(&self.config.table_name)?;

        let insert_sql = format!(
            "INSERT INTO {table}
                 (entity_uri, order_id, entity_type, metric_type, rating_value,
                  strategy, embedding, dimensions, model_name, character_length)
             VALUES ($1, $2, $3, $4, $5, $6, $7::vector, $8, $9, $10)
             RETURNING id",
            table = self.config.table_name,
        );

        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let expected = self.config.expected_dimensions as usize;
            if record.embedding.len() != expected {
                return Err(SemRankError::VectorStore(format!(
                    "embedding for {} has {} dimensions, store is configured for {expected}",
                    record.entity_uri,
                    record.embedding.len(),
                )));
            }

            let embedding = Vector::from(record.embedding.clone());
            let id: i64 = sqlx::query_scalar(&insert_sql)
                .bind(&record.entity_uri)
                .bind(record.order_id)
                .bind(record.entity_type.as_deref())
                .bind(record.metric_type.as_deref())
                .bind(record.rating_value)
                .bind(record.strategy.as_deref())
                .bind(&embedding)
                .bind(record.dimensions)
                .bind(record.model_name.as_deref())
                .bind(record.character_length)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    SemRankError::VectorStore(format!(
                        "insert failed for {}: {e}",
                        record.entity_uri,
                    ))
                })?;
            ids.push(id);
        }

        debug!(count = ids.len(), "inserted embedding records");
        Ok(ids)
    }

    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<(EntityEmbedding, f32)>, SemRankError> {
        validate_table_name(&self.config.table_name)?;

        let search_sql = format!(
            "SELECT id, entity_uri, order_id, entity_type, metric_type, rating_value,
                    strategy, embedding, dimensions, model_name, character_length,
                    (1 - (embedding <=> $1::vector))::float4 AS score
             FROM {table}
             WHERE embedding IS NOT NULL
               AND ($2::integer IS NULL OR order_id = $2)
               AND ($3::text IS NULL OR metric_type = $3)
               AND ($4::text IS NULL OR strategy = $4)
             ORDER BY embedding <=> $1::vector
             LIMIT $5",
            table = self.config.table_name,
        );

        let query_embedding = Vector::from(embedding.to_vec());
        let rows: Vec<EmbeddingRow> = sqlx::query_as(&search_sql)
            .bind(&query_embedding)
            .bind(filter.order_id)
            .bind(filter.metric_type.as_deref())
            .bind(filter.strategy.as_deref())
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SemRankError::VectorStore(format!("similarity search failed: {e}")))?;

        Ok(rows.into_iter().map(EmbeddingRow::into_scored).collect())
    }

    async fn delete_by_entity(&self, entity_uri: &str) -> Result<u64, SemRankError> {
        validate_table_name(&self.config.table_name)?;

        let delete_sql = format!(
            "DELETE FROM {table} WHERE entity_uri = $1",
            table = self.config.table_name,
        );
        let result = sqlx::query(&delete_sql)
            .bind(entity_uri)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                SemRankError::VectorStore(format!("delete failed for {entity_uri}: {e}"))
            })?;

        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<i64, SemRankError> {
        validate_table_name(&self.config.table_name)?;

        let count_sql = format!("SELECT count(*) FROM {table}", table = self.config.table_name);
        sqlx::query_scalar(&count_sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SemRankError::VectorStore(format!("count failed: {e}")))
    }
}

/// Internal row type used by sqlx::query_as.
#[derive(sqlx::FromRow)]
struct EmbeddingRow {
    id: i64,
    entity_uri: String,
    order_id: i32,
    entity_type: Option<String>,
    metric_type: Option<String>,
    rating_value: Option<f64>,
    strategy: Option<String>,
    embedding: Vector,
    dimensions: i32,
    model_name: Option<String>,
    character_length: Option<i32>,
    score: f32,
}

impl EmbeddingRow {
    fn into_scored(self) -> (EntityEmbedding, f32) {
        (
            EntityEmbedding {
                id: Some(self.id),
                entity_uri: self.entity_uri,
                order_id: self.order_id,
                entity_type: self.entity_type,
                metric_type: self.metric_type,
                rating_value: self.rating_value,
                strategy: self.strategy,
                embedding: self.embedding.to_vec(),
                dimensions: self.dimensions,
                model_name: self.model_name,
                character_length: self.character_length,
            },
            self.score,
        )
    }
}
