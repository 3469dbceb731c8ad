//! Core types for the semrank entity-embedding service.
//!
//! This crate defines the shared vocabulary of the workspace: the
//! [`EntityEmbedding`] record, the [`EmbeddingStore`] trait implemented by
//! storage backends, and the unified [`SemRankError`] type. Backend crates
//! (currently `semrank-pgvector`) depend on this crate and implement the
//! traits; service code depends on the traits rather than a concrete backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// EntityEmbedding
// ---------------------------------------------------------------------------

/// One embedded entity: a URI-addressed piece of content attached to an
/// order, together with its embedding vector and scoring metadata.
///
/// `id` is assigned by the database on insert; records built in application
/// code leave it `None`. `created_at`/`updated_at` live server-side and are
/// not surfaced here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEmbedding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub entity_uri: String,
    pub order_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    pub embedding: Vec<f32>,
    /// Length of `embedding`, denormalised into its own column so it can be
    /// filtered on without reading the vector.
    pub dimensions: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_length: Option<i32>,
}

impl EntityEmbedding {
    /// Create a record with the required fields; `dimensions` is derived
    /// from the vector length.
    pub fn new(entity_uri: impl Into<String>, order_id: i32, embedding: Vec<f32>) -> Self {
        let dimensions = embedding.len() as i32;
        Self {
            id: None,
            entity_uri: entity_uri.into(),
            order_id,
            entity_type: None,
            metric_type: None,
            rating_value: None,
            strategy: None,
            embedding,
            dimensions,
            model_name: None,
            character_length: None,
        }
    }

    pub fn with_metric(mut self, metric_type: impl Into<String>, rating_value: f64) -> Self {
        self.metric_type = Some(metric_type.into());
        self.rating_value = Some(rating_value);
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }
}

// ---------------------------------------------------------------------------
// SearchFilter
// ---------------------------------------------------------------------------

/// Optional scalar predicates applied alongside vector similarity search.
///
/// All fields are conjunctive; a default filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

impl SearchFilter {
    pub fn for_order(order_id: i32) -> Self {
        Self {
            order_id: Some(order_id),
            ..Self::default()
        }
    }

    pub fn metric(mut self, metric_type: impl Into<String>) -> Self {
        self.metric_type = Some(metric_type.into());
        self
    }

    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    /// True when no predicate is set.
    pub fn is_empty(&self) -> bool {
        self.order_id.is_none() && self.metric_type.is_none() && self.strategy.is_none()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for semrank with variants covering each subsystem.
#[derive(Debug, Error)]
pub enum SemRankError {
    /// The vector extension is missing or non-functional. Schema
    /// reconciliation cannot proceed without it.
    #[error("vector extension error: {0}")]
    Extension(String),
    /// Fatal schema failure: the target table could not be created.
    #[error("schema error: {0}")]
    Schema(String),
    #[error("vector store error: {0}")]
    VectorStore(String),
    #[error("config error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// EmbeddingStore trait
// ---------------------------------------------------------------------------

/// Storage backend for entity embeddings.
///
/// Implementations assume the backing schema has already been reconciled at
/// startup; none of these methods issue DDL.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Insert records, returning the database-assigned ids in input order.
    async fn insert(&self, records: &[EntityEmbedding]) -> Result<Vec<i64>, SemRankError>;

    /// Top-`k` nearest records by cosine distance, optionally restricted by
    /// `filter`. Results are `(record, similarity)` pairs ordered most
    /// similar first.
    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<(EntityEmbedding, f32)>, SemRankError>;

    /// Delete every record for an entity URI, returning the deleted count.
    async fn delete_by_entity(&self, entity_uri: &str) -> Result<u64, SemRankError>;

    /// Total number of stored records.
    async fn count(&self) -> Result<i64, SemRankError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_new_derives_dimensions() {
        let record = EntityEmbedding::new("urn:review:42", 7, vec![0.1, 0.2, 0.3]);
        assert_eq!(record.dimensions, 3);
        assert_eq!(record.order_id, 7);
        assert!(record.id.is_none());
    }

    #[test]
    fn embedding_builders() {
        let record = EntityEmbedding::new("urn:review:42", 7, vec![0.0; 4])
            .with_metric("helpfulness", 0.87)
            .with_strategy("chunked")
            .with_model("all-minilm-l6-v2");
        assert_eq!(record.metric_type.as_deref(), Some("helpfulness"));
        assert_eq!(record.rating_value, Some(0.87));
        assert_eq!(record.strategy.as_deref(), Some("chunked"));
        assert_eq!(record.model_name.as_deref(), Some("all-minilm-l6-v2"));
    }

    #[test]
    fn embedding_serde_skips_absent_options() {
        let record = EntityEmbedding::new("urn:review:1", 1, vec![1.0]);
        let json = serde_json::to_value(&record).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("id"));
        assert!(!obj.contains_key("metric_type"));
        assert_eq!(obj["dimensions"], 1);
    }

    #[test]
    fn filter_default_is_empty() {
        assert!(SearchFilter::default().is_empty());
        assert!(!SearchFilter::for_order(3).is_empty());
    }

    #[test]
    fn error_display_includes_cause() {
        let err = SemRankError::Extension("probe failed".into());
        assert_eq!(err.to_string(), "vector extension error: probe failed");
    }
}
