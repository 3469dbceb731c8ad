//! Startup schema reconciliation for the `entity_embeddings` table.
//!
//! [`SchemaReconciler::run`] brings the live database into line with the
//! declared catalog: it installs and verifies the pgvector extension, creates
//! the table and its indexes when missing, adds columns a pre-existing table
//! lacks, and checks the stored vector dimension against the configured one.
//! Every step is independently idempotent, so the routine is safe to re-run
//! on every process start, including against a partially-migrated or
//! hand-edited database.
//!
//! Only two failures abort the run: a missing or non-functional vector
//! extension, and a failed initial table creation; nothing downstream can
//! produce a correct result without either. Everything else degrades
//! gracefully: per-column and per-index failures are logged and collected
//! into the returned [`ReconcileReport`], and the run continues.

use std::fmt;

use semrank_core::SemRankError;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use crate::catalog;
use crate::inspect;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the pgvector schema and store.
#[derive(Debug, Clone)]
pub struct PgSchemaConfig {
    /// Name of the embeddings table. May be schema-qualified.
    pub table_name: String,
    /// Embedding dimension the schema is expected to hold.
    pub expected_dimensions: u32,
    /// When the live vector column's dimension disagrees with
    /// `expected_dimensions`, drop and recreate the table. Destructive
    /// (every stored embedding is lost) and therefore off by default.
    pub auto_reset_on_dimension_change: bool,
}

impl PgSchemaConfig {
    pub const DEFAULT_DIMENSIONS: u32 = 4096;

    /// Create a configuration for the default `entity_embeddings` table.
    ///
    /// # Panics
    ///
    /// Panics if `expected_dimensions` is zero.
    pub fn new(expected_dimensions: u32) -> Self {
        assert!(expected_dimensions > 0, "expected_dimensions must be > 0");
        Self {
            table_name: catalog::TABLE_NAME.to_string(),
            expected_dimensions,
            auto_reset_on_dimension_change: false,
        }
    }

    /// Use a custom table name.
    ///
    /// # Panics
    ///
    /// Panics if `table_name` is empty.
    pub fn with_table(mut self, table_name: impl Into<String>) -> Self {
        let table_name = table_name.into();
        assert!(!table_name.is_empty(), "table_name must not be empty");
        self.table_name = table_name;
        self
    }

    /// Opt in to the destructive drop-and-recreate on dimension mismatch.
    pub fn with_auto_reset(mut self, auto_reset: bool) -> Self {
        self.auto_reset_on_dimension_change = auto_reset;
        self
    }
}

impl Default for PgSchemaConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSIONS)
    }
}

/// Validate that a table name is safe to interpolate into SQL.
///
/// Allows alphanumeric ASCII characters, underscores, and dots (for
/// schema-qualified names like `analytics.entity_embeddings`).
pub(crate) fn validate_table_name(name: &str) -> Result<(), SemRankError> {
    if name.is_empty() {
        return Err(SemRankError::Config("table name must not be empty".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(SemRankError::Config(format!(
            "invalid table name '{name}': only alphanumeric, underscore, and dot characters are allowed",
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ReconcileReport
// ---------------------------------------------------------------------------

/// One recoverable problem encountered during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileIssue {
    /// The column, index, or extension the issue concerns.
    pub subject: String,
    pub detail: String,
}

impl fmt::Display for ReconcileIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.detail)
    }
}

/// Outcome of a reconciliation run that reached its terminal state.
///
/// Collects every recoverable problem the run logged and skipped. The caller
/// decides what to do with a dirty report; the routine itself never turns a
/// recoverable problem into a startup failure.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    issues: Vec<ReconcileIssue>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[ReconcileIssue] {
        &self.issues
    }

    fn record(&mut self, subject: impl Into<String>, detail: impl Into<String>) {
        let issue = ReconcileIssue {
            subject: subject.into(),
            detail: detail.into(),
        };
        warn!(subject = %issue.subject, detail = %issue.detail, "schema reconciliation issue");
        self.issues.push(issue);
    }
}

// ---------------------------------------------------------------------------
// SchemaReconciler
// ---------------------------------------------------------------------------

/// One-shot schema reconciliation routine.
///
/// Construct once at startup and call [`run`](Self::run) before the owning
/// service accepts any request that touches the embeddings table.
pub struct SchemaReconciler {
    pool: PgPool,
    config: PgSchemaConfig,
}

impl SchemaReconciler {
    pub fn new(pool: PgPool, config: PgSchemaConfig) -> Self {
        Self { pool, config }
    }

    /// Run the full reconciliation pass.
    ///
    /// Returns `Err` only when the vector extension cannot be installed or
    /// verified, or when the table had to be created and creation failed.
    /// A reasonable caller logs such an error loudly and starts anyway,
    /// since an absent table is repaired on the next start, but a missing
    /// vector capability is a correctness risk worth surfacing. All other problems
    /// are collected into the returned [`ReconcileReport`].
    pub async fn run(&self) -> Result<ReconcileReport, SemRankError> {
        validate_table_name(&self.config.table_name)?;
        let mut report = ReconcileReport::default();

        self.ensure_extension().await?;

        let table = &self.config.table_name;
        let exists = inspect::table_exists(&self.pool, table)
            .await
            .map_err(|e| {
                SemRankError::Schema(format!("could not determine whether {table} exists: {e}"))
            })?;

        if exists {
            debug!(table = %table, "table present, reconciling columns");
            self.reconcile_columns(&mut report).await;
            self.reconcile_dimensions(&mut report).await?;
        } else {
            info!(table = %table, "table missing, creating");
            self.create_table(&mut report).await?;
        }

        self.recheck_extension(&mut report).await;
        Ok(report)
    }

    /// Install the pgvector extension and verify it actually works.
    ///
    /// The literal probe catches installs that register the extension but
    /// cannot parse vector values (broken shared library, version skew).
    async fn ensure_extension(&self) -> Result<(), SemRankError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                SemRankError::Extension(format!("failed to install vector extension: {e}"))
            })?;

        sqlx::query("SELECT '[1,2,3]'::vector")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                SemRankError::Extension(format!("vector literal probe failed: {e}"))
            })?;

        debug!("vector extension installed and functional");
        Ok(())
    }

    /// Create the table from the catalog and build its indexes.
    async fn create_table(&self, report: &mut ReconcileReport) -> Result<(), SemRankError> {
        let table = &self.config.table_name;
        let dimensions = self.config.expected_dimensions;

        let sql = catalog::create_table_sql(table, dimensions);
        sqlx::query(&sql).execute(&self.pool).await.map_err(|e| {
            SemRankError::Schema(format!("failed to create table {table}: {e}"))
        })?;
        info!(table = %table, dimensions, "created embeddings table");

        self.build_indexes(report).await;
        Ok(())
    }

    /// Add any catalog column absent from the live table.
    ///
    /// Columns are handled independently: a failure on one is recorded and
    /// the pass moves on to the next. Existing columns are never modified,
    /// even when their live type disagrees with the catalog.
    async fn reconcile_columns(&self, report: &mut ReconcileReport) {
        let table = &self.config.table_name;
        let dimensions = self.config.expected_dimensions;

        for spec in catalog::reconciled_columns() {
            match inspect::column_exists(&self.pool, table, spec.name).await {
                Ok(true) => {}
                Ok(false) => {
                    let sql = catalog::add_column_sql(table, spec, dimensions);
                    match sqlx::query(&sql).execute(&self.pool).await {
                        Ok(_) => {
                            info!(table = %table, column = spec.name, "added missing column");
                        }
                        Err(e) => {
                            report.record(spec.name, format!("failed to add column: {e}"));
                        }
                    }
                }
                Err(e) => {
                    report.record(spec.name, format!("column existence check failed: {e}"));
                }
            }
        }
    }

    /// Compare the live vector dimension against the configured one.
    ///
    /// A mismatch is either repaired destructively (opt-in) or recorded as a
    /// diagnostic for manual migration. An undetectable dimension is logged
    /// and left alone.
    async fn reconcile_dimensions(&self, report: &mut ReconcileReport) -> Result<(), SemRankError> {
        let table = &self.config.table_name;
        let expected = self.config.expected_dimensions;

        let live = match inspect::vector_dimension(&self.pool, table, catalog::EMBEDDING_COLUMN).await
        {
            Ok(live) => live,
            Err(e) => {
                report.record(
                    catalog::EMBEDDING_COLUMN,
                    format!("dimension introspection failed: {e}"),
                );
                return Ok(());
            }
        };

        let Some(live) = live else {
            debug!(table = %table, "vector dimension undetectable, leaving column as-is");
            return Ok(());
        };

        if live == expected {
            debug!(table = %table, dimensions = live, "vector dimension matches configuration");
            return Ok(());
        }

        if self.config.auto_reset_on_dimension_change {
            error!(
                table = %table,
                live,
                expected,
                "embedding dimension changed; dropping and recreating table, \
                 ALL STORED EMBEDDINGS WILL BE LOST"
            );
            let drop_sql = format!("DROP TABLE {table}");
            if let Err(e) = sqlx::query(&drop_sql).execute(&self.pool).await {
                report.record(
                    table.clone(),
                    format!("failed to drop table for dimension reset: {e}"),
                );
                return Ok(());
            }
            // The table is gone; from here creation failure is as fatal as
            // on a fresh database.
            self.create_table(report).await?;
        } else {
            report.record(
                catalog::EMBEDDING_COLUMN,
                format!(
                    "declared vector dimension is {live} but {expected} is configured; \
                     migrate manually (ALTER TABLE {table} ALTER COLUMN embedding \
                     TYPE vector({expected})) or enable auto_reset_on_dimension_change \
                     to drop and recreate the table",
                ),
            );
        }
        Ok(())
    }

    /// Create every catalog index, each independently.
    async fn build_indexes(&self, report: &mut ReconcileReport) {
        let table = &self.config.table_name;
        for index in catalog::INDEXES {
            let sql = index.create_sql(table);
            if let Err(e) = sqlx::query(&sql).execute(&self.pool).await {
                report.record(index.name(table), format!("index creation failed: {e}"));
            }
        }
        debug!(table = %table, "index build pass complete");
    }

    /// Final observational check that the extension is still reported
    /// installed. Never alters control flow.
    async fn recheck_extension(&self, report: &mut ReconcileReport) {
        match inspect::extension_installed(&self.pool).await {
            Ok(true) => debug!("vector extension present after reconciliation"),
            Ok(false) => {
                report.record("vector", "extension not reported installed after reconciliation");
            }
            Err(e) => {
                report.record("vector", format!("extension re-check failed: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = PgSchemaConfig::default();
        assert_eq!(config.table_name, "entity_embeddings");
        assert_eq!(config.expected_dimensions, 4096);
        assert!(!config.auto_reset_on_dimension_change);
    }

    #[test]
    fn config_builders() {
        let config = PgSchemaConfig::new(1536)
            .with_table("analytics.entity_embeddings")
            .with_auto_reset(true);
        assert_eq!(config.table_name, "analytics.entity_embeddings");
        assert_eq!(config.expected_dimensions, 1536);
        assert!(config.auto_reset_on_dimension_change);
    }

    #[test]
    #[should_panic(expected = "expected_dimensions must be > 0")]
    fn config_rejects_zero_dimensions() {
        PgSchemaConfig::new(0);
    }

    #[test]
    #[should_panic(expected = "table_name must not be empty")]
    fn config_rejects_empty_table_name() {
        PgSchemaConfig::default().with_table("");
    }

    #[test]
    fn validate_table_name_accepts_valid_names() {
        assert!(validate_table_name("entity_embeddings").is_ok());
        assert!(validate_table_name("analytics.entity_embeddings").is_ok());
        assert!(validate_table_name("t2").is_ok());
    }

    #[test]
    fn validate_table_name_rejects_sql_injection() {
        assert!(validate_table_name("embeddings; DROP TABLE users").is_err());
        assert!(validate_table_name("embeddings--comment").is_err());
        assert!(validate_table_name("embeddings'quoted").is_err());
        assert!(validate_table_name("").is_err());
    }

    #[test]
    fn report_collects_issues() {
        let mut report = ReconcileReport::default();
        assert!(report.is_clean());

        report.record("updated_at", "failed to add column: boom");
        assert!(!report.is_clean());
        assert_eq!(report.issues().len(), 1);
        assert_eq!(
            report.issues()[0].to_string(),
            "updated_at: failed to add column: boom",
        );
    }
}
