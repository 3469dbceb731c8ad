//! Read-only schema introspection.
//!
//! Everything here observes the live database and mutates nothing. Table
//! names may be schema-qualified (`analytics.entity_embeddings`); unqualified
//! names resolve against `current_schema()`.

use sqlx::PgPool;
use tracing::debug;

/// Split an optionally schema-qualified table name into (schema, base name).
fn split_qualified(table: &str) -> (Option<&str>, &str) {
    match table.rsplit_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, table),
    }
}

/// Whether the table exists in its schema.
pub async fn table_exists(pool: &PgPool, table: &str) -> Result<bool, sqlx::Error> {
    let (schema, name) = split_qualified(table);
    sqlx::query_scalar(
        "SELECT EXISTS (
             SELECT 1 FROM information_schema.tables
             WHERE table_schema = COALESCE($2::text, current_schema())
               AND table_name = $1
         )",
    )
    .bind(name)
    .bind(schema)
    .fetch_one(pool)
    .await
}

/// Whether a column exists on the table.
pub async fn column_exists(pool: &PgPool, table: &str, column: &str) -> Result<bool, sqlx::Error> {
    let (schema, name) = split_qualified(table);
    sqlx::query_scalar(
        "SELECT EXISTS (
             SELECT 1 FROM information_schema.columns
             WHERE table_schema = COALESCE($2::text, current_schema())
               AND table_name = $1
               AND column_name = $3
         )",
    )
    .bind(name)
    .bind(schema)
    .bind(column)
    .fetch_one(pool)
    .await
}

/// Declared vector dimension of a column, if it is vector-typed.
///
/// Reads the declared type string (`vector(1536)`) from the catalog and
/// parses out the dimension. Returns `None` when the column is absent, is
/// not vector-typed, or its type string does not carry a dimension.
pub async fn vector_dimension(
    pool: &PgPool,
    table: &str,
    column: &str,
) -> Result<Option<u32>, sqlx::Error> {
    let (schema, name) = split_qualified(table);
    let declared: Option<String> = sqlx::query_scalar(
        "SELECT format_type(a.atttypid, a.atttypmod)
         FROM pg_attribute a
         JOIN pg_class c ON c.oid = a.attrelid
         JOIN pg_namespace n ON n.oid = c.relnamespace
         WHERE n.nspname = COALESCE($2::text, current_schema())
           AND c.relname = $1
           AND a.attname = $3
           AND NOT a.attisdropped",
    )
    .bind(name)
    .bind(schema)
    .bind(column)
    .fetch_optional(pool)
    .await?;

    let Some(declared) = declared else {
        debug!(table, column, "column not found during dimension check");
        return Ok(None);
    };
    let dimension = parse_vector_type(&declared);
    if dimension.is_none() {
        debug!(
            table,
            column,
            declared = %declared,
            "declared type is not a dimensioned vector"
        );
    }
    Ok(dimension)
}

/// Whether the pgvector extension is reported installed.
pub async fn extension_installed(pool: &PgPool) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'vector')")
        .fetch_one(pool)
        .await
}

/// Parse the dimension out of a declared type string like `vector(1536)`.
fn parse_vector_type(declared: &str) -> Option<u32> {
    let declared = declared.trim().to_ascii_lowercase();
    let inner = declared.strip_prefix("vector(")?.strip_suffix(')')?;
    inner.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dimensioned_vector_types() {
        assert_eq!(parse_vector_type("vector(1536)"), Some(1536));
        assert_eq!(parse_vector_type("vector(4096)"), Some(4096));
        assert_eq!(parse_vector_type("  VECTOR(768)  "), Some(768));
    }

    #[test]
    fn rejects_non_vector_and_malformed_types() {
        assert_eq!(parse_vector_type("character varying(50)"), None);
        assert_eq!(parse_vector_type("integer"), None);
        // dimensionless vector column
        assert_eq!(parse_vector_type("vector"), None);
        assert_eq!(parse_vector_type("vector()"), None);
        assert_eq!(parse_vector_type("vector(abc)"), None);
        assert_eq!(parse_vector_type("vector(1536"), None);
        assert_eq!(parse_vector_type(""), None);
    }

    #[test]
    fn splits_qualified_names() {
        assert_eq!(split_qualified("entity_embeddings"), (None, "entity_embeddings"));
        assert_eq!(
            split_qualified("analytics.entity_embeddings"),
            (Some("analytics"), "entity_embeddings"),
        );
    }
}
