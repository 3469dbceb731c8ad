//! Declarative description of the `entity_embeddings` table.
//!
//! The table shape lives here as data, an ordered list of [`ColumnSpec`]
//! plus the index definitions, and is rendered into DDL generically.
//! Adding a column to the schema means adding a catalog entry, not a new
//! branch in the reconciliation code.

/// SQL type of a catalog column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigSerial,
    VarChar(u32),
    Integer,
    DoublePrecision,
    /// pgvector column; renders at the configured embedding dimension.
    Vector,
    Timestamp,
}

impl ColumnType {
    fn render(&self, dimensions: u32) -> String {
        match self {
            ColumnType::BigSerial => "BIGSERIAL".to_string(),
            ColumnType::VarChar(n) => format!("VARCHAR({n})"),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::DoublePrecision => "DOUBLE PRECISION".to_string(),
            ColumnType::Vector => format!("VECTOR({dimensions})"),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
        }
    }
}

/// Default expression of a catalog column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultExpr {
    Now,
    /// The configured embedding dimension as an integer literal.
    Dimensions,
}

impl DefaultExpr {
    fn render(&self, dimensions: u32) -> String {
        match self {
            DefaultExpr::Now => "NOW()".to_string(),
            DefaultExpr::Dimensions => dimensions.to_string(),
        }
    }
}

/// One column of the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<DefaultExpr>,
    pub primary_key: bool,
    /// Created with the table but skipped by the per-column reconciliation
    /// pass against a pre-existing table.
    pub created_only: bool,
}

impl ColumnSpec {
    const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
            default: None,
            primary_key: false,
            created_only: false,
        }
    }

    const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    const fn default(mut self, expr: DefaultExpr) -> Self {
        self.default = Some(expr);
        self
    }

    const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    const fn created_only(mut self) -> Self {
        self.created_only = true;
        self
    }

    /// Column definition as it appears in CREATE TABLE / ADD COLUMN DDL.
    pub fn definition(&self, dimensions: u32) -> String {
        let mut def = format!("{} {}", self.name, self.ty.render(dimensions));
        if self.primary_key {
            def.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(expr) = self.default {
            def.push_str(" DEFAULT ");
            def.push_str(&expr.render(dimensions));
        }
        def
    }
}

/// One index of the target table. `suffix` is combined with the table's
/// base name into `idx_<table>_<suffix>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub suffix: &'static str,
    pub columns: &'static [&'static str],
}

impl IndexSpec {
    /// Index name for a given (possibly schema-qualified) table.
    pub fn name(&self, table: &str) -> String {
        let base = table.rsplit('.').next().unwrap_or(table);
        format!("idx_{base}_{}", self.suffix)
    }

    pub fn create_sql(&self, table: &str) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            self.name(table),
            table,
            self.columns.join(", "),
        )
    }
}

/// Default name of the target table.
pub const TABLE_NAME: &str = "entity_embeddings";

/// The embedding column, referenced by the dimension check.
pub const EMBEDDING_COLUMN: &str = "embedding";

/// Ordered column set of `entity_embeddings`. Order affects only the
/// readability of the CREATE TABLE statement.
pub const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("id", ColumnType::BigSerial).primary_key(),
    ColumnSpec::new("entity_uri", ColumnType::VarChar(1000)).not_null(),
    ColumnSpec::new("order_id", ColumnType::Integer).not_null(),
    ColumnSpec::new("entity_type", ColumnType::VarChar(50)),
    ColumnSpec::new("metric_type", ColumnType::VarChar(50)),
    ColumnSpec::new("rating_value", ColumnType::DoublePrecision),
    ColumnSpec::new("strategy", ColumnType::VarChar(20)),
    ColumnSpec::new("embedding", ColumnType::Vector),
    ColumnSpec::new("dimensions", ColumnType::Integer)
        .not_null()
        .default(DefaultExpr::Dimensions),
    ColumnSpec::new("model_name", ColumnType::VarChar(100)).created_only(),
    ColumnSpec::new("character_length", ColumnType::Integer).created_only(),
    ColumnSpec::new("created_at", ColumnType::Timestamp)
        .not_null()
        .default(DefaultExpr::Now),
    ColumnSpec::new("updated_at", ColumnType::Timestamp),
];

/// Indexes of `entity_embeddings`: one per scalar filter column, plus the
/// composite used by filtered similarity search.
pub const INDEXES: &[IndexSpec] = &[
    IndexSpec { suffix: "entity_uri", columns: &["entity_uri"] },
    IndexSpec { suffix: "order_id", columns: &["order_id"] },
    IndexSpec { suffix: "entity_type", columns: &["entity_type"] },
    IndexSpec { suffix: "metric_type", columns: &["metric_type"] },
    IndexSpec { suffix: "rating_value", columns: &["rating_value"] },
    IndexSpec { suffix: "strategy", columns: &["strategy"] },
    IndexSpec {
        suffix: "order_metric_strategy",
        columns: &["order_id", "metric_type", "strategy"],
    },
];

/// Columns checked (and added when absent) against a pre-existing table.
pub fn reconciled_columns() -> impl Iterator<Item = &'static ColumnSpec> {
    COLUMNS.iter().filter(|c| !c.created_only)
}

/// Full CREATE TABLE statement at the given embedding dimension.
pub fn create_table_sql(table: &str, dimensions: u32) -> String {
    let columns: Vec<String> = COLUMNS
        .iter()
        .map(|c| format!("    {}", c.definition(dimensions)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n{}\n)",
        columns.join(",\n"),
    )
}

/// ALTER TABLE statement adding one catalog column.
pub fn add_column_sql(table: &str, column: &ColumnSpec, dimensions: u32) -> String {
    format!(
        "ALTER TABLE {table} ADD COLUMN {}",
        column.definition(dimensions),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_thirteen_columns_and_seven_indexes() {
        assert_eq!(COLUMNS.len(), 13);
        assert_eq!(INDEXES.len(), 7);
    }

    #[test]
    fn created_only_columns_are_skipped_by_reconciliation() {
        let reconciled: Vec<&str> = reconciled_columns().map(|c| c.name).collect();
        assert_eq!(reconciled.len(), 11);
        assert!(!reconciled.contains(&"model_name"));
        assert!(!reconciled.contains(&"character_length"));
        assert!(reconciled.contains(&"embedding"));
        assert!(reconciled.contains(&"updated_at"));
    }

    #[test]
    fn create_table_renders_configured_dimension() {
        let sql = create_table_sql(TABLE_NAME, 4096);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS entity_embeddings (\n"));
        assert!(sql.contains("id BIGSERIAL PRIMARY KEY"));
        assert!(sql.contains("entity_uri VARCHAR(1000) NOT NULL"));
        assert!(sql.contains("embedding VECTOR(4096)"));
        assert!(sql.contains("dimensions INTEGER NOT NULL DEFAULT 4096"));
        assert!(sql.contains("created_at TIMESTAMP NOT NULL DEFAULT NOW()"));
        assert!(sql.contains("updated_at TIMESTAMP"));
    }

    #[test]
    fn create_table_at_other_dimension() {
        let sql = create_table_sql(TABLE_NAME, 1536);
        assert!(sql.contains("embedding VECTOR(1536)"));
        assert!(sql.contains("dimensions INTEGER NOT NULL DEFAULT 1536"));
        assert!(!sql.contains("4096"));
    }

    #[test]
    fn add_column_is_additive_only() {
        for column in COLUMNS {
            let sql = add_column_sql(TABLE_NAME, column, 4096);
            assert!(sql.starts_with("ALTER TABLE entity_embeddings ADD COLUMN "));
            assert!(!sql.contains("DROP"));
            assert!(!sql.contains("ALTER COLUMN"));
        }
    }

    #[test]
    fn add_column_renders_exact_definition() {
        let updated_at = COLUMNS.iter().find(|c| c.name == "updated_at").unwrap();
        assert_eq!(
            add_column_sql(TABLE_NAME, updated_at, 4096),
            "ALTER TABLE entity_embeddings ADD COLUMN updated_at TIMESTAMP",
        );
        let rating = COLUMNS.iter().find(|c| c.name == "rating_value").unwrap();
        assert_eq!(
            add_column_sql(TABLE_NAME, rating, 4096),
            "ALTER TABLE entity_embeddings ADD COLUMN rating_value DOUBLE PRECISION",
        );
    }

    #[test]
    fn index_names_use_table_base_name() {
        let composite = INDEXES.last().unwrap();
        assert_eq!(
            composite.create_sql("entity_embeddings"),
            "CREATE INDEX IF NOT EXISTS idx_entity_embeddings_order_metric_strategy \
             ON entity_embeddings (order_id, metric_type, strategy)",
        );
        assert_eq!(
            INDEXES[0].name("public.entity_embeddings"),
            "idx_entity_embeddings_entity_uri",
        );
    }
}
