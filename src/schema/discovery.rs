//! Schema discovery through `INFORMATION_SCHEMA` views.
//!
//! Column metadata is required: the detailed query is tried first, then a
//! basic variant without size information. Primary and foreign key metadata
//! are optional; warehouse backends expose constraint views inconsistently,
//! so their failures only degrade the snapshot and are recorded as warnings.

use super::model::{table_key, Column, KeyRole, Relationship, SchemaSnapshot, Table};
use crate::config::DatabaseTarget;
use crate::database::{QueryResult, QueryRunner, Record};
use crate::error::ServerError;
use crate::fallback::{first_success, Strategy};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Columns of every base table with size, precision and default information.
pub const DETAILED_COLUMNS_SQL: &str = r#"
SELECT
    t.TABLE_SCHEMA AS table_schema,
    t.TABLE_NAME AS table_name,
    c.COLUMN_NAME AS column_name,
    c.DATA_TYPE AS data_type,
    c.IS_NULLABLE AS is_nullable,
    c.ORDINAL_POSITION AS ordinal_position,
    c.CHARACTER_MAXIMUM_LENGTH AS max_length,
    c.NUMERIC_PRECISION AS numeric_precision,
    c.NUMERIC_SCALE AS numeric_scale,
    c.COLUMN_DEFAULT AS column_default
FROM INFORMATION_SCHEMA.TABLES t
JOIN INFORMATION_SCHEMA.COLUMNS c
    ON t.TABLE_NAME = c.TABLE_NAME AND t.TABLE_SCHEMA = c.TABLE_SCHEMA
WHERE t.TABLE_TYPE = 'BASE TABLE'
    AND t.TABLE_SCHEMA NOT IN ('sys', 'INFORMATION_SCHEMA')
ORDER BY t.TABLE_SCHEMA, t.TABLE_NAME, c.ORDINAL_POSITION
"#;

/// Columns only, for backends where the detailed query is rejected.
pub const BASIC_COLUMNS_SQL: &str = r#"
SELECT
    TABLE_SCHEMA AS table_schema,
    TABLE_NAME AS table_name,
    COLUMN_NAME AS column_name,
    DATA_TYPE AS data_type,
    IS_NULLABLE AS is_nullable,
    ORDINAL_POSITION AS ordinal_position
FROM INFORMATION_SCHEMA.COLUMNS
WHERE TABLE_SCHEMA NOT IN ('sys', 'INFORMATION_SCHEMA')
ORDER BY TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION
"#;

/// Primary key columns.
pub const PRIMARY_KEYS_SQL: &str = r#"
SELECT
    tc.TABLE_SCHEMA AS table_schema,
    tc.TABLE_NAME AS table_name,
    ku.COLUMN_NAME AS column_name
FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
    ON tc.CONSTRAINT_NAME = ku.CONSTRAINT_NAME
    AND tc.TABLE_SCHEMA = ku.TABLE_SCHEMA
    AND tc.TABLE_NAME = ku.TABLE_NAME
WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
"#;

/// Foreign key edges, one row per column pair.
pub const FOREIGN_KEYS_SQL: &str = r#"
SELECT
    fk.TABLE_SCHEMA AS source_schema,
    fk.TABLE_NAME AS source_table,
    fk.COLUMN_NAME AS source_column,
    pk.TABLE_SCHEMA AS target_schema,
    pk.TABLE_NAME AS target_table,
    pk.COLUMN_NAME AS target_column
FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE fk
    ON rc.CONSTRAINT_SCHEMA = fk.CONSTRAINT_SCHEMA
    AND rc.CONSTRAINT_NAME = fk.CONSTRAINT_NAME
JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE pk
    ON rc.UNIQUE_CONSTRAINT_SCHEMA = pk.CONSTRAINT_SCHEMA
    AND rc.UNIQUE_CONSTRAINT_NAME = pk.CONSTRAINT_NAME
    AND fk.ORDINAL_POSITION = pk.ORDINAL_POSITION
ORDER BY fk.TABLE_SCHEMA, fk.TABLE_NAME, fk.ORDINAL_POSITION
"#;

/// Produces schema snapshots for a target.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Discover the current structure of `target`.
    async fn discover(&self, target: &DatabaseTarget) -> Result<SchemaSnapshot, ServerError>;
}

/// Column metadata query variants, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnQuery {
    Detailed,
    Basic,
}

impl ColumnQuery {
    pub const ALL: [ColumnQuery; 2] = [ColumnQuery::Detailed, ColumnQuery::Basic];

    fn sql(&self) -> &'static str {
        match self {
            ColumnQuery::Detailed => DETAILED_COLUMNS_SQL,
            ColumnQuery::Basic => BASIC_COLUMNS_SQL,
        }
    }
}

impl Strategy for ColumnQuery {
    fn name(&self) -> &str {
        match self {
            ColumnQuery::Detailed => "detailed column metadata",
            ColumnQuery::Basic => "basic column metadata",
        }
    }
}

/// Discovers schema through a [`QueryRunner`].
pub struct SchemaDiscoverer {
    runner: Arc<dyn QueryRunner>,
}

impl SchemaDiscoverer {
    /// Create a discoverer over the given runner.
    pub fn new(runner: Arc<dyn QueryRunner>) -> Self {
        Self { runner }
    }

    async fn load_columns(
        &self,
        target: &DatabaseTarget,
        variant: ColumnQuery,
    ) -> Result<BTreeMap<String, Table>, ServerError> {
        let result = self.runner.run(target, variant.sql()).await?;
        Ok(tables_from_rows(&result))
    }

    async fn load_primary_keys(
        &self,
        target: &DatabaseTarget,
    ) -> Result<Vec<(String, String)>, ServerError> {
        let result = self.runner.run(target, PRIMARY_KEYS_SQL).await?;
        Ok(result
            .records()
            .filter_map(|row| {
                let key = record_table_key(&row, "table_schema", "table_name")?;
                Some((key, row.text("column_name")?))
            })
            .collect())
    }

    async fn load_relationships(
        &self,
        target: &DatabaseTarget,
    ) -> Result<Vec<Relationship>, ServerError> {
        let result = self.runner.run(target, FOREIGN_KEYS_SQL).await?;
        Ok(result
            .records()
            .filter_map(|row| {
                Some(Relationship::new(
                    record_table_key(&row, "source_schema", "source_table")?,
                    row.text("source_column")?,
                    record_table_key(&row, "target_schema", "target_table")?,
                    row.text("target_column")?,
                ))
            })
            .collect())
    }
}

#[async_trait]
impl SnapshotSource for SchemaDiscoverer {
    async fn discover(&self, target: &DatabaseTarget) -> Result<SchemaSnapshot, ServerError> {
        info!("Discovering schema for {}", target);

        let columns = first_success(ColumnQuery::ALL, |variant| self.load_columns(target, variant))
            .await
            .map_err(|exhausted| {
                ServerError::discovery(format!(
                    "Could not read column metadata:\n{}",
                    exhausted.diagnostics()
                ))
            })?;

        let mut tables = columns.value;
        let mut warnings = Vec::new();

        if !columns.failures.is_empty() {
            warnings.push(
                "Detailed column metadata was unavailable; lengths, precision and defaults are omitted"
                    .to_string(),
            );
        }

        match self.load_primary_keys(target).await {
            Ok(keys) => {
                for (key, column) in keys {
                    if let Some(col) = tables.get_mut(&key).and_then(|t| t.column_mut(&column)) {
                        col.key_role = KeyRole::PrimaryKey;
                    }
                }
            }
            Err(e) => {
                warn!("Could not retrieve primary key information: {}", e);
                warnings.push(format!("Primary key metadata unavailable: {}", e));
            }
        }

        let relationships = match self.load_relationships(target).await {
            Ok(relationships) => {
                for rel in &relationships {
                    if let Some(col) = tables
                        .get_mut(&rel.source_table)
                        .and_then(|t| t.column_mut(&rel.source_column))
                    {
                        if col.key_role != KeyRole::PrimaryKey {
                            col.key_role = KeyRole::ForeignKey;
                        }
                    }
                }
                relationships
            }
            Err(e) => {
                warn!("Could not retrieve foreign key information: {}", e);
                warnings.push(format!("Foreign key metadata unavailable: {}", e));
                Vec::new()
            }
        };

        for table in tables.values_mut() {
            table.sort_columns();
        }

        info!(
            "Discovered {} tables and {} relationships",
            tables.len(),
            relationships.len()
        );

        Ok(SchemaSnapshot::new(tables.into_values(), relationships).with_warnings(warnings))
    }
}

/// Group column rows into tables keyed by `schema.name`.
fn tables_from_rows(result: &QueryResult) -> BTreeMap<String, Table> {
    let mut tables: BTreeMap<String, Table> = BTreeMap::new();

    for row in result.records() {
        let (Some(schema_name), Some(table_name), Some(column_name)) = (
            row.text("table_schema"),
            row.text("table_name"),
            row.text("column_name"),
        ) else {
            continue;
        };

        let table = tables
            .entry(table_key(&schema_name, &table_name))
            .or_insert_with(|| Table::new(schema_name, table_name, Vec::new()));

        let ordinal = row
            .int("ordinal_position")
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or_else(|| next_ordinal(table));

        let mut column = Column::new(
            column_name,
            row.text("data_type").unwrap_or_default(),
            ordinal,
        );
        column.nullable = row
            .text("is_nullable")
            .is_none_or(|v| v.eq_ignore_ascii_case("YES"));
        column.max_length = row.int("max_length");
        column.precision = row.int("numeric_precision").and_then(|p| u32::try_from(p).ok());
        column.scale = row.int("numeric_scale").and_then(|s| u32::try_from(s).ok());
        column.default_value = row.text("column_default");

        table.columns.push(column);
    }

    tables
}

/// Position for a column whose row carries no ordinal.
fn next_ordinal(table: &Table) -> u32 {
    u32::try_from(table.columns.len()).map_or(u32::MAX, |n| n.saturating_add(1))
}

fn record_table_key(row: &Record<'_>, schema_column: &str, name_column: &str) -> Option<String> {
    Some(table_key(&row.text(schema_column)?, &row.text(name_column)?))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::SqlValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runner answering the discovery queries from canned results.
    pub(crate) struct CannedRunner {
        pub detailed: Option<QueryResult>,
        pub basic: Option<QueryResult>,
        pub primary_keys: Option<QueryResult>,
        pub foreign_keys: Option<QueryResult>,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl QueryRunner for CannedRunner {
        async fn run(&self, _target: &DatabaseTarget, sql: &str) -> Result<QueryResult, ServerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = match sql {
                DETAILED_COLUMNS_SQL => &self.detailed,
                BASIC_COLUMNS_SQL => &self.basic,
                PRIMARY_KEYS_SQL => &self.primary_keys,
                FOREIGN_KEYS_SQL => &self.foreign_keys,
                _ => &None,
            };
            answer
                .clone()
                .ok_or_else(|| ServerError::execution(sql, "Invalid object name"))
        }
    }

    fn text(s: &str) -> SqlValue {
        SqlValue::String(s.to_string())
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    pub(crate) fn sales_columns() -> QueryResult {
        let row = |table: &str, column: &str, ty: &str, nullable: &str, pos: i32, len: SqlValue| {
            vec![
                text("dbo"),
                text(table),
                text(column),
                text(ty),
                text(nullable),
                SqlValue::I32(pos),
                len,
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::Null,
            ]
        };

        QueryResult::new(
            cols(&[
                "table_schema",
                "table_name",
                "column_name",
                "data_type",
                "is_nullable",
                "ordinal_position",
                "max_length",
                "numeric_precision",
                "numeric_scale",
                "column_default",
            ]),
            vec![
                row("Resellers", "ResellerCompany", "nvarchar", "YES", 2, SqlValue::I32(100)),
                row("Resellers", "ResellerID", "int", "NO", 1, SqlValue::Null),
                row("Sales", "InvoiceID", "int", "NO", 1, SqlValue::Null),
                row("Sales", "ResellerID", "int", "YES", 2, SqlValue::Null),
            ],
        )
    }

    pub(crate) fn sales_primary_keys() -> QueryResult {
        QueryResult::new(
            cols(&["table_schema", "table_name", "column_name"]),
            vec![
                vec![text("dbo"), text("Sales"), text("InvoiceID")],
                vec![text("dbo"), text("Resellers"), text("ResellerID")],
            ],
        )
    }

    pub(crate) fn sales_foreign_keys() -> QueryResult {
        QueryResult::new(
            cols(&[
                "source_schema",
                "source_table",
                "source_column",
                "target_schema",
                "target_table",
                "target_column",
            ]),
            vec![vec![
                text("dbo"),
                text("Sales"),
                text("ResellerID"),
                text("dbo"),
                text("Resellers"),
                text("ResellerID"),
            ]],
        )
    }

    pub(crate) fn full_runner() -> CannedRunner {
        CannedRunner {
            detailed: Some(sales_columns()),
            basic: None,
            primary_keys: Some(sales_primary_keys()),
            foreign_keys: Some(sales_foreign_keys()),
            calls: AtomicUsize::new(0),
        }
    }

    fn target() -> DatabaseTarget {
        DatabaseTarget::new("srv", "db").unwrap()
    }

    async fn discover(runner: CannedRunner) -> Result<SchemaSnapshot, ServerError> {
        SchemaDiscoverer::new(Arc::new(runner)).discover(&target()).await
    }

    #[tokio::test]
    async fn test_full_discovery() {
        let snapshot = discover(full_runner()).await.unwrap();

        assert_eq!(snapshot.table_count(), 2);
        assert!(snapshot.warnings().is_empty());

        let resellers = snapshot.table("dbo.Resellers").unwrap();
        assert_eq!(resellers.columns[0].name, "ResellerID");
        assert_eq!(resellers.columns[0].key_role, KeyRole::PrimaryKey);
        assert!(!resellers.columns[0].nullable);
        assert_eq!(resellers.columns[1].max_length, Some(100));

        let sales = snapshot.table("dbo.Sales").unwrap();
        assert_eq!(sales.column("ResellerID").unwrap().key_role, KeyRole::ForeignKey);
        assert_eq!(snapshot.relationships().len(), 1);
        assert_eq!(
            snapshot.relationships()[0].to_string(),
            "dbo.Sales.ResellerID → dbo.Resellers.ResellerID"
        );
    }

    #[tokio::test]
    async fn test_primary_key_wins_over_foreign_key() {
        let mut runner = full_runner();
        runner.foreign_keys = Some(QueryResult::new(
            sales_foreign_keys().columns,
            vec![vec![
                text("dbo"),
                text("Sales"),
                text("InvoiceID"),
                text("dbo"),
                text("Resellers"),
                text("ResellerID"),
            ]],
        ));

        let snapshot = discover(runner).await.unwrap();
        let sales = snapshot.table("dbo.Sales").unwrap();
        assert_eq!(sales.column("InvoiceID").unwrap().key_role, KeyRole::PrimaryKey);
    }

    #[tokio::test]
    async fn test_key_metadata_failures_are_soft() {
        let mut runner = full_runner();
        runner.primary_keys = None;
        runner.foreign_keys = None;

        let snapshot = discover(runner).await.unwrap();
        assert_eq!(snapshot.table_count(), 2);
        assert!(snapshot.relationships().is_empty());
        assert!(snapshot
            .tables()
            .flat_map(|t| &t.columns)
            .all(|c| c.key_role == KeyRole::None));
        assert_eq!(snapshot.warnings().len(), 2);
    }

    #[tokio::test]
    async fn test_basic_variant_fallback() {
        let mut runner = full_runner();
        runner.detailed = None;
        runner.basic = Some(QueryResult::new(
            cols(&["table_schema", "table_name", "column_name", "data_type", "is_nullable"]),
            vec![
                vec![text("sales"), text("Orders"), text("OrderID"), text("int"), text("NO")],
                vec![text("sales"), text("Orders"), text("Amount"), text("decimal"), text("YES")],
            ],
        ));
        runner.primary_keys = Some(QueryResult::default());
        runner.foreign_keys = Some(QueryResult::default());

        let snapshot = discover(runner).await.unwrap();
        let orders = snapshot.table("sales.Orders").unwrap();
        assert_eq!(orders.columns[0].name, "OrderID");
        assert_eq!(orders.columns[1].ordinal_position, 2);
        assert!(orders.columns[1].max_length.is_none());
        assert_eq!(snapshot.warnings().len(), 1);
    }

    #[test]
    fn test_missing_ordinals_count_per_table() {
        let result = QueryResult::new(
            cols(&["table_schema", "table_name", "column_name", "data_type", "is_nullable"]),
            vec![
                vec![text("dbo"), text("Orders"), text("OrderID"), text("int"), text("NO")],
                vec![text("dbo"), text("Customers"), text("CustomerID"), text("int"), text("NO")],
                vec![text("dbo"), text("Orders"), text("Amount"), text("decimal"), text("YES")],
                vec![text("dbo"), text("Customers"), text("Name"), text("nvarchar"), text("YES")],
            ],
        );

        let tables = tables_from_rows(&result);
        let positions = |key: &str| -> Vec<(String, u32)> {
            tables[key]
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.ordinal_position))
                .collect()
        };

        assert_eq!(
            positions("dbo.Orders"),
            vec![("OrderID".to_string(), 1), ("Amount".to_string(), 2)]
        );
        assert_eq!(
            positions("dbo.Customers"),
            vec![("CustomerID".to_string(), 1), ("Name".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_column_metadata_failure_is_fatal() {
        let mut runner = full_runner();
        runner.detailed = None;
        runner.basic = None;

        let err = discover(runner).await.unwrap_err();
        assert!(matches!(err, ServerError::Discovery(_)));
        let text = err.to_string();
        assert!(text.contains("detailed column metadata"));
        assert!(text.contains("basic column metadata"));
    }

    #[tokio::test]
    async fn test_empty_database() {
        let mut runner = full_runner();
        runner.detailed = Some(QueryResult::new(sales_columns().columns, vec![]));
        let snapshot = discover(runner).await.unwrap();
        assert!(snapshot.is_empty());
    }
}
