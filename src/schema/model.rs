//! In-memory representation of discovered database structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind recorded for every discovered table.
pub const BASE_TABLE: &str = "BASE TABLE";

/// Key role of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyRole {
    #[default]
    None,
    PrimaryKey,
    ForeignKey,
}

impl KeyRole {
    /// Short label used in tables ("PK", "FK" or empty).
    pub fn short_label(&self) -> &'static str {
        match self {
            KeyRole::None => "",
            KeyRole::PrimaryKey => "PK",
            KeyRole::ForeignKey => "FK",
        }
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub ordinal_position: u32,
    pub max_length: Option<i64>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub default_value: Option<String>,
    pub key_role: KeyRole,
}

impl Column {
    /// Create a nullable column with no size information and no key role.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal_position: u32) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            ordinal_position,
            max_length: None,
            precision: None,
            scale: None,
            default_value: None,
            key_role: KeyRole::None,
        }
    }

    /// Builder-style key role setter.
    pub fn with_key_role(mut self, key_role: KeyRole) -> Self {
        self.key_role = key_role;
        self
    }

    /// Builder-style nullability setter.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub schema_name: String,
    pub name: String,
    pub kind: String,
    /// Ordered by ordinal position.
    pub columns: Vec<Column>,
}

impl Table {
    /// Create a base table; columns are sorted by ordinal position.
    pub fn new(schema_name: impl Into<String>, name: impl Into<String>, columns: Vec<Column>) -> Self {
        let mut table = Self {
            schema_name: schema_name.into(),
            name: name.into(),
            kind: BASE_TABLE.to_string(),
            columns,
        };
        table.sort_columns();
        table
    }

    /// Fully-qualified key, `schema.name`.
    pub fn key(&self) -> String {
        table_key(&self.schema_name, &self.name)
    }

    /// Restore ordinal-position order.
    pub fn sort_columns(&mut self) {
        self.columns.sort_by_key(|c| c.ordinal_position);
    }

    /// Find a column by name, case-insensitively.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Mutable variant of [`Table::column`].
    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Names of columns with the given key role, in ordinal order.
    pub fn columns_with_role(&self, role: KeyRole) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.key_role == role)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// A foreign-key edge between two table columns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
}

impl Relationship {
    pub fn new(
        source_table: impl Into<String>,
        source_column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            source_table: source_table.into(),
            source_column: source_column.into(),
            target_table: target_table.into(),
            target_column: target_column.into(),
        }
    }

    /// Whether either endpoint is the given table key.
    pub fn touches(&self, table_key: &str) -> bool {
        self.source_table == table_key || self.target_table == table_key
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} → {}.{}",
            self.source_table, self.source_column, self.target_table, self.target_column
        )
    }
}

/// Immutable point-in-time capture of discovered structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    tables: BTreeMap<String, Table>,
    relationships: Vec<Relationship>,
    discovered_at: DateTime<Utc>,
    warnings: Vec<String>,
}

impl SchemaSnapshot {
    /// Build a snapshot stamped with the current time.
    ///
    /// Tables are keyed by `schema.name`; a later table with the same key replaces
    /// an earlier one.
    pub fn new(tables: impl IntoIterator<Item = Table>, relationships: Vec<Relationship>) -> Self {
        Self {
            tables: tables.into_iter().map(|t| (t.key(), t)).collect(),
            relationships,
            discovered_at: Utc::now(),
            warnings: Vec::new(),
        }
    }

    /// Attach partial-discovery warnings.
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table(&self, key: &str) -> Option<&Table> {
        self.tables.get(key)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }

    /// Non-fatal problems recorded during discovery.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Resolve a user-supplied table name.
    ///
    /// Tries, case-insensitively: the full key, then the local name, then a
    /// substring of the key.
    pub fn find_table(&self, name: &str) -> Option<&Table> {
        let wanted = strip_brackets(name).to_lowercase();
        if wanted.is_empty() {
            return None;
        }

        self.tables
            .values()
            .find(|t| t.key().to_lowercase() == wanted)
            .or_else(|| {
                self.tables
                    .values()
                    .find(|t| t.name.to_lowercase() == wanted)
            })
            .or_else(|| {
                self.tables
                    .values()
                    .find(|t| t.key().to_lowercase().contains(&wanted))
            })
    }
}

/// Build a `schema.name` key.
pub fn table_key(schema_name: &str, name: &str) -> String {
    format!("{}.{}", schema_name, name)
}

/// Remove `[` `]` quoting from every part of a possibly qualified name.
pub fn strip_brackets(name: &str) -> String {
    name.trim().replace(['[', ']'], "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers() -> Table {
        Table::new(
            "dbo",
            "Customers",
            vec![
                Column::new("FullName", "nvarchar", 2),
                Column::new("CustomerID", "int", 1)
                    .with_key_role(KeyRole::PrimaryKey)
                    .not_null(),
            ],
        )
    }

    #[test]
    fn test_columns_follow_ordinal_position() {
        let table = customers();
        assert_eq!(table.columns[0].name, "CustomerID");
        assert_eq!(table.columns[1].name, "FullName");
        assert_eq!(table.key(), "dbo.Customers");
        assert_eq!(table.kind, BASE_TABLE);
    }

    #[test]
    fn test_columns_with_role() {
        let table = customers();
        assert_eq!(table.columns_with_role(KeyRole::PrimaryKey), vec!["CustomerID"]);
        assert!(table.columns_with_role(KeyRole::ForeignKey).is_empty());
    }

    #[test]
    fn test_snapshot_keys_are_unique() {
        let snapshot = SchemaSnapshot::new(
            vec![customers(), Table::new("dbo", "Customers", vec![])],
            vec![],
        );
        assert_eq!(snapshot.table_count(), 1);
        assert!(snapshot.table("dbo.Customers").unwrap().columns.is_empty());
    }

    #[test]
    fn test_find_table() {
        let snapshot = SchemaSnapshot::new(
            vec![customers(), Table::new("sales", "CustomerOrders", vec![])],
            vec![],
        );
        assert_eq!(snapshot.find_table("DBO.CUSTOMERS").unwrap().name, "Customers");
        assert_eq!(snapshot.find_table("[dbo].[Customers]").unwrap().name, "Customers");
        assert_eq!(snapshot.find_table("customerorders").unwrap().schema_name, "sales");
        assert_eq!(snapshot.find_table("Orders").unwrap().name, "CustomerOrders");
        assert!(snapshot.find_table("Invoices").is_none());
        assert!(snapshot.find_table("  ").is_none());
    }

    #[test]
    fn test_cyclic_relationships_are_representable() {
        let snapshot = SchemaSnapshot::new(
            vec![
                Table::new("dbo", "Employees", vec![Column::new("ManagerID", "int", 2)]),
            ],
            vec![Relationship::new("dbo.Employees", "ManagerID", "dbo.Employees", "EmployeeID")],
        );
        let rel = &snapshot.relationships()[0];
        assert!(rel.touches("dbo.Employees"));
        assert_eq!(rel.to_string(), "dbo.Employees.ManagerID → dbo.Employees.EmployeeID");
    }
}
