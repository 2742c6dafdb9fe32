//! Plain-text schema description injected into the SQL generation prompt.

use super::model::{Column, KeyRole, Relationship, SchemaSnapshot, Table};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Render a snapshot, optionally restricted to `tables_of_interest`.
///
/// Tables are sorted by key so the same snapshot always renders to the same
/// text. Relationships are kept when either endpoint is rendered.
pub fn render(snapshot: &SchemaSnapshot, tables_of_interest: Option<&BTreeSet<String>>) -> String {
    let tables = sorted_tables(snapshot, tables_of_interest);

    let mut out = String::from("DATABASE SCHEMA:\n\n");

    for table in &tables {
        render_table(&mut out, table);
        out.push('\n');
    }

    let rendered: BTreeSet<String> = tables.iter().map(|t| t.key()).collect();
    let mut relationships: Vec<&Relationship> = snapshot
        .relationships()
        .iter()
        .filter(|rel| tables_of_interest.is_none() || rendered.iter().any(|k| rel.touches(k)))
        .collect();
    relationships.sort();
    relationships.dedup();

    if !relationships.is_empty() {
        out.push_str("RELATIONSHIPS:\n");
        for rel in relationships {
            let _ = writeln!(out, "  - {}", rel);
        }
        out.push('\n');
    }

    out
}

/// Tables in rendering order: case-insensitive key, then exact key.
pub fn sorted_tables<'a>(
    snapshot: &'a SchemaSnapshot,
    tables_of_interest: Option<&BTreeSet<String>>,
) -> Vec<&'a Table> {
    let mut tables: Vec<&Table> = snapshot
        .tables()
        .filter(|t| tables_of_interest.is_none_or(|wanted| wanted.contains(&t.key())))
        .collect();
    tables.sort_by_cached_key(|t| (t.key().to_lowercase(), t.key()));
    tables
}

fn render_table(out: &mut String, table: &Table) {
    let _ = writeln!(out, "TABLE: {}", table.key());
    out.push_str("COLUMNS:\n");
    for column in &table.columns {
        let _ = writeln!(out, "  - {}", describe_column(column));
    }
}

/// `name (type[, details]) [KEY] [NOT NULL]`
pub fn describe_column(column: &Column) -> String {
    let mut desc = format!("{} ({}", column.name, column.data_type);

    match (column.max_length, column.precision) {
        (Some(len), _) if len != 0 => {
            let _ = write!(desc, ", max_length={}", len);
        }
        (_, Some(precision)) if precision > 0 => {
            let _ = write!(desc, ", precision={}", precision);
            if let Some(scale) = column.scale.filter(|s| *s > 0) {
                let _ = write!(desc, ", scale={}", scale);
            }
        }
        _ => {}
    }
    desc.push(')');

    match column.key_role {
        KeyRole::PrimaryKey => desc.push_str(" [PRIMARY KEY]"),
        KeyRole::ForeignKey => desc.push_str(" [FOREIGN KEY]"),
        KeyRole::None => {}
    }

    if !column.nullable {
        desc.push_str(" [NOT NULL]");
    }

    desc
}
