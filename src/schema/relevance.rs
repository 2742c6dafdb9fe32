//! Heuristic narrowing of the tables described to the oracle.
//!
//! Matching is plain lower-cased substring search over the question. It is a
//! prompt-size filter, not a correctness guarantee: a missed table only means
//! the rendered schema omits it.

use super::model::{SchemaSnapshot, Table};
use crate::constants::{FACT_TABLE_HINTS, MIN_COLUMN_MATCH_LEN};
use std::collections::BTreeSet;

/// Select the keys of tables that look relevant to `question`.
///
/// When nothing matches by name or column, every table whose name contains a
/// fact-table hint is returned instead.
pub fn match_tables(question: &str, snapshot: &SchemaSnapshot) -> BTreeSet<String> {
    let question = question.to_lowercase();

    let matched: BTreeSet<String> = snapshot
        .tables()
        .filter(|table| table_matches(&question, table))
        .map(|table| table.key())
        .collect();

    if !matched.is_empty() {
        return matched;
    }

    snapshot
        .tables()
        .filter(|table| is_fact_table(&table.name))
        .map(|table| table.key())
        .collect()
}

/// Whether a table name contains one of the fact-table hints.
pub fn is_fact_table(name: &str) -> bool {
    let name = name.to_lowercase();
    FACT_TABLE_HINTS.iter().any(|hint| name.contains(hint))
}

fn table_matches(question: &str, table: &Table) -> bool {
    let name = table.name.to_lowercase();

    if question.contains(&name) {
        return true;
    }

    if let Some(singular) = name.strip_suffix('s') {
        if !singular.is_empty() && question.contains(singular) {
            return true;
        }
    }

    if question.contains(&format!("{}s", name)) {
        return true;
    }

    table.columns.iter().any(|column| {
        let column = column.name.to_lowercase();
        column.len() > MIN_COLUMN_MATCH_LEN && question.contains(&column)
    })
}
