//! Advisory checks on generated SQL.
//!
//! This is a lexical heuristic, not a parser. Findings are shown to the user
//! next to the results and never block execution.

use crate::constants::AGGREGATE_TOKENS;
use crate::schema::model::strip_brackets;
use crate::schema::SchemaSnapshot;
use std::collections::HashSet;

/// Warning text for a query that aggregates without grouping.
pub const MISSING_GROUP_BY: &str = "Query contains aggregation but might be missing GROUP BY clause";

/// Check `sql` against the tables in `snapshot`.
///
/// Returns warnings in the order they were found.
pub fn validate(sql: &str, snapshot: &SchemaSnapshot) -> Vec<String> {
    let lowered = sql.to_lowercase();
    let mut warnings = unknown_tables(&lowered, snapshot);

    if let Some(warning) = missing_group_by(&lowered) {
        warnings.push(warning);
    }

    warnings
}

/// Flag unqualified names after `FROM` or `JOIN` that are not in the snapshot.
fn unknown_tables(lowered: &str, snapshot: &SchemaSnapshot) -> Vec<String> {
    let known: HashSet<String> = snapshot
        .tables()
        .flat_map(|t| [t.key().to_lowercase(), t.name.to_lowercase()])
        .collect();

    let words: Vec<&str> = lowered.split_whitespace().collect();

    words
        .windows(2)
        .filter(|pair| matches!(pair[0], "from" | "join"))
        .filter_map(|pair| {
            let reference = pair[1].trim_matches(|c| matches!(c, '(' | ')' | ',' | ';'));
            if reference.is_empty() || reference.contains('.') {
                return None;
            }
            if known.contains(&strip_brackets(reference)) {
                return None;
            }
            Some(format!("Table '{}' not found in schema", reference))
        })
        .collect()
}

fn missing_group_by(lowered: &str) -> Option<String> {
    let aggregates = AGGREGATE_TOKENS.iter().any(|token| lowered.contains(token));
    (aggregates && !lowered.contains("group by")).then(|| MISSING_GROUP_BY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Table};

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot::new(
            vec![
                Table::new("dbo", "Sales", vec![Column::new("Amount", "decimal", 1)]),
                Table::new("dbo", "Resellers", vec![Column::new("ResellerID", "int", 1)]),
            ],
            vec![],
        )
    }

    #[test]
    fn test_clean_query_has_no_warnings() {
        let sql = "SELECT r.ResellerID, SUM(s.Amount) FROM dbo.Sales s \
                   JOIN Resellers r ON s.ResellerID = r.ResellerID GROUP BY r.ResellerID";
        assert!(validate(sql, &snapshot()).is_empty());
    }

    #[test]
    fn test_unknown_table_is_flagged() {
        let warnings = validate("SELECT * FROM Customers", &snapshot());
        assert_eq!(warnings, vec!["Table 'customers' not found in schema"]);
    }

    #[test]
    fn test_qualified_names_are_skipped() {
        assert!(validate("SELECT * FROM other.Missing", &snapshot()).is_empty());
    }

    #[test]
    fn test_bracketed_and_punctuated_names_resolve() {
        assert!(validate("SELECT * FROM [Sales];", &snapshot()).is_empty());
        assert!(validate("SELECT * FROM (Sales) JOIN Resellers, x", &snapshot()).is_empty());
    }

    #[test]
    fn test_subquery_after_from_is_ignored() {
        let sql = "SELECT * FROM ( SELECT 1 AS x ) AS t";
        assert!(validate(sql, &snapshot()).is_empty());
    }

    #[test]
    fn test_aggregation_without_group_by() {
        let warnings = validate("SELECT ResellerID, SUM(Amount) FROM Sales", &snapshot());
        assert_eq!(warnings, vec![MISSING_GROUP_BY]);

        let grouped = "SELECT ResellerID, SUM(Amount) FROM Sales GROUP BY ResellerID";
        assert!(validate(grouped, &snapshot()).is_empty());
    }

    #[test]
    fn test_warnings_keep_order() {
        let warnings = validate("SELECT COUNT(*) FROM Orders", &snapshot());
        assert_eq!(
            warnings,
            vec![
                "Table 'orders' not found in schema".to_string(),
                MISSING_GROUP_BY.to_string(),
            ]
        );
    }
}
