//! Query execution and result handling.

use crate::config::DatabaseTarget;
use crate::database::connection::Connector;
use crate::database::types::{SqlValue, TypeMapper};
use crate::error::ServerError;
use async_trait::async_trait;
use futures_util::stream::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::Instant;
use tiberius::QueryItem;
use tracing::debug;

/// Name of the synthetic column returned for statements without a result set.
pub const ROWS_AFFECTED_COLUMN: &str = "rows_affected";

/// Ordered result of a single statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in order.
    pub columns: Vec<String>,

    /// Rows, each aligned with `columns`.
    pub rows: Vec<Vec<SqlValue>>,

    /// Whether rows were dropped because of the row limit.
    pub truncated: bool,
}

impl QueryResult {
    /// Create a result from columns and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows,
            truncated: false,
        }
    }

    /// Result of a statement that returned no rows.
    pub fn rows_affected(count: u64) -> Self {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        Self::new(
            vec![ROWS_AFFECTED_COLUMN.to_string()],
            vec![vec![SqlValue::I64(count)]],
        )
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The single value of a one-row, one-column result.
    pub fn scalar(&self) -> Option<&SqlValue> {
        match (self.columns.len(), self.rows.as_slice()) {
            (1, [row]) => row.first(),
            _ => None,
        }
    }

    /// Value at `row`, `column` by position.
    pub fn value(&self, row: usize, column: usize) -> Option<&SqlValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Rows with access by column name.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(|values| Record {
            columns: &self.columns,
            values,
        })
    }

    /// Render one row as `{col: value, ...}`.
    pub fn describe_row(&self, row: usize) -> Option<String> {
        let values = self.rows.get(row)?;
        let pairs: Vec<String> = self
            .columns
            .iter()
            .zip(values)
            .map(|(col, value)| format!("{}: {}", col, value))
            .collect();
        Some(format!("{{{}}}", pairs.join(", ")))
    }

    /// Format the first `max_rows` rows as a markdown table.
    ///
    /// Remaining rows are reported as `... and N more rows`.
    pub fn to_markdown_table(&self, max_rows: usize) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "| {} |", self.columns.join(" | "));
        let _ = writeln!(output, "|{}", "---|".repeat(self.columns.len()));

        for row in self.rows.iter().take(max_rows) {
            let values: Vec<String> = row.iter().map(|v| escape_cell(&v.to_string())).collect();
            let _ = writeln!(output, "| {} |", values.join(" | "));
        }

        if self.rows.len() > max_rows {
            let _ = writeln!(output, "... and {} more rows", self.rows.len() - max_rows);
        }

        output
    }
}

/// One row of a [`QueryResult`] with access by column name.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    values: &'a [SqlValue],
}

impl<'a> Record<'a> {
    /// Value of a column, matched case-insensitively.
    pub fn get(&self, column: &str) -> Option<&'a SqlValue> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))?;
        self.values.get(idx)
    }

    /// Non-NULL value of a column as text.
    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).and_then(SqlValue::as_text)
    }

    /// Value of a column as an integer.
    pub fn int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(SqlValue::as_i64)
    }
}

fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

/// Runs SQL text against a database target.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Execute one statement and return its ordered result.
    ///
    /// Failures carry the SQL and the driver message.
    async fn run(&self, target: &DatabaseTarget, sql: &str) -> Result<QueryResult, ServerError>;
}

/// Query runner backed by a fresh TDS connection per call.
pub struct FabricExecutor {
    connector: Connector,
    max_rows: usize,
}

impl FabricExecutor {
    /// Create a new executor.
    pub fn new(connector: Connector, max_rows: usize) -> Self {
        Self {
            connector,
            max_rows,
        }
    }
}

/// Query used to verify a newly configured target.
pub const VERSION_SQL: &str = "SELECT @@VERSION, GETDATE()";

/// Run [`VERSION_SQL`] and return the first line of the server version.
pub async fn server_version(
    runner: &dyn QueryRunner,
    target: &DatabaseTarget,
) -> Result<String, ServerError> {
    let result = runner.run(target, VERSION_SQL).await?;
    let version = result
        .value(0, 0)
        .and_then(SqlValue::as_text)
        .unwrap_or_else(|| "Unknown".to_string());
    Ok(version.lines().next().unwrap_or_default().trim().to_string())
}

#[async_trait]
impl QueryRunner for FabricExecutor {
    async fn run(&self, target: &DatabaseTarget, sql: &str) -> Result<QueryResult, ServerError> {
        let start = Instant::now();
        debug!("Executing query on {}: {}", target, truncate_for_log(sql, 200));

        // Connection and token failures keep their own variants
        let mut connection = self.connector.open(target).await?;

        let result = if returns_rows(sql) {
            let stream = connection
                .client
                .simple_query(sql)
                .await
                .map_err(|e| execution_error(sql, e))?;
            collect_rows(stream, sql, self.max_rows).await?
        } else {
            let done = connection
                .client
                .execute(sql, &[])
                .await
                .map_err(|e| execution_error(sql, e))?;
            QueryResult::rows_affected(done.rows_affected().iter().sum())
        };

        debug!(
            "Query completed: {} rows in {} ms",
            result.row_count(),
            start.elapsed().as_millis()
        );

        Ok(result)
    }
}

/// Collect the first result set of a stream.
///
/// A batch that produced no result set reports zero rows affected.
async fn collect_rows(
    mut stream: tiberius::QueryStream<'_>,
    sql: &str,
    max_rows: usize,
) -> Result<QueryResult, ServerError> {
    let mut result = QueryResult::default();
    let mut result_sets = 0;

    while let Some(item) = stream.try_next().await.map_err(|e| execution_error(sql, e))? {
        match item {
            QueryItem::Metadata(meta) => {
                result_sets += 1;
                if result_sets == 1 {
                    result.columns = meta.columns().iter().map(|c| c.name().to_string()).collect();
                }
            }
            QueryItem::Row(row) if result_sets == 1 => {
                if result.rows.len() >= max_rows {
                    result.truncated = true;
                    continue;
                }
                result.rows.push(TypeMapper::row_values(row));
            }
            QueryItem::Row(_) => {}
        }
    }

    if result_sets == 0 {
        return Ok(QueryResult::rows_affected(0));
    }
    Ok(result)
}

fn execution_error(sql: &str, e: tiberius::error::Error) -> ServerError {
    match e {
        tiberius::error::Error::Server(token) => {
            ServerError::execution_with_code(sql, token.message(), token.code())
        }
        other => ServerError::execution(sql, other.to_string()),
    }
}

/// Whether a statement is expected to produce a result set.
///
/// Leading comments are skipped. `DECLARE` batches usually end in a `SELECT`
/// so they are streamed too.
pub fn returns_rows(sql: &str) -> bool {
    let first = skip_leading_comments(sql)
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    matches!(
        first.as_str(),
        "SELECT" | "WITH" | "EXEC" | "EXECUTE" | "VALUES" | "DECLARE"
    )
}

fn skip_leading_comments(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(' || c == ';');
        if let Some(line) = rest.strip_prefix("--") {
            rest = line.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(block) = rest.strip_prefix("/*") {
            rest = block.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            return rest;
        }
    }
}

/// Truncate a string for logging purposes.
pub fn truncate_for_log(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
