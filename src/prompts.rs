//! Prompt templates for the text oracle and the fallbacks used when it fails.

use crate::constants::{
    HISTORY_PROMPT_ENTRIES, SAMPLE_ROWS, SQL_GENERATION_MAX_TOKENS, SUMMARY_MAX_TOKENS,
    SUMMARY_PREVIEW_ROWS,
};
use crate::database::QueryResult;
use crate::oracle::ChatPrompt;
use crate::schema::{render, SchemaSnapshot};
use crate::security::QualifiedName;
use crate::state::HistoryEntry;
use std::collections::BTreeSet;
use std::fmt::Write;

/// System message for SQL generation.
pub const SQL_SYSTEM_PROMPT: &str = "You are an expert SQL generator. Generate clean, efficient SQL \
     queries based on the provided schema. Return only the SQL query without any explanation or \
     markdown formatting.";

/// System message for result summaries.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a data analyst providing clear, insightful \
     summaries of query results. Focus on answering the user's specific question with the most \
     important findings.";

/// Summary used when a query returned nothing.
pub const NO_RESULTS_SUMMARY: &str = "No results found for your query.";

const GENERATION_RULES: &str = "IMPORTANT RULES:
1. Use the exact table and column names from the schema above
2. Always use proper table prefixes (schema.table_name)
3. Use appropriate JOINs based on the relationships shown
4. Include proper GROUP BY clauses for aggregations
5. Add meaningful column aliases
6. Consider data types when writing conditions
7. Use TOP or LIMIT for potentially large result sets";

const GENERIC_RULES: &str = "QUERY GENERATION RULES:
1. The database is Microsoft Fabric / Azure SQL; write T-SQL (TOP, not LIMIT)
2. Qualify tables with their schema (schema.table_name)
3. Include appropriate GROUP BY clauses for aggregations
4. Add ORDER BY clauses to sort results meaningfully
5. Use descriptive column aliases
6. Use TOP for potentially large result sets
7. If the schema is unknown, query INFORMATION_SCHEMA to find it";

/// Build the SQL generation request.
///
/// With a snapshot only the relevant tables are rendered, or every table when
/// nothing matched; without one only generic T-SQL rules are given. The most recent
/// history entries are included as conversational context.
pub fn sql_generation_prompt(
    question: &str,
    snapshot: Option<&SchemaSnapshot>,
    relevant: &BTreeSet<String>,
    history: &[HistoryEntry],
) -> ChatPrompt {
    let mut user = String::from(
        "You are an expert SQL generator. Generate SQL queries based on the discovered database schema.\n\n",
    );

    match snapshot {
        Some(snapshot) => {
            let scope = (!relevant.is_empty()).then_some(relevant);
            user.push_str(&render(snapshot, scope));
            user.push('\n');
            user.push_str(GENERATION_RULES);
            user.push_str("\n\n");
            let relevant: Vec<&str> = relevant.iter().map(String::as_str).collect();
            let _ = writeln!(user, "RELEVANT TABLES FOR THIS QUERY: {}", relevant.join(", "));
        }
        None => {
            user.push_str(GENERIC_RULES);
            user.push('\n');
        }
    }

    let skip = history.len().saturating_sub(HISTORY_PROMPT_ENTRIES);
    let recent = &history[skip..];
    if !recent.is_empty() {
        user.push_str("\nRECENT QUERIES FOR CONTEXT:\n");
        for (i, entry) in recent.iter().enumerate() {
            let _ = writeln!(user, "{}. Q: {}\n   SQL: {}", i + 1, entry.question, entry.sql);
        }
        user.push_str("If the question is a follow-up, build upon this context.\n");
    }

    let _ = write!(
        user,
        "\nQuestion: \"{}\"\n\nGenerate only the SQL query, nothing else.\n",
        question
    );

    ChatPrompt {
        system: SQL_SYSTEM_PROMPT.to_string(),
        user,
        max_tokens: SQL_GENERATION_MAX_TOKENS,
        temperature: 0.0,
    }
}

/// Build the summary request for an executed query.
pub fn summary_prompt(question: &str, sql: &str, result: &QueryResult) -> ChatPrompt {
    let header = result.columns.join(" | ");
    let mut preview = format!("{}\n{}\n", header, "-".repeat(header.chars().count()));
    for row in result.rows.iter().take(SUMMARY_PREVIEW_ROWS) {
        let values: Vec<String> = row.iter().map(ToString::to_string).collect();
        let _ = writeln!(preview, "{}", values.join(" | "));
    }
    if result.row_count() > SUMMARY_PREVIEW_ROWS {
        let _ = writeln!(
            preview,
            "... and {} more rows",
            result.row_count() - SUMMARY_PREVIEW_ROWS
        );
    }

    let user = format!(
        "Question: {question}\n\
         SQL Query: {sql}\n\
         Results: {rows} rows, {cols} columns\n\
         Columns: {columns}\n\n\
         Data Preview:\n{preview}\n\
         Provide a clear, concise summary that directly answers the user's question.\n\
         If this is numerical data, highlight key insights and trends.\n\
         If this is a list, mention the top results.\n\
         Keep the response conversational and informative.\n",
        rows = result.row_count(),
        cols = result.columns.len(),
        columns = result.columns.join(", "),
    );

    ChatPrompt {
        system: SUMMARY_SYSTEM_PROMPT.to_string(),
        user,
        max_tokens: SUMMARY_MAX_TOKENS,
        temperature: 0.1,
    }
}

/// Remove a surrounding Markdown code fence from oracle output.
pub fn strip_code_fences(text: &str) -> String {
    let mut sql = text.trim();

    if let Some(rest) = sql.strip_prefix("```") {
        // Info string, e.g. `sql` or `tsql`
        sql = match rest.split_once('\n') {
            Some((info, body)) if !info.trim().contains(char::is_whitespace) => body,
            Some(_) => rest,
            None => strip_language_tag(rest),
        };
    }
    if let Some(rest) = sql.trim_end().strip_suffix("```") {
        sql = rest;
    }

    sql.trim().to_string()
}

/// Drop a leading `sql`/`tsql` tag from a single-line fence body.
fn strip_language_tag(body: &str) -> &str {
    match body.split_once(char::is_whitespace) {
        Some((tag, rest))
            if tag.eq_ignore_ascii_case("sql") || tag.eq_ignore_ascii_case("tsql") =>
        {
            rest
        }
        _ => body,
    }
}

/// SQL to run when the oracle could not produce any.
///
/// Samples the first relevant table, else the first table of the snapshot,
/// else lists the tables of the database.
pub fn fallback_sql(snapshot: Option<&SchemaSnapshot>, relevant: &BTreeSet<String>) -> String {
    let table = relevant
        .iter()
        .next()
        .and_then(|key| snapshot.and_then(|s| s.table(key)))
        .or_else(|| snapshot.and_then(|s| s.tables().next()));

    match table {
        Some(table) => {
            let name = QualifiedName {
                schema: Some(table.schema_name.clone()),
                name: table.name.clone(),
            };
            format!("SELECT TOP {} * FROM {}", SAMPLE_ROWS, name.escaped())
        }
        None => "SELECT TABLE_SCHEMA, TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_SCHEMA, TABLE_NAME"
            .to_string(),
    }
}

/// Summary to show when the oracle could not produce one.
pub fn fallback_summary(result: &QueryResult) -> String {
    if result.is_empty() {
        return NO_RESULTS_SUMMARY.to_string();
    }
    if let Some(value) = result.scalar() {
        return format!("The answer is: {}", value);
    }
    format!(
        "Found {} results. Top result: {}",
        result.row_count(),
        result.describe_row(0).unwrap_or_default()
    )
}
