//! The assistant operations behind the MCP tools.
//!
//! Every operation returns user-facing markdown. Failures are rendered as
//! `❌` text with a remediation hint instead of being raised to the protocol
//! layer.

use crate::config::DatabaseTarget;
use crate::constants::{
    ASK_DISPLAY_ROWS, DISPLAY_RELATIONSHIPS, EXECUTE_DISPLAY_ROWS, HISTORY_PROMPT_ENTRIES,
    SAMPLE_ROWS,
};
use crate::database::{server_version, truncate_for_log, QueryResult, QueryRunner, SqlValue};
use crate::error::ServerError;
use crate::lint;
use crate::oracle::TextOracle;
use crate::prompts::{
    fallback_sql, fallback_summary, sql_generation_prompt, strip_code_fences, summary_prompt,
    NO_RESULTS_SUMMARY,
};
use crate::schema::{match_tables, KeyRole, SchemaDiscoverer, SchemaSnapshot, SnapshotSource};
use crate::security::{safe_table_name, QualifiedName};
use crate::state::SharedSession;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reply when an operation needs a target and none is set.
pub const NOT_CONFIGURED: &str =
    "❌ Please configure database first using `configure_database` tool.";

/// Detects an existing row limit in a statement.
static ROW_LIMIT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(TOP|LIMIT)\b")
        .unwrap_or_else(|e| panic!("Internal error: invalid regex pattern: {}", e))
});

/// Detects a leading `SELECT`.
static LEADING_SELECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*SELECT\b")
        .unwrap_or_else(|e| panic!("Internal error: invalid regex pattern: {}", e))
});

/// Natural-language SQL assistant over one session.
#[derive(Clone)]
pub struct Assistant {
    session: SharedSession,
    runner: Arc<dyn QueryRunner>,
    discoverer: Arc<dyn SnapshotSource>,
    oracle: Arc<dyn TextOracle>,
}

impl Assistant {
    /// Create an assistant with explicit collaborators.
    pub fn new(
        session: SharedSession,
        runner: Arc<dyn QueryRunner>,
        discoverer: Arc<dyn SnapshotSource>,
        oracle: Arc<dyn TextOracle>,
    ) -> Self {
        Self {
            session,
            runner,
            discoverer,
            oracle,
        }
    }

    /// Create an assistant that discovers schemas through `runner`.
    pub fn with_runner(
        session: SharedSession,
        runner: Arc<dyn QueryRunner>,
        oracle: Arc<dyn TextOracle>,
    ) -> Self {
        let discoverer = Arc::new(SchemaDiscoverer::new(Arc::clone(&runner)));
        Self::new(session, runner, discoverer, oracle)
    }

    /// The session this assistant works on.
    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Set the server/database and verify the connection.
    ///
    /// The target is kept even if the connection test fails, so the user can
    /// retry after fixing permissions or network access.
    pub async fn configure_database(&self, server: &str, database: &str) -> String {
        let target = match DatabaseTarget::new(server, database) {
            Ok(target) => target,
            Err(_) => return "❌ Both server and database parameters are required.".to_string(),
        };

        if self.session.cache.configure(target.clone()).await {
            info!("Configured {}; schema cache reset", target);
        }

        match server_version(self.runner.as_ref(), &target).await {
            Ok(version) => format!(
                "✅ **Database Configured Successfully!**\n\n\
                 **Server:** {}\n\
                 **Database:** {}\n\
                 **Status:** Connected\n\
                 **Version:** {}\n\n\
                 You can now:\n\
                 1. Run `discover_schema` to automatically discover all tables and columns\n\
                 2. Ask questions about your data using `ask_database`\n\
                 3. Execute SQL queries directly using `execute_sql_query`",
                target.server, target.database, version
            ),
            Err(e) => {
                warn!("Connection test for {} failed: {}", target, e);
                let mut response = format!(
                    "❌ **Database Configuration Failed**\n\n\
                     **Server:** {}\n\
                     **Database:** {}\n\
                     **Error:** {}\n\n\
                     Please check:\n\
                     - Server address is correct\n\
                     - Database name exists\n\
                     - You have proper permissions\n\
                     - Network connectivity",
                    target.server, target.database, e
                );
                if let Some(hint) = e.suggestion() {
                    let _ = write!(response, "\n\n**Suggestion:** {}", hint);
                }
                response
            }
        }
    }

    /// Discover (or return the cached) schema and describe it.
    pub async fn discover_schema(&self, refresh: bool) -> String {
        if self.session.cache.target().await.is_none() {
            return NOT_CONFIGURED.to_string();
        }

        match self.session.cache.get(self.discoverer.as_ref(), refresh).await {
            Ok(snapshot) => format_schema_response(&snapshot),
            Err(e) => e.to_user_message(),
        }
    }

    /// Answer a natural-language question.
    pub async fn ask_database(
        &self,
        question: &str,
        include_raw_data: bool,
        use_auto_schema: bool,
    ) -> String {
        let question = question.trim();
        if question.is_empty() {
            return "❌ Please provide a question.".to_string();
        }

        let Some(target) = self.session.cache.target().await else {
            return NOT_CONFIGURED.to_string();
        };

        let mut notes = Vec::new();
        let snapshot = self.schema_for_question(use_auto_schema, &mut notes).await;
        let relevant = snapshot
            .as_deref()
            .map(|s| match_tables(question, s))
            .unwrap_or_default();

        let generated = self
            .generate_sql(question, snapshot.as_deref(), &relevant)
            .await;
        let sql = match &generated {
            Ok(sql) => sql.clone(),
            Err(e) => {
                warn!("SQL generation failed, using fallback query: {}", e);
                notes.push(format!(
                    "SQL generation was unavailable ({}); showing sample rows instead.",
                    e
                ));
                fallback_sql(snapshot.as_deref(), &relevant)
            }
        };

        let warnings = snapshot
            .as_deref()
            .map(|s| lint::validate(&sql, s))
            .unwrap_or_default();
        for warning in &warnings {
            debug!("Lint: {}", warning);
        }

        let result = match self.runner.run(&target, &sql).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Generated query failed: {}", e);
                return e.to_user_message();
            }
        };

        if generated.is_ok() {
            self.session.history.write().await.record(question, sql.clone());
        }

        let answer = self.summarize(question, &sql, &result).await;

        format_answer(
            &answer,
            &sql,
            &result,
            &warnings,
            &relevant,
            &notes,
            include_raw_data,
        )
    }

    /// Describe the configured target and cache state.
    pub async fn get_current_config(&self) -> String {
        let Some(target) = self.session.cache.target().await else {
            return "❌ No database configured. Use `configure_database` to set up connection."
                .to_string();
        };
        let snapshot = self.session.cache.peek().await;

        let mut response = format!(
            "**Current Configuration:**\n\n\
             **Server:** {}\n\
             **Database:** {}\n\
             **Schema Discovered:** {}\n",
            target.server,
            target.database,
            if snapshot.is_some() { "Yes" } else { "No" }
        );

        if let Some(snapshot) = snapshot {
            let _ = writeln!(response, "**Tables Found:** {}", snapshot.table_count());
            let _ = writeln!(
                response,
                "**Relationships Found:** {}",
                snapshot.relationships().len()
            );
            let _ = writeln!(
                response,
                "**Discovered At:** {}",
                snapshot.discovered_at().format("%Y-%m-%d %H:%M:%S UTC")
            );
        }

        let stats = self.session.cache.stats().await;
        let _ = writeln!(
            response,
            "**Schema Cache:** {} hits, {} discoveries, {} failed, {} invalidations ({:.1}% hit rate)",
            stats.hits,
            stats.discoveries,
            stats.failed_discoveries,
            stats.invalidations,
            stats.hit_rate()
        );

        let history = self.session.history.read().await;
        if !history.is_empty() {
            let _ = writeln!(response, "**Questions In History:** {}", history.len());
        }

        response.trim_end().to_string()
    }

    /// Run SQL supplied by the user.
    pub async fn execute_sql_query(&self, sql: &str, limit_rows: usize) -> String {
        if sql.trim().is_empty() {
            return "❌ Please provide a SQL query.".to_string();
        }

        let Some(target) = self.session.cache.target().await else {
            return NOT_CONFIGURED.to_string();
        };

        let sql = apply_row_limit(sql, limit_rows);
        debug!("Executing user SQL: {}", truncate_for_log(&sql, 200));

        match self.runner.run(&target, &sql).await {
            Ok(result) => {
                let mut response = format!("**Results:** {} rows\n\n", result.row_count());
                if result.is_empty() {
                    response.push_str("No results returned.");
                } else {
                    response.push_str(&result.to_markdown_table(EXECUTE_DISPLAY_ROWS));
                }
                response.trim_end().to_string()
            }
            Err(e) => e.to_user_message(),
        }
    }

    /// Row count, column list and sample rows of one table.
    pub async fn get_table_details(&self, table_name: &str, include_sample_data: bool) -> String {
        if table_name.trim().is_empty() {
            return "❌ Please provide a table name.".to_string();
        }

        let Some(target) = self.session.cache.target().await else {
            return NOT_CONFIGURED.to_string();
        };

        match self
            .table_details(&target, table_name.trim(), include_sample_data)
            .await
        {
            Ok(text) => text,
            Err(e) => e.to_user_message(),
        }
    }

    async fn table_details(
        &self,
        target: &DatabaseTarget,
        table_name: &str,
        include_sample_data: bool,
    ) -> Result<String, ServerError> {
        let requested = safe_table_name(table_name)?;
        let snapshot = self.session.cache.peek().await;
        let table = snapshot.as_deref().and_then(|s| s.find_table(table_name));

        // Prefer the qualified name from the snapshot when the lookup resolved
        let name = match table {
            Some(table) => QualifiedName {
                schema: Some(table.schema_name.clone()),
                name: table.name.clone(),
            },
            None => requested,
        };
        let escaped = name.escaped();

        let count = self
            .runner
            .run(target, &format!("SELECT COUNT(*) AS row_count FROM {}", escaped))
            .await?;
        let row_count = count.scalar().and_then(SqlValue::as_i64).unwrap_or(0);

        let display = table.map(|t| t.key()).unwrap_or_else(|| table_name.to_string());
        let mut response = format!(
            "## Table: {}\n**Total Rows:** {}\n",
            display,
            group_thousands(row_count)
        );

        if let Some(table) = table {
            response.push_str("\n**Columns:**\n");
            response.push_str("| Column | Type | Nullable | Key |\n");
            response.push_str("|--------|------|----------|-----|\n");
            for column in &table.columns {
                let _ = writeln!(
                    response,
                    "| {} | {} | {} | {} |",
                    column.name,
                    column.data_type,
                    if column.nullable { "Yes" } else { "No" },
                    column.key_role.short_label()
                );
            }
        }

        if include_sample_data && row_count > 0 {
            let sample = self
                .runner
                .run(target, &format!("SELECT TOP {} * FROM {}", SAMPLE_ROWS, escaped))
                .await?;
            response.push_str("\n**Sample Data:**\n");
            response.push_str(&sample.to_markdown_table(SAMPLE_ROWS));
        }

        Ok(response.trim_end().to_string())
    }

    /// Snapshot used for prompting. Discovery failures degrade to no schema.
    async fn schema_for_question(
        &self,
        use_auto_schema: bool,
        notes: &mut Vec<String>,
    ) -> Option<Arc<SchemaSnapshot>> {
        if !use_auto_schema {
            return self.session.cache.peek().await;
        }

        match self.session.cache.get(self.discoverer.as_ref(), false).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Schema unavailable for question: {}", e);
                notes.push(format!("Schema discovery failed, SQL was generated without it: {}", e));
                self.session.cache.peek().await
            }
        }
    }

    async fn generate_sql(
        &self,
        question: &str,
        snapshot: Option<&SchemaSnapshot>,
        relevant: &BTreeSet<String>,
    ) -> Result<String, ServerError> {
        let history = self.session.history.read().await.recent(HISTORY_PROMPT_ENTRIES);
        let prompt = sql_generation_prompt(question, snapshot, relevant, &history);

        let sql = strip_code_fences(&self.oracle.complete(&prompt).await?);
        if sql.is_empty() {
            return Err(ServerError::oracle("Oracle returned an empty query"));
        }
        Ok(sql)
    }

    async fn summarize(&self, question: &str, sql: &str, result: &QueryResult) -> String {
        if result.is_empty() {
            return NO_RESULTS_SUMMARY.to_string();
        }

        match self.oracle.complete(&summary_prompt(question, sql, result)).await {
            Ok(summary) => summary,
            Err(e) => {
                debug!("Summary unavailable, using fallback: {}", e);
                fallback_summary(result)
            }
        }
    }
}

/// Wrap a `SELECT` without `TOP`/`LIMIT` so at most `limit_rows` rows return.
pub fn apply_row_limit(sql: &str, limit_rows: usize) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    if LEADING_SELECT.is_match(trimmed) && !ROW_LIMIT_PATTERN.is_match(trimmed) {
        format!(
            "SELECT TOP {} * FROM ({}) AS limited_query",
            limit_rows.max(1),
            trimmed
        )
    } else {
        sql.trim().to_string()
    }
}

/// Markdown description of a snapshot, grouped by schema.
pub fn format_schema_response(snapshot: &SchemaSnapshot) -> String {
    let mut response = format!(
        "## 🎯 Fabric Data Warehouse Schema Discovery Complete!\n**Found {} tables**\n\n",
        snapshot.table_count()
    );

    let mut schemas: BTreeMap<&str, Vec<_>> = BTreeMap::new();
    for table in snapshot.tables() {
        schemas.entry(table.schema_name.as_str()).or_default().push(table);
    }

    for (schema, mut tables) in schemas {
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        let _ = writeln!(response, "### Schema: {}\n", schema);

        for table in tables {
            let _ = writeln!(response, "**{}** ({} columns)", table.name, table.columns.len());

            let primary = table.columns_with_role(KeyRole::PrimaryKey);
            if !primary.is_empty() {
                let _ = writeln!(response, "  - Primary Key: {}", primary.join(", "));
            }

            let foreign = table.columns_with_role(KeyRole::ForeignKey);
            if !foreign.is_empty() {
                let _ = writeln!(response, "  - Foreign Keys: {}", foreign.join(", "));
            }
            response.push('\n');
        }
    }

    if snapshot.is_empty() {
        response.push_str("*No user tables were found. Check that your account can see the tables in this database.*\n\n");
    }

    response.push_str("### 🔗 Relationships\n");
    let relationships = snapshot.relationships();
    if relationships.is_empty() {
        response.push_str(
            "*No foreign key relationships found - this is normal for Fabric Data Warehouse*\n",
        );
    } else {
        response.push('\n');
        for relationship in relationships.iter().take(DISPLAY_RELATIONSHIPS) {
            let _ = writeln!(response, "- {}", relationship);
        }
        if relationships.len() > DISPLAY_RELATIONSHIPS {
            let _ = writeln!(
                response,
                "... and {} more relationships",
                relationships.len() - DISPLAY_RELATIONSHIPS
            );
        }
    }

    if !snapshot.warnings().is_empty() {
        response.push_str("\n**⚠️ Partial Discovery:**\n");
        for warning in snapshot.warnings() {
            let _ = writeln!(response, "- {}", warning);
        }
    }

    response.push_str("\n**🚀 Next Steps:**\n");
    response.push_str("1. Use `ask_database` to query your data with natural language\n");
    response.push_str("2. Use `get_table_details` to inspect specific tables\n");
    response.push_str("3. The AI will automatically use this schema for better SQL generation");

    response
}

fn format_answer(
    answer: &str,
    sql: &str,
    result: &QueryResult,
    warnings: &[String],
    relevant: &BTreeSet<String>,
    notes: &[String],
    include_raw_data: bool,
) -> String {
    let mut response = format!(
        "## {}\n\n**SQL Query:**\n```sql\n{}\n```\n**Results:** {} rows",
        answer,
        sql,
        result.row_count()
    );
    if result.truncated {
        response.push_str(" (row limit reached)");
    }
    response.push('\n');

    if !warnings.is_empty() {
        response.push_str("\n**⚠️ Validation Warnings:**\n");
        for warning in warnings {
            let _ = writeln!(response, "- {}", warning);
        }
    }

    if !relevant.is_empty() {
        let tables: Vec<&str> = relevant.iter().map(String::as_str).collect();
        let _ = writeln!(response, "\n**Relevant Tables:** {}", tables.join(", "));
    }

    for note in notes {
        let _ = writeln!(response, "\n*Note: {}*", note);
    }

    if include_raw_data && !result.is_empty() {
        response.push_str("\n**Data:**\n");
        response.push_str(&result.to_markdown_table(ASK_DISPLAY_ROWS));
    }

    response.trim_end().to_string()
}

/// Format an integer with `,` thousands separators.
fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        grouped.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}
