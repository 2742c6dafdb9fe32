//! End-to-end assistant flows against an in-memory database and model.
//!
//! These tests drive the six assistant operations through the public API
//! with a scripted [`QueryRunner`] and [`TextOracle`], so they run without
//! Docker or network access.

use async_trait::async_trait;
use fabric_sql_mcp::assistant::NOT_CONFIGURED;
use fabric_sql_mcp::config::DatabaseTarget;
use fabric_sql_mcp::database::{QueryResult, QueryRunner, SqlValue, VERSION_SQL};
use fabric_sql_mcp::lint::MISSING_GROUP_BY;
use fabric_sql_mcp::oracle::{ChatPrompt, TextOracle};
use fabric_sql_mcp::schema::discovery::{
    BASIC_COLUMNS_SQL, DETAILED_COLUMNS_SQL, FOREIGN_KEYS_SQL, PRIMARY_KEYS_SQL,
};
use fabric_sql_mcp::state::SessionContext;
use fabric_sql_mcp::{Assistant, ServerError};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

const SERVER: &str = "abc.datawarehouse.fabric.microsoft.com";
const DATABASE: &str = "SalesWarehouse";

fn text(s: &str) -> SqlValue {
    SqlValue::String(s.to_string())
}

fn cols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// A two-table warehouse: `dbo.Sales` referencing `dbo.Resellers`.
struct FakeWarehouse {
    answers: HashMap<String, QueryResult>,
    executed: Mutex<Vec<String>>,
}

impl FakeWarehouse {
    fn new() -> Self {
        let mut answers = HashMap::new();

        answers.insert(
            VERSION_SQL.to_string(),
            QueryResult::new(
                cols(&["version", "now"]),
                vec![vec![
                    text("Microsoft Azure SQL Data Warehouse - 10.0.1\n\tCopyright (c) Microsoft"),
                    SqlValue::Null,
                ]],
            ),
        );

        answers.insert(
            DETAILED_COLUMNS_SQL.to_string(),
            QueryResult::new(
                cols(&[
                    "table_schema",
                    "table_name",
                    "column_name",
                    "data_type",
                    "is_nullable",
                    "ordinal_position",
                ]),
                vec![
                    vec![text("dbo"), text("Resellers"), text("ResellerID"), text("int"), text("NO"), SqlValue::I32(1)],
                    vec![text("dbo"), text("Resellers"), text("ResellerCompany"), text("nvarchar"), text("YES"), SqlValue::I32(2)],
                    vec![text("dbo"), text("Sales"), text("InvoiceID"), text("int"), text("NO"), SqlValue::I32(1)],
                    vec![text("dbo"), text("Sales"), text("ResellerID"), text("int"), text("YES"), SqlValue::I32(2)],
                    vec![text("dbo"), text("Sales"), text("Amount"), text("decimal"), text("YES"), SqlValue::I32(3)],
                ],
            ),
        );

        answers.insert(
            PRIMARY_KEYS_SQL.to_string(),
            QueryResult::new(
                cols(&["table_schema", "table_name", "column_name"]),
                vec![
                    vec![text("dbo"), text("Sales"), text("InvoiceID")],
                    vec![text("dbo"), text("Resellers"), text("ResellerID")],
                ],
            ),
        );

        answers.insert(
            FOREIGN_KEYS_SQL.to_string(),
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
            ),
        );

        Self {
            answers,
            executed: Mutex::new(Vec::new()),
        }
    }

    fn answer(mut self, sql: &str, result: QueryResult) -> Self {
        self.answers.insert(sql.to_string(), result);
        self
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl QueryRunner for FakeWarehouse {
    async fn run(&self, _target: &DatabaseTarget, sql: &str) -> Result<QueryResult, ServerError> {
        self.executed.lock().push(sql.to_string());
        if sql == BASIC_COLUMNS_SQL {
            return Err(ServerError::execution(sql, "basic columns should not be needed"));
        }
        self.answers
            .get(sql)
            .cloned()
            .ok_or_else(|| ServerError::execution_with_code(sql, "Invalid object name", 208))
    }
}

/// Model that replies from a script; an exhausted script is an outage.
struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<ChatPrompt>>,
}

impl ScriptedOracle {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<ChatPrompt> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl TextOracle for ScriptedOracle {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, ServerError> {
        self.prompts.lock().push(prompt.clone());
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| ServerError::oracle("service unavailable"))
    }
}

fn assistant(
    warehouse: Arc<FakeWarehouse>,
    oracle: Arc<ScriptedOracle>,
    target: Option<DatabaseTarget>,
) -> Assistant {
    Assistant::with_runner(SessionContext::shared(target, 5), warehouse, oracle)
}

fn configured_target() -> Option<DatabaseTarget> {
    Some(DatabaseTarget::new(SERVER, DATABASE).unwrap())
}

#[tokio::test]
async fn test_configure_discover_and_ask() {
    let count_sql = "SELECT COUNT(*) AS total FROM dbo.Sales";
    let warehouse = Arc::new(FakeWarehouse::new().answer(
        count_sql,
        QueryResult::new(cols(&["total"]), vec![vec![SqlValue::I32(42)]]),
    ));
    let oracle = Arc::new(ScriptedOracle::new(&[
        "```sql\nSELECT COUNT(*) AS total FROM dbo.Sales\n```",
        "There are 42 sales.",
    ]));
    let assistant = assistant(Arc::clone(&warehouse), Arc::clone(&oracle), None);

    let configured = assistant.configure_database(SERVER, DATABASE).await;
    assert!(configured.starts_with("✅ **Database Configured Successfully!**"));
    assert!(configured.contains("**Version:** Microsoft Azure SQL Data Warehouse - 10.0.1"));
    assert!(!configured.contains("Copyright"));

    let discovered = assistant.discover_schema(false).await;
    assert!(discovered.contains("**Found 2 tables**"));
    assert!(discovered.contains("### Schema: dbo"));
    assert!(discovered.contains("**Sales** (3 columns)"));
    assert!(discovered.contains("  - Primary Key: InvoiceID"));
    assert!(discovered.contains("→"));
    assert!(!discovered.contains("Partial Discovery"));

    let answer = assistant
        .ask_database("How many sales do we have?", false, true)
        .await;
    assert!(answer.starts_with("## There are 42 sales."));
    assert!(answer.contains("```sql\nSELECT COUNT(*) AS total FROM dbo.Sales\n```"));
    assert!(answer.contains("**Results:** 1 rows"));
    assert!(answer.contains(MISSING_GROUP_BY));
    assert!(answer.contains("**Relevant Tables:** dbo.Sales"));
    assert!(!answer.contains("**Data:**"));

    // The generation prompt is grounded in the discovered schema
    let prompts = oracle.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].user.contains("dbo.Resellers"));
    assert!(prompts[0].user.contains("Question: \"How many sales do we have?\""));

    let history = assistant.session().history.read().await.recent(5);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sql, count_sql);

    // Discovery ran once; the question reused the cached snapshot
    let discovery_runs = warehouse
        .executed()
        .iter()
        .filter(|sql| sql.as_str() == DETAILED_COLUMNS_SQL)
        .count();
    assert_eq!(discovery_runs, 1);

    let config = assistant.get_current_config().await;
    assert!(config.contains("**Schema Discovered:** Yes"));
    assert!(config.contains("**Tables Found:** 2"));
    assert!(config.contains("**Questions In History:** 1"));
    assert!(config.contains(
        "**Schema Cache:** 1 hits, 1 discoveries, 0 failed, 0 invalidations (50.0% hit rate)"
    ));
}

#[tokio::test]
async fn test_unknown_table_is_flagged_but_still_runs() {
    let sql = "SELECT * FROM Customers";
    let warehouse = Arc::new(FakeWarehouse::new().answer(
        sql,
        QueryResult::new(cols(&["CustomerID"]), vec![vec![SqlValue::I32(7)]]),
    ));
    let oracle = Arc::new(ScriptedOracle::new(&[sql, "One customer."]));
    let assistant = assistant(warehouse, oracle, configured_target());

    let answer = assistant.ask_database("list customers", true, true).await;
    assert!(answer.contains("Table 'Customers' not found in schema"));
    assert!(answer.contains("**Data:**"));
    assert!(answer.contains("| CustomerID |"));
}

#[tokio::test]
async fn test_oracle_outage_falls_back_to_sample_rows() {
    let sample_sql = "SELECT TOP 5 * FROM [dbo].[Resellers]";
    let warehouse = Arc::new(FakeWarehouse::new().answer(
        sample_sql,
        QueryResult::new(
            cols(&["ResellerID", "ResellerCompany"]),
            vec![
                vec![SqlValue::I32(1), text("Contoso")],
                vec![SqlValue::I32(2), text("Fabrikam")],
            ],
        ),
    ));
    let oracle = Arc::new(ScriptedOracle::new(&[]));
    let assistant = assistant(warehouse, oracle, configured_target());

    let answer = assistant
        .ask_database("which resellers are there", false, true)
        .await;
    assert!(answer.contains(sample_sql));
    assert!(answer.contains("*Note: SQL generation was unavailable"));
    assert!(answer.contains("Found 2 results. Top result: {ResellerID: 1, ResellerCompany: Contoso}"));

    // Fallback queries are not remembered as answers
    assert!(assistant.session().history.read().await.is_empty());
}

#[tokio::test]
async fn test_failed_generated_query_reports_error() {
    let oracle = Arc::new(ScriptedOracle::new(&["SELECT * FROM dbo.Missing"]));
    let assistant = assistant(Arc::new(FakeWarehouse::new()), oracle, configured_target());

    let answer = assistant.ask_database("show missing rows", false, true).await;
    assert!(answer.starts_with("❌ Query execution failed"));
    assert!(answer.contains("**Suggestion:**"));
    assert!(assistant.session().history.read().await.is_empty());
}

#[tokio::test]
async fn test_operations_require_a_target() {
    let warehouse = Arc::new(FakeWarehouse::new());
    let assistant = assistant(
        Arc::clone(&warehouse),
        Arc::new(ScriptedOracle::new(&[])),
        None,
    );

    assert_eq!(assistant.discover_schema(false).await, NOT_CONFIGURED);
    assert_eq!(assistant.ask_database("anything", false, true).await, NOT_CONFIGURED);
    assert_eq!(assistant.execute_sql_query("SELECT 1", 10).await, NOT_CONFIGURED);
    assert_eq!(assistant.get_table_details("Sales", true).await, NOT_CONFIGURED);
    assert!(assistant
        .get_current_config()
        .await
        .starts_with("❌ No database configured"));
    assert!(warehouse.executed().is_empty());
}

#[tokio::test]
async fn test_execute_sql_query_wraps_select() {
    let wrapped = "SELECT TOP 50 * FROM (SELECT * FROM dbo.Sales) AS limited_query";
    let warehouse = Arc::new(FakeWarehouse::new().answer(
        wrapped,
        QueryResult::new(
            cols(&["InvoiceID", "Amount"]),
            vec![vec![SqlValue::I32(1), SqlValue::I32(10)]],
        ),
    ));
    let assistant = assistant(
        Arc::clone(&warehouse),
        Arc::new(ScriptedOracle::new(&[])),
        configured_target(),
    );

    let response = assistant.execute_sql_query("SELECT * FROM dbo.Sales;", 50).await;
    assert!(response.starts_with("**Results:** 1 rows"));
    assert!(response.contains("| InvoiceID | Amount |"));
    assert_eq!(warehouse.executed(), vec![wrapped.to_string()]);
}

#[tokio::test]
async fn test_get_table_details_uses_snapshot() {
    let warehouse = Arc::new(
        FakeWarehouse::new()
            .answer(
                "SELECT COUNT(*) AS row_count FROM [dbo].[Sales]",
                QueryResult::new(cols(&["row_count"]), vec![vec![SqlValue::I32(1234)]]),
            )
            .answer(
                "SELECT TOP 5 * FROM [dbo].[Sales]",
                QueryResult::new(
                    cols(&["InvoiceID", "ResellerID", "Amount"]),
                    vec![vec![SqlValue::I32(1), SqlValue::I32(3), SqlValue::I32(99)]],
                ),
            ),
    );
    let assistant = assistant(
        warehouse,
        Arc::new(ScriptedOracle::new(&[])),
        configured_target(),
    );
    assistant.discover_schema(false).await;

    let details = assistant.get_table_details("sales", true).await;
    assert!(details.starts_with("## Table: dbo.Sales\n**Total Rows:** 1,234"));
    assert!(details.contains("| InvoiceID | int | No | PK |"));
    assert!(details.contains("| ResellerID | int | Yes | FK |"));
    assert!(details.contains("**Sample Data:**"));
    assert!(details.contains("| 1 | 3 | 99 |"));
}

#[tokio::test]
async fn test_get_table_details_rejects_unsafe_names() {
    let warehouse = Arc::new(FakeWarehouse::new());
    let assistant = assistant(
        Arc::clone(&warehouse),
        Arc::new(ScriptedOracle::new(&[])),
        configured_target(),
    );

    let details = assistant.get_table_details("Sales; DROP TABLE x", false).await;
    assert!(details.starts_with("❌"));
    assert!(warehouse.executed().is_empty());
}

#[tokio::test]
async fn test_reconfigure_resets_cached_schema() {
    let warehouse = Arc::new(FakeWarehouse::new());
    let assistant = assistant(
        Arc::clone(&warehouse),
        Arc::new(ScriptedOracle::new(&[])),
        configured_target(),
    );
    assistant.discover_schema(false).await;
    assert!(assistant.session().cache.peek().await.is_some());

    assistant.configure_database(SERVER, "OtherWarehouse").await;
    assert!(assistant.session().cache.peek().await.is_none());

    let config = assistant.get_current_config().await;
    assert!(config.contains("**Database:** OtherWarehouse"));
    assert!(config.contains("**Schema Discovered:** No"));
    assert!(config.contains(
        "**Schema Cache:** 0 hits, 1 discoveries, 0 failed, 1 invalidations (0.0% hit rate)"
    ));
}
