//! Database connectivity and query execution.

pub mod auth;
mod connection;
mod query;
pub mod types;

pub use auth::{AzureAdTokenProvider, Credentials, GrantFlow, TokenProvider};
pub use connection::{Connection, ConnectionProfile, Connector, RawConnection};
pub use query::{
    returns_rows, server_version, truncate_for_log, FabricExecutor, QueryResult, QueryRunner,
    Record, ROWS_AFFECTED_COLUMN, VERSION_SQL,
};
pub use types::{SqlValue, TypeMapper};
