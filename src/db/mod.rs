//! Database abstraction layer for dbquery.
//!
//! Provides a trait-based interface for database operations, allowing
//! the sqlite, postgres and mysql backends to be used interchangeably.

mod mock;
mod mysql;
mod postgres;
mod schema;
mod sqlite;
mod types;

pub use mock::MockDatabaseClient;
pub use mysql::MysqlClient;
pub use postgres::PostgresClient;
pub use schema::{
    build_schema_context, format_schema_context, introspect, CatalogTable, TableDescriptor,
    TableFilter,
};
pub use sqlite::SqliteClient;
pub use types::{format_rfc3339_nanos, RawValue, ResultSet, Row, Value};

use crate::config::ConnectionConfig;
use crate::error::{DbQueryError, Result};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use sqlx::Column as SqlxColumn;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Supported database dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgres,
    Mysql,
}

impl Dialect {
    /// Returns the dialect as a string for persistence and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        }
    }

    /// Parses a dialect name, accepting the common postgres aliases.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            _ => Err(DbQueryError::unsupported_dialect(format!(
                "{s:?} (expected sqlite|postgres|postgresql|mysql)"
            ))),
        }
    }

    /// Guesses the dialect from the shape of a connection URL or file path.
    pub fn detect(location: &str) -> Result<Self> {
        let raw = location.trim();
        if raw.is_empty() {
            return Err(DbQueryError::config("db url/path cannot be empty"));
        }

        let lower = raw.to_lowercase();

        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            return Ok(Self::Postgres);
        }
        if lower.starts_with("mysql://") {
            return Ok(Self::Mysql);
        }
        if lower.starts_with("sqlite:")
            || lower.starts_with("sqlite3://")
            || lower.starts_with("file:")
        {
            return Ok(Self::Sqlite);
        }
        if lower == ":memory:"
            || lower.ends_with(".db")
            || lower.ends_with(".sqlite")
            || lower.ends_with(".sqlite3")
        {
            return Ok(Self::Sqlite);
        }
        if ["./", "../", "/", "~"].iter().any(|p| raw.starts_with(p)) {
            return Ok(Self::Sqlite);
        }
        if lower.contains("host=") && lower.contains("user=") {
            return Ok(Self::Postgres);
        }

        if let Ok(parsed) = Url::parse(raw) {
            match parsed.scheme() {
                "postgres" | "postgresql" => return Ok(Self::Postgres),
                "mysql" => return Ok(Self::Mysql),
                "sqlite" | "sqlite3" | "file" => return Ok(Self::Sqlite),
                _ => {}
            }
        }

        Err(DbQueryError::unsupported_dialect(format!(
            "unable to detect database type from {location:?}; pass --db-type sqlite|postgres|mysql"
        )))
    }
}

impl FromStr for Dialect {
    type Err = DbQueryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Creates a database client for the configured dialect.
///
/// This is the central factory function for database connections.
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn DatabaseClient>> {
    match config.dialect {
        Dialect::Sqlite => Ok(Box::new(SqliteClient::connect(config).await?)),
        Dialect::Postgres => Ok(Box::new(PostgresClient::connect(config).await?)),
        Dialect::Mysql => Ok(Box::new(MysqlClient::connect(config).await?)),
    }
}

/// Catalog access for one dialect.
///
/// `list_tables` enumerates candidate tables in catalog order; `table_columns`
/// describes one of them as `"<name> <type>"` strings.
#[async_trait]
pub trait Introspector: Send + Sync {
    /// The dialect this catalog speaks.
    fn dialect(&self) -> Dialect;

    /// Lists user tables, excluding the engine's internal ones.
    async fn list_tables(&self) -> Result<Vec<CatalogTable>>;

    /// Returns the ordered column descriptions of a table.
    async fn table_columns(&self, table: &CatalogTable) -> Result<Vec<String>>;
}

/// Trait defining the interface for database clients.
///
/// All database operations are async and bounded by the client's deadline.
#[async_trait]
pub trait DatabaseClient: Introspector {
    /// Executes a SQL statement and materializes every row.
    async fn execute_query(&self, sql: &str) -> Result<ResultSet>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}

/// Runs `fut`, failing with a timeout error once `deadline` has elapsed.
pub async fn with_deadline<T>(
    deadline: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| DbQueryError::timeout(format!("{what} did not finish within {deadline:?}")))?
}

/// The database's own message for an error, falling back to sqlx's rendering.
fn driver_message(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    }
}

/// Maps a failed query. Waiting too long for a pooled connection is a
/// timeout; everything else is an execution error rendered by `describe`.
fn query_error(error: sqlx::Error, describe: fn(sqlx::Error) -> String) -> DbQueryError {
    match error {
        sqlx::Error::PoolTimedOut => {
            DbQueryError::timeout("timed out waiting for a free database connection")
        }
        other => DbQueryError::execution(describe(other)),
    }
}

/// Drains a row stream into column names and normalized rows.
///
/// The first driver error aborts the scan and drops everything read so far.
async fn collect_rows<R, S, D, E>(
    mut stream: S,
    decode: D,
    map_err: E,
) -> Result<(Vec<String>, Vec<Row>)>
where
    R: sqlx::Row,
    S: Stream<Item = std::result::Result<R, sqlx::Error>> + Unpin,
    D: Fn(&R, usize) -> RawValue,
    E: Fn(sqlx::Error) -> DbQueryError,
{
    let mut columns: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    while let Some(row) = stream.try_next().await.map_err(&map_err)? {
        let names = columns.get_or_insert_with(|| {
            row.columns()
                .iter()
                .map(|col| col.name().to_string())
                .collect()
        });

        let mut out = Row::new();
        for (index, name) in names.iter().enumerate() {
            out.insert(name.clone(), decode(&row, index).normalize());
        }
        rows.push(out);
    }

    Ok((columns.unwrap_or_default(), rows))
}
