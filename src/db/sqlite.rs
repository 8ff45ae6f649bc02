//! SQLite database client implementation.
//!
//! Uses a single-connection sqlx pool so that `:memory:` databases live for
//! as long as the client does. Every call arms a statement deadline that a
//! progress handler enforces inside the engine, so a timed-out statement is
//! interrupted instead of holding the only connection.

use super::{
    collect_rows, driver_message, query_error, with_deadline, CatalogTable, DatabaseClient,
    Dialect, Introspector, RawValue, ResultSet,
};
use crate::config::ConnectionConfig;
use crate::error::{DbQueryError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, Sqlite, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// VM instructions between deadline checks.
const PROGRESS_INTERVAL: i32 = 1_000;

/// Result code sqlite reports for an interrupted statement.
const SQLITE_INTERRUPT: &str = "9";

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    pool: SqlitePool,
    timeout: Duration,
    deadline: StatementDeadline,
}

/// Point in time after which the statement running on the connection is
/// aborted by the progress handler.
#[derive(Debug, Clone, Default)]
struct StatementDeadline(Arc<Mutex<Option<Instant>>>);

impl StatementDeadline {
    fn arm(&self, at: Instant) {
        match self.0.lock() {
            Ok(mut slot) => *slot = Some(at),
            Err(_) => warn!("sqlite statement deadline lock poisoned"),
        }
    }

    /// False once the armed deadline has passed.
    fn keep_running(&self) -> bool {
        self.0
            .lock()
            .map(|slot| slot.map_or(true, |at| Instant::now() < at))
            .unwrap_or(true)
    }
}

impl SqliteClient {
    /// Opens the database named by `config.url`.
    ///
    /// File paths must point at an existing database; nothing is created.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let options = connect_options(&config.url)?;
        let deadline = StatementDeadline::default();
        let handler_deadline = deadline.clone();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(config.timeout)
            .after_connect(move |conn, _meta| {
                let deadline = handler_deadline.clone();
                Box::pin(async move {
                    conn.lock_handle()
                        .await?
                        .set_progress_handler(PROGRESS_INTERVAL, move || deadline.keep_running());
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .map_err(|e| DbQueryError::connection(format!("open sqlite database: {e}")))?;

        info!(location = %config.url, "connected to sqlite");
        Ok(Self {
            pool,
            timeout: config.timeout,
            deadline,
        })
    }

    /// Takes the pooled connection and arms the statement deadline for it.
    ///
    /// A statement abandoned at its deadline still owns the connection until
    /// the progress handler stops it, so this waits for that first.
    async fn acquire(&self, deadline: Instant) -> Result<PoolConnection<Sqlite>> {
        let conn = self.pool.acquire().await.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => {
                DbQueryError::timeout("sqlite connection still busy with an earlier statement")
            }
            other => DbQueryError::connection(format!("acquire sqlite connection: {other}")),
        })?;
        self.deadline.arm(deadline);
        Ok(conn)
    }
}

#[async_trait]
impl Introspector for SqliteClient {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn list_tables(&self) -> Result<Vec<CatalogTable>> {
        let deadline = Instant::now() + self.timeout;
        let names: Vec<String> = with_deadline(self.timeout, "sqlite list tables", async {
            let mut conn = self.acquire(deadline).await?;
            sqlx::query_scalar(
                r#"
                SELECT name
                FROM sqlite_master
                WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                ORDER BY name
                "#,
            )
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| DbQueryError::introspection(Dialect::Sqlite, "list tables", e))
        })
        .await?;

        Ok(names.into_iter().map(CatalogTable::bare).collect())
    }

    async fn table_columns(&self, table: &CatalogTable) -> Result<Vec<String>> {
        let step = format!("describe columns of {}", table.name);
        let describe_sql = format!(
            "SELECT * FROM \"{}\" LIMIT 0",
            table.name.replace('"', "\"\"")
        );
        debug!(sql = %describe_sql, "describing sqlite table");

        let deadline = Instant::now() + self.timeout;
        with_deadline(self.timeout, &step, async {
            let mut conn = self.acquire(deadline).await?;

            let described = (&mut *conn)
                .describe(&describe_sql)
                .await
                .map_err(|e| DbQueryError::introspection(Dialect::Sqlite, step.as_str(), e))?;

            // The driver only knows storage classes; the declared type is
            // what the table definition says.
            let declared: Vec<(String, String)> =
                sqlx::query_as("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")
                    .bind(table.name.as_str())
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(|e| {
                        DbQueryError::introspection(
                            Dialect::Sqlite,
                            format!("read declared types of {}", table.name),
                            e,
                        )
                    })?;

            Ok(described
                .columns()
                .iter()
                .map(|col| {
                    let type_name = declared
                        .iter()
                        .find(|(name, _)| name == col.name())
                        .map(|(_, declared)| declared.trim())
                        .filter(|declared| !declared.is_empty())
                        .unwrap_or(match col.type_info().name() {
                            "NULL" => "",
                            name => name,
                        });
                    format!("{} {}", col.name(), type_name).trim().to_string()
                })
                .collect())
        })
        .await
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    async fn execute_query(&self, sql: &str) -> Result<ResultSet> {
        let start = Instant::now();
        let deadline = start + self.timeout;

        let (columns, rows) = with_deadline(self.timeout, "sqlite query", async {
            let mut conn = self.acquire(deadline).await?;
            let (columns, rows) =
                collect_rows(sqlx::query(sql).fetch(&mut *conn), decode_value, statement_error)
                    .await?;

            if columns.is_empty() {
                return Ok((describe_columns(&mut conn, sql).await, rows));
            }
            Ok((columns, rows))
        })
        .await?;

        Ok(ResultSet::with_data(columns, rows).with_execution_time(start.elapsed()))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// An interrupt only happens when the statement deadline passed.
fn statement_error(error: sqlx::Error) -> DbQueryError {
    let interrupted = error
        .as_database_error()
        .and_then(|db_error| db_error.code())
        .is_some_and(|code| code == SQLITE_INTERRUPT);
    if interrupted {
        return DbQueryError::timeout("sqlite statement interrupted at its deadline");
    }
    query_error(error, driver_message)
}

/// Column names of a statement that produced no rows, best effort.
async fn describe_columns(conn: &mut SqliteConnection, sql: &str) -> Vec<String> {
    conn.describe(sql)
        .await
        .map(|described| {
            described
                .columns()
                .iter()
                .map(|col| col.name().to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Where a sqlite location string points.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SqliteLocation {
    Memory,
    File { path: PathBuf, read_only: bool },
}

fn connect_options(location: &str) -> Result<SqliteConnectOptions> {
    match parse_location(location)? {
        SqliteLocation::Memory => SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DbQueryError::connection(format!("open sqlite database: {e}"))),
        SqliteLocation::File { path, read_only } => {
            validate_path(&path)?;
            Ok(SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(false)
                .read_only(read_only))
        }
    }
}

/// Accepts bare paths, `sqlite:`/`sqlite://`/`sqlite3://` URLs, `file:` URIs
/// and the in-memory spellings.
fn parse_location(location: &str) -> Result<SqliteLocation> {
    let raw = location.trim();
    if raw.is_empty() {
        return Err(DbQueryError::config("sqlite path cannot be empty"));
    }

    let lower = raw.to_lowercase();
    if lower == ":memory:" || lower == "sqlite::memory:" || lower.starts_with("file::memory:") {
        return Ok(SqliteLocation::Memory);
    }

    let rest = ["sqlite3://", "sqlite://", "sqlite:", "file://", "file:"]
        .iter()
        .find(|prefix| lower.starts_with(*prefix))
        .map(|prefix| &raw[prefix.len()..])
        .unwrap_or(raw);

    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, query),
        None => (rest, ""),
    };

    let mut read_only = false;
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key.eq_ignore_ascii_case("mode") {
                match value.to_lowercase().as_str() {
                    "memory" => return Ok(SqliteLocation::Memory),
                    "ro" => read_only = true,
                    _ => {}
                }
            }
        }
    }

    if path.trim().is_empty() {
        return Err(DbQueryError::config(format!(
            "no sqlite path in {location:?}"
        )));
    }

    Ok(SqliteLocation::File {
        path: expand_home(path.trim()),
        read_only,
    })
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}

/// The database file must already exist and be a regular file.
fn validate_path(path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Err(DbQueryError::connection(format!(
            "sqlite path points to a directory: {}",
            path.display()
        ))),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(DbQueryError::connection(format!(
                        "sqlite database directory does not exist: {}",
                        parent.display()
                    )));
                }
            }
            Err(DbQueryError::connection(format!(
                "sqlite database file does not exist: {}",
                path.display()
            )))
        }
        Err(e) => Err(DbQueryError::connection(format!(
            "check sqlite database path {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Decodes one cell by the column's reported storage class.
fn decode_value(row: &SqliteRow, index: usize) -> RawValue {
    let is_null = row
        .try_get_raw(index)
        .map(|value| value.is_null())
        .unwrap_or(true);
    if is_null {
        return RawValue::Null;
    }

    let type_name = row
        .columns()
        .get(index)
        .map(|col| col.type_info().name().to_uppercase())
        .unwrap_or_default();

    let decoded = match type_name.as_str() {
        "INTEGER" => row.try_get::<i64, _>(index).ok().map(RawValue::Int),
        "REAL" => row.try_get::<f64, _>(index).ok().map(RawValue::Float),
        "BOOLEAN" => row.try_get::<bool, _>(index).ok().map(RawValue::Bool),
        "TEXT" => row.try_get::<String, _>(index).ok().map(RawValue::Text),
        "BLOB" => row.try_get::<Vec<u8>, _>(index).ok().map(RawValue::Bytes),
        "DATETIME" => decode_datetime(row, index),
        "DATE" => row
            .try_get::<NaiveDate, _>(index)
            .ok()
            .map(|date| RawValue::Timestamp(date.and_time(NaiveTime::MIN).and_utc()))
            .or_else(|| row.try_get::<String, _>(index).ok().map(RawValue::Text)),
        _ => None,
    };

    decoded.unwrap_or_else(|| decode_untyped(row, index))
}

fn decode_datetime(row: &SqliteRow, index: usize) -> Option<RawValue> {
    if let Ok(ts) = row.try_get::<DateTime<Utc>, _>(index) {
        return Some(RawValue::Timestamp(ts));
    }
    if let Ok(naive) = row.try_get::<NaiveDateTime, _>(index) {
        return Some(RawValue::Timestamp(naive.and_utc()));
    }
    row.try_get::<String, _>(index).ok().map(RawValue::Text)
}

fn decode_untyped(row: &SqliteRow, index: usize) -> RawValue {
    if let Ok(i) = row.try_get::<i64, _>(index) {
        return RawValue::Int(i);
    }
    if let Ok(f) = row.try_get::<f64, _>(index) {
        return RawValue::Float(f);
    }
    if let Ok(s) = row.try_get::<String, _>(index) {
        return RawValue::Text(s);
    }
    row.try_get::<Vec<u8>, _>(index)
        .map(RawValue::Bytes)
        .unwrap_or(RawValue::Null)
}
