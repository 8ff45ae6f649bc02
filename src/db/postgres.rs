//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using sqlx.

use super::{
    collect_rows, query_error, with_deadline, CatalogTable, DatabaseClient, Dialect, Introspector,
    RawValue, ResultSet,
};
use crate::config::ConnectionConfig;
use crate::error::{DbQueryError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::{BigDecimal, JsonValue, Uuid};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo, ValueRef};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Pool size bound. Requests run one statement at a time.
const MAX_CONNECTIONS: u32 = 4;

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresClient {
    /// Connects to the server named by `config.url`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(config.timeout)
            .connect(&config.url)
            .await
            .map_err(map_connection_error)?;

        info!("connected to postgres");
        Ok(Self {
            pool,
            timeout: config.timeout,
        })
    }

    /// Column names of a statement that produced no rows, best effort.
    async fn describe_columns(&self, sql: &str) -> Vec<String> {
        (&self.pool)
            .describe(sql)
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
}

#[async_trait]
impl Introspector for PostgresClient {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn list_tables(&self) -> Result<Vec<CatalogTable>> {
        let rows: Vec<(String, String)> =
            with_deadline(self.timeout, "postgres list tables", async {
                sqlx::query_as(
                    r#"
                    SELECT table_schema::text, table_name::text
                    FROM information_schema.tables
                    WHERE table_type = 'BASE TABLE'
                      AND table_schema NOT IN ('pg_catalog', 'information_schema')
                    ORDER BY table_schema, table_name
                    "#,
                )
                .fetch_all(&self.pool)
                .await
                .map_err(|e| DbQueryError::introspection(Dialect::Postgres, "list tables", e))
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|(schema, name)| CatalogTable::qualified(schema, name))
            .collect())
    }

    async fn table_columns(&self, table: &CatalogTable) -> Result<Vec<String>> {
        let step = format!("columns of {}", table.display_name());
        let schema = table.schema.as_deref().unwrap_or("public");
        debug!(schema, table = %table.name, "fetching postgres columns");

        let rows: Vec<(String, String)> = with_deadline(self.timeout, &step, async {
            sqlx::query_as(
                r#"
                SELECT column_name::text, data_type::text
                FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2
                ORDER BY ordinal_position
                "#,
            )
            .bind(schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbQueryError::introspection(Dialect::Postgres, step.as_str(), e))
        })
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type)| format!("{name} {data_type}").trim().to_string())
            .collect())
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn execute_query(&self, sql: &str) -> Result<ResultSet> {
        let start = Instant::now();

        let (mut columns, rows) = with_deadline(
            self.timeout,
            "postgres query",
            collect_rows(sqlx::query(sql).fetch(&self.pool), decode_value, |e| {
                query_error(e, format_query_error)
            }),
        )
        .await?;

        if columns.is_empty() {
            columns = self.describe_columns(sql).await;
        }

        Ok(ResultSet::with_data(columns, rows).with_execution_time(start.elapsed()))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Decodes one cell by its postgres type name.
fn decode_value(row: &PgRow, index: usize) -> RawValue {
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
        "BOOL" => row.try_get::<bool, _>(index).ok().map(RawValue::Bool),
        "INT2" => row
            .try_get::<i16, _>(index)
            .ok()
            .map(|v| RawValue::Int(v.into())),
        "INT4" => row
            .try_get::<i32, _>(index)
            .ok()
            .map(|v| RawValue::Int(v.into())),
        "INT8" => row.try_get::<i64, _>(index).ok().map(RawValue::Int),
        "FLOAT4" => row
            .try_get::<f32, _>(index)
            .ok()
            .map(|v| RawValue::Float(v.into())),
        "FLOAT8" => row.try_get::<f64, _>(index).ok().map(RawValue::Float),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(index)
            .ok()
            .map(RawValue::Timestamp),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(index)
            .ok()
            .map(|ts| RawValue::Timestamp(ts.and_utc())),
        "DATE" => row
            .try_get::<NaiveDate, _>(index)
            .ok()
            .map(|date| RawValue::Timestamp(date.and_time(NaiveTime::MIN).and_utc())),
        "NUMERIC" => row
            .try_get::<BigDecimal, _>(index)
            .ok()
            .map(|d| RawValue::Bytes(d.to_string().into_bytes())),
        "BYTEA" => row.try_get::<Vec<u8>, _>(index).ok().map(RawValue::Bytes),
        "UUID" => row
            .try_get::<Uuid, _>(index)
            .ok()
            .map(|u| RawValue::Text(u.to_string())),
        "JSON" | "JSONB" => row
            .try_get::<JsonValue, _>(index)
            .ok()
            .map(|j| RawValue::Text(j.to_string())),
        _ => None,
    };

    decoded.unwrap_or_else(|| {
        row.try_get::<String, _>(index)
            .map(RawValue::Text)
            .or_else(|_| row.try_get_unchecked::<Vec<u8>, _>(index).map(RawValue::Bytes))
            .unwrap_or(RawValue::Null)
    })
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error) -> DbQueryError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        DbQueryError::connection("Cannot reach the postgres server. Check that it is running.")
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        DbQueryError::connection("Postgres authentication failed. Check your credentials.")
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        DbQueryError::connection(format!("Postgres database does not exist: {error}"))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        DbQueryError::timeout(format!("connecting to postgres: {error}"))
    } else {
        DbQueryError::connection(error.to_string())
    }
}

/// Formats a query error with the server's detail and hint when present.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{introspect, TableFilter, Value};

    // These tests require a running PostgreSQL database and are skipped
    // unless DATABASE_URL is set.
    async fn get_test_client() -> Option<PostgresClient> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let config = ConnectionConfig::new(Dialect::Postgres, url, Duration::from_secs(10));
        PostgresClient::connect(&config).await.ok()
    }

    #[tokio::test]
    async fn test_introspect_schema_qualified_names() {
        let Some(client) = get_test_client().await else {
            eprintln!("Skipping test: DATABASE_URL not set");
            return;
        };

        let tables = introspect(&client, &TableFilter::default(), 40).await.unwrap();
        assert!(tables.iter().all(|t| t.name.contains('.')));
        assert!(tables
            .iter()
            .all(|t| !t.name.starts_with("pg_catalog.") && !t.name.starts_with("information_schema.")));

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_normalizes_values() {
        let Some(client) = get_test_client().await else {
            eprintln!("Skipping test: DATABASE_URL not set");
            return;
        };

        let result = client
            .execute_query(
                "SELECT 1::int4 AS num, 'hello' AS greeting, 2.50::numeric AS amount, \
                 true AS flag, NULL::text AS nothing, \
                 TIMESTAMPTZ '2024-01-02 03:04:05.5+00' AS at",
            )
            .await
            .unwrap();

        assert_eq!(
            result.columns,
            vec!["num", "greeting", "amount", "flag", "nothing", "at"]
        );
        let row = &result.rows[0];
        assert_eq!(row.get("num"), Some(&Value::Int(1)));
        assert_eq!(row.get("greeting"), Some(&Value::String("hello".to_string())));
        assert_eq!(row.get("amount"), Some(&Value::Float(2.5)));
        assert_eq!(row.get("flag"), Some(&Value::Bool(true)));
        assert_eq!(row.get("nothing"), Some(&Value::Null));
        assert_eq!(
            row.get("at"),
            Some(&Value::String("2024-01-02T03:04:05.5Z".to_string()))
        );

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_query_with_error() {
        let Some(client) = get_test_client().await else {
            eprintln!("Skipping test: DATABASE_URL not set");
            return;
        };

        let error = client
            .execute_query("SELECT * FROM nonexistent_table_xyz")
            .await
            .unwrap_err();
        assert!(matches!(error, DbQueryError::Execution(_)));
        assert!(error.to_string().contains("nonexistent_table_xyz"));

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_error_messages() {
        let config = ConnectionConfig::new(
            Dialect::Postgres,
            "postgres://user:pw@nonexistent.invalid.host:5432/db",
            Duration::from_secs(2),
        );
        let err = PostgresClient::connect(&config).await.unwrap_err();
        assert!(matches!(
            err,
            DbQueryError::Connection(_) | DbQueryError::Timeout(_)
        ));
    }
}
