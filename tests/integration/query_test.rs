//! Query execution integration tests.
//!
//! Tests SQL execution, value normalization and result handling.

use super::{create_sqlite_file, seeded_sqlite};
use dbquery::config::ConnectionConfig;
use dbquery::db::{connect, DatabaseClient, Dialect, MysqlClient, PostgresClient, Value};
use dbquery::error::DbQueryError;
use dbquery::render::render;
use std::time::Duration;

#[tokio::test]
async fn test_sqlite_select_rows() {
    let (_dir, client) = seeded_sqlite().await;

    let result = client
        .execute_query("SELECT id, email FROM users ORDER BY id")
        .await
        .unwrap();

    assert_eq!(result.columns, vec!["id", "email"]);
    assert_eq!(result.row_count(), 3);
    assert_eq!(result.rows[0].get("id"), Some(&Value::Int(1)));
    assert_eq!(
        result.rows[2].get("email"),
        Some(&Value::String("lee@example.com".to_string()))
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_sqlite_aggregate_and_join() {
    let (_dir, client) = seeded_sqlite().await;

    let result = client
        .execute_query(
            "SELECT u.email, COUNT(o.id) AS orders, SUM(o.total) AS spent \
             FROM users u JOIN orders o ON o.user_id = u.id \
             GROUP BY u.email ORDER BY spent DESC",
        )
        .await
        .unwrap();

    assert_eq!(result.columns, vec!["email", "orders", "spent"]);
    assert_eq!(result.row_count(), 2);
    assert_eq!(result.rows[0].get("orders"), Some(&Value::Int(1)));
    assert_eq!(result.rows[0].get("spent"), Some(&Value::Float(30.0)));
    assert_eq!(result.rows[1].get("spent"), Some(&Value::Float(19.75)));
}

#[tokio::test]
async fn test_sqlite_null_and_empty_result() {
    let (_dir, client) = seeded_sqlite().await;

    let result = client
        .execute_query("SELECT created_at FROM users WHERE id = 3")
        .await
        .unwrap();
    assert_eq!(result.rows[0].get("created_at"), Some(&Value::Null));

    let empty = client
        .execute_query("SELECT id, email FROM users WHERE id > 100")
        .await
        .unwrap();
    assert!(empty.is_empty());
    assert_eq!(
        render("table", &empty.columns, &empty.rows).unwrap(),
        "+----+-------+\n| id | email |\n+----+-------+\n+----+-------+\n(0 rows)"
    );
}

#[tokio::test]
async fn test_sqlite_query_error() {
    let (_dir, client) = seeded_sqlite().await;

    let err = client
        .execute_query("SELECT nope FROM users")
        .await
        .unwrap_err();
    assert!(matches!(err, DbQueryError::Execution(_)));
    assert_eq!(err.category(), "Query Error");
}

#[tokio::test]
async fn test_sqlite_missing_file_is_connection_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("absent.db");
    let config = ConnectionConfig::new(
        Dialect::Sqlite,
        missing.to_string_lossy(),
        Duration::from_secs(5),
    );

    let err = connect(&config).await.err().unwrap();
    assert!(matches!(err, DbQueryError::Connection(_)));
    assert!(!missing.exists());
}

#[tokio::test]
async fn test_sqlite_memory_database() {
    let config = ConnectionConfig::new(Dialect::Sqlite, ":memory:", Duration::from_secs(5));
    let client = connect(&config).await.unwrap();

    let result = client
        .execute_query("SELECT 'a' AS x UNION ALL SELECT 'b'")
        .await
        .unwrap();
    assert_eq!(result.row_count(), 2);
    assert_eq!(
        render("json", &result.columns, &result.rows).unwrap(),
        "[\n  {\n    \"x\": \"a\"\n  },\n  {\n    \"x\": \"b\"\n  }\n]"
    );
}

#[tokio::test]
async fn test_sqlite_error_mid_stream_returns_no_rows() {
    let (_dir, client) = seeded_sqlite().await;

    // The first row decodes fine; the second overflows.
    let err = client
        .execute_query(
            "SELECT id, abs(v) AS a FROM \
             (SELECT 1 AS id, 1 AS v UNION ALL SELECT 2, -9223372036854775808) ORDER BY id",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbQueryError::Execution(_)), "{err}");
    assert!(err.to_string().contains("integer overflow"), "{err}");
}

#[tokio::test]
async fn test_sqlite_query_after_timeout() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = create_sqlite_file(dir.path()).await;
    let config = ConnectionConfig::new(Dialect::Sqlite, path, Duration::from_millis(300));
    let client = connect(&config).await.unwrap();

    let err = client
        .execute_query(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
             SELECT count(*) FROM c",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbQueryError::Timeout(_)), "{err}");
    assert_eq!(err.category(), "Timeout");

    let count = client
        .execute_query("SELECT COUNT(*) AS n FROM users")
        .await
        .unwrap();
    assert_eq!(count.rows[0].get("n"), Some(&Value::Int(3)));

    client.close().await.unwrap();
}

/// Helper to create a PostgreSQL client from `DATABASE_URL`.
async fn get_postgres_client() -> Option<PostgresClient> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = ConnectionConfig::new(Dialect::Postgres, url, Duration::from_secs(10));
    PostgresClient::connect(&config).await.ok()
}

/// Helper to create a MySQL client from `MYSQL_DATABASE_URL`.
async fn get_mysql_client() -> Option<MysqlClient> {
    let url = std::env::var("MYSQL_DATABASE_URL").ok()?;
    let config = ConnectionConfig::new(Dialect::Mysql, url, Duration::from_secs(10));
    MysqlClient::connect(&config).await.ok()
}

#[tokio::test]
async fn test_postgres_value_normalization() {
    let Some(client) = get_postgres_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = client
        .execute_query(
            "SELECT 1::int4 AS i, 2.5::float8 AS f, true AS b, 'x'::text AS t, \
             12.50::numeric AS n, NULL::int AS z, \
             TIMESTAMPTZ '2024-01-02 03:04:05.5+00' AS ts",
        )
        .await
        .unwrap();

    let row = &result.rows[0];
    assert_eq!(row.get("i"), Some(&Value::Int(1)));
    assert_eq!(row.get("f"), Some(&Value::Float(2.5)));
    assert_eq!(row.get("b"), Some(&Value::Bool(true)));
    assert_eq!(row.get("t"), Some(&Value::String("x".to_string())));
    assert_eq!(row.get("n"), Some(&Value::Float(12.5)));
    assert_eq!(row.get("z"), Some(&Value::Null));
    assert_eq!(
        row.get("ts"),
        Some(&Value::String("2024-01-02T03:04:05.5Z".to_string()))
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_mysql_value_normalization() {
    let Some(client) = get_mysql_client().await else {
        eprintln!("Skipping test: MYSQL_DATABASE_URL not set");
        return;
    };

    let result = client
        .execute_query("SELECT 1 AS i, 'abc' AS s, CAST(2.50 AS DECIMAL(5,2)) AS d, NULL AS z")
        .await
        .unwrap();

    let row = &result.rows[0];
    assert_eq!(row.get("i"), Some(&Value::Int(1)));
    assert_eq!(row.get("s"), Some(&Value::String("abc".to_string())));
    assert_eq!(row.get("d"), Some(&Value::Float(2.5)));
    assert_eq!(row.get("z"), Some(&Value::Null));

    client.close().await.unwrap();
}
