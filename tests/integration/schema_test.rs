//! Schema introspection integration tests.
//!
//! Tests catalog discovery and schema-context formatting per dialect.

use super::seeded_sqlite;
use dbquery::config::ConnectionConfig;
use dbquery::db::{
    build_schema_context, introspect, DatabaseClient, Dialect, MysqlClient, PostgresClient,
    TableFilter,
};
use std::time::Duration;

#[tokio::test]
async fn test_sqlite_introspect_tables() {
    let (_dir, client) = seeded_sqlite().await;

    let tables = introspect(client.as_ref(), &TableFilter::default(), 40)
        .await
        .unwrap();

    let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["orders", "users"]);

    let users = tables.iter().find(|t| t.name == "users").unwrap();
    assert_eq!(users.columns.len(), 3);
    assert!(users.columns[0].starts_with("id"));
    assert!(users.columns[1].starts_with("email"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_sqlite_max_tables_stops_early() {
    let (_dir, client) = seeded_sqlite().await;

    let tables = introspect(client.as_ref(), &TableFilter::default(), 1)
        .await
        .unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "orders");
}

#[tokio::test]
async fn test_sqlite_schema_context_with_scope_and_file() {
    let (dir, client) = seeded_sqlite().await;
    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "orders.total is in EUR").unwrap();

    let context = build_schema_context(
        client.as_ref(),
        &TableFilter::new(["USERS"]),
        40,
        Some(notes.as_path()),
    )
    .await
    .unwrap();

    assert!(context.starts_with("Discovered schema:\n- users ("), "{context}");
    assert!(!context.contains("- orders"), "{context}");
    assert!(context.ends_with("\nExtra schema context from file:\norders.total is in EUR\n"));
}

#[tokio::test]
async fn test_sqlite_scope_matching_nothing() {
    let (_dir, client) = seeded_sqlite().await;

    let context = build_schema_context(client.as_ref(), &TableFilter::new(["invoices"]), 40, None)
        .await
        .unwrap();
    assert_eq!(context, "Discovered schema:\n(no tables discovered)\n");
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
async fn test_postgres_introspect_qualified_names() {
    let Some(client) = get_postgres_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let tables = introspect(&client, &TableFilter::default(), 40).await.unwrap();
    for table in &tables {
        assert!(table.name.contains('.'), "expected schema.table, got {}", table.name);
        assert!(!table.name.starts_with("pg_catalog."));
        assert!(!table.name.starts_with("information_schema."));
    }

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_mysql_introspect_current_database() {
    let Some(client) = get_mysql_client().await else {
        eprintln!("Skipping test: MYSQL_DATABASE_URL not set");
        return;
    };

    let tables = introspect(&client, &TableFilter::default(), 40).await.unwrap();
    for table in &tables {
        assert!(!table.name.contains('.'), "expected bare name, got {}", table.name);
    }

    client.close().await.unwrap();
}
