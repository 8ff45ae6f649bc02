//! Integration tests for dbquery.
//!
//! SQLite tests always run against throwaway databases. PostgreSQL and MySQL
//! tests need `DATABASE_URL` / `MYSQL_DATABASE_URL` and skip otherwise.

pub mod pipeline_test;
pub mod query_test;
pub mod schema_test;

use dbquery::config::ConnectionConfig;
use dbquery::db::{connect, DatabaseClient, Dialect};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

pub const SEED: &[&str] = &[
    "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL, created_at DATETIME)",
    "CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users(id), total REAL)",
    "INSERT INTO users (id, email, created_at) VALUES (1, 'sam@example.com', '2024-01-02 03:04:05')",
    "INSERT INTO users (id, email, created_at) VALUES (2, 'kim@example.com', '2024-02-03 04:05:06')",
    "INSERT INTO users (id, email, created_at) VALUES (3, 'lee@example.com', NULL)",
    "INSERT INTO orders (id, user_id, total) VALUES (10, 1, 12.5)",
    "INSERT INTO orders (id, user_id, total) VALUES (11, 1, 7.25)",
    "INSERT INTO orders (id, user_id, total) VALUES (12, 2, 30)",
];

/// Creates a seeded SQLite file inside `dir` and returns its path.
pub async fn create_sqlite_file(dir: &Path) -> String {
    let path = dir.join("app.db");
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    for stmt in SEED {
        sqlx::query(stmt).execute(&pool).await.unwrap();
    }
    pool.close().await;

    path.to_string_lossy().into_owned()
}

/// Opens a client on a freshly seeded SQLite file through the public factory.
pub async fn seeded_sqlite() -> (TempDir, Box<dyn DatabaseClient>) {
    let dir = TempDir::new().unwrap();
    let path = create_sqlite_file(dir.path()).await;
    let config = ConnectionConfig::new(Dialect::Sqlite, path, Duration::from_secs(5));
    let client = connect(&config).await.unwrap();
    (dir, client)
}
