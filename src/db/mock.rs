//! Mock database client for testing.
//!
//! Serves a fixed catalog and canned query results from memory, and records
//! every catalog call so tests can assert on round trips.

use super::{CatalogTable, DatabaseClient, Dialect, Introspector, ResultSet};
use crate::error::{DbQueryError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A mock database client that returns predefined results.
pub struct MockDatabaseClient {
    dialect: Dialect,
    tables: Vec<(CatalogTable, Vec<String>)>,
    failing_table: Option<String>,
    result: std::result::Result<ResultSet, String>,
    list_calls: AtomicUsize,
    column_lookups: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
}

impl MockDatabaseClient {
    /// Creates a mock with an empty catalog that answers every query with no rows.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            tables: Vec::new(),
            failing_table: None,
            result: Ok(ResultSet::new()),
            list_calls: AtomicUsize::new(0),
            column_lookups: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Adds a table to the catalog, in listing order.
    pub fn with_table(mut self, table: CatalogTable, columns: &[&str]) -> Self {
        let columns = columns.iter().map(|c| c.to_string()).collect();
        self.tables.push((table, columns));
        self
    }

    /// Makes the column lookup for the named table fail.
    pub fn failing_columns_for(mut self, table: impl Into<String>) -> Self {
        self.failing_table = Some(table.into());
        self
    }

    /// Sets the result returned by every query.
    pub fn with_result(mut self, result: ResultSet) -> Self {
        self.result = Ok(result);
        self
    }

    /// Makes every query fail with the given driver message.
    pub fn with_query_error(mut self, message: impl Into<String>) -> Self {
        self.result = Err(message.into());
        self
    }

    /// Number of catalog listings issued.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Display names of every table whose columns were looked up, in order.
    pub fn column_lookups(&self) -> Vec<String> {
        lock(&self.column_lookups).clone()
    }

    /// Every SQL statement passed to `execute_query`, in order.
    pub fn executed(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Introspector for MockDatabaseClient {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn list_tables(&self) -> Result<Vec<CatalogTable>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables.iter().map(|(table, _)| table.clone()).collect())
    }

    async fn table_columns(&self, table: &CatalogTable) -> Result<Vec<String>> {
        let name = table.display_name();
        lock(&self.column_lookups).push(name.clone());

        if self.failing_table.as_deref() == Some(name.as_str()) {
            return Err(DbQueryError::introspection(
                self.dialect,
                format!("columns of {name}"),
                "mock column lookup failure",
            ));
        }

        self.tables
            .iter()
            .find(|(candidate, _)| candidate == table)
            .map(|(_, columns)| columns.clone())
            .ok_or_else(|| {
                DbQueryError::introspection(self.dialect, format!("columns of {name}"), "no such table")
            })
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(&self, sql: &str) -> Result<ResultSet> {
        lock(&self.executed).push(sql.to_string());
        self.result.clone().map_err(DbQueryError::execution)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
