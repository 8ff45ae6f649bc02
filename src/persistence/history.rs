//! Query history persistence.
//!
//! Every natural-language request is recorded as one JSON object per line,
//! whether it succeeded or not.

use crate::db::{Row, Value};
use crate::error::{DbQueryError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default number of entries shown by `dbquery history`.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// A query history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    /// `query` or `chat`.
    pub mode: String,
    pub db_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    pub natural_query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default)]
    pub rows: usize,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryEntry {
    /// Starts an entry stamped with the current time.
    pub fn new(
        mode: impl Into<String>,
        db_type: impl Into<String>,
        profile: Option<String>,
        natural_query: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            mode: mode.into(),
            db_type: db_type.into(),
            profile,
            natural_query: natural_query.into(),
            sql: None,
            rows: 0,
            duration_ms: 0,
            error: None,
        }
    }
}

/// Append-only JSONL history file.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry, creating parent directories on demand.
    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                DbQueryError::history(format!("create history directory: {e}"))
            })?;
        }

        let mut line = serde_json::to_string(entry)
            .map_err(|e| DbQueryError::history(format!("encode history entry: {e}")))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DbQueryError::history(format!("open history file: {e}")))?;

        file.write_all(line.as_bytes())
            .map_err(|e| DbQueryError::history(format!("write history entry: {e}")))
    }

    /// Appends an entry, logging instead of failing.
    pub fn record_best_effort(&self, entry: &HistoryEntry) {
        match self.append(entry) {
            Ok(()) => debug!(path = %self.path.display(), "recorded history entry"),
            Err(e) => warn!("failed to write history: {e}"),
        }
    }

    /// Reads every entry in file order. A missing file is an empty history.
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DbQueryError::history(format!("open history file: {e}"))),
        };

        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| DbQueryError::history(format!("parse history entry: {e}")))
            })
            .collect()
    }

    /// Reads the newest `limit` entries, oldest first.
    pub fn read_last(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.read_all()?;
        if limit < entries.len() {
            entries.drain(..entries.len() - limit);
        }
        Ok(entries)
    }
}

/// Column names for the history table; `full` adds the SQL column.
pub fn history_columns(full: bool) -> Vec<String> {
    let names: &[&str] = if full {
        &["timestamp", "mode", "db", "rows", "ms", "query", "sql", "error"]
    } else {
        &["timestamp", "mode", "db", "rows", "ms", "query", "error"]
    };
    names.iter().map(|n| n.to_string()).collect()
}

/// Converts entries into renderer rows matching [`history_columns`].
pub fn history_rows(entries: &[HistoryEntry], full: bool) -> Vec<Row> {
    entries
        .iter()
        .map(|e| {
            let mut row = Row::new();
            row.insert(
                "timestamp",
                Value::from(e.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
            row.insert("mode", Value::from(e.mode.as_str()));
            row.insert("db", Value::from(e.db_type.as_str()));
            row.insert("rows", Value::Int(e.rows as i64));
            row.insert("ms", Value::Int(e.duration_ms as i64));
            row.insert("query", Value::from(e.natural_query.as_str()));
            if full {
                row.insert("sql", Value::from(e.sql.clone().unwrap_or_default()));
            }
            row.insert("error", Value::from(e.error.clone().unwrap_or_default()));
            row
        })
        .collect()
}
