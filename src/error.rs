//! Error types for dbquery.
//!
//! Defines the main error enum used throughout the application.

use crate::db::Dialect;
use thiserror::Error;

/// Main error type for dbquery operations.
#[derive(Error, Debug)]
pub enum DbQueryError {
    /// The configured database type is not one of sqlite, postgres or mysql.
    #[error("Unsupported database type: {0}")]
    UnsupportedDialect(String),

    /// Database connection errors (missing sqlite file, host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// A catalog or column lookup failed while discovering the schema.
    #[error("Introspection error ({dialect}, {step}): {message}")]
    Introspection {
        dialect: Dialect,
        step: String,
        message: String,
    },

    /// Generated SQL was rejected by the read-only guard.
    #[error("{reason}")]
    NotReadOnly { sql: String, reason: String },

    /// Query execution errors (syntax errors, constraint violations, etc.)
    #[error("Query error: {0}")]
    Execution(String),

    /// A database or LLM call exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Requested output format is not table or json.
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// LLM API errors (auth, bad response, empty SQL, etc.)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading or writing the history file failed.
    #[error("History error: {0}")]
    History(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DbQueryError {
    /// Creates an unsupported dialect error for the given input.
    pub fn unsupported_dialect(input: impl Into<String>) -> Self {
        Self::UnsupportedDialect(input.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates an introspection error naming the dialect and the failing step.
    pub fn introspection(dialect: Dialect, step: impl Into<String>, msg: impl ToString) -> Self {
        Self::Introspection {
            dialect,
            step: step.into(),
            message: msg.to_string(),
        }
    }

    /// Creates a read-only guard rejection for the given SQL.
    pub fn not_read_only(sql: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotReadOnly {
            sql: sql.into(),
            reason: reason.into(),
        }
    }

    /// Creates a query execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates a timeout error with the given message.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates an unsupported output format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a history error with the given message.
    pub fn history(msg: impl Into<String>) -> Self {
        Self::History(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedDialect(_) => "Configuration Error",
            Self::Connection(_) => "Connection Error",
            Self::Introspection { .. } => "Introspection Error",
            Self::NotReadOnly { .. } => "Safety Error",
            Self::Execution(_) => "Query Error",
            Self::Timeout(_) => "Timeout",
            Self::UnsupportedFormat(_) => "Configuration Error",
            Self::Llm(_) => "LLM Error",
            Self::Config(_) => "Configuration Error",
            Self::History(_) => "History Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the rejected SQL when this is a read-only guard rejection.
    pub fn rejected_sql(&self) -> Option<&str> {
        match self {
            Self::NotReadOnly { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

/// Result type alias using DbQueryError.
pub type Result<T> = std::result::Result<T, DbQueryError>;
