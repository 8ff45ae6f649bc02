//! Query safety module.
//!
//! Decides whether generated SQL may run against the database and adds a
//! row limit to statements that lack one. The read-only decision is a
//! pluggable [`ReadOnlyCheck`]; the keyword scan is the default.

mod keyword;
mod parser;

pub use keyword::{ensure_limit, ensure_read_only, strip_leading_comments, KeywordGuard};
pub use parser::ParserGuard;

use crate::db::Dialect;
use crate::error::{DbQueryError, Result};
use std::fmt;
use std::str::FromStr;

/// A validation step that rejects SQL which might modify the database.
pub trait ReadOnlyCheck: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns `NotReadOnly` carrying the SQL when the statement is rejected.
    fn check(&self, sql: &str) -> Result<()>;
}

/// Which read-only check to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GuardKind {
    #[default]
    Keyword,
    Parser,
}

impl GuardKind {
    /// Builds the check for a connection's dialect.
    pub fn build(self, dialect: Dialect) -> Box<dyn ReadOnlyCheck> {
        match self {
            Self::Keyword => Box::new(KeywordGuard),
            Self::Parser => Box::new(ParserGuard::new(dialect)),
        }
    }
}

impl FromStr for GuardKind {
    type Err = DbQueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "parser" => Ok(Self::Parser),
            _ => Err(DbQueryError::config(format!(
                "unsupported guard {s:?} (expected keyword|parser)"
            ))),
        }
    }
}

impl fmt::Display for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyword => write!(f, "keyword"),
            Self::Parser => write!(f, "parser"),
        }
    }
}
