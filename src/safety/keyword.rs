//! Textual read-only guard and row-limit injection.
//!
//! Works on the raw SQL text with word-boundary keyword matching; no
//! dialect grammar is involved.

use crate::error::{DbQueryError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use super::ReadOnlyCheck;

static WRITE_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(insert|update|delete|drop|alter|truncate|create|grant|revoke|merge|call|replace)\b",
    )
    .expect("write keyword pattern is valid")
});

static LIMIT_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\blimit\s+\d+").expect("limit pattern is valid"));

const NOT_READ_ONLY: &str =
    "generated SQL is not read-only; use --allow-write to permit non-SELECT statements";
const HAS_WRITE_KEYWORDS: &str =
    "generated SQL contains write/DDL keywords; use --allow-write if intentional";

/// Keyword-based read-only check. Rejects on suspicion: a blocked word
/// anywhere in the statement, even inside a string literal, fails it.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordGuard;

impl ReadOnlyCheck for KeywordGuard {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn check(&self, sql: &str) -> Result<()> {
        ensure_read_only(sql)
    }
}

/// Fails unless the statement starts with `select`, `with` or
/// `explain select` and contains no write or DDL keyword.
pub fn ensure_read_only(sql: &str) -> Result<()> {
    let lower = strip_leading_comments(sql).to_lowercase();

    let readable = ["select", "with", "explain select"]
        .iter()
        .any(|prefix| lower.starts_with(prefix));
    if !readable {
        return Err(DbQueryError::not_read_only(sql, NOT_READ_ONLY));
    }

    if WRITE_KEYWORDS.is_match(&lower) {
        return Err(DbQueryError::not_read_only(sql, HAS_WRITE_KEYWORDS));
    }

    Ok(())
}

/// Appends `LIMIT <limit>;` to a SELECT/WITH statement that has no limit yet.
///
/// Anything else comes back unchanged, so applying this twice is the same as
/// applying it once.
pub fn ensure_limit(sql: &str, limit: i64) -> String {
    if limit <= 0 {
        return sql.to_string();
    }

    let lower = strip_leading_comments(sql).to_lowercase();
    if !(lower.starts_with("select") || lower.starts_with("with")) {
        return sql.to_string();
    }

    if LIMIT_CLAUSE.is_match(&lower) {
        return sql.to_string();
    }

    let trimmed = sql.trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed);
    format!("{trimmed} LIMIT {limit};")
}

/// Removes any run of `--` line comments and `/* */` block comments from the
/// front of the text. An unterminated comment swallows the rest.
pub fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            match after.find('\n') {
                Some(idx) => rest = after[idx + 1..].trim(),
                None => return "",
            }
        } else if let Some(after) = rest.strip_prefix("/*") {
            match after.find("*/") {
                Some(idx) => rest = after[idx + 2..].trim(),
                None => return "",
            }
        } else {
            return rest;
        }
    }
}
