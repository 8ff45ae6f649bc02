//! Extraction of the SQL statement from a model reply.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DbQueryError, Result};

/// A reply that is one fenced block, optionally language-tagged.
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:\w+)?\s*(.*?)\s*```$").expect("code fence pattern is valid")
});

/// Strips a surrounding code fence and a leading `sql:` label.
///
/// Fails when nothing is left.
pub fn normalize_sql(reply: &str) -> Result<String> {
    let mut sql = reply.trim();

    if let Some(inner) = CODE_FENCE.captures(sql).and_then(|c| c.get(1)) {
        sql = inner.as_str().trim();
    }

    if let Some(rest) = strip_label(sql) {
        sql = rest.trim();
    }

    if sql.is_empty() {
        return Err(DbQueryError::llm("LLM returned an empty SQL query"));
    }

    Ok(sql.to_string())
}

/// Strips a case-insensitive `sql:` prefix.
fn strip_label(sql: &str) -> Option<&str> {
    let label = sql.get(..4)?;
    label.eq_ignore_ascii_case("sql:").then(|| &sql[4..])
}
