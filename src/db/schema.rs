//! Schema discovery for dbquery.
//!
//! Walks a dialect's catalog through the [`Introspector`] trait, applying the
//! user's table scope and the table cap, and formats the result as context
//! for the LLM prompt.

use super::Introspector;
use crate::error::{DbQueryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Lower-cased allow-list of table names. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    names: HashSet<String>,
}

impl TableFilter {
    /// Builds a filter from the user-supplied scope tokens.
    pub fn new<I, S>(scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = scope
            .into_iter()
            .map(|token| token.as_ref().trim().to_lowercase())
            .filter(|token| !token.is_empty())
            .collect();
        Self { names }
    }

    /// Returns true when no scope was given.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Checks a (possibly schema-qualified) table name against the filter.
    ///
    /// `users` matches `public.users`; `public.users` only matches itself.
    pub fn allows(&self, name: &str) -> bool {
        if self.names.is_empty() {
            return true;
        }

        let lowered = name.to_lowercase();
        if self.names.contains(&lowered) {
            return true;
        }

        match lowered.rsplit_once('.') {
            Some((_, bare)) => self.names.contains(bare),
            None => false,
        }
    }
}

/// A table as it appears in the dialect's catalog, before column lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTable {
    pub schema: Option<String>,
    pub name: String,
}

impl CatalogTable {
    /// A table addressed by its bare name.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// A table addressed as `schema.name`.
    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// The name shown to the user and the LLM.
    pub fn display_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

/// One discovered table with its `"<name> <type>"` column descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<String>,
}

/// Discovers up to `max_tables` tables allowed by `filter`.
///
/// Column lookups only happen for tables that pass the filter, and the walk
/// stops as soon as the cap is reached. Any catalog failure aborts the whole
/// call.
pub async fn introspect<I>(
    introspector: &I,
    filter: &TableFilter,
    max_tables: usize,
) -> Result<Vec<TableDescriptor>>
where
    I: Introspector + ?Sized,
{
    let mut descriptors = Vec::new();
    if max_tables == 0 {
        return Ok(descriptors);
    }

    let candidates = introspector.list_tables().await?;
    debug!(
        dialect = %introspector.dialect(),
        candidates = candidates.len(),
        "listed catalog tables"
    );

    for table in candidates {
        let name = table.display_name();
        if !filter.allows(&name) {
            continue;
        }

        let columns = introspector.table_columns(&table).await?;
        debug!(table = %name, columns = columns.len(), "described table");
        descriptors.push(TableDescriptor { name, columns });

        if descriptors.len() >= max_tables {
            break;
        }
    }

    Ok(descriptors)
}

/// Formats discovered tables, plus an optional schema file, as prompt context.
pub fn format_schema_context(tables: &[TableDescriptor], extra: Option<&str>) -> String {
    let mut out = String::from("Discovered schema:\n");

    if tables.is_empty() {
        out.push_str("(no tables discovered)\n");
    } else {
        for table in tables {
            out.push_str(&format!("- {} ({})\n", table.name, table.columns.join(", ")));
        }
    }

    if let Some(extra) = extra {
        out.push_str("\nExtra schema context from file:\n");
        out.push_str(extra);
        if !extra.ends_with('\n') {
            out.push('\n');
        }
    }

    out
}

/// Introspects the database and renders the full schema context string.
pub async fn build_schema_context<I>(
    introspector: &I,
    filter: &TableFilter,
    max_tables: usize,
    schema_file: Option<&Path>,
) -> Result<String>
where
    I: Introspector + ?Sized,
{
    let tables = introspect(introspector, filter, max_tables).await?;

    let extra = match schema_file {
        Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
            DbQueryError::config(format!("read schema file {}: {}", path.display(), e))
        })?),
        None => None,
    };

    Ok(format_schema_context(&tables, extra.as_deref()))
}
