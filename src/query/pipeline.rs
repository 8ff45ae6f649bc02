//! One natural-language request, end to end.
//!
//! Generates SQL with the LLM, applies the read-only guard and the row
//! limit, executes, renders, and records the attempt in the history file.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::db::{with_deadline, DatabaseClient, Introspector, ResultSet};
use crate::error::{DbQueryError, Result};
use crate::llm::{build_messages, normalize_sql, LlmClient, PromptOptions};
use crate::persistence::{HistoryEntry, HistoryLog};
use crate::render::{render_as, OutputFormat};
use crate::safety::{ensure_limit, ReadOnlyCheck};

/// How the request was submitted, as recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Query,
    Chat,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Chat => "chat",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-run switches for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub mode: RunMode,
    pub profile: Option<String>,
    pub allow_write: bool,
    pub no_auto_limit: bool,
    pub limit: i64,
    pub dry_run: bool,
    pub show_sql: bool,
    pub output: OutputFormat,
    pub output_file: Option<PathBuf>,
    /// Deadline for the LLM call.
    pub llm_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Query,
            profile: None,
            allow_write: false,
            no_auto_limit: false,
            limit: crate::config::DEFAULT_LIMIT,
            dry_run: false,
            show_sql: false,
            output: OutputFormat::default(),
            output_file: None,
            llm_timeout: crate::config::DEFAULT_TIMEOUT,
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The SQL after guard and limit handling.
    pub sql: String,
    /// `None` for a dry run.
    pub result: Option<ResultSet>,
    /// The rendered output written to stdout, `None` for a dry run.
    pub rendered: Option<String>,
}

/// Runs natural-language requests against one connection.
pub struct QueryPipeline<'a> {
    db: &'a dyn DatabaseClient,
    llm: &'a dyn LlmClient,
    guard: Box<dyn ReadOnlyCheck>,
    history: Option<&'a HistoryLog>,
    schema_context: &'a str,
    options: PipelineOptions,
}

impl<'a> QueryPipeline<'a> {
    pub fn new(
        db: &'a dyn DatabaseClient,
        llm: &'a dyn LlmClient,
        guard: Box<dyn ReadOnlyCheck>,
        schema_context: &'a str,
        options: PipelineOptions,
    ) -> Self {
        Self {
            db,
            llm,
            guard,
            history: None,
            schema_context,
            options,
        }
    }

    /// Records every run in `history`.
    pub fn with_history(mut self, history: Option<&'a HistoryLog>) -> Self {
        self.history = history;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Runs one request, writing rendered results to `out`.
    ///
    /// A history entry is recorded whether the run succeeds or fails; a
    /// history write failure is only logged.
    pub async fn run(&self, request: &str, out: &mut dyn Write) -> Result<PipelineOutcome> {
        let start = Instant::now();
        let mut entry = HistoryEntry::new(
            self.options.mode.as_str(),
            self.db.dialect().as_str(),
            self.options.profile.clone(),
            request,
        );

        let result = self.run_steps(request, out, &mut entry).await;

        entry.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(outcome) => {
                entry.rows = outcome.result.as_ref().map_or(0, ResultSet::row_count);
            }
            Err(e) => entry.error = Some(e.to_string()),
        }

        if let Some(history) = self.history {
            history.record_best_effort(&entry);
        }

        result
    }

    async fn run_steps(
        &self,
        request: &str,
        out: &mut dyn Write,
        entry: &mut HistoryEntry,
    ) -> Result<PipelineOutcome> {
        let sql = self.generate_sql(request).await?;

        if !self.options.allow_write {
            if let Err(e) = self.guard.check(&sql) {
                entry.sql = Some(sql);
                return Err(e);
            }
            debug!(guard = self.guard.name(), "generated SQL passed read-only check");
        }

        let sql = if self.options.no_auto_limit {
            sql
        } else {
            ensure_limit(&sql, self.options.limit)
        };
        entry.sql = Some(sql.clone());

        if self.options.show_sql || self.options.dry_run {
            eprintln!("Generated SQL:\n{sql}");
        }

        if self.options.dry_run {
            return Ok(PipelineOutcome {
                sql,
                result: None,
                rendered: None,
            });
        }

        let result = self.db.execute_query(&sql).await?;
        info!(
            rows = result.row_count(),
            elapsed = ?result.execution_time,
            "query executed"
        );

        let rendered = render_as(self.options.output, &result.columns, &result.rows)?;

        if let Some(path) = &self.options.output_file {
            std::fs::write(path, &rendered).map_err(|e| {
                DbQueryError::internal(format!("write output file {}: {e}", path.display()))
            })?;
        }

        writeln!(out, "{rendered}")
            .map_err(|e| DbQueryError::internal(format!("write output: {e}")))?;

        Ok(PipelineOutcome {
            sql,
            result: Some(result),
            rendered: Some(rendered),
        })
    }

    /// Asks the LLM for SQL and strips any markdown around it.
    async fn generate_sql(&self, request: &str) -> Result<String> {
        let prompt = PromptOptions {
            dialect: self.db.dialect(),
            limit: self.options.limit,
            allow_write: self.options.allow_write,
        };
        let messages = build_messages(&prompt, request, self.schema_context);

        let reply = with_deadline(
            self.options.llm_timeout,
            "LLM request",
            self.llm.complete(&messages),
        )
        .await?;

        normalize_sql(&reply)
    }
}
