//! Command dispatch for dbquery.
//!
//! Opens the connection, builds the schema context once, and drives the
//! pipeline for a single request or an interactive session. Also lists the
//! recorded history and runs the config maintenance commands.

use std::io::Write;
use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::cli::{Cli, Command, HistoryArgs, QueryArgs, ResetArgs};
use crate::config::{default_history_path, history_path, Config, Overrides, Settings};
use crate::db::{build_schema_context, connect, with_deadline, DatabaseClient, TableFilter};
use crate::error::{DbQueryError, Result};
use crate::llm::{LlmClient, OpenAiClient};
use crate::manage;
use crate::persistence::{history_columns, history_rows, HistoryEntry, HistoryLog};
use crate::query::{PipelineOptions, QueryPipeline, RunMode};
use crate::render::{render_as, OutputFormat};

/// Help text displayed for the :help command.
const CHAT_HELP: &str = "Commands:
  :help          Show this help
  :exit, :quit   Leave interactive mode
Anything else is sent as a natural-language query.";

const CHAT_PROMPT: &str = "dbquery> ";

/// Runs the command selected on the command line.
pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    match &cli.command {
        None => run_query(&config, &config_path, &cli.query, cli.verbose).await,
        Some(Command::Chat(args)) => run_chat(&config, &config_path, args, cli.verbose).await,
        Some(Command::History(args)) => run_history(&config, args),
        Some(Command::Set(args)) => {
            println!("{}", manage::run_set(&config_path, &args.target)?);
            Ok(())
        }
        Some(Command::Show(args)) => {
            println!("{}", manage::render_show(&config_path, &config, args.target)?);
            Ok(())
        }
        Some(Command::Reset(args)) => run_reset(&config, &config_path, args),
    }
}

/// An open connection plus the schema context built from it.
struct Session {
    settings: Settings,
    db: Box<dyn DatabaseClient>,
    llm: Box<dyn LlmClient>,
    history: Option<HistoryLog>,
    schema_context: String,
}

impl Session {
    async fn open(settings: Settings) -> Result<Self> {
        let llm: Box<dyn LlmClient> = Box::new(OpenAiClient::from_settings(&settings.llm)?);

        let connection = &settings.connection;
        info!("Connecting to {}", connection.display_string());
        let db = with_deadline(connection.timeout, "database connection", connect(connection))
            .await?;

        let filter = TableFilter::new(&settings.tables);
        let schema_context = build_schema_context(
            db.as_ref(),
            &filter,
            settings.schema_max_tables,
            settings.schema_file.as_deref(),
        )
        .await?;

        let history = settings.history_file.clone().map(HistoryLog::new);

        Ok(Self {
            settings,
            db,
            llm,
            history,
            schema_context,
        })
    }

    fn pipeline(&self, mode: RunMode, args: &QueryArgs, verbose: bool) -> QueryPipeline<'_> {
        let options = pipeline_options(&self.settings, mode, args, verbose);

        QueryPipeline::new(
            self.db.as_ref(),
            self.llm.as_ref(),
            self.settings.guard.build(self.settings.connection.dialect),
            &self.schema_context,
            options,
        )
        .with_history(self.history.as_ref())
    }

    async fn close(self) {
        if let Err(e) = self.db.close().await {
            warn!("failed to close database connection: {e}");
        }
    }
}

/// Per-run pipeline switches. `--verbose` also prints the generated SQL.
fn pipeline_options(
    settings: &Settings,
    mode: RunMode,
    args: &QueryArgs,
    verbose: bool,
) -> PipelineOptions {
    PipelineOptions {
        mode,
        profile: settings.profile.clone(),
        allow_write: settings.allow_write,
        no_auto_limit: settings.no_auto_limit,
        limit: settings.limit,
        dry_run: args.dry_run,
        show_sql: args.show_sql || verbose,
        output: settings.output,
        output_file: args.output_file.clone(),
        llm_timeout: settings.llm.timeout,
    }
}

/// Stores the resolved settings under `--save-profile`, if given.
fn save_profile(
    config: &Config,
    config_path: &Path,
    args: &QueryArgs,
    settings: &Settings,
) -> Result<bool> {
    let Some(name) = args.save_profile.as_deref() else {
        return Ok(false);
    };

    let mut config = config.clone();
    config.save_profile(name, settings)?;
    config.save_to_file(config_path)?;
    info!("saved profile {:?} to {}", name.trim(), config_path.display());
    Ok(true)
}

async fn run_query(
    config: &Config,
    config_path: &Path,
    args: &QueryArgs,
    verbose: bool,
) -> Result<()> {
    let settings = Settings::resolve(config, &args.to_overrides())?;
    let saved = save_profile(config, config_path, args, &settings)?;

    let Some(request) = args.request() else {
        if saved {
            eprintln!("Profile saved. No query provided, skipping execution.");
            return Ok(());
        }
        return Err(DbQueryError::config("--query is required"));
    };

    let session = Session::open(settings).await?;
    let result = session
        .pipeline(RunMode::Query, args, verbose)
        .run(request, &mut std::io::stdout())
        .await;
    session.close().await;

    result.map(|_| ())
}

async fn run_chat(
    config: &Config,
    config_path: &Path,
    args: &QueryArgs,
    verbose: bool,
) -> Result<()> {
    let settings = Settings::resolve(config, &args.to_overrides())?;
    save_profile(config, config_path, args, &settings)?;
    let session = Session::open(settings).await?;

    eprintln!("Entering interactive mode. Type :help for commands.");

    let pipeline = session.pipeline(RunMode::Chat, args, verbose);
    let mut stdout = std::io::stdout();

    if let Some(request) = args.request() {
        if let Err(e) = pipeline.run(request, &mut stdout).await {
            eprintln!("error: {e}");
        }
    }

    let result = chat_loop(&pipeline, BufReader::new(tokio::io::stdin()), &mut stdout).await;
    drop(pipeline);
    session.close().await;
    result
}

/// Reads requests line by line until end of input or `:exit`.
///
/// Pipeline errors are printed and the loop continues.
pub async fn chat_loop<R>(
    pipeline: &QueryPipeline<'_>,
    input: R,
    out: &mut dyn Write,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        eprint!("{CHAT_PROMPT}");

        let line = lines
            .next_line()
            .await
            .map_err(|e| DbQueryError::internal(format!("read input: {e}")))?;
        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "" => continue,
            ":exit" | ":quit" => break,
            ":help" => eprintln!("{CHAT_HELP}"),
            request => {
                if let Err(e) = pipeline.run(request, out).await {
                    eprintln!("error: {e}");
                }
            }
        }
    }

    Ok(())
}

fn run_history(config: &Config, args: &HistoryArgs) -> Result<()> {
    if args.limit == 0 {
        return Err(DbQueryError::config("--limit must be > 0"));
    }
    let format: OutputFormat = args.output.parse()?;

    let overrides = Overrides {
        history_file: args.history_file.clone(),
        ..Default::default()
    };
    let path = history_path(config, &overrides).unwrap_or_else(default_history_path);

    let entries = HistoryLog::new(path).read_last(args.limit)?;
    println!("{}", render_history(&entries, format, args.full)?);
    Ok(())
}

fn run_reset(config: &Config, config_path: &Path, args: &ResetArgs) -> Result<()> {
    let overrides = Overrides {
        history_file: args.history_file.clone(),
        ..Default::default()
    };
    let history = history_path(config, &overrides).unwrap_or_else(default_history_path);
    let items = manage::reset_items(args.target, config_path, &history);

    // A dry run deletes nothing, so it needs no confirmation.
    if !args.yes && !args.dry_run {
        let confirmed = manage::confirm_reset(
            args.target,
            &items,
            std::io::stdin().lock(),
            &mut std::io::stderr(),
        )?;
        if !confirmed {
            eprintln!("Reset cancelled.");
            return Ok(());
        }
    }

    println!("{}", manage::apply_reset(&items, args.dry_run)?.render());
    Ok(())
}

/// Renders history entries as JSON records or a table.
pub fn render_history(entries: &[HistoryEntry], format: OutputFormat, full: bool) -> Result<String> {
    if entries.is_empty() {
        return Ok("No history entries found.".to_string());
    }

    match format {
        OutputFormat::Json => serde_json::to_string_pretty(entries)
            .map_err(|e| DbQueryError::internal(format!("marshal history: {e}"))),
        OutputFormat::Table => render_as(
            OutputFormat::Table,
            &history_columns(full),
            &history_rows(entries, full),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Dialect, MockDatabaseClient, ResultSet, Row, Value};
    use crate::llm::MockLlmClient;
    use crate::safety::GuardKind;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn entry() -> HistoryEntry {
        let mut entry = HistoryEntry::new("chat", "sqlite", None, "count users");
        entry.timestamp = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        entry.sql = Some("SELECT 1".to_string());
        entry.rows = 1;
        entry.duration_ms = 12;
        entry
    }

    #[test]
    fn test_render_history_empty() {
        assert_eq!(
            render_history(&[], OutputFormat::Table, false).unwrap(),
            "No history entries found."
        );
    }

    #[test]
    fn test_render_history_table() {
        let out = render_history(&[entry()], OutputFormat::Table, false).unwrap();
        assert_eq!(
            out,
            "+----------------------+------+--------+------+----+-------------+-------+\n\
             | timestamp            | mode | db     | rows | ms | query       | error |\n\
             +----------------------+------+--------+------+----+-------------+-------+\n\
             | 2024-01-02T03:04:05Z | chat | sqlite | 1    | 12 | count users |       |\n\
             +----------------------+------+--------+------+----+-------------+-------+"
        );

        let full = render_history(&[entry()], OutputFormat::Table, true).unwrap();
        assert!(full.contains("| sql "));
        assert!(full.contains("SELECT 1"));
    }

    #[test]
    fn test_render_history_json() {
        let out = render_history(&[entry()], OutputFormat::Json, false).unwrap();
        assert!(out.contains(r#""natural_query": "count users""#), "{out}");
        assert!(out.contains(r#""sql": "SELECT 1""#), "{out}");
    }

    #[tokio::test]
    async fn test_chat_loop_commands_and_errors() {
        let db = MockDatabaseClient::new(Dialect::Sqlite).with_result(ResultSet::with_data(
            vec!["count".to_string()],
            vec![Row::from_pairs([("count", Value::Int(3))])],
        ));
        let llm = MockLlmClient::new();
        let pipeline = QueryPipeline::new(
            &db,
            &llm,
            GuardKind::Keyword.build(Dialect::Sqlite),
            "Discovered schema:\n",
            PipelineOptions {
                mode: RunMode::Chat,
                ..Default::default()
            },
        );

        let input: &[u8] = b"\n:help\ncount users\ndelete user 1\n:quit\ncount orders\n";
        let mut out = Vec::new();
        chat_loop(&pipeline, input, &mut out).await.unwrap();

        // The rejected delete does not stop the loop; nothing after :quit runs.
        assert_eq!(
            db.executed(),
            vec!["SELECT COUNT(*) AS count FROM users LIMIT 10;".to_string()]
        );
        assert_eq!(llm.requests().len(), 2);
        assert!(String::from_utf8(out).unwrap().contains("| 3 "));
    }

    #[tokio::test]
    async fn test_chat_loop_stops_at_end_of_input() {
        let db = MockDatabaseClient::new(Dialect::Sqlite);
        let llm = MockLlmClient::new();
        let pipeline = QueryPipeline::new(
            &db,
            &llm,
            GuardKind::Parser.build(Dialect::Sqlite),
            "",
            PipelineOptions::default(),
        );

        let input: &[u8] = b"show all users";
        chat_loop(&pipeline, input, &mut Vec::new()).await.unwrap();
        assert_eq!(db.executed().len(), 1);
    }

    fn resolved(overrides: Overrides) -> Settings {
        Settings::resolve_with_env(&Config::default(), &overrides, |_| None).unwrap()
    }

    #[test]
    fn test_pipeline_options_verbose_shows_sql() {
        let settings = resolved(Overrides {
            db_url: Some("./app.db".to_string()),
            ..Default::default()
        });
        let args = QueryArgs::default();

        let quiet = pipeline_options(&settings, RunMode::Query, &args, false);
        assert!(!quiet.show_sql);

        let verbose = pipeline_options(&settings, RunMode::Query, &args, true);
        assert!(verbose.show_sql);
        assert_eq!(verbose.limit, settings.limit);
    }

    #[test]
    fn test_pipeline_options_take_profile_switches() {
        let settings = resolved(Overrides {
            db_url: Some("./app.db".to_string()),
            allow_write: true,
            no_auto_limit: true,
            ..Default::default()
        });
        let options = pipeline_options(&settings, RunMode::Chat, &QueryArgs::default(), false);
        assert!(options.allow_write);
        assert!(options.no_auto_limit);
        assert_eq!(options.mode, RunMode::Chat);
    }

    #[test]
    fn test_save_profile_without_query() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let args = QueryArgs {
            db_url: Some("./app.db".to_string()),
            save_profile: Some("local".to_string()),
            ..Default::default()
        };
        let settings = resolved(args.to_overrides());

        assert!(save_profile(&Config::default(), &config_path, &args, &settings).unwrap());
        let saved = Config::load_from_file(&config_path).unwrap();
        assert_eq!(
            saved.profile("local").unwrap().db_url.as_deref(),
            Some("./app.db")
        );

        let plain = QueryArgs::default();
        assert!(!save_profile(&Config::default(), &config_path, &plain, &settings).unwrap());
    }

    #[tokio::test]
    async fn test_run_query_save_profile_only() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let args = QueryArgs {
            db_url: Some("./app.db".to_string()),
            save_profile: Some("local".to_string()),
            no_history: true,
            ..Default::default()
        };

        run_query(&Config::default(), &config_path, &args, false)
            .await
            .unwrap();
        assert!(Config::load_from_file(&config_path)
            .unwrap()
            .profiles
            .contains_key("local"));

        let no_request = QueryArgs {
            db_url: Some("./app.db".to_string()),
            ..Default::default()
        };
        let err = run_query(&Config::default(), &config_path, &no_request, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--query is required"));
    }
}
