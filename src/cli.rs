//! Command-line argument parsing for dbquery.
//!
//! `dbquery [options] --query "..."` runs one request, `dbquery chat` opens
//! an interactive session, `dbquery history` lists past requests. `set`,
//! `show` and `reset` manage the saved configuration.

use crate::config::{parse_duration, Overrides};
use crate::persistence::DEFAULT_HISTORY_LIMIT;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Ask a SQL database questions in plain language.
#[derive(Parser, Debug)]
#[command(name = "dbquery")]
#[command(version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub query: QueryArgs,

    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive session: one request per line
    Chat(QueryArgs),
    /// Show recorded requests
    History(HistoryArgs),
    /// Save a default LLM key or database
    Set(SetArgs),
    /// Print the saved configuration with secrets masked
    Show(ShowArgs),
    /// Delete saved configuration and history
    Reset(ResetArgs),
}

/// Options shared by single-query and chat mode.
#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Natural-language request (initial request in chat mode)
    #[arg(short, long, value_name = "TEXT")]
    pub query: Option<String>,

    /// Database type: sqlite, postgres or mysql (detected from the URL when omitted)
    #[arg(long, value_name = "TYPE")]
    pub db_type: Option<String>,

    /// Database URL, DSN or SQLite file path
    #[arg(long, value_name = "URL")]
    pub db_url: Option<String>,

    /// Named profile from the config file
    #[arg(short, long, value_name = "NAME")]
    pub profile: Option<String>,

    /// Comma-separated tables to include in the schema context
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub tables: Option<Vec<String>>,

    /// File whose content is appended to the schema context
    #[arg(long, value_name = "PATH")]
    pub schema_file: Option<PathBuf>,

    /// Maximum number of tables described to the LLM
    #[arg(long, value_name = "N")]
    pub schema_max_tables: Option<usize>,

    /// Row limit appended to queries without one
    #[arg(short, long, value_name = "N")]
    pub limit: Option<i64>,

    /// Output format: table or json
    #[arg(short, long, value_name = "FORMAT")]
    pub output: Option<String>,

    /// Also write the rendered output to this file
    #[arg(long, value_name = "PATH")]
    pub output_file: Option<PathBuf>,

    /// Read-only check: keyword or parser
    #[arg(long, value_name = "KIND")]
    pub guard: Option<String>,

    /// LLM model name
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// LLM API key
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, value_name = "URL")]
    pub llm_base_url: Option<String>,

    /// Sampling temperature
    #[arg(long, value_name = "T")]
    pub temperature: Option<f32>,

    /// Maximum tokens in the LLM reply
    #[arg(long, value_name = "N")]
    pub max_tokens: Option<u32>,

    /// Timeout per step (e.g. 45s, 2m, 500ms)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Generate SQL only, do not execute it
    #[arg(long)]
    pub dry_run: bool,

    /// Print generated SQL to stderr
    #[arg(long)]
    pub show_sql: bool,

    /// Allow statements that are not read-only
    #[arg(long)]
    pub allow_write: bool,

    /// Do not append LIMIT to queries without one
    #[arg(long)]
    pub no_auto_limit: bool,

    /// History file path
    #[arg(long, value_name = "PATH")]
    pub history_file: Option<PathBuf>,

    /// Do not record this run in history
    #[arg(long)]
    pub no_history: bool,

    /// Save the resolved settings of this run as a named profile
    #[arg(long, value_name = "NAME")]
    pub save_profile: Option<String>,
}

impl QueryArgs {
    /// Collects the values that override config and environment.
    pub fn to_overrides(&self) -> Overrides {
        Overrides {
            db_type: self.db_type.clone(),
            db_url: self.db_url.clone(),
            profile: self.profile.clone(),
            tables: self.tables.clone(),
            schema_file: self.schema_file.clone(),
            schema_max_tables: self.schema_max_tables,
            limit: self.limit,
            output: self.output.clone(),
            guard: self.guard.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            llm_base_url: self.llm_base_url.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: self.timeout,
            history_file: self.history_file.clone(),
            no_history: self.no_history,
            allow_write: self.allow_write,
            no_auto_limit: self.no_auto_limit,
        }
    }

    /// The request text, if one was given and is not blank.
    pub fn request(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    /// Number of entries to show
    #[arg(short, long, value_name = "N", default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub limit: usize,

    /// Output format: table or json
    #[arg(short, long, value_name = "FORMAT", default_value = "json")]
    pub output: String,

    /// Include the generated SQL
    #[arg(long)]
    pub full: bool,

    /// History file path
    #[arg(long, value_name = "PATH")]
    pub history_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SetArgs {
    #[command(subcommand)]
    pub target: SetTarget,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SetTarget {
    /// Store the LLM API key used when none is given
    LlmKey {
        #[arg(value_name = "API_KEY")]
        key: String,
    },
    /// Store the database used when none is given: `db <url>`,
    /// `db <type> <url>` or `db <type> <name> <url>`
    Db {
        #[arg(value_name = "ARGS", num_args = 1..=3, required = true)]
        args: Vec<String>,
    },
}

/// What `show` prints.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShowTarget {
    #[default]
    All,
    Settings,
    Profiles,
}

impl ShowTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Settings => "settings",
            Self::Profiles => "profiles",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[arg(value_enum, default_value_t = ShowTarget::All)]
    pub target: ShowTarget,
}

/// What `reset` deletes.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetTarget {
    /// The `[llm]` and `[defaults]` sections
    Config,
    /// Every saved profile
    Profile,
    /// The whole config file and the history file
    #[default]
    All,
}

impl ResetTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Profile => "profile",
            Self::All => "all",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ResetArgs {
    #[arg(value_enum, default_value_t = ResetTarget::All)]
    pub target: ResetTarget,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,

    /// Only report what would be deleted
    #[arg(long)]
    pub dry_run: bool,

    /// History file path
    #[arg(long, value_name = "PATH")]
    pub history_file: Option<PathBuf>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }
}
