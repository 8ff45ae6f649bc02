//! Configuration management for dbquery.
//!
//! Handles loading configuration from a TOML file, named profiles,
//! environment variables and command-line overrides, and merges them into
//! the [`Settings`] a run works with. The same file is written back by
//! `dbquery set` and `--save-profile`.

use crate::db::Dialect;
use crate::error::{DbQueryError, Result};
use crate::render::OutputFormat;
use crate::safety::GuardKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_LIMIT: i64 = 10;
pub const DEFAULT_SCHEMA_MAX_TABLES: usize = 40;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// Main configuration structure, as stored in `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// LLM endpoint settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Defaults applied to every run.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Named profiles, kept sorted by name.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model name (e.g., "gpt-4o-mini").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// API key, as stored by `dbquery set llm-key`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl LlmConfig {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DefaultsConfig {
    /// Database used when neither the command line nor a profile names one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_max_tables: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_file: Option<PathBuf>,
}

impl DefaultsConfig {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// `[profiles.<name>]` section: a database target plus the run settings
/// that go with it.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_max_tables: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Duration such as `45s` or `2m`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_write: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub no_auto_limit: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Profile {
    /// Captures the resolved settings of a run so it can be replayed by name.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            db_type: Some(settings.connection.dialect.to_string()),
            db_url: Some(settings.connection.url.clone()),
            tables: settings.tables.clone(),
            schema_file: settings.schema_file.clone(),
            schema_max_tables: Some(settings.schema_max_tables),
            output: Some(settings.output.to_string()),
            limit: Some(settings.limit),
            guard: Some(settings.guard.to_string()),
            model: Some(settings.llm.model.clone()),
            llm_base_url: Some(settings.llm.base_url.clone()),
            temperature: Some(settings.llm.temperature),
            max_tokens: Some(settings.llm.max_tokens),
            timeout: Some(format_duration(settings.connection.timeout)),
            allow_write: settings.allow_write,
            no_auto_limit: settings.no_auto_limit,
        }
    }

    /// Same profile with the password in `db_url` replaced by `***`.
    pub fn redacted(&self) -> Self {
        Self {
            db_url: self.db_url.as_deref().map(redact_url),
            ..self.clone()
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        config_dir().join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| DbQueryError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            DbQueryError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Writes the configuration as TOML, creating parent directories.
    ///
    /// The file can hold an API key, so on unix it is readable by the owner
    /// only.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DbQueryError::config(format!("encode config: {e}")))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbQueryError::config(format!(
                    "create config directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        std::fs::write(path, content).map_err(|e| {
            DbQueryError::config(format!("write config file {}: {e}", path.display()))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(
                |e| DbQueryError::config(format!("restrict config file permissions: {e}")),
            )?;
        }

        Ok(())
    }

    /// Looks up a named profile.
    pub fn profile(&self, name: &str) -> Result<&Profile> {
        self.profiles
            .get(name)
            .ok_or_else(|| DbQueryError::config(format!("profile {name:?} not found")))
    }

    /// Stores `settings` under `name`, replacing any profile of that name.
    pub fn save_profile(&mut self, name: &str, settings: &Settings) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DbQueryError::config("--save-profile cannot be empty"));
        }
        self.profiles
            .insert(name.to_string(), Profile::from_settings(settings));
        Ok(())
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dbquery")
}

/// Default location of the query history file.
pub fn default_history_path() -> PathBuf {
    config_dir().join("history.jsonl")
}

/// Parses `45`, `45s`, `2m`, `1h` or `500ms`. A bare number is seconds.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid duration: '{s}'. Expected e.g. 45s, 2m, 500ms"))?;

    let secs = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("Duration too large: '{s}'"))
    };

    match unit {
        "" | "s" => Ok(Duration::from_secs(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "m" => secs(60),
        "h" => secs(3600),
        _ => Err(format!("Invalid duration unit '{unit}' in '{s}'")),
    }
}

/// Inverse of [`parse_duration`] for whole seconds or milliseconds.
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Masks a secret for display, keeping four characters at each end of
/// long values.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.trim().chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 8))
}

/// Replaces the password of a connection URL with `***`.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            // set_password only fails for cannot-be-a-base URLs, which have no password.
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        _ => raw.to_string(),
    }
}

/// Everything needed to open one database connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub dialect: Dialect,

    /// Connection URL, or a file path for sqlite.
    pub url: String,

    /// Deadline for every database call made through this connection.
    pub timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(dialect: Dialect, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            dialect,
            url: url.into(),
            timeout,
        }
    }

    /// Returns a display-safe string (no password) for logs.
    pub fn display_string(&self) -> String {
        format!("{} ({})", redact_url(&self.url), self.dialect)
    }
}

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub db_type: Option<String>,
    pub db_url: Option<String>,
    pub profile: Option<String>,
    pub tables: Option<Vec<String>>,
    pub schema_file: Option<PathBuf>,
    pub schema_max_tables: Option<usize>,
    pub limit: Option<i64>,
    pub output: Option<String>,
    pub guard: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<Duration>,
    pub history_file: Option<PathBuf>,
    pub no_history: bool,
    pub allow_write: bool,
    pub no_auto_limit: bool,
}

/// Resolved LLM endpoint settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl LlmSettings {
    /// The API key, required before any request is sent.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            DbQueryError::config(
                "missing API key: use --api-key, run `dbquery set llm-key`, or export DBQUERY_API_KEY",
            )
        })
    }
}

/// Fully merged and validated settings for a query or chat run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub connection: ConnectionConfig,
    pub profile: Option<String>,
    pub tables: Vec<String>,
    pub schema_file: Option<PathBuf>,
    pub schema_max_tables: usize,
    pub limit: i64,
    pub output: OutputFormat,
    pub guard: GuardKind,
    pub allow_write: bool,
    pub no_auto_limit: bool,
    pub llm: LlmSettings,

    /// `None` when history recording is disabled.
    pub history_file: Option<PathBuf>,
}

impl Settings {
    /// Merges CLI overrides, the selected profile, the config file and the
    /// process environment.
    pub fn resolve(config: &Config, overrides: &Overrides) -> Result<Self> {
        Self::resolve_with_env(config, overrides, |key| std::env::var(key).ok())
    }

    /// Like [`Settings::resolve`] with an explicit environment lookup.
    ///
    /// Each value comes from the first of: command line, profile, config
    /// file, environment, built-in default.
    pub fn resolve_with_env<F>(config: &Config, overrides: &Overrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile_name = non_empty(overrides.profile.as_deref());
        let profile = match &profile_name {
            Some(name) => config.profile(name)?.clone(),
            None => Profile::default(),
        };
        let defaults = &config.defaults;

        let (db_url, stored_type) = if let Some(url) = non_empty(overrides.db_url.as_deref()) {
            (url, profile.db_type.clone())
        } else if let Some(url) = non_empty(profile.db_url.as_deref()) {
            (url, profile.db_type.clone())
        } else if let Some(url) = non_empty(defaults.db_url.as_deref()) {
            (url, profile.db_type.clone().or(defaults.db_type.clone()))
        } else if let Some(url) = non_empty(env("DBQUERY_DB_URL").as_deref()) {
            (url, profile.db_type.clone())
        } else {
            return Err(DbQueryError::config(
                "--db-url is required (or run `dbquery set db <url>`)",
            ));
        };

        let dialect = match non_empty(overrides.db_type.as_deref())
            .or_else(|| non_empty(stored_type.as_deref()))
        {
            Some(db_type) => Dialect::parse(&db_type)?,
            None => Dialect::detect(&db_url)?,
        };

        let profile_timeout = non_empty(profile.timeout.as_deref())
            .map(|raw| {
                parse_duration(&raw)
                    .map_err(|e| DbQueryError::config(format!("profile timeout: {e}")))
            })
            .transpose()?;
        let timeout = overrides
            .timeout
            .or(profile_timeout)
            .or_else(|| defaults.timeout_secs.map(Duration::from_secs))
            .unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(DbQueryError::config("--timeout must be > 0"));
        }

        let limit = overrides
            .limit
            .or(profile.limit)
            .or(defaults.limit)
            .unwrap_or(DEFAULT_LIMIT);
        if limit <= 0 {
            return Err(DbQueryError::config("--limit must be > 0"));
        }

        let schema_max_tables = overrides
            .schema_max_tables
            .or(profile.schema_max_tables)
            .or(defaults.schema_max_tables)
            .unwrap_or(DEFAULT_SCHEMA_MAX_TABLES);
        if schema_max_tables == 0 {
            return Err(DbQueryError::config("--schema-max-tables must be > 0"));
        }

        let output = non_empty(overrides.output.as_deref())
            .or_else(|| non_empty(profile.output.as_deref()))
            .or_else(|| non_empty(defaults.output.as_deref()))
            .map(|s| s.parse::<OutputFormat>())
            .transpose()?
            .unwrap_or_default();

        let guard = non_empty(overrides.guard.as_deref())
            .or_else(|| non_empty(profile.guard.as_deref()))
            .or_else(|| non_empty(defaults.guard.as_deref()))
            .map(|s| s.parse::<GuardKind>())
            .transpose()?
            .unwrap_or_default();

        let tables = overrides
            .tables
            .clone()
            .unwrap_or_else(|| profile.tables.clone())
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let llm = resolve_llm(&config.llm, &profile, overrides, timeout, &env)?;

        Ok(Self {
            connection: ConnectionConfig::new(dialect, db_url, timeout),
            profile: profile_name,
            tables,
            schema_file: overrides.schema_file.clone().or(profile.schema_file),
            schema_max_tables,
            limit,
            output,
            guard,
            allow_write: overrides.allow_write || profile.allow_write,
            no_auto_limit: overrides.no_auto_limit || profile.no_auto_limit,
            llm,
            history_file: history_path(config, overrides),
        })
    }
}

fn resolve_llm<F>(
    llm: &LlmConfig,
    profile: &Profile,
    overrides: &Overrides,
    timeout: Duration,
    env: &F,
) -> Result<LlmSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let max_tokens = overrides
        .max_tokens
        .or(profile.max_tokens)
        .or(llm.max_tokens)
        .unwrap_or(DEFAULT_MAX_TOKENS);
    if max_tokens == 0 {
        return Err(DbQueryError::config("--max-tokens must be > 0"));
    }

    let base_url = non_empty(overrides.llm_base_url.as_deref())
        .or_else(|| non_empty(profile.llm_base_url.as_deref()))
        .or_else(|| non_empty(llm.base_url.as_deref()))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    Url::parse(&base_url)
        .map_err(|e| DbQueryError::config(format!("invalid LLM base URL {base_url:?}: {e}")))?;

    Ok(LlmSettings {
        base_url,
        model: non_empty(overrides.model.as_deref())
            .or_else(|| non_empty(profile.model.as_deref()))
            .or_else(|| non_empty(llm.model.as_deref()))
            .or_else(|| non_empty(env("LLM_MODEL").as_deref()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        api_key: non_empty(overrides.api_key.as_deref())
            .or_else(|| non_empty(llm.api_key.as_deref()))
            .or_else(|| non_empty(env("DBQUERY_API_KEY").as_deref()))
            .or_else(|| non_empty(env("OPENAI_API_KEY").as_deref())),
        temperature: overrides
            .temperature
            .or(profile.temperature)
            .or(llm.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE),
        max_tokens,
        timeout,
    })
}

/// Where history is recorded, or `None` when disabled.
pub fn history_path(config: &Config, overrides: &Overrides) -> Option<PathBuf> {
    if overrides.no_history {
        return None;
    }
    Some(
        overrides
            .history_file
            .clone()
            .or_else(|| config.defaults.history_file.clone())
            .unwrap_or_else(default_history_path),
    )
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
