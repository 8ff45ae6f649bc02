//! Maintenance commands for the saved configuration.
//!
//! `set` stores a default LLM key or database, `show` prints the config with
//! secrets masked, and `reset` deletes saved settings, profiles or history.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::cli::{ResetTarget, SetTarget, ShowTarget};
use crate::config::{mask_secret, redact_url, Config, DefaultsConfig, LlmConfig, Profile};
use crate::db::Dialect;
use crate::error::{DbQueryError, Result};

const SET_DB_USAGE: &str =
    "usage: dbquery set db <db-url-or-path> OR dbquery set db <db-type> [<name>] <db-url-or-path>";

/// Applies `dbquery set` to the config file and returns the confirmation.
pub fn run_set(config_path: &Path, target: &SetTarget) -> Result<String> {
    let mut config = Config::load_from_file(config_path)?;

    let message = match target {
        SetTarget::LlmKey { key } => {
            let key = key.trim();
            if key.is_empty() {
                return Err(DbQueryError::config("usage: dbquery set llm-key <api-key>"));
            }
            config.llm.api_key = Some(key.to_string());
            format!("Saved default LLM key to {}", config_path.display())
        }
        SetTarget::Db { args } => {
            let (dialect, url) = parse_db_target(args)?;
            config.defaults.db_type = Some(dialect.to_string());
            config.defaults.db_url = Some(url);
            format!(
                "Saved default DB settings ({dialect}) to {}",
                config_path.display()
            )
        }
    };

    config.save_to_file(config_path)?;
    info!("updated {}", config_path.display());
    Ok(message)
}

/// Reads `<url>`, `<type> <url>` or `<type> <name> <url>`. The name is
/// accepted for symmetry with profiles and otherwise ignored.
pub fn parse_db_target(args: &[String]) -> Result<(Dialect, String)> {
    let (dialect, url) = match args {
        [url] => (Dialect::detect(url)?, url),
        [db_type, url] => {
            let dialect = Dialect::parse(db_type).map_err(|_| {
                DbQueryError::config(format!(
                    "unable to detect db type from {db_type:?}; provide explicit db type: \
                     dbquery set db <sqlite|postgres|mysql> <db-url-or-path>"
                ))
            })?;
            (dialect, url)
        }
        [db_type, _name, url] => (Dialect::parse(db_type)?, url),
        _ => return Err(DbQueryError::config(SET_DB_USAGE)),
    };

    let url = url.trim();
    if url.is_empty() {
        return Err(DbQueryError::config(SET_DB_USAGE));
    }
    Ok((dialect, url.to_string()))
}

#[derive(Debug, Serialize)]
struct ShowPayload {
    target: &'static str,
    config_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    settings: Option<ShownSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profiles: Option<Vec<NamedProfile>>,
}

#[derive(Debug, Serialize)]
struct ShownSettings {
    llm: LlmConfig,
    defaults: DefaultsConfig,
}

#[derive(Debug, Serialize)]
struct NamedProfile {
    name: String,
    profile: Profile,
}

/// Renders the saved configuration as JSON, API keys and passwords masked.
pub fn render_show(config_path: &Path, config: &Config, target: ShowTarget) -> Result<String> {
    let settings = matches!(target, ShowTarget::All | ShowTarget::Settings).then(|| {
        ShownSettings {
            llm: LlmConfig {
                api_key: config.llm.api_key.as_deref().map(mask_secret),
                ..config.llm.clone()
            },
            defaults: DefaultsConfig {
                db_url: config.defaults.db_url.as_deref().map(redact_url),
                ..config.defaults.clone()
            },
        }
    });

    let profiles = matches!(target, ShowTarget::All | ShowTarget::Profiles).then(|| {
        config
            .profiles
            .iter()
            .map(|(name, profile)| NamedProfile {
                name: name.clone(),
                profile: profile.redacted(),
            })
            .collect()
    });

    let payload = ShowPayload {
        target: target.as_str(),
        config_file: config_path.display().to_string(),
        settings,
        profiles,
    };

    serde_json::to_string_pretty(&payload)
        .map_err(|e| DbQueryError::internal(format!("marshal show output: {e}")))
}

/// One thing `reset` can delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetItem {
    /// The `[llm]` and `[defaults]` sections of the config file.
    Settings(PathBuf),
    /// Every `[profiles.*]` section of the config file.
    Profiles(PathBuf),
    ConfigFile(PathBuf),
    HistoryFile(PathBuf),
}

impl ResetItem {
    pub fn label(&self) -> String {
        match self {
            Self::Settings(path) => format!("settings ({})", path.display()),
            Self::Profiles(path) => format!("profiles ({})", path.display()),
            Self::ConfigFile(path) => format!("config ({})", path.display()),
            Self::HistoryFile(path) => format!("history ({})", path.display()),
        }
    }

    fn is_present(&self) -> Result<bool> {
        match self {
            Self::Settings(path) => {
                let config = Config::load_from_file(path)?;
                Ok(!(config.llm.is_empty() && config.defaults.is_empty()))
            }
            Self::Profiles(path) => Ok(!Config::load_from_file(path)?.profiles.is_empty()),
            Self::ConfigFile(path) | Self::HistoryFile(path) => Ok(path.exists()),
        }
    }

    fn remove(&self) -> Result<()> {
        match self {
            Self::Settings(path) => {
                let mut config = Config::load_from_file(path)?;
                config.llm = LlmConfig::default();
                config.defaults = DefaultsConfig::default();
                config.save_to_file(path)
            }
            Self::Profiles(path) => {
                let mut config = Config::load_from_file(path)?;
                config.profiles.clear();
                config.save_to_file(path)
            }
            Self::ConfigFile(path) | Self::HistoryFile(path) => match std::fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(DbQueryError::config(format!("remove {}: {e}", self.label()))),
            },
        }
    }
}

/// What `reset <target>` touches.
pub fn reset_items(target: ResetTarget, config_path: &Path, history_path: &Path) -> Vec<ResetItem> {
    match target {
        ResetTarget::Config => vec![ResetItem::Settings(config_path.to_path_buf())],
        ResetTarget::Profile => vec![ResetItem::Profiles(config_path.to_path_buf())],
        ResetTarget::All => vec![
            ResetItem::ConfigFile(config_path.to_path_buf()),
            ResetItem::HistoryFile(history_path.to_path_buf()),
        ],
    }
}

/// Lists the items and asks for a yes. Empty input means yes; end of input
/// means no.
pub fn confirm_reset<R: BufRead>(
    target: ResetTarget,
    items: &[ResetItem],
    mut input: R,
    prompt: &mut dyn Write,
) -> Result<bool> {
    let io_error = |e: std::io::Error| DbQueryError::internal(format!("confirm reset: {e}"));

    writeln!(prompt, "Reset {}? This will delete:", target.as_str()).map_err(io_error)?;
    for item in items {
        writeln!(prompt, "- {}", item.label()).map_err(io_error)?;
    }
    write!(prompt, "Continue? [Y/n]: ").map_err(io_error)?;
    prompt.flush().map_err(io_error)?;

    let mut line = String::new();
    if input.read_line(&mut line).map_err(io_error)? == 0 {
        return Ok(false);
    }
    Ok(matches!(
        line.trim().to_lowercase().as_str(),
        "" | "y" | "yes"
    ))
}

/// Outcome of a reset, split into what was (or would be) deleted and what
/// was already gone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub dry_run: bool,
    pub removed: Vec<String>,
    pub missing: Vec<String>,
}

impl ResetReport {
    pub fn render(&self) -> String {
        let mut lines = Vec::new();

        if self.dry_run {
            lines.push("Dry run (no files deleted).".to_string());
            if self.removed.is_empty() {
                lines.push("Nothing would be removed.".to_string());
            } else {
                lines.push("Would remove:".to_string());
            }
        } else if self.removed.is_empty() {
            lines.push("Nothing was removed.".to_string());
        } else {
            lines.push("Removed:".to_string());
        }
        lines.extend(self.removed.iter().map(|label| format!("- {label}")));

        if !self.missing.is_empty() {
            lines.push("Already missing:".to_string());
            lines.extend(self.missing.iter().map(|label| format!("- {label}")));
        }

        lines.join("\n")
    }
}

/// Deletes the items, or only checks them on a dry run.
pub fn apply_reset(items: &[ResetItem], dry_run: bool) -> Result<ResetReport> {
    let mut report = ResetReport {
        dry_run,
        ..Default::default()
    };

    for item in items {
        if !item.is_present()? {
            report.missing.push(item.label());
            continue;
        }
        if !dry_run {
            item.remove()?;
        }
        report.removed.push(item.label());
    }

    Ok(report)
}
