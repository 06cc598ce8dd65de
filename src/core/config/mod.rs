//! core::config
//!
//! Layered configuration loading.
//!
//! # Precedence
//!
//! Highest priority first:
//! 1. Process environment
//! 2. User-scope file `$HOME/.teamflow/config.json`
//! 3. Project-scope file `<project>/.teamflow/config.json`
//! 4. Project-level `.env`
//! 5. Built-in defaults
//!
//! The resolved [`Config`] is frozen after load; no component mutates it.
//!
//! # Example
//!
//! ```no_run
//! use teamflow::core::config::Config;
//! use teamflow::core::paths::AppPaths;
//!
//! let paths = AppPaths::default();
//! let config = Config::load(&paths).unwrap();
//! println!("default branch: {}", config.default_branch);
//! ```

pub mod schema;

pub use schema::{ConfigFile, RunEnv};

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::logger::LogLevel;
use crate::core::paths::AppPaths;
use crate::core::validate;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("home directory not found")]
    NoHomeDir,
}

/// Resolved configuration, frozen after load.
#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub personal access token. Required for gateway operations;
    /// its absence is surfaced by `check()`, not by `load()`.
    pub github_token: Option<String>,
    /// Slack bot token, when Slack notifications are configured.
    pub slack_token: Option<String>,
    /// Slack channel for notifications.
    pub slack_channel: String,
    /// Discord webhook URL, when Discord notifications are configured.
    pub discord_webhook_url: Option<String>,
    /// The repository default branch.
    pub default_branch: String,
    /// Push automatically after commit in the Finish phase.
    pub auto_push: bool,
    /// Open a pull request automatically in the Finish phase.
    pub auto_pr: bool,
    /// Require confirmation before destructive operations.
    pub confirm_destructive_actions: bool,
    /// Runtime environment.
    pub run_env: RunEnv,
    /// Verbose diagnostics.
    pub debug: bool,
    /// Log verbosity.
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_token: None,
            slack_token: None,
            slack_channel: "#general".to_string(),
            discord_webhook_url: None,
            default_branch: "main".to_string(),
            auto_push: false,
            auto_pr: false,
            confirm_destructive_actions: true,
            run_env: RunEnv::Development,
            debug: false,
            log_level: LogLevel::Info,
        }
    }
}

/// One finding from `Config::check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFinding {
    /// The key the finding concerns.
    pub key: &'static str,
    /// True when the finding blocks normal operation.
    pub blocking: bool,
    /// Human-readable description.
    pub message: String,
}

/// Report from validating a loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigReport {
    pub findings: Vec<ConfigFinding>,
}

impl ConfigReport {
    /// True when no blocking findings are present.
    pub fn is_usable(&self) -> bool {
        self.findings.iter().all(|f| !f.blocking)
    }
}

impl Config {
    /// Load configuration with the documented precedence.
    ///
    /// Missing files are not errors; files that exist but fail to parse
    /// are.
    pub fn load(paths: &AppPaths) -> Result<Self, ConfigError> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let global = match AppPaths::global_config_path() {
            Some(path) if path.exists() => Some(read_config_file(&path)?),
            _ => None,
        };
        let project = {
            let path = paths.project_config_path();
            if path.exists() {
                Some(read_config_file(&path)?)
            } else {
                None
            }
        };
        let dotenv = read_env_file(&paths.env_file_path())?;

        Ok(Self::resolve(&env, global, project, &dotenv))
    }

    /// Resolve the four layers into a frozen config.
    ///
    /// Split out from `load` so tests can exercise precedence without
    /// touching process environment or the filesystem. The project-scope
    /// config file sits between the user-scope file and `.env`.
    pub fn resolve(
        env: &HashMap<String, String>,
        global: Option<ConfigFile>,
        project: Option<ConfigFile>,
        dotenv: &HashMap<String, String>,
    ) -> Self {
        let global = global.unwrap_or_default();
        let project = project.unwrap_or_default();
        let defaults = Config::default();

        let lookup_str = |key: &str,
                          global_field: &Option<String>,
                          project_field: &Option<String>|
         -> Option<String> {
            env.get(key)
                .cloned()
                .or_else(|| global_field.clone())
                .or_else(|| project_field.clone())
                .or_else(|| dotenv.get(key).cloned())
        };
        let lookup_bool = |key: &str,
                           global_field: Option<bool>,
                           project_field: Option<bool>|
         -> Option<bool> {
            env.get(key)
                .map(|v| parse_bool(v))
                .or(global_field)
                .or(project_field)
                .or_else(|| dotenv.get(key).map(|v| parse_bool(v)))
        };

        let slack_channel = lookup_str(
            "SLACK_CHANNEL",
            &global.slack_channel,
            &project.slack_channel,
        )
        .map(|raw| {
            validate::validate_slack_channel(&raw)
                .into_result()
                .unwrap_or(raw)
        })
        .unwrap_or(defaults.slack_channel);

        Self {
            github_token: lookup_str("GITHUB_TOKEN", &global.github_token, &project.github_token),
            slack_token: lookup_str("SLACK_TOKEN", &global.slack_token, &project.slack_token),
            slack_channel,
            discord_webhook_url: lookup_str(
                "DISCORD_WEBHOOK_URL",
                &global.discord_webhook_url,
                &project.discord_webhook_url,
            ),
            default_branch: lookup_str(
                "DEFAULT_BRANCH",
                &global.default_branch,
                &project.default_branch,
            )
            .unwrap_or(defaults.default_branch),
            auto_push: lookup_bool("AUTO_PUSH", global.auto_push, project.auto_push)
                .unwrap_or(defaults.auto_push),
            auto_pr: lookup_bool("AUTO_PR", global.auto_pr, project.auto_pr)
                .unwrap_or(defaults.auto_pr),
            confirm_destructive_actions: lookup_bool(
                "CONFIRM_DESTRUCTIVE_ACTIONS",
                global.confirm_destructive_actions,
                project.confirm_destructive_actions,
            )
            .unwrap_or(defaults.confirm_destructive_actions),
            run_env: lookup_str("NODE_ENV", &global.run_env, &project.run_env)
                .map(|v| RunEnv::parse(&v))
                .unwrap_or(defaults.run_env),
            debug: lookup_bool("DEBUG", global.debug, project.debug).unwrap_or(defaults.debug),
            log_level: lookup_str("LOG_LEVEL", &global.log_level, &project.log_level)
                .map(|v| LogLevel::parse(&v))
                .unwrap_or(defaults.log_level),
        }
    }

    /// Validate the loaded configuration and report findings.
    pub fn check(&self) -> ConfigReport {
        let mut findings = Vec::new();

        match &self.github_token {
            None => findings.push(ConfigFinding {
                key: "GITHUB_TOKEN",
                blocking: true,
                message: "GITHUB_TOKENが設定されていません".to_string(),
            }),
            Some(token) => {
                if !validate::validate_token(token).is_valid() {
                    findings.push(ConfigFinding {
                        key: "GITHUB_TOKEN",
                        blocking: true,
                        message: validate::messages::TOKEN_INVALID.to_string(),
                    });
                }
            }
        }

        if self.slack_token.is_some()
            && !validate::validate_slack_channel(&self.slack_channel).is_valid()
        {
            findings.push(ConfigFinding {
                key: "SLACK_CHANNEL",
                blocking: false,
                message: validate::messages::SLACK_CHANNEL_INVALID.to_string(),
            });
        }

        if let Some(url) = &self.discord_webhook_url {
            if !validate::validate_discord_webhook(url).is_valid() {
                findings.push(ConfigFinding {
                    key: "DISCORD_WEBHOOK_URL",
                    blocking: false,
                    message: validate::messages::DISCORD_WEBHOOK_INVALID.to_string(),
                });
            }
        }

        if !validate::validate_branch_name(&self.default_branch).is_valid() {
            findings.push(ConfigFinding {
                key: "DEFAULT_BRANCH",
                blocking: true,
                message: validate::messages::BRANCH_INVALID_CHARS.to_string(),
            });
        }

        ConfigReport { findings }
    }

    /// Best-effort repair of project configuration.
    ///
    /// Creates `.env` from `.env.example` when the former is missing and
    /// the latter exists. Returns the list of repairs performed.
    pub fn fix(paths: &AppPaths) -> Result<Vec<String>, ConfigError> {
        let mut repairs = Vec::new();

        let env_path = paths.env_file_path();
        let example_path = paths.project_root.join(".env.example");
        if !env_path.exists() && example_path.exists() {
            fs::copy(&example_path, &env_path).map_err(|e| ConfigError::WriteError {
                path: env_path.clone(),
                source: e,
            })?;
            repairs.push(format!(
                ".env を .env.example から作成しました: {}",
                env_path.display()
            ));
        }

        let project_config = paths.project_config_path();
        if !project_config.exists() {
            write_config_atomic(&project_config, &ConfigFile::default())?;
            repairs.push(format!(
                "プロジェクト設定ファイルを作成しました: {}",
                project_config.display()
            ));
        }

        Ok(repairs)
    }

    /// Write the user-scope config file atomically.
    pub fn write_global(file: &ConfigFile) -> Result<PathBuf, ConfigError> {
        let path = AppPaths::global_config_path().ok_or(ConfigError::NoHomeDir)?;
        write_config_atomic(&path, file)?;
        Ok(path)
    }
}

/// Parse a boolean setting. Accepts `true/1/yes/on` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Read and parse a JSON config file.
fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Read a `.env` file into key/value pairs.
///
/// Supports `KEY=value` lines, `#` comments, and optional single or
/// double quotes around the value. A missing file yields an empty map.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut vars = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let mut value = value.trim();
        if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
            || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
        {
            value = &value[1..value.len() - 1];
        }
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

/// Write a config file atomically (temp file + rename).
fn write_config_atomic(path: &Path, file: &ConfigFile) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let contents = serde_json::to_string_pretty(file).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let temp_path = path.with_extension("json.tmp");
    let mut f = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
        path: temp_path.clone(),
        source: e,
    })?;
    f.write_all(contents.as_bytes())
        .map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;
    f.sync_all().map_err(|e| ConfigError::WriteError {
        path: temp_path.clone(),
        source: e,
    })?;
    fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}
