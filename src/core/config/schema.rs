//! core::config::schema
//!
//! Configuration file schema.
//!
//! # Locations
//!
//! - User scope: `$HOME/.teamflow/config.json`
//! - Project scope: `<project>/.teamflow/config.json`
//!
//! Both files share one JSON schema; keys mirror the environment variable
//! names so a setting can move freely between `.env` and config files.

use serde::{Deserialize, Serialize};

/// Runtime environment the tool believes it is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunEnv {
    #[default]
    Development,
    Production,
    Test,
}

impl RunEnv {
    /// Parse the conventional NODE_ENV-style value; unknown values map to
    /// development.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => RunEnv::Production,
            "test" => RunEnv::Test,
            _ => RunEnv::Development,
        }
    }
}

/// One configuration file (user or project scope).
///
/// Every field is optional; unset fields defer to the next layer down.
///
/// # Example
///
/// ```json
/// {
///   "GITHUB_TOKEN": "ghp_...",
///   "SLACK_CHANNEL": "#dev-team",
///   "DEFAULT_BRANCH": "main",
///   "AUTO_PUSH": true
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(rename = "GITHUB_TOKEN", skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,

    #[serde(rename = "SLACK_TOKEN", skip_serializing_if = "Option::is_none")]
    pub slack_token: Option<String>,

    #[serde(rename = "SLACK_CHANNEL", skip_serializing_if = "Option::is_none")]
    pub slack_channel: Option<String>,

    #[serde(rename = "DISCORD_WEBHOOK_URL", skip_serializing_if = "Option::is_none")]
    pub discord_webhook_url: Option<String>,

    #[serde(rename = "DEFAULT_BRANCH", skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,

    #[serde(rename = "AUTO_PUSH", skip_serializing_if = "Option::is_none")]
    pub auto_push: Option<bool>,

    #[serde(rename = "AUTO_PR", skip_serializing_if = "Option::is_none")]
    pub auto_pr: Option<bool>,

    #[serde(
        rename = "CONFIRM_DESTRUCTIVE_ACTIONS",
        skip_serializing_if = "Option::is_none"
    )]
    pub confirm_destructive_actions: Option<bool>,

    #[serde(rename = "NODE_ENV", skip_serializing_if = "Option::is_none")]
    pub run_env: Option<String>,

    #[serde(rename = "DEBUG", skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,

    #[serde(rename = "LOG_LEVEL", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_env_parse() {
        assert_eq!(RunEnv::parse("production"), RunEnv::Production);
        assert_eq!(RunEnv::parse("prod"), RunEnv::Production);
        assert_eq!(RunEnv::parse("test"), RunEnv::Test);
        assert_eq!(RunEnv::parse("development"), RunEnv::Development);
        assert_eq!(RunEnv::parse("staging"), RunEnv::Development);
    }

    #[test]
    fn config_file_roundtrip() {
        let json = r##"{
            "GITHUB_TOKEN": "ghp_x",
            "SLACK_CHANNEL": "#general",
            "AUTO_PUSH": true
        }"##;
        let file: ConfigFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.github_token.as_deref(), Some("ghp_x"));
        assert_eq!(file.slack_channel.as_deref(), Some("#general"));
        assert_eq!(file.auto_push, Some(true));
        assert!(file.debug.is_none());

        let out = serde_json::to_string(&file).unwrap();
        assert!(out.contains("GITHUB_TOKEN"));
        assert!(!out.contains("DISCORD_WEBHOOK_URL"));
    }
}
