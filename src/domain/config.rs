//! # Configuration
//!
//! Manages the loading and parsing of the application's configuration file (`config.yaml`).
//! Defines the structs for the chat service, the supervisor, the wizard engine and the
//! project catalog.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration structure.
/// Matches the layout of `data/config.yaml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub services: ServicesConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub wizard: WizardConfig,
    #[serde(default)]
    pub projects: ProjectsConfig,
}

impl AppConfig {
    /// Reads and parses the YAML configuration at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context(crate::strings::logs::CONFIG_PARSE_ERROR)
    }
}

/// Configuration for various connected services.
#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    pub matrix: MatrixConfig,
}

/// Specific configuration for the Matrix service.
#[derive(Debug, Deserialize, Clone)]
pub struct MatrixConfig {
    pub username: String,
    pub password: String,
    pub homeserver: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Reconnect policy of the supervisor loop.
#[derive(Debug, Deserialize, Clone)]
pub struct SupervisorConfig {
    /// Retry delay after the first failure, in seconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay: f64,
    #[serde(default = "default_base")]
    pub base: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Upper bound for cancelling in-flight handlers when a session ends.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            base: default_base(),
            max_attempts: default_max_attempts(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_initial_delay() -> f64 {
    3.0
}
fn default_base() -> f64 {
    1.58
}
fn default_max_attempts() -> u32 {
    12
}
fn default_shutdown_timeout() -> u64 {
    10
}

/// System-level settings for the bot.
#[derive(Debug, Deserialize, Clone)]
pub struct SystemConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Cogs to load at startup, by name.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            extensions: default_extensions(),
            command_prefix: default_command_prefix(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}
fn default_extensions() -> Vec<String> {
    vec!["projects".to_string()]
}
fn default_command_prefix() -> String {
    ".".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WizardConfig {
    /// Answer that skips an optional question (case-insensitive).
    #[serde(default = "default_skip_token")]
    pub skip_token: String,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            skip_token: default_skip_token(),
        }
    }
}

fn default_skip_token() -> String {
    "none".to_string()
}

/// Catalog the project wizard offers for genre and type questions.
#[derive(Debug, Deserialize, Clone)]
pub struct ProjectsConfig {
    #[serde(default = "default_genres")]
    pub genres: Vec<String>,
    #[serde(default = "default_types")]
    pub types: Vec<String>,
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            genres: default_genres(),
            types: default_types(),
        }
    }
}

fn default_genres() -> Vec<String> {
    ["Fantasy", "Science Fiction", "Horror", "Historical", "Other"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_types() -> Vec<String> {
    ["Novel", "Short Story", "Game", "Comic", "Other"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let yaml = r#"
services:
  matrix:
    username: bot
    password: secret
    homeserver: https://matrix.example.org
"#;
        let config = AppConfig::parse(yaml).unwrap();
        assert_eq!(config.services.matrix.username, "bot");
        assert_eq!(config.supervisor.initial_delay, 3.0);
        assert_eq!(config.supervisor.base, 1.58);
        assert_eq!(config.supervisor.max_attempts, 12);
        assert_eq!(config.system.extensions, vec!["projects".to_string()]);
        assert_eq!(config.system.command_prefix, ".");
        assert_eq!(config.wizard.skip_token, "none");
        assert!(config.projects.genres.contains(&"Fantasy".to_string()));
    }

    #[test]
    fn test_overrides() {
        let yaml = r#"
services:
  matrix:
    username: bot
    password: secret
    homeserver: https://matrix.example.org
supervisor:
  max_attempts: 3
wizard:
  skip_token: skip
projects:
  genres: [Mystery]
"#;
        let config = AppConfig::parse(yaml).unwrap();
        assert_eq!(config.supervisor.max_attempts, 3);
        assert_eq!(config.supervisor.initial_delay, 3.0);
        assert_eq!(config.wizard.skip_token, "skip");
        assert_eq!(config.projects.genres, vec!["Mystery".to_string()]);
    }

    #[test]
    fn test_missing_services_is_an_error() {
        assert!(AppConfig::parse("system:\n  data_dir: x\n").is_err());
    }
}
