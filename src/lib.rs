pub mod alert;
pub mod api;
pub mod error;
pub mod evaluators;
pub mod github;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod utils;
pub mod webhook;

#[cfg(test)]
pub(crate) mod test_utils;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{AlertError, Result};
use crate::github::GitHubService;
use crate::pipeline::Pipeline;
use crate::utils::{AllowList, GITHUB_HOOK_RANGES};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub github: GitHubConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub allow_localhost: bool,
    pub allowed_cidrs: Vec<String>,
    /// Replace `allowed_cidrs` with the live ranges from GitHub's `/meta` at startup.
    pub refresh_allowed_cidrs: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            allow_localhost: true,
            allowed_cidrs: GITHUB_HOOK_RANGES.iter().map(|r| r.to_string()).collect(),
            refresh_allowed_cidrs: false,
            log_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    pub owner: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub token: Option<String>,
    pub webhook_secret: Option<String>,
}

fn default_api_url() -> String {
    DEFAULT_GITHUB_API_URL.to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct NotifyConfig {
    pub teams_webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RulesConfig {
    pub generate_pull_requests: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            generate_pull_requests: true,
        }
    }
}

impl AppConfig {
    /// Environment variables win over the file for secrets and the bind address.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(addr) = lookup("BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        if let Some(token) = lookup("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(secret) = lookup("GITHUB_WEBHOOK_SECRET") {
            self.github.webhook_secret = Some(secret);
        }
        if let Some(url) = lookup("TEAMS_WEBHOOK_URL") {
            self.notify.teams_webhook_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.github.owner.trim().is_empty() {
            return Err(AlertError::Config("github.owner must be set".into()));
        }
        if self.webhook_secret().is_none() {
            return Err(AlertError::Config(
                "github.webhook_secret (or GITHUB_WEBHOOK_SECRET) must be set".into(),
            ));
        }
        AllowList::parse(&self.server.allowed_cidrs, self.server.allow_localhost)?;
        Ok(())
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.github.webhook_secret.as_deref().filter(|s| !s.is_empty())
    }

    pub fn teams_webhook_url(&self) -> Option<&str> {
        self.notify
            .teams_webhook_url
            .as_deref()
            .filter(|s| !s.is_empty())
    }
}

/// Load, override from the environment, and validate the configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();
    let config_str = std::fs::read_to_string(path).map_err(|e| {
        AlertError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
    })?;

    let mut config: AppConfig = toml::from_str(&config_str)?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

pub struct AppState {
    pub config: AppConfig,
    pub webhook_secret: String,
    pub allow_list: AllowList,
    pub pipeline: Arc<Pipeline>,
    pub github: Arc<dyn GitHubService>,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
        [github]
        owner = "acme"
        webhook_secret = "s3cret"
    "#;

    #[test]
    fn defaults_fill_optional_sections() {
        let config: AppConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:3000");
        assert!(config.server.allow_localhost);
        assert_eq!(config.server.allowed_cidrs.len(), GITHUB_HOOK_RANGES.len());
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert!(config.rules.generate_pull_requests);
        assert!(config.teams_webhook_url().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config: AppConfig = toml::from_str(MINIMAL).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("GITHUB_TOKEN", "ghp_token"),
            ("GITHUB_WEBHOOK_SECRET", "from-env"),
            ("TEAMS_WEBHOOK_URL", "https://example.webhook.office.com/x"),
            ("BIND_ADDRESS", ""),
        ]);
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.github.token.as_deref(), Some("ghp_token"));
        assert_eq!(config.webhook_secret(), Some("from-env"));
        assert_eq!(
            config.teams_webhook_url(),
            Some("https://example.webhook.office.com/x")
        );
        assert_eq!(config.server.bind_address, "0.0.0.0:3000");
    }

    #[test]
    fn missing_secret_or_bad_ranges_fail_validation() {
        let no_secret: AppConfig = toml::from_str("[github]\nowner = \"acme\"").unwrap();
        assert!(matches!(no_secret.validate(), Err(AlertError::Config(_))));

        let bad_ranges: AppConfig = toml::from_str(
            r#"
            [server]
            allowed_cidrs = ["10.0.0.0/99"]
            [github]
            owner = "acme"
            webhook_secret = "s"
            "#,
        )
        .unwrap();
        assert!(bad_ranges.validate().is_err());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        assert!(matches!(
            load_config("/nonexistent/alert_hooks.toml"),
            Err(AlertError::Config(_))
        ));
    }
}
