//! Application configuration.
//!
//! Settings come from a TOML file (`LISTENER_CONFIG`, or `reddit-listener.toml`
//! in the working directory when present) and are then overridden by
//! environment variables. Secrets are normally supplied only through the
//! environment.

use crate::{ConfigError, KeywordMatcher, KeywordSet, MatchMode};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "LISTENER_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "reddit-listener.toml";

const REDDIT_MAX_LISTING_LIMIT: u32 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reddit: RedditConfig,
    pub matching: MatchingConfig,
    pub storage: StorageConfig,
    pub notifier: NotifierConfig,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub subreddits: Vec<String>,
    /// Pause between polls once both listings are drained.
    pub poll_interval_secs: u64,
    pub fetch_limit: u32,
    /// Ignore whatever is already listed when the feed first connects.
    pub skip_existing: bool,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: None,
            username: None,
            password: None,
            subreddits: Vec::new(),
            poll_interval_secs: 5,
            fetch_limit: REDDIT_MAX_LISTING_LIMIT,
            skip_existing: false,
        }
    }
}

impl fmt::Debug for RedditConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("subreddits", &self.subreddits)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("fetch_limit", &self.fetch_limit)
            .field("skip_existing", &self.skip_existing)
            .finish()
    }
}

impl RedditConfig {
    pub fn credentials(&self) -> Result<RedditCredentials, ConfigError> {
        Ok(RedditCredentials {
            client_id: required(&self.client_id, "REDDIT_CLIENT_ID")?,
            client_secret: required(&self.client_secret, "REDDIT_CLIENT_SECRET")?,
            user_agent: required(&self.user_agent, "REDDIT_USER_AGENT")?,
            username: required(&self.username, "REDDIT_USERNAME")?,
            password: required(&self.password, "REDDIT_PASSWORD")?,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Subreddit names with blanks and any `r/` prefix removed.
    pub fn channels(&self) -> Vec<String> {
        self.subreddits
            .iter()
            .map(|name| name.trim().trim_start_matches("r/").to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

fn required(value: &Option<String>, var_name: &str) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(ConfigError::MissingEnvironmentVariable {
            var_name: var_name.to_string(),
        }),
    }
}

/// Credentials for a Reddit "script" application.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("user_agent", &self.user_agent)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub keywords: Vec<String>,
    pub mode: MatchMode,
}

impl MatchingConfig {
    pub fn keyword_set(&self) -> KeywordSet {
        KeywordSet::new(&self.keywords)
    }

    pub fn matcher(&self) -> KeywordMatcher {
        KeywordMatcher::new(self.keyword_set(), self.mode)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://reddit-listener.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    #[default]
    Desktop,
    Webhook,
    Log,
}

impl NotifierKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "desktop" => Some(NotifierKind::Desktop),
            "webhook" => Some(NotifierKind::Webhook),
            "log" => Some(NotifierKind::Log),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    pub timeout_secs: u64,
    pub webhook_url: Option<String>,
    pub app_name: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Desktop,
            timeout_secs: 10,
            webhook_url: None,
            app_name: "Reddit Listener".to_string(),
        }
    }
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            std::io::ErrorKind::PermissionDenied => ConfigError::PermissionDenied {
                path: path.display().to_string(),
            },
            _ => ConfigError::InvalidFormat {
                details: format!("{}: {}", path.display(), e),
            },
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads the file, applies the process environment and validates.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = [
            ("REDDIT_CLIENT_ID", &mut self.reddit.client_id),
            ("REDDIT_CLIENT_SECRET", &mut self.reddit.client_secret),
            ("REDDIT_USER_AGENT", &mut self.reddit.user_agent),
            ("REDDIT_USERNAME", &mut self.reddit.username),
            ("REDDIT_PASSWORD", &mut self.reddit.password),
        ];
        for (var_name, slot) in credentials {
            if let Some(value) = lookup(var_name) {
                *slot = Some(value);
            }
        }

        if let Some(value) = lookup("LISTENER_SUBREDDITS") {
            self.reddit.subreddits = split_list(&value);
        }
        if let Some(value) = lookup("LISTENER_KEYWORDS") {
            self.matching.keywords = split_list(&value);
        }
        if let Some(value) = lookup("LISTENER_MATCH_MODE") {
            self.matching.mode = match value.trim().to_ascii_lowercase().as_str() {
                "substring" => MatchMode::Substring,
                "whole_word" => MatchMode::WholeWord,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "LISTENER_MATCH_MODE".to_string(),
                        value: value.clone(),
                    })
                }
            };
        }
        if let Some(value) = lookup("LISTENER_DATABASE_URL") {
            self.storage.database_url = value;
        }
        if let Some(value) = lookup("LISTENER_NOTIFIER") {
            self.notifier.kind =
                NotifierKind::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                    field: "LISTENER_NOTIFIER".to_string(),
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup("LISTENER_WEBHOOK_URL") {
            self.notifier.webhook_url = Some(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reddit.credentials()?;

        let channels = self.reddit.channels();
        if channels.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "at least one subreddit must be monitored".to_string(),
            });
        }
        if let Some(bad) = channels
            .iter()
            .find(|name| !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        {
            return Err(ConfigError::InvalidValue {
                field: "reddit.subreddits".to_string(),
                value: bad.clone(),
            });
        }
        if self.reddit.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reddit.poll_interval_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if self.reddit.fetch_limit == 0 || self.reddit.fetch_limit > REDDIT_MAX_LISTING_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "reddit.fetch_limit".to_string(),
                value: self.reddit.fetch_limit.to_string(),
            });
        }

        if self.matching.keyword_set().is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "the keyword list is empty".to_string(),
            });
        }

        if self.storage.database_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "storage.database_url".to_string(),
            });
        }

        if self.notifier.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "notifier.timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if self.notifier.kind == NotifierKind::Webhook {
            let raw = self
                .notifier
                .webhook_url
                .as_deref()
                .ok_or_else(|| ConfigError::MissingField {
                    field: "notifier.webhook_url".to_string(),
                })?;
            let parsed = url::Url::parse(raw).map_err(|_| ConfigError::InvalidValue {
                field: "notifier.webhook_url".to_string(),
                value: raw.to_string(),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidValue {
                    field: "notifier.webhook_url".to_string(),
                    value: raw.to_string(),
                });
            }
        }

        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
        [reddit]
        client_id = "id"
        client_secret = "secret"
        user_agent = "reddit-listener/0.1 by tester"
        username = "tester"
        password = "hunter2"
        subreddits = ["smallbusiness", "r/learnpython"]

        [matching]
        keywords = ["GPU", "deal"]
        mode = "whole_word"

        [notifier]
        kind = "log"
        timeout_secs = 3
    "#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_toml_with_defaults() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.reddit.channels(), vec!["smallbusiness", "learnpython"]);
        assert_eq!(config.reddit.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.reddit.fetch_limit, 100);
        assert!(!config.reddit.skip_existing);
        assert_eq!(config.matching.mode, MatchMode::WholeWord);
        assert_eq!(
            config.matching.keyword_set().iter().collect::<Vec<_>>(),
            vec!["gpu", "deal"]
        );
        assert_eq!(config.notifier.kind, NotifierKind::Log);
        assert_eq!(config.notifier.timeout(), Duration::from_secs(3));
        assert_eq!(config.storage.database_url, "sqlite://reddit-listener.db");
    }

    #[test]
    fn test_environment_overrides_file_values() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config
            .apply_env(env(&[
                ("REDDIT_PASSWORD", "from-env"),
                ("LISTENER_KEYWORDS", "sale, ,coupon"),
                ("LISTENER_SUBREDDITS", "deals"),
                ("LISTENER_NOTIFIER", "Desktop"),
            ]))
            .unwrap();

        assert_eq!(config.reddit.password.as_deref(), Some("from-env"));
        assert_eq!(config.matching.keywords, vec!["sale", "coupon"]);
        assert_eq!(config.reddit.channels(), vec!["deals"]);
        assert_eq!(config.notifier.kind, NotifierKind::Desktop);
    }

    #[test]
    fn test_missing_credentials_are_reported_by_variable_name() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.reddit.client_secret = Some("   ".to_string());

        match config.validate() {
            Err(ConfigError::MissingEnvironmentVariable { var_name }) => {
                assert_eq!(var_name, "REDDIT_CLIENT_SECRET")
            }
            other => panic!("expected missing variable, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_keywords_and_channels_are_rejected() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.matching.keywords = vec!["  ".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed { .. })
        ));

        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.reddit.subreddits.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_webhook_notifier_requires_valid_url() {
        let mut config = AppConfig::from_toml_str(SAMPLE).unwrap();
        config.notifier.kind = NotifierKind::Webhook;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { .. })
        ));

        config.notifier.webhook_url = Some("ftp://example.com/hook".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        config.notifier.webhook_url = Some("https://example.com/hooks/abc".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_env_values_are_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env(env(&[("LISTENER_NOTIFIER", "pager")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_missing_config_file() {
        let result = AppConfig::load_with(env(&[(CONFIG_ENV_VAR, "/nonexistent/listener.toml")]));
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_malformed_toml() {
        let result = AppConfig::from_toml_str("[reddit\nclient_id = 1");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        let rendered = format!("{:?}", config.reddit);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("\"secret\""));

        let credentials = format!("{:?}", config.reddit.credentials().unwrap());
        assert!(!credentials.contains("hunter2"));
    }
}
