//! Client Settings
//!
//! Resolved from four layers; a later layer wins over an earlier one:
//!
//! 1. Built-in defaults
//! 2. `client.toml` in the XDG config dir (`~/.config/repochat/client.toml`)
//! 3. `REPOCHAT_*` environment variables
//! 4. Command-line flags, applied by the binary through [`ConfigOverrides`]
//!
//! # `client.toml`
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:8000"
//! request_timeout_secs = 120
//! connect_timeout_secs = 10
//!
//! [polling]
//! status_interval_ms = 2000
//! list_refresh_ms = 10000
//!
//! [chat]
//! error_message = "Sorry, I encountered an error. Please try again."
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backend used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Assistant content shown when a turn fails
pub const DEFAULT_ERROR_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";

/// Environment variable names
pub mod env {
    /// Backend base URL
    pub const API_URL: &str = "REPOCHAT_API_URL";
    /// Status poll interval in milliseconds
    pub const POLL_INTERVAL_MS: &str = "REPOCHAT_POLL_INTERVAL_MS";
    /// List refresh interval in milliseconds
    pub const LIST_REFRESH_MS: &str = "REPOCHAT_LIST_REFRESH_MS";
    /// Per-request timeout in seconds
    pub const REQUEST_TIMEOUT_SECS: &str = "REPOCHAT_REQUEST_TIMEOUT_SECS";
}

/// Why settings could not be resolved
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `client.toml` exists but could not be read
    #[error("Cannot read {path}: {source}")]
    ReadError {
        /// File that was opened
        path: PathBuf,
        /// I/O failure
        source: std::io::Error,
    },

    /// `client.toml` is not valid TOML for this schema
    #[error("Malformed client.toml: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A resolved value is unusable
    #[error("Invalid client setting: {0}")]
    ValidationError(String),
}

/// Highest layer that set at least one value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line flag
    Cli,
    /// `REPOCHAT_*` variable
    Env,
    /// `client.toml`
    File,
    /// Nothing overridden
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::Cli => "command line",
            Self::Env => "env",
            Self::File => "client.toml",
            Self::Default => "defaults",
        })
    }
}

/// `[api]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// Backend base URL
    pub base_url: Option<String>,
    /// Per-request timeout for non-streaming calls, in seconds
    pub request_timeout_secs: Option<u64>,
    /// TCP connect timeout, in seconds
    pub connect_timeout_secs: Option<u64>,
}

/// `[polling]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingToml {
    /// Status poll interval for a non-terminal repository, in milliseconds
    pub status_interval_ms: Option<u64>,
    /// Repository list refresh interval, in milliseconds
    pub list_refresh_ms: Option<u64>,
}

/// `[chat]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Assistant content shown when a turn fails
    pub error_message: Option<String>,
}

/// Whole `client.toml` document
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Backend connection section
    pub api: ApiToml,
    /// Timer section
    pub polling: PollingToml,
    /// Conversation section
    pub chat: ChatToml,
}

/// Resolved client configuration
///
/// Use [`load_config`] to load it with proper priority handling, then apply
/// [`ConfigOverrides`] for command-line values.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Backend base URL
    pub base_url: String,

    /// Status poll interval while a repository is queued or processing
    pub poll_interval: Duration,

    /// Repository list refresh interval
    pub list_refresh_interval: Duration,

    /// Per-request timeout for non-streaming calls
    pub request_timeout: Duration,

    /// TCP connect timeout for every call
    pub connect_timeout: Duration,

    /// Assistant content shown when a turn fails
    pub error_message: String,

    /// `client.toml` that contributed values, if one was found
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_secs(2),
            list_refresh_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            error_message: DEFAULT_ERROR_MESSAGE.to_string(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Built-in defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Short intervals for timer-driven tests
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            list_refresh_interval: Duration::from_millis(500),
            ..Self::default()
        }
    }

    /// Highest layer that set a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Record which layer set values last
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check values that would make the client misbehave
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a non-http base URL, a zero
    /// interval or timeout, or an empty error message.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }

        for (name, value) in [
            ("poll_interval", self.poll_interval),
            ("list_refresh_interval", self.list_refresh_interval),
            ("request_timeout", self.request_timeout),
            ("connect_timeout", self.connect_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if self.error_message.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "error_message must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// `repochat/client.toml` under the platform config dir
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("repochat").join("client.toml"))
}

/// Resolve settings from defaults, the default `client.toml`, and env
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// resolved values fail validation. A missing config file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Resolve settings reading `client.toml` from `path` instead
///
/// With `None`, only defaults and env are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// if the resolved values fail validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_with_env(path, |key| std::env::var(key).ok())
}

fn load_with_env(
    path: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    match path {
        Some(file) if file.exists() => {
            let text = std::fs::read_to_string(&file).map_err(|source| {
                ConfigError::ReadError {
                    path: file.clone(),
                    source,
                }
            })?;
            let parsed: ClientToml = toml::from_str(&text)?;
            apply_toml_config(&mut config, &parsed);

            tracing::info!(path = %file.display(), "Read client.toml");
            config.config_file_path = Some(file);
            config.source = ConfigSource::File;
        }
        Some(file) => {
            tracing::debug!(path = %file.display(), "No client.toml; keeping defaults");
        }
        None => {}
    }

    apply_env_config(&mut config, lookup);
    config.validate()?;

    Ok(config)
}

/// Copy every value present in the file
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    if let Some(ref url) = toml.api.base_url {
        config.base_url.clone_from(url);
    }
    if let Some(secs) = toml.api.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.api.connect_timeout_secs {
        config.connect_timeout = Duration::from_secs(secs);
    }

    if let Some(ms) = toml.polling.status_interval_ms {
        config.poll_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.polling.list_refresh_ms {
        config.list_refresh_interval = Duration::from_millis(ms);
    }

    if let Some(ref message) = toml.chat.error_message {
        config.error_message.clone_from(message);
    }
}

/// Layer `REPOCHAT_*` values over the current settings
///
/// Unparseable numeric values are ignored with a warning.
fn apply_env_config(config: &mut ClientConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(env::API_URL) {
        config.base_url = url;
        config.source = ConfigSource::Env;
    }

    let millis = |key: &str| parse_env_u64(key, lookup(key)).map(Duration::from_millis);
    if let Some(interval) = millis(env::POLL_INTERVAL_MS) {
        config.poll_interval = interval;
        config.source = ConfigSource::Env;
    }
    if let Some(interval) = millis(env::LIST_REFRESH_MS) {
        config.list_refresh_interval = interval;
        config.source = ConfigSource::Env;
    }

    if let Some(secs) = parse_env_u64(env::REQUEST_TIMEOUT_SECS, lookup(env::REQUEST_TIMEOUT_SECS))
    {
        config.request_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
}

fn parse_env_u64(key: &str, value: Option<String>) -> Option<u64> {
    let value = value?;
    match value.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(key, value = %value, "Ignoring non-numeric environment value");
            None
        }
    }
}

/// Command-line values, applied last
///
/// The binary collects its flags here and calls [`ConfigOverrides::apply`] on
/// the result of [`load_config`].
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,

    /// Poll interval override (milliseconds)
    pub poll_interval_ms: Option<u64>,

    /// Request timeout override (seconds)
    pub request_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Create empty overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set poll interval override
    #[must_use]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = Some(ms);
        self
    }

    /// Set request timeout override
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Write the set values into `config` and re-validate
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if an override produces an
    /// invalid configuration.
    pub fn apply(&self, config: &mut ClientConfig) -> Result<(), ConfigError> {
        if let Some(ref url) = self.base_url {
            config.base_url.clone_from(url);
            config.source = ConfigSource::Cli;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
            config.source = ConfigSource::Cli;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Cli;
        }
        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn toml_file(content: &str) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(content.as_bytes()).unwrap();
        tmp
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();

        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.list_refresh_interval, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(
            config.error_message,
            "Sorry, I encountered an error. Please try again."
        );
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_path_location() {
        if let Some(p) = default_config_path() {
            assert!(p.to_string_lossy().contains("repochat"));
            assert!(p.to_string_lossy().ends_with("client.toml"));
        }
    }

    #[test]
    fn test_every_section_read() {
        let file = toml_file(
            r#"
[api]
base_url = "https://chat.example.com"
request_timeout_secs = 30

[polling]
status_interval_ms = 500
list_refresh_ms = 5000

[chat]
error_message = "Something broke."
"#,
        );

        let config = load_with_env(Some(file.path().to_path_buf()), no_env).unwrap();
        assert_eq!(config.base_url, "https://chat.example.com");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.list_refresh_interval, Duration::from_secs(5));
        assert_eq!(config.error_message, "Something broke.");
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path, Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_sections_are_optional() {
        let file = toml_file("[polling]\nstatus_interval_ms = 750\n");

        let config = load_with_env(Some(file.path().to_path_buf()), no_env).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(750));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_absent_file_keeps_defaults() {
        let path = PathBuf::from("/nonexistent/repochat/client.toml");
        let config = load_with_env(Some(path), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_broken_toml_rejected() {
        let file = toml_file("[api\nbase_url = ");
        let result = load_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let file = toml_file("[polling]\nstatus_interval_ms = 0\n");
        let result = load_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_env_beats_file() {
        let file = toml_file(
            "[api]\nbase_url = \"http://file:8000\"\n[polling]\nstatus_interval_ms = 900\n",
        );
        let env = env_from(&[
            (env::API_URL, "http://env:8000"),
            (env::POLL_INTERVAL_MS, "250"),
        ]);

        let config = load_with_env(Some(file.path().to_path_buf()), env).unwrap();
        assert_eq!(config.base_url, "http://env:8000");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_non_numeric_env_ignored() {
        let env = env_from(&[(env::REQUEST_TIMEOUT_SECS, "soon")]);
        let config = load_with_env(None, env).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_env_url_validated() {
        let env = env_from(&[(env::API_URL, "localhost:8000")]);
        assert!(matches!(
            load_with_env(None, env),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_flags_beat_env() {
        let mut config = ClientConfig {
            base_url: "http://env:8000".to_string(),
            ..ClientConfig::default()
        };
        config.set_source(ConfigSource::Env);

        ConfigOverrides::new()
            .with_base_url("http://cli:8000")
            .apply(&mut config)
            .unwrap();

        assert_eq!(config.base_url, "http://cli:8000");
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_no_flags_keeps_source() {
        let mut config = ClientConfig::default();
        ConfigOverrides::new().apply(&mut config).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_flags_revalidated() {
        let mut config = ClientConfig::default();
        let result = ConfigOverrides::new()
            .with_poll_interval_ms(0)
            .apply(&mut config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_source_labels() {
        assert_eq!(ConfigSource::Cli.to_string(), "command line");
        assert_eq!(ConfigSource::File.to_string(), "client.toml");
        assert_eq!(format!("{:<8}|", ConfigSource::Env), "env     |");
    }
}
