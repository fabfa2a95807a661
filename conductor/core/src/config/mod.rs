//! TOML Configuration File Support
//!
//! This module provides centralized configuration loading for a chat
//! session, supporting a TOML configuration file at
//! `~/.config/costchat/config.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`COSTCHAT_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! base_url = "https://costs.example.com/api"
//! request_timeout_secs = 300
//! api_timeout_secs = 30
//! streaming = true
//!
//! [session]
//! default_model = "claude-sonnet-4-5-20250929"
//! max_input_length = 32768
//! conversation_name_max_chars = 50
//!
//! [storage]
//! state_dir = "/home/me/.local/state/costchat"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendConfig;

/// Model used when nothing else is configured
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Base URL including the `/api` prefix
    pub base_url: Option<String>,

    /// Ceiling for chat requests, in seconds
    pub request_timeout_secs: Option<u64>,

    /// Ceiling for every other request, in seconds
    pub api_timeout_secs: Option<u64>,

    /// Use the streaming chat endpoint
    pub streaming: Option<bool>,
}

/// Session section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Model for new questions
    pub default_model: Option<String>,

    /// Maximum question length in characters
    pub max_input_length: Option<usize>,

    /// Maximum derived conversation name length in characters
    pub conversation_name_max_chars: Option<usize>,

    /// Capacity of the controller-to-surface channel
    pub channel_capacity: Option<usize>,
}

/// Storage section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageToml {
    /// Directory for the last-account file
    pub state_dir: Option<PathBuf>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CostchatToml {
    /// Server configuration section
    pub server: ServerToml,

    /// Session configuration section
    pub session: SessionToml,

    /// Storage configuration section
    pub storage: StorageToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Configuration for one chat session
///
/// Use [`load_config`] to load with proper priority handling.
#[derive(Clone, Debug)]
pub struct ConductorConfig {
    /// Server connection settings
    pub backend: BackendConfig,

    /// Use `POST /chat/stream` rather than `POST /chat`
    pub streaming: bool,

    /// Model for new questions
    pub default_model: String,

    /// Maximum question length in characters
    pub max_input_length: usize,

    /// Maximum derived conversation name length in characters
    pub conversation_name_max_chars: usize,

    /// Capacity of the controller-to-surface channel
    pub channel_capacity: usize,

    /// Directory for the last-account file (`None` = platform default)
    pub state_dir: Option<PathBuf>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            streaming: true,
            default_model: DEFAULT_MODEL.to_string(),
            max_input_length: 32768,
            conversation_name_max_chars: 50,
            channel_capacity: 100,
            state_dir: None,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ConductorConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.backend.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "server.base_url must be an http(s) URL, got {url:?}"
            )));
        }
        if self.backend.request_timeout.is_zero() || self.backend.api_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if self.max_input_length == 0 {
            return Err(ConfigError::ValidationError(
                "session.max_input_length must be greater than zero".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "session.channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/costchat/config.toml` or
/// `~/.config/costchat/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("costchat").join("config.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI overrides are not handled here; apply [`ConfigOverrides`] afterwards.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the resulting values are invalid. A missing config file is not an error.
pub async fn load_config() -> Result<ConductorConfig, ConfigError> {
    load_config_from_path(default_config_path()).await
}

/// Load configuration from a specific path, reading the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub async fn load_config_from_path(path: Option<PathBuf>) -> Result<ConductorConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok()).await
}

/// Load configuration with a custom environment lookup
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub async fn load_config_with_env<F>(
    path: Option<PathBuf>,
    env: F,
) -> Result<ConductorConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ConductorConfig::default();

    if let Some(config_path) = path {
        match tokio::fs::read_to_string(&config_path).await {
            Ok(toml_content) => {
                let toml_config: CostchatToml = toml::from_str(&toml_content)?;
                apply_toml_config(&mut config, &toml_config);
                config.source = ConfigSource::File;
                tracing::info!(
                    path = %config_path.display(),
                    "Loaded configuration from file"
                );
                config.config_file_path = Some(config_path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    path = %config_path.display(),
                    "Config file not found, using defaults"
                );
            }
            Err(e) => {
                return Err(ConfigError::ReadError {
                    path: config_path,
                    source: e,
                });
            }
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ConductorConfig, toml: &CostchatToml) {
    // Server settings
    if let Some(ref url) = toml.server.base_url {
        config.backend.base_url.clone_from(url);
    }
    if let Some(secs) = toml.server.request_timeout_secs {
        config.backend.request_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.server.api_timeout_secs {
        config.backend.api_timeout = Duration::from_secs(secs);
    }
    if let Some(streaming) = toml.server.streaming {
        config.streaming = streaming;
    }

    // Session settings
    if let Some(ref model) = toml.session.default_model {
        config.default_model.clone_from(model);
    }
    if let Some(length) = toml.session.max_input_length {
        config.max_input_length = length;
    }
    if let Some(chars) = toml.session.conversation_name_max_chars {
        config.conversation_name_max_chars = chars;
    }
    if let Some(capacity) = toml.session.channel_capacity {
        config.channel_capacity = capacity;
    }

    // Storage settings
    if toml.storage.state_dir.is_some() {
        config.state_dir.clone_from(&toml.storage.state_dir);
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ConductorConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env("COSTCHAT_SERVER_URL") {
        config.backend.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = env("COSTCHAT_REQUEST_TIMEOUT") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.backend.request_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(model) = env("COSTCHAT_MODEL") {
        config.default_model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(streaming) = env("COSTCHAT_STREAMING") {
        config.streaming = streaming != "0" && streaming.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
    if let Some(dir) = env("COSTCHAT_STATE_DIR") {
        config.state_dir = Some(PathBuf::from(dir));
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Server URL override
    pub base_url: Option<String>,

    /// Chat request timeout override (seconds)
    pub request_timeout_secs: Option<u64>,

    /// Default model override
    pub default_model: Option<String>,

    /// Streaming override
    pub streaming: Option<bool>,

    /// State directory override
    pub state_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set server URL override
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set request timeout override
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Set default model override
    #[must_use]
    pub fn with_default_model(mut self, model: String) -> Self {
        self.default_model = Some(model);
        self
    }

    /// Set streaming override
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = Some(streaming);
        self
    }

    /// Set state directory override
    #[must_use]
    pub fn with_state_dir(mut self, dir: PathBuf) -> Self {
        self.state_dir = Some(dir);
        self
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the overridden values are invalid.
    pub fn apply(&self, config: &mut ConductorConfig) -> Result<(), ConfigError> {
        if self.base_url.is_some()
            || self.request_timeout_secs.is_some()
            || self.default_model.is_some()
            || self.streaming.is_some()
            || self.state_dir.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.base_url {
            config.backend.base_url.clone_from(url);
        }
        if let Some(secs) = self.request_timeout_secs {
            config.backend.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ref model) = self.default_model {
            config.default_model.clone_from(model);
        }
        if let Some(streaming) = self.streaming {
            config.streaming = streaming;
        }
        if self.state_dir.is_some() {
            config.state_dir.clone_from(&self.state_dir);
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
