//! TOML Configuration File Support
//!
//! Configuration for a hosting process, read from
//! `$XDG_CONFIG_HOME/promptline/config.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [openai]
//! api_key = "sk-..."
//! model = "gpt-4o-mini"
//! endpoint = "https://api.openai.com"
//!
//! [ollama]
//! base = "http://127.0.0.1:11434"
//! model = "llama3.1"
//!
//! [tasks]
//! notification_capacity = 100
//!
//! [transport]
//! socket_path = "/run/user/1000/promptline/promptline.sock"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::ProviderDefaults;
use crate::transport::default_socket_path;

/// Default capacity of a notification channel
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 100;

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

/// Tracks where the configuration came from
///
/// Records the highest-priority layer that contributed a value.
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

/// `[openai]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiToml {
    /// Bearer credential
    pub api_key: Option<String>,
    /// Chat model
    pub model: Option<String>,
    /// API host
    pub endpoint: Option<String>,
}

/// `[ollama]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaToml {
    /// Server base URL
    pub base: Option<String>,
    /// Local model
    pub model: Option<String>,
}

/// `[tasks]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksToml {
    /// Notification channel capacity per sink
    pub notification_capacity: Option<usize>,
}

/// `[transport]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// Unix socket path for IPC
    pub socket_path: Option<String>,
}

/// Root of the TOML file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptlineToml {
    /// Remote provider settings
    pub openai: OpenAiToml,
    /// Local provider settings
    pub ollama: OllamaToml,
    /// Task settings
    pub tasks: TasksToml,
    /// Transport settings
    pub transport: TransportToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Configuration of a hosting process
#[derive(Clone, Debug)]
pub struct PromptlineConfig {
    /// Defaults that start options are merged over
    pub provider_defaults: ProviderDefaults,

    /// Notification channel capacity per sink
    pub notification_capacity: usize,

    /// Where the daemon listens
    pub socket_path: PathBuf,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for PromptlineConfig {
    fn default() -> Self {
        Self {
            provider_defaults: ProviderDefaults::default(),
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            socket_path: default_socket_path(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl PromptlineConfig {
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

    /// Check values that would break the runtime
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] for a zero notification capacity or
    /// an empty socket path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.notification_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "tasks.notification_capacity must be at least 1".to_string(),
            ));
        }
        if self.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "transport.socket_path must not be empty".to_string(),
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
/// Returns `$XDG_CONFIG_HOME/promptline/config.toml` (typically
/// `~/.config/promptline/config.toml`).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("promptline").join("config.toml"))
}

/// Load configuration from the default file, the environment and defaults
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<PromptlineConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// With `None`, only defaults and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// the result fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<PromptlineConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration reading environment variables through `env`
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<F>(
    path: Option<PathBuf>,
    env: F,
) -> Result<PromptlineConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = PromptlineConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: PromptlineToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut PromptlineConfig, toml: &PromptlineToml) {
    let defaults = &mut config.provider_defaults;

    if toml.openai.api_key.is_some() {
        defaults.openai_api_key.clone_from(&toml.openai.api_key);
    }
    if let Some(ref model) = toml.openai.model {
        defaults.openai_model.clone_from(model);
    }
    if let Some(ref endpoint) = toml.openai.endpoint {
        defaults.openai_endpoint.clone_from(endpoint);
    }
    if let Some(ref base) = toml.ollama.base {
        defaults.ollama_base.clone_from(base);
    }
    if let Some(ref model) = toml.ollama.model {
        defaults.ollama_model.clone_from(model);
    }

    if let Some(capacity) = toml.tasks.notification_capacity {
        config.notification_capacity = capacity;
    }
    if let Some(ref path) = toml.transport.socket_path {
        config.socket_path = PathBuf::from(path);
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut PromptlineConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());
    let mut from_env = false;
    let defaults = &mut config.provider_defaults;

    if let Some(key) = var("OPENAI_API_KEY") {
        defaults.openai_api_key = Some(key);
        from_env = true;
    }
    if let Some(model) = var("OPENAI_MODEL") {
        defaults.openai_model = model;
        from_env = true;
    }
    if let Some(endpoint) = var("OPENAI_BASE_URL") {
        defaults.openai_endpoint = endpoint;
        from_env = true;
    }
    if let Some(base) = var("OLLAMA_BASE") {
        defaults.ollama_base = base;
        from_env = true;
    }
    if let Some(model) = var("OLLAMA_MODEL") {
        defaults.ollama_model = model;
        from_env = true;
    }
    if let Some(path) = var("PROMPTLINE_SOCKET") {
        config.socket_path = PathBuf::from(path);
        from_env = true;
    }

    if from_env {
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
    /// Socket path override
    pub socket_path: Option<PathBuf>,

    /// Local server base URL override
    pub ollama_base: Option<String>,

    /// Local model override
    pub ollama_model: Option<String>,

    /// Remote model override
    pub openai_model: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set socket path override
    #[must_use]
    pub fn with_socket_path(mut self, path: PathBuf) -> Self {
        self.socket_path = Some(path);
        self
    }

    /// Set local server base override
    #[must_use]
    pub fn with_ollama_base(mut self, base: String) -> Self {
        self.ollama_base = Some(base);
        self
    }

    /// Set local model override
    #[must_use]
    pub fn with_ollama_model(mut self, model: String) -> Self {
        self.ollama_model = Some(model);
        self
    }

    /// Set remote model override
    #[must_use]
    pub fn with_openai_model(mut self, model: String) -> Self {
        self.openai_model = Some(model);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut PromptlineConfig) {
        if self.socket_path.is_some()
            || self.ollama_base.is_some()
            || self.ollama_model.is_some()
            || self.openai_model.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref path) = self.socket_path {
            config.socket_path.clone_from(path);
        }
        if let Some(ref base) = self.ollama_base {
            config.provider_defaults.ollama_base.clone_from(base);
        }
        if let Some(ref model) = self.ollama_model {
            config.provider_defaults.ollama_model.clone_from(model);
        }
        if let Some(ref model) = self.openai_model {
            config.provider_defaults.openai_model.clone_from(model);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
