//! Configuration loading and resolution
//!
//! Configuration is resolved in priority order:
//! 1. Command-line argument (highest priority, applied by the binary)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not fatal: a warning is logged and defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "PWATCH_CONFIG";
/// Environment variable holding the Reddit OAuth client id
pub const REDDIT_CLIENT_ID_ENV: &str = "PWATCH_REDDIT_CLIENT_ID";
/// Environment variable holding the Reddit OAuth client secret
pub const REDDIT_CLIENT_SECRET_ENV: &str = "PWATCH_REDDIT_CLIENT_SECRET";
/// Environment variable holding the OpenAI API key
pub const OPENAI_API_KEY_ENV: &str = "PWATCH_OPENAI_API_KEY";

/// Root of the TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub reddit: RedditConfig,
    pub openai: OpenAiConfig,
    pub logging: LoggingConfig,
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// `[pipeline]` section: filtering, batching and retry tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Documents per batch
    pub batch_size: usize,
    /// Maximum classification attempts per document
    pub max_retries: u32,
    /// Base of the exponential backoff, in seconds
    pub base_delay_secs: u64,
    /// Pause between batches, in seconds
    pub batch_cooldown_secs: u64,
    /// Token budget of a document body (4 characters per token)
    pub max_tokens: usize,
    /// Minimum whitespace-separated words in a body
    pub min_words: usize,
    /// Accepted language (ISO 639-1)
    pub language: String,
    /// Classifier response meaning "match", compared literally
    pub affirmative_label: String,
    /// Instruction sent as the user prompt when a request carries none
    pub instruction: String,
    /// Capacity of the outcome channel between submitter and emitter
    pub channel_capacity: usize,
    /// Upper bound accepted for `data_num`
    pub max_data_num: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_retries: 3,
            base_delay_secs: 20,
            batch_cooldown_secs: 20,
            max_tokens: 4000,
            min_words: 20,
            language: "en".to_string(),
            affirmative_label: "Yes".to_string(),
            instruction: "Please classify the post correctly".to_string(),
            channel_capacity: 32,
            max_data_num: 1000,
        }
    }
}

/// Approximate characters per model token
const CHARS_PER_TOKEN: usize = 4;

impl PipelineConfig {
    /// Character budget derived from the token budget
    pub fn char_budget(&self) -> usize {
        self.max_tokens.saturating_mul(CHARS_PER_TOKEN)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let zero_fields = [
            ("batch_size", self.batch_size == 0),
            ("max_retries", self.max_retries == 0),
            ("max_tokens", self.max_tokens == 0),
            ("channel_capacity", self.channel_capacity == 0),
            ("max_data_num", self.max_data_num == 0),
        ];
        for (name, is_zero) in zero_fields {
            if is_zero {
                return Err(Error::Config(format!("pipeline.{} must be at least 1", name)));
            }
        }
        if self.max_tokens.checked_mul(CHARS_PER_TOKEN).is_none() {
            return Err(Error::Config(format!(
                "pipeline.max_tokens is too large ({})",
                self.max_tokens
            )));
        }
        if self.language.trim().is_empty() {
            return Err(Error::Config("pipeline.language must not be empty".to_string()));
        }
        Ok(())
    }
}

/// `[reddit]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
    pub subreddit: String,
    /// Client-side request budget
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: format!("pwatch/{}", env!("CARGO_PKG_VERSION")),
            subreddit: "all".to_string(),
            requests_per_minute: 60,
            timeout_secs: 30,
        }
    }
}

/// `[openai]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 120,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Fill secrets from the environment (environment wins over TOML)
    pub fn apply_env_overrides(&mut self) {
        self.reddit.client_id = resolve_secret(
            "Reddit client id",
            REDDIT_CLIENT_ID_ENV,
            self.reddit.client_id.take(),
        );
        self.reddit.client_secret = resolve_secret(
            "Reddit client secret",
            REDDIT_CLIENT_SECRET_ENV,
            self.reddit.client_secret.take(),
        );
        self.openai.api_key = resolve_secret(
            "OpenAI API key",
            OPENAI_API_KEY_ENV,
            self.openai.api_key.take(),
        );
    }
}

/// Load configuration following the resolution order
///
/// An explicit path (argument or `PWATCH_CONFIG`) must exist. Discovered default
/// locations are optional; without one the compiled defaults are used.
pub fn load_config(cli_path: Option<&Path>) -> Result<TomlConfig> {
    let explicit = cli_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

    let mut config = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!("Config file not found: {}", path.display())));
            }
            info!("Loading configuration from {}", path.display());
            TomlConfig::from_file(&path)?
        }
        None => match default_config_path() {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                TomlConfig::from_file(&path)?
            }
            None => {
                warn!("No config file found, using compiled defaults");
                TomlConfig::default()
            }
        },
    };

    config.apply_env_overrides();
    config.pipeline.validate()?;
    Ok(config)
}

/// First existing config file among the platform locations
fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("pwatch").join("config.toml"));
    let system_config = PathBuf::from("/etc/pwatch/config.toml");

    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }
    None
}

/// Resolve a secret from ENV then TOML, warning when both are set
pub fn resolve_secret(name: &str, env_var: &str, toml_value: Option<String>) -> Option<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_key(v));
    let toml_value = toml_value.filter(|v| is_valid_key(v));

    match (env_value, toml_value) {
        (Some(env), Some(_)) => {
            warn!("{} found in both environment and TOML. Using environment.", name);
            Some(env)
        }
        (Some(env), None) => Some(env),
        (None, toml) => toml,
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
