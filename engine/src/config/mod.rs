//! Configuration management
//!
//! This module handles loading, validation, and management of the gateway
//! configuration. Configuration is stored in TOML format at
//! ~/.chorus/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **server**: Bind address, CORS origins, identity header
//! - **provider**: OpenAI-compatible endpoint and credential source
//! - **dispatch**: Fan-out cap, per-call timeout, retry backoff
//! - **synthesis**: Reconciliation model and limits
//! - **memory**: Conversation memory condensation
//! - **backends**: The backend registry (identifier, label, upstream model)
//!
//! # Examples
//!
//! ```no_run
//! use chorus_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Bind address: {}", config.server.bind);
//! println!("Backends: {}", config.backends.len());
//! # Ok(())
//! # }
//! ```

use sdk::errors::GatewayError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Fan-out settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Reconciliation settings
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Conversation memory settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Backend registry
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendEntry>,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Origins allowed by CORS; empty disables the CORS layer
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Header carrying the caller identity resolved by the upstream auth layer
    #[serde(default = "default_identity_header")]
    pub identity_header: String,

    /// Interval between keep-alive comments on open event streams (0 disables)
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

/// Upstream OpenAI-compatible provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the chat completions API
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Hard ceiling for any single HTTP request (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    // Note: API key stored in the environment, not in config
}

/// Fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of backends per request; extra selections are dropped
    #[serde(default = "default_max_backends")]
    pub max_backends: usize,

    /// Timeout for one invocation attempt (seconds)
    #[serde(default = "default_invoke_timeout_secs")]
    pub invoke_timeout_secs: u64,

    /// Pause before the single retry (milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Instruction appended to every fan-out prompt
    #[serde(default = "default_prompt_suffix")]
    pub prompt_suffix: String,
}

/// Reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Upstream model used for the reconciliation call
    #[serde(default = "default_synthesis_model")]
    pub model: String,

    /// Display label of the reconciliation model
    #[serde(default = "default_synthesis_label")]
    pub label: String,

    /// Timeout for the reconciliation call (seconds)
    #[serde(default = "default_synthesis_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_synthesis_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_frequency_penalty")]
    pub frequency_penalty: f32,
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Enable memory for identified callers
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Upstream model used for summarization and fact extraction
    #[serde(default = "default_memory_model")]
    pub model: String,

    /// Number of recent turns loaded before condensing
    #[serde(default = "default_recent_turns")]
    pub recent_turns: i64,

    /// Token budget given to the summarizer
    #[serde(default = "default_summary_token_budget")]
    pub summary_token_budget: u32,

    /// Upper bound on the stored durable summary (characters)
    #[serde(default = "default_max_summary_chars")]
    pub max_summary_chars: usize,

    /// Timeout for summarization and extraction calls (seconds)
    #[serde(default = "default_memory_timeout_secs")]
    pub timeout_secs: u64,
}

/// One entry of the backend registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendEntry {
    /// Short key used by clients (e.g. "deepseek")
    pub id: String,

    /// Display label (e.g. "DeepSeek")
    pub label: String,

    /// Upstream model name
    pub model: String,
}

impl BackendEntry {
    pub fn new(id: &str, label: &str, model: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            model: model.to_string(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.chorus")
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:5174".to_string(),
    ]
}

fn default_identity_header() -> String {
    "x-owner-id".to_string()
}

fn default_keep_alive_secs() -> u64 {
    15
}

fn default_provider_base_url() -> String {
    "https://router.huggingface.co/v1".to_string()
}

fn default_api_key_env() -> String {
    "HF_TOKEN".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_max_backends() -> usize {
    4
}

fn default_invoke_timeout_secs() -> u64 {
    90
}

fn default_retry_backoff_ms() -> u64 {
    300
}

fn default_prompt_suffix() -> String {
    "Respond in English only.".to_string()
}

fn default_synthesis_model() -> String {
    "openai/gpt-oss-20b:novita".to_string()
}

fn default_synthesis_label() -> String {
    "GPT-OSS".to_string()
}

fn default_synthesis_timeout_secs() -> u64 {
    90
}

fn default_synthesis_max_tokens() -> u32 {
    1500
}

fn default_frequency_penalty() -> f32 {
    1.2
}

fn default_memory_model() -> String {
    "meta-llama/Llama-3.1-8B-Instruct:novita".to_string()
}

fn default_recent_turns() -> i64 {
    6
}

fn default_summary_token_budget() -> u32 {
    200
}

fn default_max_summary_chars() -> usize {
    2000
}

fn default_memory_timeout_secs() -> u64 {
    30
}

fn default_backends() -> Vec<BackendEntry> {
    vec![
        BackendEntry::new("deepseek", "DeepSeek", "deepseek-ai/DeepSeek-V3.2:novita"),
        BackendEntry::new("llama", "Llama", "meta-llama/Llama-3.1-8B-Instruct:novita"),
        BackendEntry::new("glm", "GLM-4.6", "zai-org/GLM-4.6:novita"),
        BackendEntry::new("qwen", "Qwen", "Qwen/Qwen2.5-72B-Instruct:novita"),
        BackendEntry::new("essential", "Essential", "EssentialAI/rnj-1-instruct:together"),
        BackendEntry::new("moonshot", "Kimi", "moonshotai/Kimi-K2-Instruct-0905"),
    ]
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
            identity_header: default_identity_header(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_backends: default_max_backends(),
            invoke_timeout_secs: default_invoke_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
            prompt_suffix: default_prompt_suffix(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            model: default_synthesis_model(),
            label: default_synthesis_label(),
            timeout_secs: default_synthesis_timeout_secs(),
            max_tokens: default_synthesis_max_tokens(),
            frequency_penalty: default_frequency_penalty(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_memory_model(),
            recent_turns: default_recent_turns(),
            summary_token_budget: default_summary_token_budget(),
            max_summary_chars: default_max_summary_chars(),
            timeout_secs: default_memory_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            server: ServerConfig::default(),
            provider: ProviderConfig::default(),
            dispatch: DispatchConfig::default(),
            synthesis: SynthesisConfig::default(),
            memory: MemoryConfig::default(),
            backends: default_backends(),
        }
    }
}

impl DispatchConfig {
    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl SynthesisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl MemoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default location (~/.chorus/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default
    /// configuration. Validates the configuration after loading.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, GatewayError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, GatewayError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| GatewayError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, GatewayError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, GatewayError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                GatewayError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| GatewayError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| GatewayError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.chorus/config.toml)
    fn default_config_path() -> Result<PathBuf, GatewayError> {
        let home = dirs::home_dir().ok_or_else(|| {
            GatewayError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(".chorus").join("config.toml"))
    }

    /// Replace the configured log level, e.g. from `--log`
    pub fn set_log_level(&mut self, level: &str) -> Result<(), GatewayError> {
        check_log_level(level)?;
        self.core.log_level = level.to_string();
        Ok(())
    }

    /// Path of the SQLite conversation store inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("chorus.db")
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates the log level and numeric limits
    /// - Rejects an empty or duplicated backend registry
    /// - Expands ~ in the data directory
    fn validate_and_process(&mut self) -> Result<(), GatewayError> {
        check_log_level(&self.core.log_level)?;

        if self.dispatch.max_backends == 0 {
            return Err(GatewayError::Config(
                "dispatch.max_backends must be at least 1".to_string(),
            ));
        }

        if self.dispatch.invoke_timeout_secs == 0 || self.synthesis.timeout_secs == 0 {
            return Err(GatewayError::Config(
                "timeouts must be at least 1 second".to_string(),
            ));
        }

        if self.memory.recent_turns < 0 {
            return Err(GatewayError::Config(
                "memory.recent_turns must not be negative".to_string(),
            ));
        }

        if self.backends.is_empty() {
            return Err(GatewayError::Config(
                "At least one backend must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if backend.id.trim().is_empty() || backend.model.trim().is_empty() {
                return Err(GatewayError::Config(
                    "Backend entries need a non-empty id and model".to_string(),
                ));
            }
            if !seen.insert(backend.id.as_str()) {
                return Err(GatewayError::Config(format!(
                    "Duplicate backend id '{}'",
                    backend.id
                )));
            }
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        Ok(())
    }
}

/// Log levels accepted in config and on the command line
pub const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

fn check_log_level(level: &str) -> Result<(), GatewayError> {
    if LOG_LEVELS.contains(&level) {
        Ok(())
    } else {
        Err(GatewayError::Config(format!(
            "Invalid log level '{}'. Must be one of: {}",
            level,
            LOG_LEVELS.join(", ")
        )))
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, GatewayError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| GatewayError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            GatewayError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| GatewayError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
