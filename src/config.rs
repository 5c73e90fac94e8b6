//! Configuration for the governor, staging cache and HTTP surface
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML file
//! (`config/governor.toml` or the path in `GOVERNOR_CONFIG`), then
//! `GOVERNOR__SECTION__KEY` environment variables.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Smallest budget the emergency digest is guaranteed to fit
pub const MIN_BUDGET_TOKENS: usize = 64;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub governor: GovernorConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Staging cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL of the fallback cache used outside any session
    #[serde(default = "default_global_ttl")]
    pub global_ttl_minutes: u64,

    /// TTL of per-session caches
    #[serde(default = "default_session_ttl")]
    pub session_ttl_minutes: u64,

    /// Idle time after which a session is torn down by `sweep_idle`
    #[serde(default = "default_session_idle")]
    pub session_idle_hours: u64,
}

/// Tokenizer used for budget measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    Cl100kBase,
    P50kBase,
    R50kBase,
    /// `len / 4`, no BPE tables required
    Heuristic,
}

/// Response governor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Budget for operations without an explicit entry in `budgets`
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: usize,

    #[serde(default = "default_tokenizer")]
    pub tokenizer: TokenizerKind,

    /// Per-operation token budgets
    #[serde(default = "default_budgets")]
    pub budgets: HashMap<String, usize>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_global_ttl() -> u64 { 5 }
fn default_session_ttl() -> u64 { 30 }
fn default_session_idle() -> u64 { 24 }
fn default_max_tokens() -> usize { 2000 }
fn default_tokenizer() -> TokenizerKind { TokenizerKind::Cl100kBase }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8001 }
fn default_max_body_bytes() -> usize { 16 * 1024 * 1024 }
fn default_log_level() -> String { "info".to_string() }

fn default_budgets() -> HashMap<String, usize> {
    [
        ("stage_data", 500),
        ("inspect_data", 5000),
        ("flatten_data", 4000),
        ("dataframe_query", 8000),
        ("aggregate_data", 8000),
    ]
    .into_iter()
    .map(|(name, budget)| (name.to_string(), budget))
    .collect()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            global_ttl_minutes: default_global_ttl(),
            session_ttl_minutes: default_session_ttl(),
            session_idle_hours: default_session_idle(),
        }
    }
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: default_max_tokens(),
            tokenizer: default_tokenizer(),
            budgets: default_budgets(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl CacheConfig {
    pub fn global_ttl(&self) -> Duration {
        Duration::from_secs(self.global_ttl_minutes * 60)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_minutes * 60)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_hours * 3600)
    }
}

impl GovernorConfig {
    /// Budget for the named operation
    pub fn budget_for(&self, operation: &str) -> usize {
        self.budgets
            .get(operation)
            .copied()
            .unwrap_or(self.default_max_tokens)
    }
}

impl Config {
    /// Load from `.env`, the optional config file and the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = std::env::var("GOVERNOR_CONFIG")
            .unwrap_or_else(|_| "config/governor".to_string());

        let config: Config = ::config::Config::builder()
            .add_source(::config::File::with_name(&path).required(false))
            .add_source(
                ::config::Environment::with_prefix("GOVERNOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string (defaults fill missing keys)
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config: Config = ::config::Config::builder()
            .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the cache or governor cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.cache.global_ttl_minutes == 0 || self.cache.session_ttl_minutes == 0 {
            return Err(Error::Configuration(
                "cache TTLs must be at least one minute".to_string(),
            ));
        }

        if self.governor.default_max_tokens < MIN_BUDGET_TOKENS {
            return Err(Error::Configuration(format!(
                "governor.default_max_tokens {} is below the minimum of {}",
                self.governor.default_max_tokens, MIN_BUDGET_TOKENS
            )));
        }

        if let Some((name, budget)) = self
            .governor
            .budgets
            .iter()
            .find(|(_, budget)| **budget < MIN_BUDGET_TOKENS)
        {
            return Err(Error::Configuration(format!(
                "budget for '{}' is {} tokens, minimum is {}",
                name, budget, MIN_BUDGET_TOKENS
            )));
        }

        Ok(())
    }

    /// Socket address string for the HTTP server
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
