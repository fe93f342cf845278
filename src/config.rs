// Layered configuration for the admissions binaries
// defaults -> optional config/admissions.toml -> ADMISSIONS__* environment variables

//! # Configuration
//!
//! Every setting has a default, so the server starts with no files at all.
//! A TOML file overrides the defaults and environment variables override the
//! file. Nested keys use a double underscore:
//!
//! ```text
//! ADMISSIONS__SERVER__PORT=8080
//! ADMISSIONS__ENGINE__CACHE_ACTIVE_WORKFLOWS=false
//! ADMISSIONS__WORKFLOWS_FILE=config/workflows.json
//! ```
//!
//! ## Rust Learning Notes:
//!
//! `#[serde(default)]` on each section means a file only has to mention the
//! keys it changes; missing keys fall back to the `Default` impls below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::api::ApiConfig;
use crate::engine::events::DEFAULT_EVENT_BUFFER;
use crate::models::Workflow;

/// Default location of the optional config file
pub const DEFAULT_CONFIG_FILE: &str = "config/admissions";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "ADMISSIONS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// JSON array of workflows registered at startup
    #[serde(default)]
    pub workflows_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the domain event broadcast channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Cache active workflow lookups and pinned snapshots
    #[serde(default = "default_true")]
    pub cache_active_workflows: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
            cache_active_workflows: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration, reading `path` (or the default file) when present
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let file = path.unwrap_or(DEFAULT_CONFIG_FILE);

        config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name(file).required(path.is_some()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Settings for the HTTP server
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            port: self.server.port,
            host: self.server.host.clone(),
            cors_enabled: self.server.cors_enabled,
        }
    }
}

/// Read a JSON array of workflows, e.g. the file named by `workflows_file`
pub fn load_workflows(path: &Path) -> anyhow::Result<Vec<Workflow>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
    parse_workflows(&raw).map_err(|e| anyhow::anyhow!("invalid workflow file {}: {}", path.display(), e))
}

/// Accepts either a single workflow object or an array of them
pub fn parse_workflows(raw: &str) -> serde_json::Result<Vec<Workflow>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if value.is_array() {
        serde_json::from_value(value)
    } else {
        serde_json::from_value(value).map(|workflow| vec![workflow])
    }
}
