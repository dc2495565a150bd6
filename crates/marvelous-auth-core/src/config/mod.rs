//! Configuration loading and validation.
//!
//! File configuration is JSON5, located at `~/.marvelous-auth/auth.json`.
//! At runtime it is flattened into a [`LiveConfig`] key/value table that
//! remote configuration and configuration-change messages overwrite.

use crate::types::Microservice;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Live key holding the token signing secret.
pub const SECRET_KEY: &str = "secretKey";

/// Live key holding the trusted gateway address.
pub const BASE_ADDRESS: &str = "BaseAddress";

/// Environment variable overriding the signing secret.
pub const SECRET_KEY_ENV: &str = "MARVELOUS_AUTH_SECRET_KEY";

/// Environment variable overriding the trusted gateway address.
pub const BASE_ADDRESS_ENV: &str = "MARVELOUS_AUTH_BASE_ADDRESS";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Token and bootstrap configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Upstream service locations.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Global settings.
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Config {
    /// Load configuration from the default location, then apply
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            tracing::debug!(path = %path.display(), "Loading configuration");
            Self::load(&path)?
        } else {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("auth.json")
    }

    /// Get the state directory.
    ///
    /// Uses `MARVELOUS_AUTH_STATE_DIR` env var if set, otherwise `~/.marvelous-auth`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("MARVELOUS_AUTH_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".marvelous-auth")
        } else {
            PathBuf::from(".marvelous-auth")
        }
    }

    /// Apply `MARVELOUS_AUTH_SECRET_KEY` and `MARVELOUS_AUTH_BASE_ADDRESS`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(SECRET_KEY_ENV).ok(),
            std::env::var(BASE_ADDRESS_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, secret_key: Option<String>, base_address: Option<String>) {
        if let Some(secret) = secret_key.filter(|s| !s.is_empty()) {
            self.auth.secret_key = Some(secret);
        }
        if let Some(address) = base_address.filter(|s| !s.is_empty()) {
            self.server.trusted_gateway = address;
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` describing the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.auth.token_lifetime_minutes <= 0 {
            return Err(ConfigError::Validation(
                "Token lifetime must be positive".to_string(),
            ));
        }

        if self.auth.retry_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "Bootstrap retry interval cannot be 0".to_string(),
            ));
        }

        if matches!(&self.auth.secret_key, Some(secret) if secret.is_empty()) {
            return Err(ConfigError::Validation(
                "Signing secret cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address mode.
    #[serde(default)]
    pub mode: BindMode,

    /// Address of the gateway every inbound call must come from.
    #[serde(default = "default_trusted_gateway")]
    pub trusted_gateway: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            mode: BindMode::default(),
            trusted_gateway: default_trusted_gateway(),
        }
    }
}

const fn default_port() -> u16 {
    5001
}

fn default_trusted_gateway() -> String {
    "127.0.0.1".to_string()
}

/// Server bind mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to localhost only.
    #[default]
    Local,
    /// Bind to all interfaces.
    Public,
    /// Custom bind address.
    Custom(String),
}

impl BindMode {
    /// Host part of the listen address.
    #[must_use]
    pub fn host(&self) -> &str {
        match self {
            Self::Local => "127.0.0.1",
            Self::Public => "0.0.0.0",
            Self::Custom(addr) => addr,
        }
    }
}

/// Token and bootstrap configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// HMAC signing secret.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Token lifetime in minutes.
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_minutes: i64,

    /// Delay between failed credential bootstrap cycles.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Timeout for outbound calls to upstream services.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long a request waits for bootstrap before giving up.
    #[serde(default = "default_startup_wait")]
    pub startup_wait_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            token_lifetime_minutes: default_token_lifetime(),
            retry_interval_secs: default_retry_interval(),
            request_timeout_secs: default_request_timeout(),
            startup_wait_secs: default_startup_wait(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("token_lifetime_minutes", &self.token_lifetime_minutes)
            .field("retry_interval_secs", &self.retry_interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("startup_wait_secs", &self.startup_wait_secs)
            .finish()
    }
}

const fn default_token_lifetime() -> i64 {
    30
}

const fn default_retry_interval() -> u64 {
    60 * 60
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_startup_wait() -> u64 {
    60
}

/// Upstream service locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamConfig {
    /// Base URL of the configuration authority.
    #[serde(default)]
    pub configs_url: Option<String>,

    /// Base URL of the CRM.
    #[serde(default)]
    pub crm_url: Option<String>,

    /// Base URL of Reporting.
    #[serde(default)]
    pub reporting_url: Option<String>,

    /// Path of the configuration endpoint on the configuration authority.
    #[serde(default = "default_configs_path")]
    pub configs_path: String,

    /// Path of the lead export endpoint on the CRM.
    #[serde(default = "default_crm_leads_path")]
    pub crm_leads_path: String,

    /// Path of the lead export endpoint on Reporting.
    #[serde(default = "default_reporting_leads_path")]
    pub reporting_leads_path: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            configs_url: None,
            crm_url: None,
            reporting_url: None,
            configs_path: default_configs_path(),
            crm_leads_path: default_crm_leads_path(),
            reporting_leads_path: default_reporting_leads_path(),
        }
    }
}

fn default_configs_path() -> String {
    "/api/configs/by-service".to_string()
}

fn default_crm_leads_path() -> String {
    "/api/leads/auth".to_string()
}

fn default_reporting_leads_path() -> String {
    "/api/leads/get-all-leads".to_string()
}

/// Global settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Enable debug logging.
    #[serde(default)]
    pub debug: bool,

    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}

/// The running key/value configuration table.
///
/// Seeded from [`Config`], then overwritten by remote configuration and
/// configuration-change messages. Writes are single-key and last-write-wins.
#[derive(Default)]
pub struct LiveConfig {
    values: RwLock<HashMap<String, String>>,
}

impl LiveConfig {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten file configuration into the live table.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let live = Self::new();
        if let Some(secret) = &config.auth.secret_key {
            live.set(SECRET_KEY, secret);
        }
        live.set(BASE_ADDRESS, &config.server.trusted_gateway);

        let urls = [
            (Microservice::MarvelousConfigs, &config.upstream.configs_url),
            (Microservice::MarvelousCrm, &config.upstream.crm_url),
            (Microservice::MarvelousReporting, &config.upstream.reporting_url),
        ];
        for (service, url) in urls {
            if let Some(url) = url {
                live.set(&service.url_key(), url);
            }
        }
        live
    }

    /// Read one key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Overwrite one key, returning the previous value.
    pub fn set(&self, key: &str, value: &str) -> Option<String> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string())
    }

    /// The signing secret, if configured.
    #[must_use]
    pub fn secret_key(&self) -> Option<String> {
        self.get(SECRET_KEY).filter(|s| !s.is_empty())
    }

    /// The trusted gateway address.
    #[must_use]
    pub fn base_address(&self) -> Option<String> {
        self.get(BASE_ADDRESS)
    }

    /// Base URL of an upstream service.
    #[must_use]
    pub fn service_url(&self, service: Microservice) -> Option<String> {
        self.get(&service.url_key())
    }

    /// Sorted copy of the table with secrets redacted.
    #[must_use]
    pub fn redacted_snapshot(&self) -> BTreeMap<String, String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), redact(k, v)))
            .collect()
    }
}

impl fmt::Debug for LiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveConfig")
            .field("values", &self.redacted_snapshot())
            .finish()
    }
}

/// Render a configuration value for logs.
#[must_use]
pub fn redact(key: &str, value: &str) -> String {
    if key.eq_ignore_ascii_case(SECRET_KEY) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}
