//! Configuration loading and constants.
//!
//! Loads application configuration from TOML files and defines constants for
//! response headers, probe thresholds, logging format, and default paths.
//! `AppConfig` is the root configuration struct containing all settings.

use const_format::formatcp;
use serde::Deserialize;
use std::path::Path;

// =============================================================================
// HTTP Response Headers
// =============================================================================
// Health responses must never be served from an intermediate cache: a load
// balancer reading a stale 200 would keep routing traffic to a dead instance.

/// Freshness lifetime for health responses (seconds)
pub const HTTP_CACHE_HEALTH_MAX_AGE: u32 = 0;

pub const CACHE_CONTROL_NO_CACHE: &str = formatcp!(
    "no-cache, no-store, must-revalidate, max-age={}",
    HTTP_CACHE_HEALTH_MAX_AGE
);

// =============================================================================
// Probe Constants
// =============================================================================

/// Elapsed seconds after which a response is reported as slow
pub const DEFAULT_SLOW_THRESHOLD_SECS: f64 = 4.0;

/// Default datastore connection timeout in seconds
pub const DEFAULT_DATASTORE_CONNECT_TIMEOUT_SECS: u64 = 3;

/// Default maximum pooled datastore connections per driver
pub const DEFAULT_DATASTORE_MAX_CONNECTIONS: u32 = 5;

/// Default capacity of the in-process object cache
pub const DEFAULT_MEMORY_CACHE_ENTRIES: u64 = 10_000;

/// Default options table holding the autoload set
pub const DEFAULT_OPTIONS_TABLE: &str = "wp_options";

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default directory holding the `.info` build artifact
pub const DEFAULT_BUILD_ROOT: &str = "./";

/// Default health routes
pub const DEFAULT_HEALTH_ROUTE: &str = "/health";
pub const DEFAULT_HEALTH_REST_ROUTE: &str = formatcp!("{}/check", DEFAULT_HEALTH_ROUTE);

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "vigil=debug,tower_http=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    pub http: HttpServerConfig,
    /// Health evaluation settings
    #[serde(default)]
    pub health: HealthConfig,
    /// Primary datastore and its optional HA fallback
    pub datastore: DatastoreConfig,
    /// Object cache backend
    #[serde(default)]
    pub cache: CacheConfig,
    /// Platform facts reported in the `wp` section
    #[serde(default)]
    pub platform: PlatformConfig,
    /// Endpoint authentication
    #[serde(default)]
    pub auth: AuthConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub tls: TlsConfig,
}

/// TLS mode for the listener
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Plain HTTP, usually behind a terminating proxy or on a private network
    #[default]
    None,
    /// User-provided certificate and key files
    Manual,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub mode: TlsMode,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Health evaluation settings
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Routes serving the health handler
    #[serde(default = "HealthConfig::default_routes")]
    pub routes: Vec<String>,
    /// Responses slower than this are answered with 416
    #[serde(default = "HealthConfig::default_slow_threshold")]
    pub slow_threshold_seconds: f64,
    /// Directory containing the `.info` build artifact
    #[serde(default = "HealthConfig::default_build_root")]
    pub build_root: String,
    /// Pretty-print JSON bodies
    #[serde(default = "HealthConfig::default_pretty")]
    pub pretty: bool,
    /// Render JSON regardless of the `json` parameter or Content-Type
    #[serde(default)]
    pub always_json: bool,
    /// Memory ceiling reported by the runtime section (e.g. "512M")
    pub memory_limit: Option<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            routes: Self::default_routes(),
            slow_threshold_seconds: Self::default_slow_threshold(),
            build_root: Self::default_build_root(),
            pretty: Self::default_pretty(),
            always_json: false,
            memory_limit: None,
        }
    }
}

impl HealthConfig {
    fn default_routes() -> Vec<String> {
        vec![
            DEFAULT_HEALTH_ROUTE.to_string(),
            DEFAULT_HEALTH_REST_ROUTE.to_string(),
        ]
    }

    fn default_slow_threshold() -> f64 {
        DEFAULT_SLOW_THRESHOLD_SECS
    }

    fn default_build_root() -> String {
        DEFAULT_BUILD_ROOT.to_string()
    }

    fn default_pretty() -> bool {
        true
    }
}

/// Datastore connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatastoreConfig {
    /// Primary driver connection URL
    pub url: String,
    /// High-availability driver tried once when the primary cannot connect
    pub fallback_url: Option<String>,
    /// Table holding configuration rows and the autoload flag
    #[serde(default = "DatastoreConfig::default_options_table")]
    pub options_table: String,
    #[serde(default = "DatastoreConfig::default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "DatastoreConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl DatastoreConfig {
    fn default_options_table() -> String {
        DEFAULT_OPTIONS_TABLE.to_string()
    }

    fn default_max_connections() -> u32 {
        DEFAULT_DATASTORE_MAX_CONNECTIONS
    }

    fn default_connect_timeout() -> u64 {
        DEFAULT_DATASTORE_CONNECT_TIMEOUT_SECS
    }
}

/// Which object cache implementation backs the cache probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Non-persistent, in-process cache
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Redis connection URL (redis backend only)
    pub url: Option<String>,
    /// Prefix prepended to every cache key
    #[serde(default)]
    pub key_prefix: String,
    /// Capacity of the in-process cache (memory backend only)
    #[serde(default = "CacheConfig::default_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            url: None,
            key_prefix: String::new(),
            max_entries: Self::default_max_entries(),
        }
    }
}

impl CacheConfig {
    fn default_max_entries() -> u64 {
        DEFAULT_MEMORY_CACHE_ENTRIES
    }
}

/// Platform facts reported in the `wp` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformConfig {
    /// Platform release string
    pub version: Option<String>,
    /// Schema version the code expects the datastore to be at
    pub schema_version: Option<u64>,
    /// External command whose output is reported as `cli`; empty disables it
    #[serde(default)]
    pub cli_command: Vec<String>,
}

/// Endpoint authentication
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Whether callers must present a bearer token at all
    #[serde(default = "AuthConfig::default_require_authentication")]
    pub require_authentication: bool,
    /// Bearer tokens allowed to read the endpoint
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Bearer tokens with elevated privilege (cache flush)
    #[serde(default)]
    pub admin_tokens: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_authentication: Self::default_require_authentication(),
            tokens: Vec::new(),
            admin_tokens: Vec::new(),
        }
    }
}

impl AuthConfig {
    fn default_require_authentication() -> bool {
        true
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.datastore.url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "datastore.url must not be empty".to_string(),
            ));
        }

        if !is_sql_identifier(&self.datastore.options_table) {
            return Err(ConfigError::Validation(format!(
                "datastore.options_table '{}' is not a plain identifier",
                self.datastore.options_table
            )));
        }

        if self.cache.backend == CacheBackend::Redis && self.cache.url.is_none() {
            return Err(ConfigError::Validation(
                "cache.url is required for the redis backend".to_string(),
            ));
        }

        if self.http.tls.mode == TlsMode::Manual
            && (self.http.tls.cert_path.is_none() || self.http.tls.key_path.is_none())
        {
            return Err(ConfigError::Validation(
                "http.tls.cert_path and http.tls.key_path are required for manual TLS".to_string(),
            ));
        }

        let threshold = self.health.slow_threshold_seconds;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "health.slow_threshold_seconds must be a positive number, got {}",
                threshold
            )));
        }

        if self.health.routes.iter().any(|r| !r.starts_with('/')) {
            return Err(ConfigError::Validation(
                "health.routes entries must start with '/'".to_string(),
            ));
        }

        Ok(())
    }
}

/// Table names are interpolated into SQL, so only `[A-Za-z0-9_]` is accepted.
fn is_sql_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
