//! Server configuration.
//!
//! Layers, later ones winning: built-in defaults, an optional YAML file,
//! then `ROLEGATE_`-prefixed environment variables with `__` between
//! nested keys. The assembled value is validated before it is returned.
//!
//! ```ignore
//! use rolegate_server::config::ServerConfig;
//!
//! let config = ServerConfig::load("config/rolegate.yaml")?;
//! let from_env_only = ServerConfig::from_env()?;
//! ```

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use rolegate_domain::naming::{ACCOUNT_GROUP, ACCOUNT_VERSION};
use rolegate_domain::StoreCacheConfig;

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Policy engine settings
    #[serde(default)]
    pub fga: FgaSettings,

    /// Workspace API settings
    #[serde(default)]
    pub workspace: WorkspaceSettings,

    /// Role catalog settings
    #[serde(default)]
    pub roles: RoleSettings,

    /// Identity directory settings
    #[serde(default)]
    pub identity: IdentitySettings,

    /// Invite record settings
    #[serde(default)]
    pub invites: InviteSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// Server network settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deadline applied to each gate invocation and role operation, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Expose error details to callers (development only)
    #[serde(default)]
    pub detailed_errors: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            detailed_errors: false,
        }
    }
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

/// Policy engine settings.
///
/// ```yaml
/// fga:
///   api_url: http://openfga:8080
///   cache_ttl_secs: 300
///   cache_capacity: 10
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FgaSettings {
    /// Base URL of the OpenFGA-compatible HTTP API
    #[serde(default = "default_fga_url")]
    pub api_url: String,

    /// Bearer token sent to the engine
    #[serde(default)]
    pub api_token: Option<String>,

    /// Lifetime of cached store and model ids
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached store and model ids
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
}

impl Default for FgaSettings {
    fn default() -> Self {
        Self {
            api_url: default_fga_url(),
            api_token: None,
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl FgaSettings {
    pub fn cache_config(&self) -> StoreCacheConfig {
        StoreCacheConfig::default()
            .with_max_capacity(self.cache_capacity)
            .with_ttl(Duration::from_secs(self.cache_ttl_secs))
    }
}

fn default_fga_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_capacity() -> u64 {
    10
}

/// Workspace API settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WorkspaceSettings {
    /// Base URL of the workspace API host; paths are rewritten per account
    #[serde(default = "default_workspace_url")]
    pub api_url: String,

    /// Bearer token
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            api_url: default_workspace_url(),
            token: None,
        }
    }
}

fn default_workspace_url() -> String {
    "https://localhost:6443".to_string()
}

/// Role catalog settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RoleSettings {
    /// Path of the YAML role catalog
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Permission required to assign and remove roles on a resource
    #[serde(default = "default_manage_permission")]
    pub manage_permission: String,

    /// Permission required to list the members of a resource
    #[serde(default = "default_read_permission")]
    pub read_permission: String,
}

impl Default for RoleSettings {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            manage_permission: default_manage_permission(),
            read_permission: default_read_permission(),
        }
    }
}

fn default_catalog_path() -> String {
    "roles.yaml".to_string()
}

fn default_manage_permission() -> String {
    "manage_iam_roles".to_string()
}

fn default_read_permission() -> String {
    "get_iam_roles".to_string()
}

/// Identity directory settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct IdentitySettings {
    /// Optional YAML list of known users
    #[serde(default)]
    pub seed_path: Option<String>,
}

/// Where invite records are created.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct InviteSettings {
    #[serde(default = "default_invite_group")]
    pub group: String,

    #[serde(default = "default_invite_version")]
    pub version: String,

    #[serde(default = "default_invite_kind")]
    pub kind: String,

    /// Namespace for namespaced invite kinds
    #[serde(default)]
    pub namespace: Option<String>,
}

impl Default for InviteSettings {
    fn default() -> Self {
        Self {
            group: default_invite_group(),
            version: default_invite_version(),
            kind: default_invite_kind(),
            namespace: None,
        }
    }
}

fn default_invite_group() -> String {
    ACCOUNT_GROUP.to_string()
}

fn default_invite_version() -> String {
    ACCOUNT_VERSION.to_string()
}

fn default_invite_kind() -> String {
    "Invite".to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsSettings {
    /// Enable metrics endpoint
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// Failure to assemble a [`ServerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn invalid(message: impl Into<String>) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.into(),
    }
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), ConfigLoadError> {
    if condition {
        Ok(())
    } else {
        Err(invalid(message()))
    }
}

fn require_url(key: &str, value: &str) -> Result<(), ConfigLoadError> {
    ensure(!value.trim().is_empty(), || format!("{key} cannot be empty"))?;
    ensure(
        value.starts_with("http://") || value.starts_with("https://"),
        || format!("{key} must be an http(s) URL, got: {value}"),
    )
}

fn require_text(key: &str, value: &str) -> Result<(), ConfigLoadError> {
    ensure(!value.trim().is_empty(), || format!("{key} cannot be empty"))
}

impl ServerConfig {
    /// Loads `path` (YAML) over the defaults, then applies `ROLEGATE_*`
    /// overrides: `ROLEGATE_SERVER__PORT=9090` sets `server.port`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Self::assemble(Some(path))
    }

    /// Defaults plus `ROLEGATE_*` overrides, for deployments without a file.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        Self::assemble(None)
    }

    fn assemble(file: Option<&Path>) -> Result<Self, ConfigLoadError> {
        let mut builder = Config::builder().add_source(Config::try_from(&ServerConfig::default())?);
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        let assembled: ServerConfig = builder
            .add_source(
                Environment::with_prefix("ROLEGATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        assembled.validate()?;
        Ok(assembled)
    }

    /// Checks values the deserializer cannot. Errors name the offending key.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        ensure(self.server.port > 0, || "server.port must be greater than 0".into())?;
        ensure(self.server.request_timeout_secs > 0, || {
            "server.request_timeout_secs must be greater than 0".into()
        })?;

        require_url("fga.api_url", &self.fga.api_url)?;
        ensure(self.fga.cache_capacity > 0, || {
            "fga.cache_capacity must be greater than 0".into()
        })?;
        require_url("workspace.api_url", &self.workspace.api_url)?;

        require_text("roles.catalog_path", &self.roles.catalog_path)?;
        require_text("roles.manage_permission", &self.roles.manage_permission)?;
        require_text("roles.read_permission", &self.roles.read_permission)?;
        require_text("invites.kind", &self.invites.kind)?;
        require_text("invites.version", &self.invites.version)?;

        let level = self.logging.level.to_lowercase();
        ensure(LOG_LEVELS.contains(&level.as_str()), || {
            format!(
                "logging.level must be one of {}, got: {}",
                LOG_LEVELS.join(", "),
                self.logging.level
            )
        })
    }
}
