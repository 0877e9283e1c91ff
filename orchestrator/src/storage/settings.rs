//! Settings file management

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::errors::ArkError;
use crate::logs::LogLevel;
use crate::storage::ssh_users::DEFAULT_SSH_USER;

pub const DEFAULT_SETTINGS_PATH: &str = "/etc/ark/settings.json";

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Directory for daily rolling log files
    #[serde(default)]
    pub log_dir: Option<String>,

    /// HTTP listener
    #[serde(default)]
    pub server: ServerSettings,

    /// Externally reachable base URL of this service
    #[serde(default)]
    pub public_host: String,

    /// State directory; memory-only when empty
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Login used for hosts without an override
    #[serde(default = "default_ssh_user")]
    pub default_ssh_user: String,

    #[serde(default)]
    pub jenkins: JenkinsSettings,

    #[serde(default)]
    pub tailscale: TailscaleSettings,

    #[serde(default)]
    pub mesh: MeshSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    /// Seconds between reconciliation passes
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Maximum seconds to wait for a graceful shutdown
    #[serde(default = "default_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_data_dir() -> String {
    "/var/lib/ark".to_string()
}

fn default_ssh_user() -> String {
    DEFAULT_SSH_USER.to_string()
}

fn default_reconcile_interval() -> u64 {
    5
}

fn default_shutdown_delay() -> u64 {
    30
}

fn default_timeout() -> u64 {
    30
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(SecretString::from))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            public_host: String::new(),
            data_dir: default_data_dir(),
            default_ssh_user: default_ssh_user(),
            jenkins: JenkinsSettings::default(),
            tailscale: TailscaleSettings::default(),
            mesh: MeshSettings::default(),
            retry: RetrySettings::default(),
            reconcile_interval_secs: default_reconcile_interval(),
            max_shutdown_delay_secs: default_shutdown_delay(),
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    5050
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Jenkins settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JenkinsSettings {
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub user: String,

    #[serde(default, deserialize_with = "deserialize_secret", skip_serializing)]
    pub api_token: Option<SecretString>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_queue_resolve_window")]
    pub queue_resolve_window_ms: u64,

    #[serde(default = "default_queue_poll_interval")]
    pub queue_poll_interval_ms: u64,
}

fn default_queue_resolve_window() -> u64 {
    6000
}

fn default_queue_poll_interval() -> u64 {
    350
}

impl Default for JenkinsSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user: String::new(),
            api_token: None,
            timeout_secs: default_timeout(),
            queue_resolve_window_ms: default_queue_resolve_window(),
            queue_poll_interval_ms: default_queue_poll_interval(),
        }
    }
}

/// Tailscale settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailscaleSettings {
    #[serde(default = "default_tailscale_api")]
    pub api_base_url: String,

    #[serde(default, deserialize_with = "deserialize_secret", skip_serializing)]
    pub api_key: Option<SecretString>,

    #[serde(default)]
    pub tailnet: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_tailscale_api() -> String {
    "https://api.tailscale.com/api/v2".to_string()
}

impl Default for TailscaleSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_tailscale_api(),
            api_key: None,
            tailnet: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Mesh directory cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshSettings {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    #[serde(default = "default_window")]
    pub stale_ttl_secs: u64,

    #[serde(default = "default_window")]
    pub recency_window_secs: u64,

    #[serde(default = "default_mesh_cidr")]
    pub cidr: String,
}

fn default_refresh_interval() -> u64 {
    15
}

fn default_window() -> u64 {
    600
}

fn default_mesh_cidr() -> String {
    "100.64.0.0/10".to_string()
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            stale_ttl_secs: default_window(),
            recency_window_secs: default_window(),
            cidr: default_mesh_cidr(),
        }
    }
}

/// Upstream retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    5000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl Settings {
    /// Override fields from environment variables as returned by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ArkError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(port) = get("ARK_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ArkError::ConfigError(format!("ARK_PORT is not a port: {:?}", port)))?;
        }
        if let Some(host) = get("ARK_HOST") {
            self.server.host = host;
        }
        if let Some(public_host) = get("ARK_PUBLIC_HOST") {
            self.public_host = public_host;
        }
        if let Some(dir) = get("ARK_DATA_DIR") {
            self.data_dir = dir;
        }
        if let Some(level) = get("ARK_LOG_LEVEL") {
            self.log_level = level.parse().map_err(ArkError::ConfigError)?;
        }
        if let Some(user) = get("ARK_DEFAULT_SSH_USER") {
            self.default_ssh_user = user;
        }
        if let Some(url) = get("JENKINS_BASE_URL") {
            self.jenkins.base_url = url;
        }
        if let Some(user) = get("JENKINS_USER") {
            self.jenkins.user = user;
        }
        if let Some(token) = get("JENKINS_API_TOKEN") {
            self.jenkins.api_token = Some(SecretString::from(token));
        }
        if let Some(key) = get("TAILSCALE_API_KEY") {
            self.tailscale.api_key = Some(SecretString::from(key));
        }
        if let Some(tailnet) = get("TAILSCALE_TAILNET") {
            self.tailscale.tailnet = tailnet;
        }
        Ok(())
    }

    /// Check required values and normalize URLs in place.
    ///
    /// Every missing value is reported in one error.
    pub fn validate(&mut self) -> Result<(), ArkError> {
        let mut missing = Vec::new();
        if self.jenkins.base_url.trim().is_empty() {
            missing.push("JENKINS_BASE_URL");
        }
        if self.jenkins.user.trim().is_empty() {
            missing.push("JENKINS_USER");
        }
        if self.jenkins.api_token.is_none() {
            missing.push("JENKINS_API_TOKEN");
        }
        if self.tailscale.api_key.is_none() {
            missing.push("TAILSCALE_API_KEY");
        }
        if self.tailscale.tailnet.trim().is_empty() {
            missing.push("TAILSCALE_TAILNET");
        }
        if self.public_host.trim().is_empty() {
            missing.push("ARK_PUBLIC_HOST");
        }
        if !missing.is_empty() {
            return Err(ArkError::ConfigError(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        self.public_host = normalize_base_url(&self.public_host, "ARK_PUBLIC_HOST")?;
        self.jenkins.base_url = normalize_base_url(&self.jenkins.base_url, "JENKINS_BASE_URL")?;
        self.mesh
            .cidr
            .trim()
            .parse::<ipnet::IpNet>()
            .map_err(|e| ArkError::ConfigError(format!("invalid mesh cidr: {}", e)))?;
        if self.retry.max_attempts == 0 {
            return Err(ArkError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reduce `raw` to `scheme://host[:port]`, rejecting anything but plain http(s)
pub fn normalize_base_url(raw: &str, name: &str) -> Result<String, ArkError> {
    let raw = raw.trim().trim_end_matches('/');
    let url = Url::parse(raw).map_err(|_| {
        ArkError::ConfigError(format!(
            "{} must be a valid URL with scheme (http:// or https://), got: {:?}",
            name, raw
        ))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ArkError::ConfigError(format!(
            "{} must use http or https, got: {:?}",
            name,
            url.scheme()
        )));
    }
    let Some(host) = url.host_str() else {
        return Err(ArkError::ConfigError(format!("{} has no host: {:?}", name, raw)));
    };
    if !url.username().is_empty() || url.password().is_some() {
        return Err(ArkError::ConfigError(format!(
            "{} must not include userinfo",
            name
        )));
    }

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}
