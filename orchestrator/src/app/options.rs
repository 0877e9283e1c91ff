//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::registry::RegistryOptions;
use crate::errors::ArkError;
use crate::http::{BasicAuth, ProxyOptions};
use crate::jobs::JenkinsOptions;
use crate::logs::LogOptions;
use crate::mesh::MeshOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::storage::ssh_users::DEFAULT_SSH_USER;
use crate::utils::{CooldownOptions, RetryOptions};
use crate::workers::reconciler;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Jenkins connection
    pub jenkins: JenkinsClientOptions,

    /// Tailscale connection
    pub tailscale: TailscaleClientOptions,

    /// Mesh directory caching and classification
    pub mesh: MeshOptions,

    /// Reconciler worker options
    pub reconciler: reconciler::Options,

    /// Registry options
    pub registry: RegistryOptions,

    /// Instance proxy
    pub proxy: ProxyOptions,

    /// Login used when no override matches a host
    pub default_ssh_user: String,

    /// Logging
    pub log: LogOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions::default(),
            server: ServerOptions::default(),
            jenkins: JenkinsClientOptions::default(),
            tailscale: TailscaleClientOptions::default(),
            mesh: MeshOptions::default(),
            reconciler: reconciler::Options::default(),
            registry: RegistryOptions::default(),
            proxy: ProxyOptions::default(),
            default_ssh_user: DEFAULT_SSH_USER.to_string(),
            log: LogOptions::default(),
        }
    }
}

impl AppOptions {
    /// Build options from validated settings
    pub fn from_settings(settings: &Settings) -> Result<Self, ArkError> {
        let mesh_cidr = settings
            .mesh
            .cidr
            .trim()
            .parse()
            .map_err(|e| ArkError::ConfigError(format!("invalid mesh cidr: {}", e)))?;

        let retry = RetryOptions {
            max_attempts: settings.retry.max_attempts.max(1),
            cooldown: CooldownOptions {
                base_delay: Duration::from_millis(settings.retry.base_delay_ms),
                max_delay: Duration::from_millis(settings.retry.max_delay_ms),
                multiplier: 2.0,
            },
        };

        let jenkins_auth = settings
            .jenkins
            .api_token
            .clone()
            .map(|token| BasicAuth::Token {
                user: settings.jenkins.user.clone(),
                token,
            });

        Ok(Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
            },
            storage: StorageOptions {
                layout: Some(StorageLayout::new(&settings.data_dir)),
            },
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            jenkins: JenkinsClientOptions {
                base_url: settings.jenkins.base_url.clone(),
                auth: jenkins_auth,
                timeout: Duration::from_secs(settings.jenkins.timeout_secs),
                runner: JenkinsOptions {
                    queue_resolve_window: Duration::from_millis(
                        settings.jenkins.queue_resolve_window_ms,
                    ),
                    queue_poll_interval: Duration::from_millis(
                        settings.jenkins.queue_poll_interval_ms,
                    ),
                    retry,
                },
            },
            tailscale: TailscaleClientOptions {
                api_base_url: settings.tailscale.api_base_url.clone(),
                auth: settings.tailscale.api_key.clone().map(BasicAuth::ApiKey),
                tailnet: settings.tailscale.tailnet.clone(),
                timeout: Duration::from_secs(settings.tailscale.timeout_secs),
            },
            mesh: MeshOptions {
                refresh_interval: Duration::from_secs(settings.mesh.refresh_interval_secs),
                stale_ttl: Duration::from_secs(settings.mesh.stale_ttl_secs),
                recency_window: Duration::from_secs(settings.mesh.recency_window_secs),
                mesh_cidr,
            },
            reconciler: reconciler::Options {
                interval: Duration::from_secs(settings.reconcile_interval_secs.max(1)),
                ..Default::default()
            },
            registry: RegistryOptions {
                public_host: settings.public_host.clone(),
            },
            proxy: ProxyOptions::default(),
            default_ssh_user: settings.default_ssh_user.clone(),
            log: LogOptions {
                log_level: settings.log_level.clone(),
                stdout: true,
                log_dir: settings.log_dir.as_ref().map(PathBuf::from),
                json_format: settings.log_json,
            },
        })
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Storage layout paths; state is kept in memory only when unset
    pub layout: Option<StorageLayout>,
}

/// Jenkins client options
#[derive(Debug, Clone)]
pub struct JenkinsClientOptions {
    pub base_url: String,
    pub auth: Option<BasicAuth>,
    pub timeout: Duration,
    pub runner: JenkinsOptions,
}

impl Default for JenkinsClientOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            auth: None,
            timeout: Duration::from_secs(30),
            runner: JenkinsOptions::default(),
        }
    }
}

/// Tailscale client options
#[derive(Debug, Clone)]
pub struct TailscaleClientOptions {
    pub api_base_url: String,
    pub auth: Option<BasicAuth>,
    pub tailnet: String,
    pub timeout: Duration,
}

impl Default for TailscaleClientOptions {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.tailscale.com/api/v2".to_string(),
            auth: None,
            tailnet: "-".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5050,
        }
    }
}
