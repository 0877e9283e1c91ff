//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::catalog::ProductCatalog;
use crate::deploy::registry::DeploymentRegistry;
use crate::errors::ArkError;
use crate::http::{HttpClient, InstanceProxy};
use crate::jobs::{JenkinsRunner, JobRunner};
use crate::mesh::{MeshDirectory, MeshProvider, TailscaleProvider};
use crate::server::state::ServerState;
use crate::storage::routes::RouteStore;
use crate::storage::ssh_users::SshUserStore;

/// Main application state
pub struct AppState {
    pub catalog: Arc<ProductCatalog>,
    pub mesh: Arc<MeshDirectory>,
    pub jobs: Arc<dyn JobRunner>,
    pub ssh_users: Arc<SshUserStore>,
    pub routes: Arc<RouteStore>,
    pub proxy: Arc<InstanceProxy>,
    pub registry: Arc<DeploymentRegistry>,
}

impl AppState {
    /// Initialize application state against the configured upstreams
    pub async fn init(options: &AppOptions) -> Result<Self, ArkError> {
        info!("Initializing application state...");

        let jenkins_client = HttpClient::new(
            &options.jenkins.base_url,
            options.jenkins.timeout,
            options.jenkins.auth.clone(),
        )?;
        let jobs: Arc<dyn JobRunner> = Arc::new(JenkinsRunner::new(
            jenkins_client,
            options.jenkins.runner.clone(),
        ));

        let tailscale_client = Arc::new(HttpClient::new(
            &options.tailscale.api_base_url,
            options.tailscale.timeout,
            options.tailscale.auth.clone(),
        )?);
        let provider: Arc<dyn MeshProvider> = Arc::new(TailscaleProvider::new(
            tailscale_client,
            options.tailscale.tailnet.clone(),
        ));

        Self::with_providers(options, provider, jobs).await
    }

    /// Wire the stores and registry around the given upstreams
    pub async fn with_providers(
        options: &AppOptions,
        provider: Arc<dyn MeshProvider>,
        jobs: Arc<dyn JobRunner>,
    ) -> Result<Self, ArkError> {
        let mesh = Arc::new(MeshDirectory::new(provider, options.mesh.clone()));

        let (catalog, ssh_users, routes) = match &options.storage.layout {
            Some(layout) => {
                layout.setup().await?;
                let catalog = ProductCatalog::load(layout.products_file()).await?;
                let ssh_users =
                    SshUserStore::load(layout.ssh_users_file(), &options.default_ssh_user).await?;
                let routes = RouteStore::load(layout.routes_file()).await?;
                (catalog, ssh_users, routes)
            }
            None => (
                ProductCatalog::in_memory(),
                SshUserStore::in_memory(&options.default_ssh_user),
                RouteStore::in_memory(),
            ),
        };
        let catalog = Arc::new(catalog);
        let ssh_users = Arc::new(ssh_users);
        let routes = Arc::new(routes);
        let proxy = Arc::new(InstanceProxy::new(options.proxy.clone())?);

        let mut registry = DeploymentRegistry::new(
            catalog.clone(),
            mesh.clone(),
            jobs.clone(),
            ssh_users.clone(),
            routes.clone(),
            options.registry.clone(),
        );
        if let Some(layout) = &options.storage.layout {
            registry = registry.with_file(layout.instances_file()).await?;
        }

        Ok(Self {
            catalog,
            mesh,
            jobs,
            ssh_users,
            routes,
            proxy,
            registry: Arc::new(registry),
        })
    }

    /// State handed to the HTTP handlers
    pub fn server_state(&self) -> ServerState {
        ServerState::new(
            self.catalog.clone(),
            self.registry.clone(),
            self.mesh.clone(),
            self.jobs.clone(),
            self.ssh_users.clone(),
            self.routes.clone(),
            self.proxy.clone(),
        )
    }
}
