//! Server state

use std::sync::Arc;

use crate::catalog::ProductCatalog;
use crate::deploy::registry::DeploymentRegistry;
use crate::http::InstanceProxy;
use crate::jobs::JobRunner;
use crate::mesh::MeshDirectory;
use crate::storage::routes::RouteStore;
use crate::storage::ssh_users::SshUserStore;

/// Server state shared across handlers
pub struct ServerState {
    pub catalog: Arc<ProductCatalog>,
    pub registry: Arc<DeploymentRegistry>,
    pub mesh: Arc<MeshDirectory>,
    pub jobs: Arc<dyn JobRunner>,
    pub ssh_users: Arc<SshUserStore>,
    pub routes: Arc<RouteStore>,
    pub proxy: Arc<InstanceProxy>,
}

impl ServerState {
    pub fn new(
        catalog: Arc<ProductCatalog>,
        registry: Arc<DeploymentRegistry>,
        mesh: Arc<MeshDirectory>,
        jobs: Arc<dyn JobRunner>,
        ssh_users: Arc<SshUserStore>,
        routes: Arc<RouteStore>,
        proxy: Arc<InstanceProxy>,
    ) -> Self {
        Self {
            catalog,
            registry,
            mesh,
            jobs,
            ssh_users,
            routes,
            proxy,
        }
    }
}
