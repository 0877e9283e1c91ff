//! Shared fakes for the integration tests
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use arkd::catalog::ProductCatalog;
use arkd::deploy::registry::{DeploymentRegistry, RegistryOptions};
use arkd::errors::ArkError;
use arkd::jobs::{BuildId, BuildStatus, JobParams, JobRunner, QueuedBuild};
use arkd::mesh::{MeshDirectory, MeshNode, MeshOptions, MeshProvider};
use arkd::storage::routes::RouteStore;
use arkd::storage::ssh_users::{SshUserStore, DEFAULT_SSH_USER};
use openapi_server::models::ProductPayload;

// ============================== JOB RUNNER =============================== //

/// Recorded trigger
#[derive(Debug, Clone)]
pub struct Triggered {
    pub job: String,
    pub params: JobParams,
    pub build: BuildId,
}

/// In-memory job runner; builds stay queued until a test moves them
#[derive(Default)]
pub struct FakeJobRunner {
    triggered: Mutex<Vec<Triggered>>,
    statuses: Mutex<HashMap<String, BuildStatus>>,
    trigger_delay: Mutex<Duration>,
    fail_triggers: AtomicBool,
    jobs: Mutex<Vec<String>>,
    queue: Mutex<Vec<QueuedBuild>>,
}

impl FakeJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_trigger_delay(&self, delay: Duration) {
        *self.trigger_delay.lock().unwrap() = delay;
    }

    pub fn set_fail_triggers(&self, fail: bool) {
        self.fail_triggers.store(fail, Ordering::SeqCst);
    }

    pub fn set_jobs(&self, jobs: &[&str]) {
        *self.jobs.lock().unwrap() = jobs.iter().map(|j| j.to_string()).collect();
    }

    pub fn set_queue(&self, queue: Vec<QueuedBuild>) {
        *self.queue.lock().unwrap() = queue;
    }

    pub fn triggered(&self) -> Vec<Triggered> {
        self.triggered.lock().unwrap().clone()
    }

    pub fn trigger_count(&self, job: &str) -> usize {
        self.triggered().iter().filter(|t| t.job == job).count()
    }

    /// Move every build of `job` to `status`
    pub fn finish_job(&self, job: &str, status: BuildStatus) {
        let builds: Vec<BuildId> = self
            .triggered()
            .into_iter()
            .filter(|t| t.job == job)
            .map(|t| t.build)
            .collect();
        let mut statuses = self.statuses.lock().unwrap();
        for build in builds {
            statuses.insert(build.to_string(), status);
        }
    }
}

#[async_trait]
impl JobRunner for FakeJobRunner {
    async fn trigger(&self, job: &str, params: &JobParams) -> Result<BuildId, ArkError> {
        let delay = *self.trigger_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_triggers.load(Ordering::SeqCst) {
            return Err(ArkError::Unavailable("jenkins unreachable".to_string()));
        }

        let mut triggered = self.triggered.lock().unwrap();
        let build = BuildId::new(format!("{}#{}", job, triggered.len() + 1));
        triggered.push(Triggered {
            job: job.to_string(),
            params: params.clone(),
            build: build.clone(),
        });
        self.statuses
            .lock()
            .unwrap()
            .insert(build.to_string(), BuildStatus::Queued);
        Ok(build)
    }

    async fn status(&self, build: &BuildId) -> Result<BuildStatus, ArkError> {
        self.statuses
            .lock()
            .unwrap()
            .get(build.as_str())
            .copied()
            .ok_or_else(|| ArkError::NotFound(format!("unknown build {}", build)))
    }

    async fn logs(&self, build: &BuildId) -> Result<BTreeMap<String, String>, ArkError> {
        let (job, _) = build
            .as_str()
            .split_once('#')
            .ok_or_else(|| ArkError::InvalidArgument(build.to_string()))?;
        if !self.statuses.lock().unwrap().contains_key(build.as_str()) {
            return Err(ArkError::NotFound(format!("unknown build {}", build)));
        }
        Ok(BTreeMap::from([(
            job.to_string(),
            format!("console of {}", build),
        )]))
    }

    async fn list_jobs(&self) -> Result<Vec<String>, ArkError> {
        Ok(self.jobs.lock().unwrap().clone())
    }

    async fn pending(&self) -> Result<Vec<QueuedBuild>, ArkError> {
        Ok(self.queue.lock().unwrap().clone())
    }

    fn build_id(&self, job: &str, number: u64) -> BuildId {
        BuildId::new(format!("{}#{}", job, number))
    }
}

// ================================= MESH ================================== //

#[derive(Default)]
pub struct FakeMeshProvider {
    nodes: Mutex<Vec<MeshNode>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl FakeMeshProvider {
    pub fn new(nodes: Vec<MeshNode>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
            ..Default::default()
        }
    }

    pub fn set_nodes(&self, nodes: Vec<MeshNode>) {
        *self.nodes.lock().unwrap() = nodes;
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MeshProvider for FakeMeshProvider {
    async fn list_nodes(&self) -> Result<Vec<MeshNode>, ArkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ArkError::Unavailable("tailscale unreachable".to_string()));
        }
        Ok(self.nodes.lock().unwrap().clone())
    }
}

pub fn node(host: &str, address: &str, online: bool) -> MeshNode {
    MeshNode {
        id: format!("id-{}", host),
        host: host.to_string(),
        name: format!("{}.tail1234.ts.net", host),
        addresses: vec![address.to_string()],
        os: "linux".to_string(),
        online,
        last_seen: Some(Utc::now() - chrono::Duration::hours(2)),
    }
}

/// Mesh options that refetch on every call
pub fn uncached_mesh_options() -> MeshOptions {
    MeshOptions {
        refresh_interval: Duration::ZERO,
        ..Default::default()
    }
}

// =============================== PRODUCTS ================================ //

pub fn product_payload(id: &str, web_service: Option<&str>) -> ProductPayload {
    ProductPayload {
        id: Some(id.to_string()),
        name: Some(format!("{} service", id)),
        description: Some("test product".to_string()),
        deploy_jobs: Some(BTreeMap::from([(
            "PROD".to_string(),
            format!("deploy-{}", id),
        )])),
        delete_job: Some(format!("delete-{}", id)),
        web_service: web_service.map(str::to_string),
        web_port: Some(8080),
    }
}

// ================================ HARNESS ================================ //

pub struct Harness {
    pub catalog: Arc<ProductCatalog>,
    pub provider: Arc<FakeMeshProvider>,
    pub mesh: Arc<MeshDirectory>,
    pub jobs: Arc<FakeJobRunner>,
    pub ssh_users: Arc<SshUserStore>,
    pub routes: Arc<RouteStore>,
    pub registry: Arc<DeploymentRegistry>,
}

impl Harness {
    /// Registry over `node1` (online, 100.1.2.3) and `node2` (offline, 100.70.0.9)
    pub fn new() -> Self {
        Self::with_nodes(vec![
            node("node1", "100.1.2.3", true),
            node("node2", "100.70.0.9", false),
        ])
    }

    pub fn with_nodes(nodes: Vec<MeshNode>) -> Self {
        let catalog = Arc::new(ProductCatalog::in_memory());
        let provider = Arc::new(FakeMeshProvider::new(nodes));
        let mesh = Arc::new(MeshDirectory::new(
            provider.clone(),
            uncached_mesh_options(),
        ));
        let jobs = Arc::new(FakeJobRunner::new());
        let ssh_users = Arc::new(SshUserStore::in_memory(DEFAULT_SSH_USER));
        let routes = Arc::new(RouteStore::in_memory());
        let registry = Arc::new(DeploymentRegistry::new(
            catalog.clone(),
            mesh.clone(),
            jobs.clone(),
            ssh_users.clone(),
            routes.clone(),
            RegistryOptions {
                public_host: "http://ark.test:5050".to_string(),
            },
        ));
        Self {
            catalog,
            provider,
            mesh,
            jobs,
            ssh_users,
            routes,
            registry,
        }
    }
}
