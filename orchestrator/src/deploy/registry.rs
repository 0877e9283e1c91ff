//! Deployment registry: instance lifecycle and coordination

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, error, info, warn};

use crate::catalog::ProductCatalog;
use crate::deploy::fsm::{InstanceEvent, InstanceFsm, InstanceStatus};
use crate::errors::ArkError;
use crate::filesys::file::File;
use crate::jobs::{BuildId, BuildStatus, JobParams, JobRunner};
use crate::mesh::{MeshDirectory, Target};
use crate::models::instance::Instance;
use crate::models::product::{Environment, Product};
use crate::storage::routes::{Route, RouteStore};
use crate::storage::ssh_users::{is_valid_ssh_user, SshUserStore};
use crate::utils::generate_uuid;

/// Registry options
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Externally reachable base URL of this service, used for job callbacks
    pub public_host: String,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            public_host: "http://localhost:5050".to_string(),
        }
    }
}

/// Request to deploy a product onto a host
#[derive(Debug, Clone)]
pub struct CreateInstanceRequest {
    pub product_id: String,
    pub target_host: String,
    pub environment: String,
    pub ssh_user: Option<String>,
}

/// Service registration reported by a deploy job
#[derive(Debug, Clone, Default)]
pub struct RegisterInstance {
    pub instance_id: String,
    pub target_host: Option<String>,
    pub target_port: Option<u32>,
    pub local_url: Option<String>,
    pub friendly_url: Option<String>,
    /// `"success"` marks the deployment complete
    pub status: Option<String>,
}

/// Outcome shared by every caller of a delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub instance_id: String,
    pub status: InstanceStatus,
    pub job_name: Option<String>,
    pub build_id: Option<String>,
    pub device_id: String,
}

/// Merged build logs of an instance
#[derive(Debug, Clone)]
pub struct InstanceLogs {
    pub instance: Instance,
    pub logs: BTreeMap<String, String>,
}

type TargetKey = (String, String, Environment);
type DeleteCell = Arc<OnceCell<Result<DeleteOutcome, ArkError>>>;

/// Releases create reservations when dropped
struct Reservation<'a> {
    reservations: &'a Mutex<HashSet<TargetKey>>,
    keys: Vec<TargetKey>,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut reservations = self.reservations.lock().unwrap_or_else(|e| e.into_inner());
        for key in &self.keys {
            reservations.remove(key);
        }
    }
}

/// Owns every instance and drives it through its lifecycle
pub struct DeploymentRegistry {
    catalog: Arc<ProductCatalog>,
    mesh: Arc<MeshDirectory>,
    jobs: Arc<dyn JobRunner>,
    ssh_users: Arc<SshUserStore>,
    routes: Arc<RouteStore>,
    options: RegistryOptions,

    instances: RwLock<BTreeMap<String, Instance>>,
    file: Option<File>,

    reservations: Mutex<HashSet<TargetKey>>,
    deletes: Mutex<HashMap<String, DeleteCell>>,
    // creates hold it shared, product deletes exclusively
    product_gate: RwLock<()>,
}

impl DeploymentRegistry {
    pub fn new(
        catalog: Arc<ProductCatalog>,
        mesh: Arc<MeshDirectory>,
        jobs: Arc<dyn JobRunner>,
        ssh_users: Arc<SshUserStore>,
        routes: Arc<RouteStore>,
        options: RegistryOptions,
    ) -> Self {
        Self {
            catalog,
            mesh,
            jobs,
            ssh_users,
            routes,
            options,
            instances: RwLock::new(BTreeMap::new()),
            file: None,
            reservations: Mutex::new(HashSet::new()),
            deletes: Mutex::new(HashMap::new()),
            product_gate: RwLock::new(()),
        }
    }

    /// Attach a write-through file and load the instances it holds
    pub async fn with_file(mut self, file: File) -> Result<Self, ArkError> {
        let stored: Vec<Instance> = file.read_json_or_default().await?;
        info!(
            "Loaded {} instances from {}",
            stored.len(),
            file.path().display()
        );
        self.instances = RwLock::new(stored.into_iter().map(|i| (i.id.clone(), i)).collect());
        self.file = Some(file);
        Ok(self)
    }

    async fn persist(&self, instances: &BTreeMap<String, Instance>) -> Result<(), ArkError> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let list: Vec<&Instance> = instances.values().collect();
        file.write_json(&list).await
    }

    // ----------------------------------------------------------------- reads

    pub async fn get_instance(&self, id: &str) -> Result<Instance, ArkError> {
        let instances = self.instances.read().await;
        instances
            .get(id)
            .cloned()
            .ok_or_else(|| ArkError::NotFound(format!("instance not found: {}", id)))
    }

    /// All instances, newest first
    pub async fn list_instances(&self) -> Vec<Instance> {
        let instances = self.instances.read().await;
        let mut list: Vec<Instance> = instances.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    // ---------------------------------------------------------------- create

    /// Claim every key of one target at once
    fn reserve(&self, keys: Vec<TargetKey>) -> Result<Reservation<'_>, ArkError> {
        let mut reservations = self.reservations.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(taken) = keys.iter().find(|k| reservations.contains(*k)) {
            return Err(ArkError::Conflict(format!(
                "a deployment of {} to {} ({}) is already in progress",
                taken.0, taken.1, taken.2
            )));
        }
        reservations.extend(keys.iter().cloned());
        Ok(Reservation {
            reservations: &self.reservations,
            keys,
        })
    }

    /// Trigger the product's deploy job and record the instance as provisioning
    pub async fn create_instance(&self, req: CreateInstanceRequest) -> Result<Instance, ArkError> {
        let env: Environment = req
            .environment
            .parse()
            .map_err(ArkError::InvalidArgument)?;
        let product_id = req.product_id.trim().to_string();
        let host = req.target_host.trim().to_string();
        if product_id.is_empty() {
            return Err(ArkError::InvalidArgument("product_id is required".to_string()));
        }
        if host.is_empty() {
            return Err(ArkError::InvalidArgument("target_host is required".to_string()));
        }

        let _gate = self.product_gate.read().await;
        let product = self.catalog.get(&product_id).await?;
        let job = product
            .deploy_job(env)
            .ok_or_else(|| {
                ArkError::InvalidArgument(format!(
                    "no deploy job configured for product {} in environment {}",
                    product_id, env
                ))
            })?
            .to_string();

        // Aliases of one host ("node1", its address, "NODE1") share a slot
        let target = self.mesh.check_target(&host).await?;
        let keys = target
            .keys()
            .into_iter()
            .map(|key| (product_id.clone(), key, env))
            .collect();
        let _reservation = self.reserve(keys)?;
        self.check_slot_free(&product_id, env, &target, &host).await?;
        let address = target.address.clone();

        let ssh_user = match req.ssh_user.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(user) if is_valid_ssh_user(user) => user.to_string(),
            Some(user) => {
                return Err(ArkError::InvalidArgument(format!("invalid ssh_user: {:?}", user)))
            }
            None => self.ssh_users.resolve([host.as_str(), address.as_str()]).await,
        };

        let instance_id = generate_uuid();
        let params = self.job_params(&instance_id, &product, env, &address, &ssh_user);
        let build = self.jobs.trigger(&job, &params).await?;
        info!(
            "Triggered {} for instance {} ({} on {} {}): {}",
            job, instance_id, product_id, host, env, build
        );

        let now = Utc::now();
        let instance = Instance {
            id: instance_id.clone(),
            product_id,
            device_id: host,
            target_device: target.device_id,
            target_address: address,
            environment: env,
            fsm: InstanceFsm::new(),
            url: None,
            build_id: build.to_string(),
            job_name: job.clone(),
            builds: BTreeMap::from([(job, build.to_string())]),
            delete_job_name: None,
            delete_build_id: None,
            ssh_user,
            created_at: now,
            updated_at: now,
        };

        let mut instances = self.instances.write().await;
        instances.insert(instance_id.clone(), instance.clone());
        if let Err(e) = self.persist(&instances).await {
            instances.remove(&instance_id);
            error!(
                "Failed to persist instance {}; build {} runs untracked: {}",
                instance_id, instance.build_id, e
            );
            return Err(e);
        }
        Ok(instance)
    }

    async fn check_slot_free(
        &self,
        product_id: &str,
        env: Environment,
        target: &Target,
        host: &str,
    ) -> Result<(), ArkError> {
        let instances = self.instances.read().await;
        match instances
            .values()
            .find(|i| i.is_live() && i.occupies(product_id, env, target))
        {
            Some(live) => Err(ArkError::Conflict(format!(
                "instance {} of {} already exists on {} ({})",
                live.id, product_id, host, env
            ))),
            None => Ok(()),
        }
    }

    fn job_params(
        &self,
        instance_id: &str,
        product: &Product,
        env: Environment,
        address: &str,
        ssh_user: &str,
    ) -> JobParams {
        let callback = format!(
            "{}/api/instances/register",
            self.options.public_host.trim_end_matches('/')
        );
        JobParams::from([
            ("INSTANCE_ID".to_string(), instance_id.to_string()),
            ("PRODUCT_ID".to_string(), product.id.clone()),
            ("ENV".to_string(), env.job_param().to_string()),
            ("TARGET_HOST".to_string(), address.to_string()),
            ("SSH_USER".to_string(), ssh_user.to_string()),
            ("ARK_CALLBACK_URL".to_string(), callback),
            (
                "WEB_SERVICE".to_string(),
                product.web_service.clone().unwrap_or_default(),
            ),
            ("WEB_PORT".to_string(), product.web_port.to_string()),
        ])
    }

    // ---------------------------------------------------------------- update

    /// Apply `f` to instance `id` only if it is still in `expected`.
    ///
    /// Returns whether the update was applied.
    async fn apply_if<F>(&self, id: &str, expected: InstanceStatus, f: F) -> Result<bool, ArkError>
    where
        F: FnOnce(&mut Instance) -> Result<(), String>,
    {
        let mut instances = self.instances.write().await;
        let Some(instance) = instances.get_mut(id) else {
            return Ok(false);
        };
        if instance.status() != expected {
            debug!(
                "Skipping stale update of {}: expected {}, found {}",
                id,
                expected,
                instance.status()
            );
            return Ok(false);
        }

        let before = instance.clone();
        if let Err(e) = f(instance) {
            warn!("Rejected update of instance {}: {}", id, e);
            *instance = before;
            return Ok(false);
        }
        instance.touch();

        if let Err(e) = self.persist(&instances).await {
            instances.insert(id.to_string(), before);
            return Err(e);
        }
        Ok(true)
    }

    /// Stop a deleting instance and drop its record
    async fn remove_stopped(&self, id: &str) -> Result<bool, ArkError> {
        let mut instances = self.instances.write().await;
        let Some(instance) = instances.get_mut(id) else {
            return Ok(false);
        };
        if instance.status() != InstanceStatus::Deleting {
            return Ok(false);
        }
        let before = instance.clone();
        if let Err(e) = instance.fsm.process(InstanceEvent::DeleteSucceeded) {
            warn!("Rejected stop of instance {}: {}", id, e);
            *instance = before;
            return Ok(false);
        }

        instances.remove(id);
        if let Err(e) = self.persist(&instances).await {
            instances.insert(id.to_string(), before);
            return Err(e);
        }
        drop(instances);
        self.forget_route(id).await;
        Ok(true)
    }

    async fn forget_route(&self, id: &str) {
        if let Err(e) = self.routes.delete(id).await {
            warn!("Failed to drop proxy route of instance {}: {}", id, e);
        }
    }

    /// `http://{address}:{web_port}/` for products exposing a web service
    async fn service_url(&self, instance: &Instance) -> Option<String> {
        let product = self.catalog.get(&instance.product_id).await.ok()?;
        product.web_service.as_ref()?;

        let address = match self.mesh.resolve(&instance.device_id).await {
            Ok(address) => address,
            Err(_) if instance.address().parse::<IpAddr>().is_ok() => instance.address().to_string(),
            Err(e) => {
                debug!("No address for {} yet: {}", instance.device_id, e);
                return None;
            }
        };
        Some(http_url(&address, u32::from(product.web_port)))
    }

    // ------------------------------------------------------------- reconcile

    /// Poll every in-flight build once and advance the affected instances
    pub async fn reconcile(&self) {
        let pending: Vec<Instance> = {
            let instances = self.instances.read().await;
            instances
                .values()
                .filter(|i| match i.status() {
                    InstanceStatus::Provisioning | InstanceStatus::Deleting => true,
                    InstanceStatus::Running => i.url.is_none(),
                    _ => false,
                })
                .cloned()
                .collect()
        };
        if pending.is_empty() {
            return;
        }

        debug!("Reconciling {} instances", pending.len());
        join_all(pending.iter().map(|i| self.reconcile_one(i))).await;
    }

    async fn reconcile_one(&self, instance: &Instance) {
        let result = match instance.status() {
            InstanceStatus::Provisioning => self.reconcile_deploy(instance).await,
            InstanceStatus::Deleting => self.reconcile_delete(instance).await,
            InstanceStatus::Running => self.fill_url(instance).await,
            _ => Ok(()),
        };
        if let Err(e) = result {
            warn!("Failed to reconcile instance {}: {}", instance.id, e);
        }
    }

    async fn reconcile_deploy(&self, instance: &Instance) -> Result<(), ArkError> {
        let build = BuildId::new(instance.build_id.clone());
        match self.jobs.status(&build).await? {
            BuildStatus::Success => {
                let url = self.service_url(instance).await;
                let applied = self
                    .apply_if(&instance.id, InstanceStatus::Provisioning, |i| {
                        i.fsm.process(InstanceEvent::JobSucceeded)?;
                        if url.is_some() {
                            i.url = url;
                        }
                        Ok(())
                    })
                    .await?;
                if applied {
                    info!("Instance {} is running", instance.id);
                }
            }
            BuildStatus::Failed => {
                let reason = format!("deploy job {} failed ({})", instance.job_name, build);
                let applied = self
                    .apply_if(&instance.id, InstanceStatus::Provisioning, |i| {
                        i.fsm.process(InstanceEvent::JobFailed(reason))
                    })
                    .await?;
                if applied {
                    warn!("Instance {} failed to deploy", instance.id);
                }
            }
            BuildStatus::Queued | BuildStatus::Running => {}
        }
        Ok(())
    }

    async fn reconcile_delete(&self, instance: &Instance) -> Result<(), ArkError> {
        let Some(build) = instance.delete_build_id.clone().map(BuildId::new) else {
            if self.delete_in_flight(&instance.id) {
                return Ok(());
            }
            // Marked deleting but the trigger never completed, e.g. across a restart
            self.apply_if(&instance.id, InstanceStatus::Deleting, |i| {
                i.fsm
                    .process(InstanceEvent::DeleteFailed("delete interrupted".to_string()))
            })
            .await?;
            return Ok(());
        };

        match self.jobs.status(&build).await? {
            BuildStatus::Success => {
                if self.remove_stopped(&instance.id).await? {
                    info!("Instance {} stopped and removed", instance.id);
                    self.clear_delete(&instance.id);
                }
            }
            BuildStatus::Failed => {
                let job = instance.delete_job_name.clone().unwrap_or_default();
                let reason = format!("delete job {} failed ({})", job, build);
                if self
                    .apply_if(&instance.id, InstanceStatus::Deleting, |i| {
                        i.fsm.process(InstanceEvent::DeleteFailed(reason))?;
                        i.delete_build_id = None;
                        Ok(())
                    })
                    .await?
                {
                    warn!("Delete of instance {} failed", instance.id);
                    self.clear_delete(&instance.id);
                }
            }
            BuildStatus::Queued | BuildStatus::Running => {}
        }
        Ok(())
    }

    async fn fill_url(&self, instance: &Instance) -> Result<(), ArkError> {
        let Some(url) = self.service_url(instance).await else {
            return Ok(());
        };
        self.apply_if(&instance.id, InstanceStatus::Running, |i| {
            if i.url.is_none() {
                i.url = Some(url);
            }
            Ok(())
        })
        .await?;
        Ok(())
    }

    // ---------------------------------------------------------------- delete

    fn delete_in_flight(&self, id: &str) -> bool {
        let deletes = self.deletes.lock().unwrap_or_else(|e| e.into_inner());
        deletes.contains_key(id)
    }

    fn clear_delete(&self, id: &str) {
        let mut deletes = self.deletes.lock().unwrap_or_else(|e| e.into_inner());
        deletes.remove(id);
    }

    /// Start tearing down an instance.
    ///
    /// Concurrent and repeated calls share one outcome; the delete job is
    /// triggered at most once per attempt. `force` drops the record without
    /// running any job.
    pub async fn delete_instance(&self, id: &str, force: bool) -> Result<DeleteOutcome, ArkError> {
        let instance = self.get_instance(id).await?;

        if force {
            let mut instances = self.instances.write().await;
            if let Some(removed) = instances.remove(id) {
                if let Err(e) = self.persist(&instances).await {
                    instances.insert(id.to_string(), removed);
                    return Err(e);
                }
            }
            drop(instances);
            self.clear_delete(id);
            self.forget_route(id).await;
            warn!("Instance {} force-removed without running a delete job", id);
            return Ok(DeleteOutcome {
                instance_id: instance.id,
                status: InstanceStatus::Stopped,
                job_name: None,
                build_id: None,
                device_id: instance.device_id,
            });
        }

        let cell = {
            let mut deletes = self.deletes.lock().unwrap_or_else(|e| e.into_inner());
            deletes
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell.get_or_init(|| self.start_delete(id)).await;
        match result {
            Ok(outcome) => Ok(outcome.clone()),
            Err(e) => {
                let err = e.to_shared();
                // Let a later call retry
                let mut deletes = self.deletes.lock().unwrap_or_else(|e| e.into_inner());
                if deletes.get(id).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                    deletes.remove(id);
                }
                Err(err)
            }
        }
    }

    async fn start_delete(&self, id: &str) -> Result<DeleteOutcome, ArkError> {
        let instance = self.get_instance(id).await?;

        if instance.status() == InstanceStatus::Deleting {
            if let Some(build) = &instance.delete_build_id {
                return Ok(DeleteOutcome {
                    instance_id: instance.id.clone(),
                    status: InstanceStatus::Deleting,
                    job_name: instance.delete_job_name.clone(),
                    build_id: Some(build.clone()),
                    device_id: instance.device_id.clone(),
                });
            }
        }

        let product = self.catalog.get(&instance.product_id).await.ok();
        let Some((product, job)) = product.and_then(|p| {
            let job = p.delete_job()?.to_string();
            Some((p, job))
        }) else {
            return Err(ArkError::FailedPrecondition(format!(
                "product {} has no delete job configured; use force to remove the record",
                instance.product_id
            )));
        };

        let previous = instance.status();
        let marked = self
            .apply_if(id, previous, |i| i.fsm.process(InstanceEvent::DeleteRequested))
            .await?;
        if !marked {
            return Err(ArkError::FailedPrecondition(format!(
                "instance {} cannot be deleted while {}",
                id, previous
            )));
        }

        let address = self
            .mesh
            .resolve(&instance.device_id)
            .await
            .unwrap_or_else(|_| instance.address().to_string());
        let params = self.job_params(
            &instance.id,
            &product,
            instance.environment,
            &address,
            &instance.ssh_user,
        );

        match self.jobs.trigger(&job, &params).await {
            Ok(build) => {
                info!("Triggered delete job {} for instance {}: {}", job, id, build);
                let build_id = build.to_string();
                let job_name = job.clone();
                self.apply_if(id, InstanceStatus::Deleting, |i| {
                    i.delete_job_name = Some(job_name.clone());
                    i.delete_build_id = Some(build_id.clone());
                    i.builds.insert(job_name, build_id);
                    Ok(())
                })
                .await?;
                Ok(DeleteOutcome {
                    instance_id: instance.id,
                    status: InstanceStatus::Deleting,
                    job_name: Some(job),
                    build_id: Some(build.to_string()),
                    device_id: instance.device_id,
                })
            }
            Err(e) => {
                warn!("Delete job {} for instance {} not triggered: {}", job, id, e);
                let reason = format!("delete job {} not triggered: {}", job, e);
                self.apply_if(id, InstanceStatus::Deleting, |i| {
                    i.fsm.process(InstanceEvent::DeleteFailed(reason))
                })
                .await?;
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------ logs

    /// Console output of every build of the instance
    pub async fn logs(&self, id: &str) -> Result<InstanceLogs, ArkError> {
        let instance = self.get_instance(id).await?;

        let fetches = instance.builds.iter().map(|(job, build)| async move {
            let result = self.jobs.logs(&BuildId::new(build.clone())).await;
            (job.clone(), result)
        });

        let mut logs = BTreeMap::new();
        for (job, result) in join_all(fetches).await {
            match result {
                Ok(map) => logs.extend(map),
                Err(e) => {
                    logs.insert(job, format!("Error fetching log: {}", e));
                }
            }
        }
        Ok(InstanceLogs { instance, logs })
    }

    // -------------------------------------------------------------- callback

    /// Record the service endpoint reported by a deploy job
    pub async fn register_callback(&self, req: RegisterInstance) -> Result<Instance, ArkError> {
        let id = req.instance_id.trim();
        if id.is_empty() {
            return Err(ArkError::InvalidArgument("instance_id is required".to_string()));
        }
        if let Some(port) = req.target_port {
            if port == 0 || port > u32::from(u16::MAX) {
                return Err(ArkError::InvalidArgument(format!(
                    "target_port out of range: {}",
                    port
                )));
            }
        }

        let non_empty = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let complete = req
            .status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("success"));

        let mut instances = self.instances.write().await;
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| ArkError::NotFound(format!("instance not found: {}", id)))?;
        let before = instance.clone();

        match instance.status() {
            InstanceStatus::Provisioning | InstanceStatus::Running => {
                instance
                    .fsm
                    .process(InstanceEvent::Registered)
                    .map_err(ArkError::Internal)?;
            }
            InstanceStatus::Success => {}
            other => {
                return Err(ArkError::FailedPrecondition(format!(
                    "instance {} is {}",
                    id, other
                )));
            }
        }
        if complete && instance.status() == InstanceStatus::Running {
            instance
                .fsm
                .process(InstanceEvent::Complete)
                .map_err(ArkError::Internal)?;
        }

        let host = non_empty(&req.target_host).unwrap_or_else(|| instance.address().to_string());
        let url = non_empty(&req.friendly_url)
            .or_else(|| non_empty(&req.local_url))
            .or_else(|| req.target_port.map(|port| http_url(&host, port)));
        if url.is_some() {
            instance.url = url;
        }
        instance.touch();
        let updated = instance.clone();

        if let Err(e) = self.persist(&instances).await {
            instances.insert(id.to_string(), before);
            return Err(e);
        }
        drop(instances);

        // Range checked above
        if let Some(port) = req.target_port.and_then(|p| u16::try_from(p).ok()) {
            self.routes.put(Route::new(id, host.as_str(), port)).await?;
            debug!("Proxy route of {} now {}:{}", id, host, port);
        }
        info!("Instance {} registered ({})", id, updated.status());
        Ok(updated)
    }

    // -------------------------------------------------------------- products

    /// Delete a product nobody references
    pub async fn delete_product(&self, product_id: &str) -> Result<Product, ArkError> {
        let _gate = self.product_gate.write().await;

        let referenced = {
            let instances = self.instances.read().await;
            instances
                .values()
                .filter(|i| i.product_id == product_id)
                .count()
        };
        let in_flight = {
            let reservations = self.reservations.lock().unwrap_or_else(|e| e.into_inner());
            reservations.iter().any(|(p, _, _)| p == product_id)
        };
        if referenced > 0 || in_flight {
            return Err(ArkError::Conflict(format!(
                "product {} is referenced by {} instance(s)",
                product_id, referenced
            )));
        }

        self.catalog.delete(product_id).await
    }
}

/// `http://{host}:{port}/`, bracketing IPv6 hosts
pub fn http_url(host: &str, port: u32) -> String {
    if host.contains(':') {
        format!("http://[{}]:{}/", host, port)
    } else {
        format!("http://{}:{}/", host, port)
    }
}
