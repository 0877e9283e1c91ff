//! HTTP request handlers

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use openapi_server::models::{
    BuildStatusResponse, CreateDeploymentRequest, CreateDeploymentResponse,
    DeleteDeploymentQuery, DeleteDeploymentResponse, DeploymentLogsResponse, ErrorResponse,
    HealthResponse, JobListResponse, MessageResponse, PendingJob, PendingJobsResponse,
    ProductPayload, RegisterInstanceRequest, RegisterInstanceResponse, SshUserListResponse,
    SshUserRequest, SshUserResponse, VersionResponse,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::catalog::validation::is_safe_job_name;
use crate::deploy::registry::{CreateInstanceRequest, RegisterInstance};
use crate::errors::ArkError;
use crate::models::device::Device;
use crate::models::instance::Instance;
use crate::models::product::Product;
use crate::server::extract::{ApiJson, ApiPath, ApiQuery};
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Run `fut` on its own task so a dropped connection cannot cancel it
async fn detached<T, F>(fut: F) -> Result<T, ArkError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, ArkError>> + Send + 'static,
{
    tokio::spawn(fut).await.map_err(|e| {
        error!("Request task failed: {}", e);
        ArkError::Internal(format!("request task failed: {}", e))
    })?
}

// ================================ HEALTH ================================= //

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "arkd".to_string(),
        version: version_info().version,
    })
}

pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// =============================== PRODUCTS ================================ //

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<Product>,
    pub total: usize,
}

pub async fn list_products_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let products = state.catalog.list().await;
    Json(ProductListResponse {
        total: products.len(),
        products,
    })
}

pub async fn create_product_handler(
    State(state): State<Arc<ServerState>>,
    ApiJson(payload): ApiJson<ProductPayload>,
) -> Result<impl IntoResponse, ArkError> {
    let product = state.catalog.create(&payload).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn get_product_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Product>, ArkError> {
    Ok(Json(state.catalog.get(&id).await?))
}

pub async fn update_product_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(id): ApiPath<String>,
    ApiJson(patch): ApiJson<ProductPayload>,
) -> Result<Json<Product>, ArkError> {
    Ok(Json(state.catalog.update(&id, &patch).await?))
}

pub async fn delete_product_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<MessageResponse>, ArkError> {
    let product = state.registry.delete_product(&id).await?;
    Ok(Json(MessageResponse {
        message: "product deleted".to_string(),
        id: product.id,
    }))
}

// ============================== DEPLOYMENTS ============================== //

#[derive(Debug, Serialize)]
pub struct InstanceListResponse {
    pub instances: Vec<Instance>,
    pub total: usize,
}

pub async fn list_deployments_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let instances = state.registry.list_instances().await;
    Json(InstanceListResponse {
        total: instances.len(),
        instances,
    })
}

pub async fn create_deployment_handler(
    State(state): State<Arc<ServerState>>,
    ApiJson(body): ApiJson<CreateDeploymentRequest>,
) -> Result<impl IntoResponse, ArkError> {
    let request = CreateInstanceRequest {
        product_id: body.product_id,
        target_host: body.target_host,
        environment: body.environment,
        ssh_user: body.ssh_user,
    };
    let registry = state.registry.clone();
    let instance = detached(async move { registry.create_instance(request).await }).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateDeploymentResponse {
            status: instance.status().to_string(),
            instance_id: instance.id,
            build_id: instance.build_id,
            job_name: instance.job_name,
            url: instance.url,
            target_host: instance.device_id,
        }),
    ))
}

pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Instance>, ArkError> {
    Ok(Json(state.registry.get_instance(&id).await?))
}

pub async fn delete_deployment_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(id): ApiPath<String>,
    ApiQuery(query): ApiQuery<DeleteDeploymentQuery>,
) -> Result<impl IntoResponse, ArkError> {
    let registry = state.registry.clone();
    let outcome =
        detached(async move { registry.delete_instance(&id, query.force).await }).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DeleteDeploymentResponse {
            instance_id: outcome.instance_id,
            status: outcome.status.to_string(),
            job_name: outcome.job_name,
            build_id: outcome.build_id,
            device_id: outcome.device_id,
        }),
    ))
}

pub async fn deployment_logs_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<DeploymentLogsResponse>, ArkError> {
    let logs = state.registry.logs(&id).await?;
    Ok(Json(DeploymentLogsResponse {
        status: logs.instance.status().to_string(),
        instance_id: logs.instance.id,
        device_id: logs.instance.device_id,
        product_id: logs.instance.product_id,
        logs: logs.logs,
    }))
}

pub async fn register_instance_handler(
    State(state): State<Arc<ServerState>>,
    ApiJson(body): ApiJson<RegisterInstanceRequest>,
) -> Result<Json<RegisterInstanceResponse>, ArkError> {
    let instance = state
        .registry
        .register_callback(RegisterInstance {
            instance_id: body.instance_id,
            target_host: Some(body.target_host),
            target_port: Some(body.target_port),
            local_url: body.local_url,
            friendly_url: body.friendly_url,
            status: body.status,
        })
        .await?;

    Ok(Json(RegisterInstanceResponse {
        status: "ok".to_string(),
        instance_id: instance.id,
        url: instance.url,
    }))
}

// ================================ DEVICES ================================ //

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    pub devices: Vec<Device>,
    pub total: usize,
    pub degraded: bool,
}

pub async fn list_devices_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let listing = state.mesh.list_devices().await;
    Json(DeviceListResponse {
        total: listing.devices.len(),
        devices: listing.devices,
        degraded: listing.degraded,
    })
}

pub async fn get_device_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Device>, ArkError> {
    Ok(Json(state.mesh.get_device(&id).await?))
}

// =============================== SSH USERS =============================== //

pub async fn list_ssh_users_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let map = state.ssh_users.list().await;
    Json(SshUserListResponse {
        total: map.len(),
        map,
    })
}

pub async fn get_ssh_user_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(host): ApiPath<String>,
) -> Result<Json<SshUserResponse>, ArkError> {
    let ssh_user = state
        .ssh_users
        .get(&host)
        .await
        .ok_or_else(|| ArkError::NotFound(format!("no ssh user mapped for host: {}", host)))?;
    Ok(Json(SshUserResponse {
        status: None,
        host,
        ssh_user: Some(ssh_user),
    }))
}

pub async fn put_ssh_user_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(host): ApiPath<String>,
    ApiJson(body): ApiJson<SshUserRequest>,
) -> Result<Json<SshUserResponse>, ArkError> {
    state.ssh_users.set(&host, &body.ssh_user).await?;
    Ok(Json(SshUserResponse {
        status: Some("ok".to_string()),
        host: host.trim().to_string(),
        ssh_user: Some(body.ssh_user.trim().to_string()),
    }))
}

pub async fn delete_ssh_user_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(host): ApiPath<String>,
) -> Result<Json<SshUserResponse>, ArkError> {
    state.ssh_users.delete(&host).await?;
    Ok(Json(SshUserResponse {
        status: Some("deleted".to_string()),
        host: host.trim().to_string(),
        ssh_user: None,
    }))
}

// ================================= JOBS ================================== //

pub async fn list_jobs_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<JobListResponse>, ArkError> {
    let jobs = state.jobs.list_jobs().await?;
    Ok(Json(JobListResponse {
        total: jobs.len(),
        jobs,
    }))
}

/// Build queue of the CI system
pub async fn pending_jobs_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<PendingJobsResponse>, ArkError> {
    let items: Vec<PendingJob> = state
        .jobs
        .pending()
        .await?
        .into_iter()
        .map(|q| PendingJob {
            id: q.id,
            job: q.job,
            why: q.why,
            blocked: q.blocked,
            stuck: q.stuck,
        })
        .collect();
    Ok(Json(PendingJobsResponse {
        total: items.len(),
        items,
    }))
}

fn parse_build_ref(job: &str, build: &str) -> Result<u64, ArkError> {
    if !is_safe_job_name(job) {
        return Err(ArkError::InvalidArgument(format!("invalid job name: {:?}", job)));
    }
    build
        .parse::<u64>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ArkError::InvalidArgument("invalid build number".to_string()))
}

pub async fn build_status_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath((job, build)): ApiPath<(String, String)>,
) -> Result<Json<BuildStatusResponse>, ArkError> {
    let number = parse_build_ref(&job, &build)?;
    let status = state.jobs.status(&state.jobs.build_id(&job, number)).await?;
    Ok(Json(BuildStatusResponse {
        job_name: job,
        build_number: number,
        status: status.as_str().to_string(),
    }))
}

/// Console output of one build as plain text
pub async fn build_logs_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath((job, build)): ApiPath<(String, String)>,
) -> Result<Response, ArkError> {
    let number = parse_build_ref(&job, &build)?;
    let mut logs = state.jobs.logs(&state.jobs.build_id(&job, number)).await?;
    let text = logs.remove(&job).unwrap_or_default();
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text,
    )
        .into_response())
}

// ================================= PROXY ================================= //

#[derive(Debug, Deserialize)]
pub struct InstancePath {
    pub id: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ShortPath {
    pub short: String,
    #[serde(default)]
    pub path: String,
}

/// Forward any request under `/instances/{id}/` to the instance's service
pub async fn proxy_instance_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(target): ApiPath<InstancePath>,
    request: Request,
) -> Result<Response, ArkError> {
    let route = state.routes.get(&target.id).await?;
    state.proxy.forward(&route, &target.path, request).await
}

/// Forward any request under `/instances/by-short/{short}/`
pub async fn proxy_short_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(target): ApiPath<ShortPath>,
    request: Request,
) -> Result<Response, ArkError> {
    let route = state.routes.find_by_short(&target.short).await?;
    state.proxy.forward(&route, &target.path, request).await
}

// =============================== FALLBACKS =============================== //

pub async fn not_found_handler(method: Method, uri: Uri) -> ArkError {
    ArkError::NotFound(format!("no route for {} {}", method, uri.path()))
}

pub async fn method_not_allowed_handler(method: Method, uri: Uri) -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse {
            detail: format!("method {} not allowed on {}", method, uri.path()),
        }),
    )
}
