//! Orchestrator API models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Error body returned with every non-2xx response.
///
/// The dashboard reads `detail` verbatim, so this shape must not change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Generic message response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    pub id: String,
}

/// Product create/update payload.
///
/// Every field is optional so the same body serves `POST` (full product) and
/// `PUT` (patch). Environment keys are free-form strings and parsed server side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deploy_jobs: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub delete_job: Option<String>,
    #[serde(default)]
    pub web_service: Option<String>,
    #[serde(default)]
    pub web_port: Option<u32>,
}

/// Deployment create request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeploymentRequest {
    pub product_id: String,
    pub target_host: String,
    pub environment: String,
    #[serde(default)]
    pub ssh_user: Option<String>,
}

/// Deployment create response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeploymentResponse {
    pub instance_id: String,
    pub build_id: String,
    pub job_name: String,
    pub url: Option<String>,
    pub status: String,
    pub target_host: String,
}

/// Deployment delete query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteDeploymentQuery {
    #[serde(default)]
    pub force: bool,
}

/// Deployment delete response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteDeploymentResponse {
    pub instance_id: String,
    pub status: String,
    pub job_name: Option<String>,
    pub build_id: Option<String>,
    pub device_id: String,
}

/// Deployment logs response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentLogsResponse {
    pub instance_id: String,
    pub device_id: String,
    pub product_id: String,
    pub status: String,
    pub logs: BTreeMap<String, String>,
}

/// Callback sent by a deploy job once the service is up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInstanceRequest {
    pub instance_id: String,
    pub target_host: String,
    pub target_port: u32,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub local_url: Option<String>,
    #[serde(default)]
    pub friendly_url: Option<String>,
    /// `"success"` once the deploy job finished
    #[serde(default)]
    pub status: Option<String>,
}

/// Callback acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInstanceResponse {
    pub status: String,
    pub instance_id: String,
    pub url: Option<String>,
}

/// SSH user upsert request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshUserRequest {
    pub ssh_user: String,
}

/// SSH user response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshUserResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_user: Option<String>,
}

/// SSH user map response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshUserListResponse {
    pub total: usize,
    pub map: BTreeMap<String, String>,
}

/// Job catalog response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListResponse {
    pub total: usize,
    pub jobs: Vec<String>,
}

/// Build waiting in the CI queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingJob {
    pub id: u64,
    pub job: String,
    pub why: String,
    pub blocked: bool,
    pub stuck: bool,
}

/// CI queue response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingJobsResponse {
    pub total: usize,
    pub items: Vec<PendingJob>,
}

/// Status of one numbered build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStatusResponse {
    pub job_name: String,
    pub build_number: u64,
    /// `queued`, `running`, `success` or `failed`
    pub status: String,
}
