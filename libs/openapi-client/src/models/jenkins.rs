//! Jenkins JSON API models

use serde::{Deserialize, Serialize};

/// `GET /crumbIssuer/api/json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrumbResponse {
    pub crumb_request_field: String,
    pub crumb: String,
}

/// Executable attached to a queue item once it left the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueExecutable {
    pub number: u64,
    #[serde(default)]
    pub url: Option<String>,
}

/// `GET /queue/item/{id}/api/json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueItemResponse {
    #[serde(default)]
    pub executable: Option<QueueExecutable>,
    #[serde(default)]
    pub cancelled: bool,
}

/// `GET /job/{job}/{number}/api/json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStatusResponse {
    #[serde(default)]
    pub building: bool,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub number: u64,
}

/// Build reference inside a job listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobBuildRef {
    pub number: u64,
    #[serde(default)]
    pub queue_id: u64,
}

/// `GET /job/{job}/api/json?tree=builds[number,queueId]{0,20}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobBuildsResponse {
    #[serde(default)]
    pub builds: Vec<JobBuildRef>,
}

/// Job entry in the root listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRef {
    pub name: String,
}

/// `GET /api/json?tree=jobs[name]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobListResponse {
    #[serde(default)]
    pub jobs: Vec<JobRef>,
}

/// Task a queue item belongs to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueTask {
    #[serde(default)]
    pub name: String,
}

/// Entry of the build queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueListItem {
    pub id: u64,
    #[serde(default)]
    pub task: Option<QueueTask>,
    #[serde(default)]
    pub why: Option<String>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub stuck: bool,
}

/// `GET /queue/api/json?tree=items[id,task[name],why,blocked,stuck]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueListResponse {
    #[serde(default)]
    pub items: Vec<QueueListItem>,
}
