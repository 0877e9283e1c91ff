//! CI job runner adapter

pub mod jenkins;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ArkError;

pub use jenkins::{JenkinsOptions, JenkinsRunner};

/// Parameters passed to a parameterized job
pub type JobParams = BTreeMap<String, String>;

/// Reference to a triggered build. Only the runner that issued it parses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(String);

impl BuildId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Progress of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Queued => "queued",
            BuildStatus::Running => "running",
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
        }
    }
}

/// Build waiting in the CI queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedBuild {
    pub id: u64,
    pub job: String,
    #[serde(default)]
    pub why: String,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub stuck: bool,
}

/// Job runner trait for testability
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Queue `job` with `params`
    async fn trigger(&self, job: &str, params: &JobParams) -> Result<BuildId, ArkError>;

    /// Current progress of a build
    async fn status(&self, build: &BuildId) -> Result<BuildStatus, ArkError>;

    /// Console output of a build keyed by job name
    async fn logs(&self, build: &BuildId) -> Result<BTreeMap<String, String>, ArkError>;

    /// Names of every job the CI system knows about
    async fn list_jobs(&self) -> Result<Vec<String>, ArkError>;

    /// Builds still waiting for an executor
    async fn pending(&self) -> Result<Vec<QueuedBuild>, ArkError>;

    /// Reference to build `number` of `job`, as `status` and `logs` accept it
    fn build_id(&self, job: &str, number: u64) -> BuildId;
}
