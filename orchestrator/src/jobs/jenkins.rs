//! Jenkins-backed job runner

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::ArkError;
use crate::http::client::HttpClient;
use crate::http::jenkins::parse_queue_id;
use crate::jobs::{BuildId, BuildStatus, JobParams, JobRunner, QueuedBuild};
use crate::utils::{retry_transient, retry_when, RetryOptions};

/// Jenkins runner options
#[derive(Debug, Clone)]
pub struct JenkinsOptions {
    /// How long `trigger` waits for the queue item to become a build
    pub queue_resolve_window: Duration,

    /// Poll interval while waiting on the queue
    pub queue_poll_interval: Duration,

    pub retry: RetryOptions,
}

impl Default for JenkinsOptions {
    fn default() -> Self {
        Self {
            queue_resolve_window: Duration::from_secs(6),
            queue_poll_interval: Duration::from_millis(350),
            retry: RetryOptions::default(),
        }
    }
}

/// Build reference as encoded in a [`BuildId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildRef {
    Number(u64),
    Queued(u64),
}

/// Encode `job` and `build` as `"{job}#{n}"` or `"{job}#q{queue}"`
pub fn encode_build_id(job: &str, build: BuildRef) -> BuildId {
    match build {
        BuildRef::Number(n) => BuildId::new(format!("{}#{}", job, n)),
        BuildRef::Queued(q) => BuildId::new(format!("{}#q{}", job, q)),
    }
}

/// Inverse of [`encode_build_id`]
pub fn decode_build_id(build: &BuildId) -> Result<(String, BuildRef), ArkError> {
    let invalid = || ArkError::InvalidArgument(format!("invalid build id: {}", build));
    let (job, reference) = build.as_str().rsplit_once('#').ok_or_else(invalid)?;
    if job.is_empty() {
        return Err(invalid());
    }
    let reference = match reference.strip_prefix('q') {
        Some(queue) => BuildRef::Queued(queue.parse().map_err(|_| invalid())?),
        None => BuildRef::Number(reference.parse().map_err(|_| invalid())?),
    };
    Ok((job.to_string(), reference))
}

/// Result of looking up a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueState {
    Started(u64),
    Waiting,
    Cancelled,
}

/// Job runner talking to a Jenkins controller
pub struct JenkinsRunner {
    client: HttpClient,
    options: JenkinsOptions,
    // queue id -> build number, once seen
    resolved: Mutex<HashMap<u64, u64>>,
}

impl JenkinsRunner {
    pub fn new(client: HttpClient, options: JenkinsOptions) -> Self {
        Self {
            client,
            options,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    async fn queue_state(&self, job: &str, queue_id: u64) -> Result<QueueState, ArkError> {
        if let Some(number) = self.cached_build(queue_id) {
            return Ok(QueueState::Started(number));
        }

        let state = match self.client.jenkins_queue_item(queue_id).await {
            Ok(item) if item.cancelled => QueueState::Cancelled,
            Ok(item) => match item.executable {
                Some(executable) if executable.number > 0 => QueueState::Started(executable.number),
                _ => QueueState::Waiting,
            },
            // Expired queue items are only reachable through the job's build history
            Err(ArkError::NotFound(_)) => {
                match self.client.jenkins_build_by_queue_id(job, queue_id).await? {
                    Some(number) => QueueState::Started(number),
                    None => QueueState::Waiting,
                }
            }
            Err(e) => return Err(e),
        };

        if let QueueState::Started(number) = state {
            let mut resolved = self.resolved.lock().unwrap_or_else(|e| e.into_inner());
            resolved.insert(queue_id, number);
        }
        Ok(state)
    }

    fn cached_build(&self, queue_id: u64) -> Option<u64> {
        let resolved = self.resolved.lock().unwrap_or_else(|e| e.into_inner());
        resolved.get(&queue_id).copied()
    }

    /// Wait a bounded time for a fresh queue item to start
    async fn resolve_queue(&self, job: &str, queue_id: u64) -> BuildRef {
        let deadline = Instant::now() + self.options.queue_resolve_window;
        while Instant::now() < deadline {
            match self.queue_state(job, queue_id).await {
                Ok(QueueState::Started(number)) => return BuildRef::Number(number),
                Ok(QueueState::Cancelled) => break,
                Ok(QueueState::Waiting) => {}
                Err(e) => {
                    debug!("Queue item {} not resolved yet: {}", queue_id, e);
                }
            }
            tokio::time::sleep(self.options.queue_poll_interval).await;
        }
        BuildRef::Queued(queue_id)
    }

    async fn build_number(&self, job: &str, build: BuildRef) -> Result<Option<u64>, ArkError> {
        match build {
            BuildRef::Number(n) => Ok(Some(n)),
            BuildRef::Queued(q) => match self.queue_state(job, q).await? {
                QueueState::Started(n) => Ok(Some(n)),
                QueueState::Waiting | QueueState::Cancelled => Ok(None),
            },
        }
    }
}

/// Map Jenkins `building`/`result` onto a build status
pub fn classify_build(building: bool, result: Option<&str>) -> BuildStatus {
    if building {
        return BuildStatus::Running;
    }
    match result {
        Some("SUCCESS") => BuildStatus::Success,
        Some(r) if !r.is_empty() => BuildStatus::Failed,
        // Not building and no result yet: the executor is still starting
        _ => BuildStatus::Running,
    }
}

#[async_trait]
impl JobRunner for JenkinsRunner {
    async fn trigger(&self, job: &str, params: &JobParams) -> Result<BuildId, ArkError> {
        let retry = &self.options.retry;
        let crumb = retry_transient(retry, "jenkins crumb", || self.client.jenkins_crumb()).await?;
        // A POST that may have reached Jenkins is never repeated
        let location = retry_when(retry, "jenkins trigger", ArkError::is_unsent, || {
            self.client
                .jenkins_build_with_parameters(job, params, crumb.as_ref())
        })
        .await?;

        let queue_id = parse_queue_id(&location).ok_or_else(|| {
            ArkError::Internal(format!("unexpected queue location: {}", location))
        })?;
        info!("Queued Jenkins job {} as queue item {}", job, queue_id);

        let build = self.resolve_queue(job, queue_id).await;
        if let BuildRef::Queued(q) = build {
            warn!("Queue item {} for {} not started within the resolve window", q, job);
        }
        Ok(encode_build_id(job, build))
    }

    async fn status(&self, build: &BuildId) -> Result<BuildStatus, ArkError> {
        let (job, reference) = decode_build_id(build)?;
        let retry = &self.options.retry;

        if let BuildRef::Queued(q) = reference {
            let state = retry_transient(retry, "jenkins queue", || self.queue_state(&job, q)).await?;
            match state {
                QueueState::Cancelled => return Ok(BuildStatus::Failed),
                QueueState::Waiting => return Ok(BuildStatus::Queued),
                QueueState::Started(_) => {}
            }
        }

        let Some(number) = self.build_number(&job, reference).await? else {
            return Ok(BuildStatus::Queued);
        };
        let status = retry_transient(retry, "jenkins build status", || {
            self.client.jenkins_build_status(&job, number)
        })
        .await?;
        Ok(classify_build(status.building, status.result.as_deref()))
    }

    async fn logs(&self, build: &BuildId) -> Result<BTreeMap<String, String>, ArkError> {
        let (job, reference) = decode_build_id(build)?;
        let retry = &self.options.retry;

        let number =
            retry_transient(retry, "jenkins queue", || self.build_number(&job, reference)).await?;
        let text = match number {
            Some(n) => {
                retry_transient(retry, "jenkins console", || {
                    self.client.jenkins_console_text(&job, n)
                })
                .await?
            }
            None => String::new(),
        };
        Ok(BTreeMap::from([(job, text)]))
    }

    async fn list_jobs(&self) -> Result<Vec<String>, ArkError> {
        retry_transient(&self.options.retry, "jenkins jobs", || {
            self.client.jenkins_jobs()
        })
        .await
    }

    async fn pending(&self) -> Result<Vec<QueuedBuild>, ArkError> {
        let queue = retry_transient(&self.options.retry, "jenkins queue", || {
            self.client.jenkins_queue()
        })
        .await?;
        Ok(queue
            .items
            .into_iter()
            .map(|item| QueuedBuild {
                id: item.id,
                job: item.task.map(|t| t.name).unwrap_or_default(),
                why: item.why.unwrap_or_default(),
                blocked: item.blocked,
                stuck: item.stuck,
            })
            .collect())
    }

    fn build_id(&self, job: &str, number: u64) -> BuildId {
        encode_build_id(job, BuildRef::Number(number))
    }
}
