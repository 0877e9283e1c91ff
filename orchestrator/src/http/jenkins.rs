//! Jenkins API client

use std::collections::BTreeMap;

use openapi_client::models::jenkins::{
    BuildStatusResponse, CrumbResponse, JobBuildsResponse, JobListResponse, QueueItemResponse,
    QueueListResponse,
};
use reqwest::header::LOCATION;
use reqwest::Method;
use url::Url;

use crate::errors::ArkError;
use crate::http::client::HttpClient;

/// CSRF crumb header to attach to mutating requests
#[derive(Debug, Clone)]
pub struct Crumb {
    pub field: String,
    pub value: String,
}

impl HttpClient {
    /// Path under the base URL for `job` followed by `rest`, each segment escaped
    pub fn jenkins_job_url(&self, job: &str, rest: &[&str]) -> Result<String, ArkError> {
        let mut url = Url::parse(self.base_url())
            .map_err(|e| ArkError::ConfigError(format!("invalid Jenkins URL: {}", e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ArkError::ConfigError("Jenkins URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            for part in job.split('/').filter(|p| !p.is_empty()) {
                segments.push("job").push(part);
            }
            segments.extend(rest);
        }
        Ok(url.to_string())
    }

    /// Fetch a CSRF crumb. `None` when the crumb issuer is disabled.
    pub async fn jenkins_crumb(&self) -> Result<Option<Crumb>, ArkError> {
        match self
            .get_json::<CrumbResponse>("/crumbIssuer/api/json")
            .await
        {
            Ok(crumb) if !crumb.crumb.is_empty() && !crumb.crumb_request_field.is_empty() => {
                Ok(Some(Crumb {
                    field: crumb.crumb_request_field,
                    value: crumb.crumb,
                }))
            }
            Ok(_) => Err(ArkError::Internal(
                "crumb response missing fields".to_string(),
            )),
            Err(ArkError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Queue a parameterized build and return the queue item URL
    pub async fn jenkins_build_with_parameters(
        &self,
        job: &str,
        params: &BTreeMap<String, String>,
        crumb: Option<&Crumb>,
    ) -> Result<String, ArkError> {
        let url = self.jenkins_job_url(job, &["buildWithParameters"])?;
        let mut request = self.request(Method::POST, &url).form(params);
        if let Some(crumb) = crumb {
            request = request.header(crumb.field.as_str(), crumb.value.as_str());
        }

        let response = match self.send(request).await {
            Err(ArkError::NotFound(_)) => {
                return Err(ArkError::NotFound(format!("job not found: {}", job)))
            }
            other => other?,
        };

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ArkError::Internal("Jenkins did not return a queue Location header".to_string())
            })
    }

    /// Read a queue item
    pub async fn jenkins_queue_item(&self, queue_id: u64) -> Result<QueueItemResponse, ArkError> {
        self.get_json(&format!("/queue/item/{}/api/json", queue_id))
            .await
    }

    /// Read the whole build queue
    pub async fn jenkins_queue(&self) -> Result<QueueListResponse, ArkError> {
        self.get_json("/queue/api/json?tree=items[id,task[name],why,blocked,stuck]")
            .await
    }

    /// Find the build started from `queue_id` among the job's recent builds
    pub async fn jenkins_build_by_queue_id(
        &self,
        job: &str,
        queue_id: u64,
    ) -> Result<Option<u64>, ArkError> {
        let url = self.jenkins_job_url(job, &["api", "json"])?;
        let url = format!("{}?tree=builds[number,queueId]{{0,20}}", url);
        let builds: JobBuildsResponse = self.get_json(&url).await?;
        Ok(builds
            .builds
            .iter()
            .find(|b| b.queue_id == queue_id)
            .map(|b| b.number))
    }

    /// Read build progress
    pub async fn jenkins_build_status(
        &self,
        job: &str,
        number: u64,
    ) -> Result<BuildStatusResponse, ArkError> {
        let number = number.to_string();
        let url = self.jenkins_job_url(job, &[number.as_str(), "api", "json"])?;
        self.get_json(&url).await
    }

    /// Read the raw console output of a build
    pub async fn jenkins_console_text(&self, job: &str, number: u64) -> Result<String, ArkError> {
        let number = number.to_string();
        let url = self.jenkins_job_url(job, &[number.as_str(), "consoleText"])?;
        self.get_text(&url).await
    }

    /// List top-level job names
    pub async fn jenkins_jobs(&self) -> Result<Vec<String>, ArkError> {
        let jobs: JobListResponse = self.get_json("/api/json?tree=jobs[name]").await?;
        let mut names: Vec<String> = jobs.jobs.into_iter().map(|j| j.name).collect();
        names.sort();
        Ok(names)
    }
}

/// Queue id from a queue item URL such as `http://ci/queue/item/42/`
pub fn parse_queue_id(location: &str) -> Option<u64> {
    location
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|last| last.parse().ok())
}
