//! Utility functions

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::ArkError;

/// Version information for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Cooldown options for exponential backoff
#[derive(Debug, Clone)]
pub struct CooldownOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for CooldownOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
        }
    }
}

/// Calculate exponential backoff delay
pub fn calc_exp_backoff(options: &CooldownOptions, attempt: u32) -> Duration {
    let delay_secs = options.base_delay.as_secs_f64() * options.multiplier.powi(attempt as i32);
    let capped_delay = delay_secs.min(options.max_delay.as_secs_f64());
    Duration::from_secs_f64(capped_delay)
}

/// Retry policy for upstream calls
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub cooldown: CooldownOptions,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown: CooldownOptions {
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(5),
                multiplier: 2.0,
            },
        }
    }
}

/// Run `op`, retrying only transient failures.
///
/// Terminal errors are returned on first occurrence.
pub async fn retry_transient<T, F, Fut>(
    options: &RetryOptions,
    what: &str,
    op: F,
) -> Result<T, ArkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ArkError>>,
{
    retry_when(options, what, ArkError::is_transient, op).await
}

/// Run `op`, retrying the failures `retryable` accepts.
///
/// A transient failure that is not retried still surfaces as `Unavailable`.
pub async fn retry_when<T, F, Fut, R>(
    options: &RetryOptions,
    what: &str,
    retryable: R,
    mut op: F,
) -> Result<T, ArkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ArkError>>,
    R: Fn(&ArkError) -> bool,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) && attempt + 1 < options.max_attempts => {
                let wait = calc_exp_backoff(&options.cooldown, attempt);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    what,
                    attempt + 1,
                    options.max_attempts,
                    wait,
                    e
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                return Err(ArkError::Unavailable(format!("{}: {}", what, e)));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
