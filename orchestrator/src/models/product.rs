//! Product models

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Deployment environment tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Environment {
    Prod,
    Dev,
    Test,
}

impl Environment {
    pub const ALL: [Environment; 3] = [Environment::Prod, Environment::Dev, Environment::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Prod => "PROD",
            Environment::Dev => "DEV",
            Environment::Test => "TEST",
        }
    }

    /// Lower-case form passed to CI jobs as `ENV`
    pub fn job_param(&self) -> &'static str {
        match self {
            Environment::Prod => "prod",
            Environment::Dev => "dev",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prod" | "production" => Ok(Environment::Prod),
            "dev" | "development" => Ok(Environment::Dev),
            "test" | "testing" => Ok(Environment::Test),
            _ => Err(format!(
                "environment must be PROD, DEV or TEST, got: {:?}",
                s.trim()
            )),
        }
    }
}

impl Serialize for Environment {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

pub const DEFAULT_WEB_PORT: u16 = 80;

fn default_web_port() -> u16 {
    DEFAULT_WEB_PORT
}

/// A deployable unit definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Unique slug, immutable after creation
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Deploy job per environment. Only environments explicitly set are present.
    #[serde(default)]
    pub deploy_jobs: BTreeMap<Environment, String>,

    /// Teardown job. Instances cannot be deleted (unforced) while empty.
    #[serde(default)]
    pub delete_job: String,

    #[serde(default)]
    pub web_service: Option<String>,

    #[serde(default = "default_web_port")]
    pub web_port: u16,
}

impl Product {
    /// Deploy job configured for `env`, if any
    pub fn deploy_job(&self, env: Environment) -> Option<&str> {
        self.deploy_jobs
            .get(&env)
            .map(|job| job.as_str())
            .filter(|job| !job.is_empty())
    }

    /// Teardown job, if configured
    pub fn delete_job(&self) -> Option<&str> {
        Some(self.delete_job.as_str()).filter(|job| !job.is_empty())
    }
}
