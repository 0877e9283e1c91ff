//! Instance models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::{InstanceFsm, InstanceStatus};
use crate::mesh::Target;
use crate::models::product::Environment;

/// A deployment of a product on one host and environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,

    pub product_id: String,

    /// Target host as given at creation (mesh address or hostname)
    #[serde(alias = "target_host")]
    pub device_id: String,

    /// Mesh device the host resolved to at creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_device: Option<String>,

    /// Address the deploy job was given
    #[serde(default)]
    pub target_address: String,

    pub environment: Environment,

    /// Lifecycle state; serialized as `status`, `error` and `status_before_delete`
    #[serde(flatten)]
    pub fsm: InstanceFsm,

    #[serde(default)]
    pub url: Option<String>,

    /// Deploy build reference in the job runner
    pub build_id: String,

    /// Deploy job name
    pub job_name: String,

    /// Job name to build id, including the delete build once triggered
    #[serde(default)]
    pub builds: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_job_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_build_id: Option<String>,

    #[serde(default)]
    pub ssh_user: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub fn status(&self) -> InstanceStatus {
        *self.fsm.state()
    }

    /// Whether this instance occupies its (product, host, environment) slot
    pub fn is_live(&self) -> bool {
        self.status().is_live()
    }

    /// Keys naming the host this instance runs on
    pub fn target_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.target_device.as_deref().into_iter().collect();
        if !self.target_address.is_empty() {
            keys.push(&self.target_address);
        }
        // Records written before resolution was stored only know the given host
        if keys.is_empty() {
            keys.push(&self.device_id);
        }
        keys
    }

    /// Whether this instance sits on the (product, target, environment) slot
    pub fn occupies(&self, product_id: &str, env: Environment, target: &Target) -> bool {
        self.product_id == product_id
            && self.environment == env
            && self
                .target_keys()
                .into_iter()
                .any(|key| key == target.address || target.device_id.as_deref() == Some(key))
    }

    /// Address to reach the host, falling back to the host as given
    pub fn address(&self) -> &str {
        if self.target_address.is_empty() {
            &self.device_id
        } else {
            &self.target_address
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
