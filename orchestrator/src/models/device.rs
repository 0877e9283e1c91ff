//! Mesh device models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reachability of a mesh node as seen by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    /// Provider reports an active heartbeat
    Online,
    /// Not online, but has a mesh address and was seen recently
    Reachable,
    Offline,
}

impl Reachability {
    /// Whether the node may be chosen as a deployment target
    pub fn is_deployable(&self) -> bool {
        !matches!(self, Reachability::Offline)
    }
}

/// A mesh node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,

    /// Stable hostname
    pub host: String,

    /// Fully qualified mesh name
    #[serde(default)]
    pub name: String,

    /// Ordered addresses, mesh address first when present
    #[serde(default)]
    pub addresses: Vec<String>,

    #[serde(default)]
    pub os: String,

    pub online: bool,

    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,

    /// Derived at listing time
    pub status: Reachability,
}

impl Device {
    /// Whether `key` names this device by id, hostname, full name, short name or address
    pub fn matches(&self, key: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        self.id == key
            || self.host.eq_ignore_ascii_case(key)
            || self.name.eq_ignore_ascii_case(key)
            || self
                .name
                .split('.')
                .next()
                .is_some_and(|short| !short.is_empty() && short.eq_ignore_ascii_case(key))
            || self.addresses.iter().any(|a| a == key)
    }
}
