//! Tailscale API v2 models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tailnet device as returned by `GET /tailnet/{tailnet}/devices`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailscaleDevice {
    pub id: String,
    /// MagicDNS name, e.g. `node1.tailnet-abc.ts.net`
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, rename = "online")]
    pub is_online: bool,
    #[serde(default)]
    pub client_version: Option<String>,
}

/// Device listing envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<TailscaleDevice>,
}
