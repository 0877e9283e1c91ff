//! Mesh network directory

pub mod directory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use openapi_client::models::tailscale::TailscaleDevice;

use crate::errors::ArkError;
use crate::http::client::HttpClient;

pub use directory::{DeviceListing, MeshDirectory, MeshOptions, Target};

/// A node as reported by the mesh provider, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshNode {
    pub id: String,
    pub host: String,
    pub name: String,
    pub addresses: Vec<String>,
    pub os: String,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<TailscaleDevice> for MeshNode {
    fn from(device: TailscaleDevice) -> Self {
        let host = if device.hostname.is_empty() {
            device.name.split('.').next().unwrap_or_default().to_string()
        } else {
            device.hostname
        };
        Self {
            id: device.id,
            host,
            name: device.name,
            addresses: device.addresses,
            os: device.os,
            online: device.is_online,
            last_seen: device.last_seen,
        }
    }
}

/// Mesh provider trait for testability
#[async_trait]
pub trait MeshProvider: Send + Sync {
    /// Every node currently known to the provider
    async fn list_nodes(&self) -> Result<Vec<MeshNode>, ArkError>;
}

/// Tailscale API provider
pub struct TailscaleProvider {
    client: Arc<HttpClient>,
    tailnet: String,
}

impl TailscaleProvider {
    pub fn new(client: Arc<HttpClient>, tailnet: impl Into<String>) -> Self {
        Self {
            client,
            tailnet: tailnet.into(),
        }
    }
}

#[async_trait]
impl MeshProvider for TailscaleProvider {
    async fn list_nodes(&self) -> Result<Vec<MeshNode>, ArkError> {
        let devices = self.client.tailscale_devices(&self.tailnet).await?;
        Ok(devices.into_iter().map(MeshNode::from).collect())
    }
}
