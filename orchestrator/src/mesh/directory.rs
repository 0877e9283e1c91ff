//! Cached, classified view over the mesh provider

use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use tracing::{debug, warn};

use crate::errors::ArkError;
use crate::mesh::{MeshNode, MeshProvider};
use crate::models::device::{Device, Reachability};

/// Longest a stale listing may be served
pub const MAX_STALE_TTL: Duration = Duration::from_secs(600);

/// Mesh directory options
#[derive(Debug, Clone)]
pub struct MeshOptions {
    /// Serve a fetched listing without refetching for this long
    pub refresh_interval: Duration,

    /// Serve the last listing (degraded) for this long after provider failures
    pub stale_ttl: Duration,

    /// A node not online but seen within this window counts as reachable
    pub recency_window: Duration,

    /// Address range of the mesh overlay
    pub mesh_cidr: IpNet,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(15),
            stale_ttl: MAX_STALE_TTL,
            recency_window: Duration::from_secs(600),
            mesh_cidr: default_mesh_cidr(),
        }
    }
}

/// Tailscale CGNAT range `100.64.0.0/10`
pub fn default_mesh_cidr() -> IpNet {
    IpNet::V4(ipnet::Ipv4Net::new(std::net::Ipv4Addr::new(100, 64, 0, 0), 10).unwrap_or_default())
}

/// Devices plus whether the listing came from a stale or missing snapshot
#[derive(Debug, Clone, Default)]
pub struct DeviceListing {
    pub devices: Vec<Device>,
    pub degraded: bool,
}

/// Deploy target as resolved against the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Matched device, `None` for an unverified mesh address
    pub device_id: Option<String>,
    /// Address the deploy job connects to
    pub address: String,
}

impl Target {
    /// Every key that names this target, used to detect aliases of one host
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.device_id.iter().cloned().collect();
        keys.push(self.address.clone());
        keys
    }
}

struct Snapshot {
    nodes: Vec<MeshNode>,
    fetched_at: Instant,
}

/// Read-through cache over a [`MeshProvider`]
pub struct MeshDirectory {
    provider: Arc<dyn MeshProvider>,
    options: MeshOptions,
    snapshot: RwLock<Option<Snapshot>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl MeshDirectory {
    pub fn new(provider: Arc<dyn MeshProvider>, mut options: MeshOptions) -> Self {
        options.stale_ttl = options.stale_ttl.min(MAX_STALE_TTL);
        Self {
            provider,
            options,
            snapshot: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Snapshot younger than `max_age`, classified now
    fn cached(&self, max_age: Duration) -> Option<Vec<Device>> {
        let snapshot = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        snapshot
            .as_ref()
            .filter(|s| s.fetched_at.elapsed() < max_age)
            .map(|s| self.classify_all(&s.nodes))
    }

    fn classify_all(&self, nodes: &[MeshNode]) -> Vec<Device> {
        let now = Utc::now();
        let mut devices: Vec<Device> = nodes
            .iter()
            .map(|node| to_device(node, &self.options, now))
            .collect();
        devices.sort_by(|a, b| a.host.cmp(&b.host).then_with(|| a.id.cmp(&b.id)));
        devices
    }

    /// List devices. Never fails; provider outages yield `degraded = true`.
    pub async fn list_devices(&self) -> DeviceListing {
        if let Some(devices) = self.cached(self.options.refresh_interval) {
            return DeviceListing {
                devices,
                degraded: false,
            };
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(devices) = self.cached(self.options.refresh_interval) {
            return DeviceListing {
                devices,
                degraded: false,
            };
        }

        match self.provider.list_nodes().await {
            Ok(nodes) => {
                debug!("Fetched {} mesh nodes", nodes.len());
                let devices = self.classify_all(&nodes);
                let mut snapshot = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
                *snapshot = Some(Snapshot {
                    nodes,
                    fetched_at: Instant::now(),
                });
                DeviceListing {
                    devices,
                    degraded: false,
                }
            }
            Err(e) => {
                warn!("Mesh provider unavailable, serving cached devices: {}", e);
                DeviceListing {
                    devices: self.cached(self.options.stale_ttl).unwrap_or_default(),
                    degraded: true,
                }
            }
        }
    }

    /// Device by id, hostname, name or address
    pub async fn get_device(&self, key: &str) -> Result<Device, ArkError> {
        let listing = self.list_devices().await;
        match listing.devices.into_iter().find(|d| d.matches(key)) {
            Some(device) => Ok(device),
            None if listing.degraded => Err(ArkError::Unavailable(
                "mesh directory unavailable".to_string(),
            )),
            None => Err(ArkError::NotFound(format!("device not found: {}", key))),
        }
    }

    /// Preferred address of `host`
    pub async fn resolve(&self, host: &str) -> Result<String, ArkError> {
        let listing = self.list_devices().await;
        listing
            .devices
            .iter()
            .find(|d| d.matches(host))
            .and_then(|d| preferred_address(d, &self.options.mesh_cidr))
            .ok_or_else(|| ArkError::NotFound(format!("unknown mesh host: {}", host)))
    }

    /// Validate `host` as a deployment target and return its address
    pub async fn check_target(&self, host: &str) -> Result<Target, ArkError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(ArkError::InvalidArgument("target_host is required".to_string()));
        }

        let listing = self.list_devices().await;
        if let Some(device) = listing.devices.iter().find(|d| d.matches(host)) {
            if !device.status.is_deployable() {
                return Err(ArkError::InvalidArgument(format!(
                    "target host {} is offline",
                    host
                )));
            }
            return Ok(Target {
                device_id: Some(device.id.clone()),
                address: preferred_address(device, &self.options.mesh_cidr)
                    .unwrap_or_else(|| host.to_string()),
            });
        }

        if listing.degraded {
            if is_mesh_ip(host, &self.options.mesh_cidr) {
                warn!(
                    "Mesh directory degraded; accepting mesh address {} unverified",
                    host
                );
                return Ok(Target {
                    device_id: None,
                    address: host.to_string(),
                });
            }
            if listing.devices.is_empty() {
                return Err(ArkError::Unavailable(
                    "mesh directory unavailable".to_string(),
                ));
            }
        }

        Err(ArkError::NotFound(format!("unknown mesh host: {}", host)))
    }
}

/// Whether `s` is an IP address inside `cidr`
pub fn is_mesh_ip(s: &str, cidr: &IpNet) -> bool {
    s.parse::<IpAddr>().is_ok_and(|ip| cidr.contains(&ip))
}

/// First address inside the mesh range, else the first address
pub fn preferred_address(device: &Device, cidr: &IpNet) -> Option<String> {
    device
        .addresses
        .iter()
        .find(|a| is_mesh_ip(a, cidr))
        .or_else(|| device.addresses.first())
        .cloned()
}

/// Derive reachability at `now`
pub fn classify(node: &MeshNode, options: &MeshOptions, now: DateTime<Utc>) -> Reachability {
    if node.online {
        return Reachability::Online;
    }
    let has_mesh_address = node
        .addresses
        .iter()
        .any(|a| is_mesh_ip(a, &options.mesh_cidr));
    let window = chrono::Duration::from_std(options.recency_window).unwrap_or_default();
    let recent = node
        .last_seen
        .is_some_and(|seen| now.signed_duration_since(seen) <= window);
    if has_mesh_address && recent {
        Reachability::Reachable
    } else {
        Reachability::Offline
    }
}

fn to_device(node: &MeshNode, options: &MeshOptions, now: DateTime<Utc>) -> Device {
    let mut addresses = node.addresses.clone();
    // Stable sort keeps provider order within each group
    addresses.sort_by_key(|a| !is_mesh_ip(a, &options.mesh_cidr));
    Device {
        id: node.id.clone(),
        host: node.host.clone(),
        name: node.name.clone(),
        addresses,
        os: node.os.clone(),
        online: node.online,
        last_seen: node.last_seen,
        status: classify(node, options, now),
    }
}
