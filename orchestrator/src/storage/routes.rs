//! Proxy routes to deployed services

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::ArkError;
use crate::filesys::file::File;

/// Length of the short instance id used in `/instances/by-short/{short}`
pub const SHORT_ID_LEN: usize = 8;

/// Where requests for an instance are forwarded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub instance_id: String,
    pub target_host: String,
    pub target_port: u16,
    pub updated_at: DateTime<Utc>,
}

impl Route {
    pub fn new(instance_id: impl Into<String>, target_host: impl Into<String>, target_port: u16) -> Self {
        Self {
            instance_id: instance_id.into(),
            target_host: target_host.into(),
            target_port,
            updated_at: Utc::now(),
        }
    }
}

/// Whether `short` looks like the first segment of an instance id
pub fn is_short_id(short: &str) -> bool {
    short.len() == SHORT_ID_LEN
        && short
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Instance id to route map, optionally written through to a JSON file
pub struct RouteStore {
    routes: RwLock<BTreeMap<String, Route>>,
    file: Option<File>,
}

impl RouteStore {
    pub fn in_memory() -> Self {
        Self {
            routes: RwLock::new(BTreeMap::new()),
            file: None,
        }
    }

    /// Load the routes from `file`, starting empty when it does not exist
    pub async fn load(file: File) -> Result<Self, ArkError> {
        let routes: BTreeMap<String, Route> = file.read_json_or_default().await?;
        debug!("Loaded {} proxy routes", routes.len());
        Ok(Self {
            routes: RwLock::new(routes),
            file: Some(file),
        })
    }

    async fn persist(&self, routes: &BTreeMap<String, Route>) -> Result<(), ArkError> {
        match &self.file {
            Some(file) => file.write_json(routes).await,
            None => Ok(()),
        }
    }

    pub async fn get(&self, instance_id: &str) -> Result<Route, ArkError> {
        self.routes
            .read()
            .await
            .get(instance_id)
            .cloned()
            .ok_or_else(|| ArkError::NotFound("instance not found".to_string()))
    }

    /// Route of the single instance whose id starts with `short`
    pub async fn find_by_short(&self, short: &str) -> Result<Route, ArkError> {
        if !is_short_id(short) {
            return Err(ArkError::InvalidArgument(format!("invalid short id: {:?}", short)));
        }
        let routes = self.routes.read().await;
        let mut matches = routes.values().filter(|r| r.instance_id.starts_with(short));
        match (matches.next(), matches.next()) {
            (Some(route), None) => Ok(route.clone()),
            (Some(_), Some(_)) => Err(ArkError::Conflict(format!(
                "short id {} matches several instances",
                short
            ))),
            (None, _) => Err(ArkError::NotFound("instance not found".to_string())),
        }
    }

    /// Insert or replace the route of `route.instance_id`
    pub async fn put(&self, route: Route) -> Result<(), ArkError> {
        let mut routes = self.routes.write().await;
        let id = route.instance_id.clone();
        let previous = routes.insert(id.clone(), route);
        if let Err(e) = self.persist(&routes).await {
            match previous {
                Some(prev) => routes.insert(id, prev),
                None => routes.remove(&id),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Drop the route of `instance_id`. Dropping a missing route is a no-op.
    pub async fn delete(&self, instance_id: &str) -> Result<(), ArkError> {
        let mut routes = self.routes.write().await;
        if let Some(previous) = routes.remove(instance_id) {
            if let Err(e) = self.persist(&routes).await {
                routes.insert(instance_id.to_string(), previous);
                return Err(e);
            }
        }
        Ok(())
    }
}
