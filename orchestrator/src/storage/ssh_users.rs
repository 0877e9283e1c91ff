//! SSH user overrides per host

use std::collections::BTreeMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::ArkError;
use crate::filesys::file::File;

pub const DEFAULT_SSH_USER: &str = "root";

/// Whether `user` is usable as a login name in job parameters
pub fn is_valid_ssh_user(user: &str) -> bool {
    !user.is_empty()
        && user.len() <= 32
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Host to login name map, optionally written through to a JSON file
pub struct SshUserStore {
    users: RwLock<BTreeMap<String, String>>,
    file: Option<File>,
    default_user: String,
}

impl SshUserStore {
    pub fn in_memory(default_user: impl Into<String>) -> Self {
        Self {
            users: RwLock::new(BTreeMap::new()),
            file: None,
            default_user: default_user.into(),
        }
    }

    /// Load the map from `file`, starting empty when it does not exist
    pub async fn load(file: File, default_user: impl Into<String>) -> Result<Self, ArkError> {
        let users: BTreeMap<String, String> = file.read_json_or_default().await?;
        debug!("Loaded {} ssh user overrides", users.len());
        Ok(Self {
            users: RwLock::new(users),
            file: Some(file),
            default_user: default_user.into(),
        })
    }

    pub fn default_user(&self) -> &str {
        &self.default_user
    }

    async fn persist(&self, users: &BTreeMap<String, String>) -> Result<(), ArkError> {
        match &self.file {
            Some(file) => file.write_json(users).await,
            None => Ok(()),
        }
    }

    pub async fn list(&self) -> BTreeMap<String, String> {
        self.users.read().await.clone()
    }

    pub async fn get(&self, host: &str) -> Option<String> {
        self.users.read().await.get(host.trim()).cloned()
    }

    /// Login for `host`: explicit override, then the first mapped alias, then the default
    pub async fn resolve<'a>(&self, hosts: impl IntoIterator<Item = &'a str>) -> String {
        let users = self.users.read().await;
        hosts
            .into_iter()
            .find_map(|h| users.get(h.trim()).cloned())
            .unwrap_or_else(|| self.default_user.clone())
    }

    pub async fn set(&self, host: &str, user: &str) -> Result<(), ArkError> {
        let host = host.trim();
        let user = user.trim();
        if host.is_empty() {
            return Err(ArkError::InvalidArgument("host is required".to_string()));
        }
        if user.is_empty() {
            return Err(ArkError::InvalidArgument("ssh_user is required".to_string()));
        }
        if !is_valid_ssh_user(user) {
            return Err(ArkError::InvalidArgument(format!("invalid ssh_user: {:?}", user)));
        }

        let mut users = self.users.write().await;
        let previous = users.insert(host.to_string(), user.to_string());
        if let Err(e) = self.persist(&users).await {
            match previous {
                Some(prev) => users.insert(host.to_string(), prev),
                None => users.remove(host),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Remove the override for `host`. Removing an unmapped host is a no-op.
    pub async fn delete(&self, host: &str) -> Result<(), ArkError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(ArkError::InvalidArgument("host is required".to_string()));
        }
        let mut users = self.users.write().await;
        if let Some(previous) = users.remove(host) {
            if let Err(e) = self.persist(&users).await {
                users.insert(host.to_string(), previous);
                return Err(e);
            }
        }
        Ok(())
    }
}
