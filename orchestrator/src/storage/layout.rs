//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// On-disk layout of the orchestrator's state
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn base(&self) -> Dir {
        Dir::new(&self.base_dir)
    }

    /// Product catalog file
    pub fn products_file(&self) -> File {
        self.base().file("products.json")
    }

    /// Instance registry file
    pub fn instances_file(&self) -> File {
        self.base().file("instances.json")
    }

    /// SSH user override map
    pub fn ssh_users_file(&self) -> File {
        self.base().file("ssh_users.json")
    }

    /// Proxy routes reported by deploy callbacks
    pub fn routes_file(&self) -> File {
        self.base().file("routes.json")
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        self.base().subdir("logs")
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), crate::errors::ArkError> {
        self.base().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/var/lib/ark")
    }
}
