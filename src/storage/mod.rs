use std::path::{Path, PathBuf};

use log::debug;
use tokio::fs;

use crate::engine::models::{LocalVersion, Version};

pub const VERSION_FILE: &str = "version.txt";

/// Access to the version record kept inside the installation root.
#[derive(Clone)]
pub struct StorageManager {
    install_root: PathBuf,
}

impl StorageManager {
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
        }
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn version_path(&self) -> PathBuf {
        self.install_root.join(VERSION_FILE)
    }

    pub async fn read_local_version(&self) -> LocalVersion {
        let path = self.version_path();
        match fs::read(&path).await {
            Ok(bytes) => Version::parse(&String::from_utf8_lossy(&bytes))
                .map(LocalVersion::Known)
                .unwrap_or(LocalVersion::Unknown),
            Err(err) => {
                debug!("storage: no version record at {} ({err})", path.display());
                LocalVersion::Unknown
            }
        }
    }

    /// Replace the version record. Written via temp file + rename.
    pub async fn write_local_version(&self, version: &Version) -> Result<(), String> {
        fs::create_dir_all(&self.install_root)
            .await
            .map_err(|e| format!("unable to create install root: {e}"))?;
        let path = self.version_path();
        let tmp = self.install_root.join(format!("{VERSION_FILE}.tmp"));
        fs::write(&tmp, version.as_str().as_bytes())
            .await
            .map_err(|e| format!("unable to persist version: {e}"))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| format!("unable to replace version record: {e}"))
    }
}
