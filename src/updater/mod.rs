use std::path::PathBuf;

use log::{debug, info, warn};

use crate::engine::models::{
    LocalVersion, ReleaseInfo, RemoteManifest, Retrieval, UpdateStrategy, Version,
};
use crate::networking::NetworkClient;
use crate::storage::{StorageManager, VERSION_FILE};

pub mod apply;
pub mod error;
pub mod fetch;

pub const DEFAULT_REMOTE_BASE: &str =
    "https://raw.githubusercontent.com/DJJJNabba/WallpaperCacheUpdater/main";
pub const DEFAULT_RELEASE_API: &str =
    "https://api.github.com/repos/DJJJNabba/WallpaperCacheUpdater/releases/latest";
/// Top-level directory every release archive must contain.
pub const PROJECT_DIR: &str = "WallpaperCacheUpdater";

/// Files shipped by the raw-content endpoint: entry point, updater, config
/// defaults, wallpaper control, tray menu, startup registration.
pub const DEFAULT_FILES: [&str; 6] = [
    "wallpaper-cache-updater.exe",
    "updater.cmd",
    "config.defaults.json",
    "wallpaper.ps1",
    "tray.ps1",
    "startup.ps1",
];

/// Resolved update configuration, handed to the components that need it.
#[derive(Clone, Debug)]
pub struct UpdaterSettings {
    pub strategy: UpdateStrategy,
    pub remote_base: String,
    pub release_api: String,
    pub install_root: PathBuf,
    pub project_dir: String,
    pub files: Vec<String>,
}

impl UpdaterSettings {
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            strategy: UpdateStrategy::FileList,
            remote_base: DEFAULT_REMOTE_BASE.to_owned(),
            release_api: DEFAULT_RELEASE_API.to_owned(),
            install_root: install_root.into(),
            project_dir: PROJECT_DIR.to_owned(),
            files: DEFAULT_FILES.iter().map(|name| (*name).to_owned()).collect(),
        }
    }

    pub fn file_url(&self, name: &str) -> String {
        format!("{}/{}", self.remote_base.trim_end_matches('/'), name)
    }
}

/// An update exists when the remote answered and its token differs from ours.
#[must_use]
pub fn is_update_available(local: &LocalVersion, remote: Option<&Version>) -> bool {
    remote.is_some_and(|remote| !local.matches(remote))
}

/// Answers "what do we run" and "what is published".
#[derive(Clone)]
pub struct VersionOracle {
    network: NetworkClient,
    storage: StorageManager,
    settings: UpdaterSettings,
}

impl VersionOracle {
    pub fn new(network: NetworkClient, storage: StorageManager, settings: UpdaterSettings) -> Self {
        Self {
            network,
            storage,
            settings,
        }
    }

    pub async fn local_version(&self) -> LocalVersion {
        self.storage.read_local_version().await
    }

    pub async fn remote_version(&self) -> Option<Version> {
        self.remote_manifest().await.map(|manifest| manifest.version)
    }

    /// Latest published version plus how to retrieve it.
    ///
    /// Any network failure, timeout, bad status or unusable body is logged
    /// and reported as `None`; the caller skips this check.
    pub async fn remote_manifest(&self) -> Option<RemoteManifest> {
        let manifest = match self.settings.strategy {
            UpdateStrategy::FileList => self.plain_text_manifest().await,
            UpdateStrategy::Archive => self.release_manifest().await,
        };
        match &manifest {
            Some(found) => debug!("updater: remote reports {}", found.version),
            None => info!("updater: remote version unavailable, skipping this check"),
        }
        manifest
    }

    async fn plain_text_manifest(&self) -> Option<RemoteManifest> {
        let url = self.settings.file_url(VERSION_FILE);
        let body = self
            .network
            .get_text(&url)
            .await
            .inspect_err(|err| warn!("updater: version check failed: {err}"))
            .ok()?;
        let version = Version::parse(&body).or_else(|| {
            warn!("updater: {url} returned an empty version token");
            None
        })?;
        Some(RemoteManifest {
            version,
            retrieval: Retrieval::Files(self.settings.files.clone()),
        })
    }

    async fn release_manifest(&self) -> Option<RemoteManifest> {
        let release: ReleaseInfo = self
            .network
            .get_json(&self.settings.release_api)
            .await
            .inspect_err(|err| warn!("updater: release lookup failed: {err}"))
            .ok()?;
        let version = Version::parse(&release.tag_name).or_else(|| {
            warn!("updater: release has an empty tag name");
            None
        })?;
        let retrieval = match release.zip_asset() {
            Some(asset) => Retrieval::Archive {
                url: asset.browser_download_url.clone(),
            },
            None => Retrieval::ArchiveMissing,
        };
        Some(RemoteManifest { version, retrieval })
    }
}
