use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::TempDir;
use zip::read::ZipArchive;

use crate::engine::models::{RemoteManifest, Retrieval};
use crate::networking::NetworkClient;
use crate::updater::UpdaterSettings;
use crate::updater::error::UpdateError;
use crate::util::{looks_like_text, normalize_line_endings};

const ARCHIVE_NAME: &str = "update.zip";
const EXTRACT_DIR: &str = "extracted";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// Everything downloaded for one update attempt, held off to the side of the
/// live installation until the applier takes over.
#[derive(Debug)]
pub enum FetchedPayload {
    Files {
        files: Vec<FetchedFile>,
        failed: Vec<String>,
    },
    /// `root` points at the project directory inside `workspace`; dropping the
    /// payload removes the whole temporary tree.
    Archive { workspace: TempDir, root: PathBuf },
}

#[derive(Clone)]
pub struct UpdateFetcher {
    network: NetworkClient,
    settings: UpdaterSettings,
}

impl UpdateFetcher {
    pub fn new(network: NetworkClient, settings: UpdaterSettings) -> Self {
        Self { network, settings }
    }

    pub async fn fetch(&self, manifest: &RemoteManifest) -> Result<FetchedPayload, UpdateError> {
        match &manifest.retrieval {
            Retrieval::Files(names) => Ok(self.fetch_files(names).await),
            Retrieval::Archive { url } => self.fetch_archive(url).await,
            Retrieval::ArchiveMissing => Err(UpdateError::NoArchiveAsset {
                version: manifest.version.to_string(),
            }),
        }
    }

    /// Fetch every named file; one failure is logged and does not stop the rest.
    pub async fn fetch_files(&self, names: &[String]) -> FetchedPayload {
        let mut files = Vec::with_capacity(names.len());
        let mut failed = Vec::new();
        for name in names {
            match self.fetch_file(name).await {
                Ok(file) => files.push(file),
                Err(err) => {
                    warn!("fetch: skipping {name}: {err}");
                    failed.push(name.clone());
                }
            }
        }
        info!("fetch: {} file(s) fetched, {} failed", files.len(), failed.len());
        FetchedPayload::Files { files, failed }
    }

    pub async fn fetch_file(&self, name: &str) -> Result<FetchedFile, UpdateError> {
        let url = self.settings.file_url(name);
        let raw = self.network.get_bytes(&url).await?;
        let contents = if looks_like_text(&raw) {
            normalize_line_endings(&raw)
        } else {
            raw
        };
        debug!("fetch: {name} ({} bytes)", contents.len());
        Ok(FetchedFile {
            name: name.to_owned(),
            contents,
        })
    }

    /// Download and unpack the release archive into a private temp directory,
    /// then check it has the project directory before anyone touches the install.
    pub async fn fetch_archive(&self, url: &str) -> Result<FetchedPayload, UpdateError> {
        let workspace = tempfile::Builder::new()
            .prefix("wallpaper-cache-update-")
            .tempdir()
            .map_err(|e| UpdateError::io("failed to create temp dir", e))?;
        let archive_path = workspace.path().join(ARCHIVE_NAME);
        info!("fetch: downloading {url} to {}", archive_path.display());
        self.network.download_to_path(url, &archive_path).await?;

        let extract_dir = workspace.path().join(EXTRACT_DIR);
        let target = extract_dir.clone();
        tokio::task::spawn_blocking(move || extract_zip(&archive_path, &target))
            .await
            .map_err(|e| UpdateError::Archive(format!("extraction task failed: {e}")))??;

        let root = extract_dir.join(&self.settings.project_dir);
        if !root.is_dir() {
            return Err(UpdateError::MissingProjectDir {
                expected: self.settings.project_dir.clone(),
            });
        }
        Ok(FetchedPayload::Archive { workspace, root })
    }
}

pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<(), UpdateError> {
    let file = fs::File::open(archive_path).map_err(|e| UpdateError::io("zip open error", e))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| UpdateError::Archive(format!("zip parse error: {e}")))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| UpdateError::Archive(format!("zip entry error: {e}")))?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            UpdateError::Archive(format!("entry '{}' escapes the archive root", entry.name()))
        })?;
        let out_path = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| UpdateError::io("zip dir create error", e))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| UpdateError::io("zip parent dir error", e))?;
        }
        let mut out_file =
            fs::File::create(&out_path).map_err(|e| UpdateError::io("zip create file error", e))?;
        std::io::copy(&mut entry, &mut out_file)
            .map_err(|e| UpdateError::io("zip write error", e))?;
    }
    Ok(())
}
