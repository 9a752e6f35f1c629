use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use log::{debug, info, warn};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::config::CONFIG_FILE;
use crate::engine::models::Version;
use crate::storage::StorageManager;
use crate::updater::error::UpdateError;
use crate::updater::fetch::{FetchedFile, FetchedPayload};

/// Writes fetched content over the installation root.
///
/// For the file list each file is written on its own and a failure only skips
/// that file. The version record is rewritten after the whole loop, so a run
/// that dies halfway is retried by the next version check.
#[derive(Clone)]
pub struct UpdateApplier {
    storage: StorageManager,
}

impl UpdateApplier {
    pub fn new(storage: StorageManager) -> Self {
        Self { storage }
    }

    pub async fn apply(
        &self,
        payload: FetchedPayload,
        version: &Version,
    ) -> Result<(), UpdateError> {
        match payload {
            FetchedPayload::Files { files, failed } => {
                self.apply_files(&files, &failed, version).await
            }
            FetchedPayload::Archive { workspace, root } => {
                let install_root = self.storage.install_root().to_path_buf();
                let result =
                    tokio::task::spawn_blocking(move || apply_tree(&root, &install_root))
                        .await
                        .map_err(|e| UpdateError::Archive(format!("apply task failed: {e}")))
                        .and_then(|res| res);
                let temp = workspace.path().to_path_buf();
                if let Err(err) = workspace.close() {
                    warn!("apply: failed to remove {}: {err}", temp.display());
                }
                result?;
                self.commit(version).await
            }
        }
    }

    async fn apply_files(
        &self,
        files: &[FetchedFile],
        not_fetched: &[String],
        version: &Version,
    ) -> Result<(), UpdateError> {
        let mut skipped = not_fetched.len();
        for file in files {
            if let Err(err) = self.apply_file(file) {
                warn!("apply: {} not written: {err}", file.name);
                skipped += 1;
            }
        }
        if skipped > 0 {
            warn!("apply: {skipped} file(s) skipped, committing {version} anyway");
        }
        self.commit(version).await
    }

    /// Write one fetched file into the installation root.
    pub fn apply_file(&self, file: &FetchedFile) -> Result<(), UpdateError> {
        if file.name == CONFIG_FILE {
            info!("apply: preserving {CONFIG_FILE}");
            return Ok(());
        }
        let dest = destination(self.storage.install_root(), &file.name)?;
        let mut tmp = staging_file(&dest)?;
        tmp.write_all(&file.contents)
            .map_err(|e| UpdateError::io(format!("failed to stage {}", file.name), e))?;
        install(tmp, &dest)
    }

    async fn commit(&self, version: &Version) -> Result<(), UpdateError> {
        self.storage
            .write_local_version(version)
            .await
            .map_err(UpdateError::VersionRecord)?;
        info!("apply: installation now at version {version}");
        Ok(())
    }
}

/// Replace each top-level entry of `src` in `dest`: directories wholesale,
/// files one by one, the config file never.
pub fn apply_tree(src: &Path, dest: &Path) -> Result<(), UpdateError> {
    fs::create_dir_all(dest).map_err(|e| UpdateError::io("failed to create install root", e))?;
    let entries = fs::read_dir(src).map_err(|e| UpdateError::io("read update dir error", e))?;
    for entry in entries {
        let entry = entry.map_err(|e| UpdateError::io("update entry error", e))?;
        let name = entry.file_name();
        let from = entry.path();
        let to = dest.join(&name);
        let file_type = entry
            .file_type()
            .map_err(|e| UpdateError::io("update filetype error", e))?;

        if file_type.is_dir() {
            if to.is_dir() {
                fs::remove_dir_all(&to).map_err(|e| {
                    UpdateError::io(format!("failed to remove {}", to.display()), e)
                })?;
            } else if to.exists() {
                fs::remove_file(&to).map_err(|e| {
                    UpdateError::io(format!("failed to remove {}", to.display()), e)
                })?;
            }
            copy_dir(&from, &to)?;
            debug!("apply: replaced directory {}", to.display());
        } else if name == CONFIG_FILE {
            info!("apply: preserving {CONFIG_FILE}");
        } else {
            copy_file(&from, &to)?;
            debug!("apply: replaced file {}", to.display());
        }
    }
    Ok(())
}

fn copy_dir(from: &Path, to: &Path) -> Result<(), UpdateError> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| UpdateError::Archive(format!("copy dir walk error: {e}")))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| UpdateError::Archive(format!("copy dir prefix error: {e}")))?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| UpdateError::io("copy dir create error", e))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| UpdateError::io("copy file error", e))?;
        }
    }
    Ok(())
}

fn copy_file(from: &Path, to: &Path) -> Result<(), UpdateError> {
    let mut tmp = staging_file(to)?;
    let mut source = fs::File::open(from)
        .map_err(|e| UpdateError::io(format!("failed to open {}", from.display()), e))?;
    std::io::copy(&mut source, tmp.as_file_mut())
        .map_err(|e| UpdateError::io(format!("failed to stage {}", to.display()), e))?;
    install(tmp, to)
}

/// Resolve a manifest name under `root`, refusing anything that would leave it.
fn destination(root: &Path, name: &str) -> Result<PathBuf, UpdateError> {
    let relative = Path::new(name);
    let plain = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if !plain || name.is_empty() {
        return Err(UpdateError::MalformedManifest(format!(
            "file name '{name}' is not a plain relative path"
        )));
    }
    Ok(root.join(relative))
}

fn staging_file(dest: &Path) -> Result<NamedTempFile, UpdateError> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| UpdateError::io("failed to create parent dir", e))?;
    NamedTempFile::new_in(parent).map_err(|e| UpdateError::io("failed to create staging file", e))
}

/// Move a fully written staging file over `dest`.
///
/// The running executable cannot be overwritten in place on Windows, so it is
/// swapped with `self_replace` instead of a plain rename.
fn install(tmp: NamedTempFile, dest: &Path) -> Result<(), UpdateError> {
    tmp.as_file()
        .sync_all()
        .map_err(|e| UpdateError::io(format!("failed to flush {}", dest.display()), e))?;
    if is_current_exe(dest) {
        info!("apply: replacing running executable {}", dest.display());
        return self_replace::self_replace(tmp.path())
            .map_err(|e| UpdateError::io("failed to replace running executable", e));
    }
    tmp.persist(dest)
        .map(|_| ())
        .map_err(|e| UpdateError::io(format!("failed to replace {}", dest.display()), e.error))
}

fn is_current_exe(path: &Path) -> bool {
    let Ok(exe) = std::env::current_exe().and_then(fs::canonicalize) else {
        return false;
    };
    fs::canonicalize(path).is_ok_and(|candidate| candidate == exe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networking::NetworkClient;
    use crate::updater::UpdaterSettings;
    use crate::updater::fetch::UpdateFetcher;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn file(name: &str, contents: &[u8]) -> FetchedFile {
        FetchedFile {
            name: name.to_owned(),
            contents: contents.to_vec(),
        }
    }

    fn v(token: &str) -> Version {
        Version::parse(token).unwrap()
    }

    fn project_tree(base: &Path) -> PathBuf {
        let root = base.join("WallpaperCacheUpdater");
        fs::create_dir_all(root.join("assets")).unwrap();
        fs::write(root.join("tray.ps1"), b"new tray").unwrap();
        fs::write(root.join("config.json"), br#"{"wallpaper_path":"evil.png"}"#).unwrap();
        fs::write(root.join("assets").join("icon.txt"), b"new icon").unwrap();
        root
    }

    #[tokio::test]
    async fn writes_files_then_commits_version() {
        let install = TempDir::new().unwrap();
        let applier = UpdateApplier::new(StorageManager::new(install.path()));
        let payload = FetchedPayload::Files {
            files: vec![file("tray.ps1", b"tray\n"), file("startup.ps1", b"startup\n")],
            failed: Vec::new(),
        };

        applier.apply(payload, &v("1.1.0")).await.unwrap();

        assert_eq!(fs::read(install.path().join("tray.ps1")).unwrap(), b"tray\n");
        assert_eq!(fs::read_to_string(install.path().join("version.txt")).unwrap(), "1.1.0");
    }

    #[tokio::test]
    async fn missing_files_are_skipped_and_version_still_committed() {
        let install = TempDir::new().unwrap();
        fs::write(install.path().join("version.txt"), "1.0.0").unwrap();
        let applier = UpdateApplier::new(StorageManager::new(install.path()));
        let payload = FetchedPayload::Files {
            files: vec![file("tray.ps1", b"tray\n"), file("../escape.txt", b"x")],
            failed: vec!["wallpaper.ps1".into()],
        };

        applier.apply(payload, &v("1.1.0")).await.unwrap();

        assert_eq!(fs::read(install.path().join("tray.ps1")).unwrap(), b"tray\n");
        assert!(!install.path().join("wallpaper.ps1").exists());
        assert_eq!(
            fs::read_to_string(install.path().join("version.txt")).unwrap(),
            "1.1.0"
        );
    }

    #[tokio::test]
    async fn crlf_download_applied_twice_is_byte_identical() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wallpaper.ps1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"a\r\nb\r\n".to_vec()))
            .mount(&server)
            .await;
        let install = TempDir::new().unwrap();
        let mut settings = UpdaterSettings::new(install.path());
        settings.remote_base = server.uri();
        let fetcher = UpdateFetcher::new(NetworkClient::new(), settings);
        let applier = UpdateApplier::new(StorageManager::new(install.path()));
        let target = install.path().join("wallpaper.ps1");

        applier
            .apply_file(&fetcher.fetch_file("wallpaper.ps1").await.unwrap())
            .unwrap();
        let first = fs::read(&target).unwrap();
        applier
            .apply_file(&fetcher.fetch_file("wallpaper.ps1").await.unwrap())
            .unwrap();
        let second = fs::read(&target).unwrap();

        assert_eq!(first, b"a\nb\n");
        assert_eq!(first, second);
    }

    #[test]
    fn config_file_is_never_written_by_file_list() {
        let install = TempDir::new().unwrap();
        let config = b"{\"wallpaper_path\":\"mine.png\"}";
        fs::write(install.path().join("config.json"), config).unwrap();
        let applier = UpdateApplier::new(StorageManager::new(install.path()));

        applier.apply_file(&file("config.json", b"{}")).unwrap();

        assert_eq!(fs::read(install.path().join("config.json")).unwrap(), config);
    }

    #[test]
    fn traversal_names_are_rejected() {
        let install = TempDir::new().unwrap();
        let applier = UpdateApplier::new(StorageManager::new(install.path().join("app")));
        let err = applier.apply_file(&file("../escape.txt", b"x")).unwrap_err();
        assert!(matches!(err, UpdateError::MalformedManifest(_)));
        assert!(!install.path().join("escape.txt").exists());
    }

    #[test]
    fn tree_replaces_directories_and_files_but_not_config() {
        let staging = TempDir::new().unwrap();
        let install = TempDir::new().unwrap();
        let src = project_tree(staging.path());

        fs::create_dir_all(install.path().join("assets")).unwrap();
        fs::write(install.path().join("assets").join("stale.txt"), b"old").unwrap();
        fs::write(install.path().join("tray.ps1"), b"old tray").unwrap();
        let config = br#"{"wallpaper_path":"C:\\mine.png"}"#;
        fs::write(install.path().join("config.json"), config).unwrap();

        apply_tree(&src, install.path()).unwrap();

        assert_eq!(fs::read(install.path().join("tray.ps1")).unwrap(), b"new tray");
        assert_eq!(
            fs::read(install.path().join("assets").join("icon.txt")).unwrap(),
            b"new icon"
        );
        assert!(!install.path().join("assets").join("stale.txt").exists());
        assert_eq!(fs::read(install.path().join("config.json")).unwrap(), config);
    }

    #[tokio::test]
    async fn archive_apply_commits_version_and_removes_workspace() {
        let workspace = TempDir::new().unwrap();
        let root = project_tree(workspace.path());
        let temp = workspace.path().to_path_buf();
        let install = TempDir::new().unwrap();
        let applier = UpdateApplier::new(StorageManager::new(install.path()));

        applier
            .apply(FetchedPayload::Archive { workspace, root }, &v("2.0.0"))
            .await
            .unwrap();

        assert!(!temp.exists());
        assert_eq!(fs::read_to_string(install.path().join("version.txt")).unwrap(), "2.0.0");
        assert!(!install.path().join("config.json").exists());
    }

    #[tokio::test]
    async fn archive_apply_failure_still_removes_workspace() {
        let workspace = TempDir::new().unwrap();
        let missing_root = workspace.path().join("WallpaperCacheUpdater");
        let temp = workspace.path().to_path_buf();
        let install = TempDir::new().unwrap();
        let applier = UpdateApplier::new(StorageManager::new(install.path()));

        let result = applier
            .apply(
                FetchedPayload::Archive {
                    workspace,
                    root: missing_root,
                },
                &v("2.0.0"),
            )
            .await;

        assert!(result.is_err());
        assert!(!temp.exists());
        assert!(!install.path().join("version.txt").exists());
    }
}
