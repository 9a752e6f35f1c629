use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "WallpaperCacheUpdater";
const HOME_DOT_DIR: &str = ".wallpapercacheupdater";

/// Returns the per-user directory that holds `config.json`.
///
/// `%APPDATA%` wins when set; otherwise a dotfile directory under the home
/// directory is used so settings still survive updates of the install root.
pub fn config_dir() -> PathBuf {
    config_dir_from(
        env::var_os("APPDATA"),
        env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")),
    )
}

pub fn config_dir_from(appdata: Option<OsString>, home: Option<OsString>) -> PathBuf {
    match appdata.filter(|value| !value.is_empty()) {
        Some(appdata) => PathBuf::from(appdata).join(APP_DIR_NAME),
        None => home
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(HOME_DOT_DIR),
    }
}

/// Path of the running executable, used as the relaunch target.
pub fn entry_point() -> std::io::Result<PathBuf> {
    env::current_exe()
}

/// Directory holding the application's own files (the directory of the executable).
pub fn default_install_root() -> PathBuf {
    entry_point()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Create the config directory if it does not exist yet.
pub fn ensure_config_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_appdata_when_present() {
        let dir = config_dir_from(
            Some(OsString::from("/roaming")),
            Some(OsString::from("/home/user")),
        );
        assert_eq!(dir, PathBuf::from("/roaming").join("WallpaperCacheUpdater"));
    }

    #[test]
    fn falls_back_to_home_dotfile() {
        let dir = config_dir_from(None, Some(OsString::from("/home/user")));
        assert_eq!(
            dir,
            PathBuf::from("/home/user").join(".wallpapercacheupdater")
        );

        let empty = config_dir_from(Some(OsString::new()), Some(OsString::from("/h")));
        assert_eq!(empty, PathBuf::from("/h").join(".wallpapercacheupdater"));
    }
}
