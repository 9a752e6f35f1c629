use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::env;

/// File name reserved for user settings; updates never write a file with this name.
pub const CONFIG_FILE: &str = "config.json";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigRecord {
    #[serde(default)]
    pub wallpaper_path: Option<String>,
    /// Keys this build does not know about, written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Owner of the on-disk configuration record.
///
/// Reads never fail: a missing or unparsable file yields the default record.
/// Writes go to a sibling temp file which is then renamed over `config.json`,
/// so a reader never observes a half-written record.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::at(env::config_dir())
    }

    pub fn at(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CONFIG_FILE),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> ConfigRecord {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(
                    "config: {} unreadable ({err}); using defaults",
                    self.path.display()
                );
                return ConfigRecord::default();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            warn!(
                "config: failed to parse {} ({err}); using defaults",
                self.path.display()
            );
            ConfigRecord::default()
        })
    }

    /// Load the record, creating the file with defaults when it is absent or broken.
    pub fn load_or_init(&self) -> ConfigRecord {
        let valid = fs::read(&self.path)
            .ok()
            .is_some_and(|bytes| serde_json::from_slice::<ConfigRecord>(&bytes).is_ok());
        let config = self.load();
        if !valid && let Err(err) = self.save(&config) {
            warn!("config: unable to write default config: {err}");
        }
        config
    }

    pub fn save(&self, config: &ConfigRecord) -> Result<(), String> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| "config lock poisoned".to_string())?;
        self.write_atomic(config)
    }

    /// Record the wallpaper chosen by the user, keeping every other key.
    pub fn set_wallpaper_path(&self, wallpaper: Option<String>) -> Result<(), String> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| "config lock poisoned".to_string())?;
        let mut config = self.load();
        config.wallpaper_path = wallpaper;
        self.write_atomic(&config)
    }

    fn write_atomic(&self, config: &ConfigRecord) -> Result<(), String> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| format!("config path {} has no parent", self.path.display()))?;
        env::ensure_config_dir(dir).map_err(|e| format!("unable to create config dir: {e}"))?;

        let bytes = serde_json::to_vec_pretty(config)
            .map_err(|e| format!("failed to serialize config: {e}"))?;
        let mut tmp =
            NamedTempFile::new_in(dir).map_err(|e| format!("failed to create temp config: {e}"))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| format!("failed to write temp config: {e}"))?;
        tmp.persist(&self.path)
            .map_err(|e| format!("failed to replace config: {}", e.error))?;
        debug!("config: saved {}", self.path.display());
        Ok(())
    }
}
