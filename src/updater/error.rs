use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("update archive is unreadable: {0}")]
    Archive(String),

    #[error("update package structure is invalid: expected top-level directory '{expected}'")]
    MissingProjectDir { expected: String },

    #[error("release {version} has no zip asset to download")]
    NoArchiveAsset { version: String },

    #[error("remote manifest is malformed: {0}")]
    MalformedManifest(String),

    #[error("failed to record installed version: {0}")]
    VersionRecord(String),

    #[error("failed to relaunch {}: {message}", .path.display())]
    Relaunch { path: PathBuf, message: String },
}

impl UpdateError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
