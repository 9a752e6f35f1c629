use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque release identifier. Only equality is meaningful.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Trims surrounding whitespace; an empty token is not a version.
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.trim();
        (!token.is_empty()).then(|| Self(token.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the installation believes it is running.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalVersion {
    Known(Version),
    /// No readable version record; never equal to any remote version.
    Unknown,
}

impl LocalVersion {
    pub fn matches(&self, remote: &Version) -> bool {
        match self {
            LocalVersion::Known(local) => local == remote,
            LocalVersion::Unknown => false,
        }
    }
}

impl fmt::Display for LocalVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalVersion::Known(version) => version.fmt(f),
            LocalVersion::Unknown => f.write_str("<unknown>"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum UpdateStrategy {
    /// Fetch each file of a static manifest from the raw-content endpoint.
    FileList,
    /// Download one zip release asset holding the whole project tree.
    Archive,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Retrieval {
    Files(Vec<String>),
    Archive { url: String },
    /// The release exists but carries no zip asset.
    ArchiveMissing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteManifest {
    pub version: Version,
    pub retrieval: Retrieval,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReleaseInfo {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseInfo {
    pub fn zip_asset(&self) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name.ends_with(".zip"))
    }
}
