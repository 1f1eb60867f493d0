use serde::{Deserialize, Serialize};

use super::version::Version;

/// Latest upstream release and the bundle to install for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseInfo {
    pub version: Version,
    pub artifact_uri: String,
}

/// What the local package inventory reports right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstalledState {
    pub present: bool,
    pub version: Option<Version>,
}

impl InstalledState {
    pub fn from_inventory(version: Option<Version>) -> Self {
        Self {
            present: version.is_some(),
            version,
        }
    }
}

/// Payload of the feed's "latest release" endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedRelease {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<FeedAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedAsset {
    pub name: String,
    pub browser_download_url: String,
}
