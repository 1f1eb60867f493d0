use thiserror::Error;

use crate::model::release::{FeedRelease, ReleaseInfo};
use crate::model::version::Version;
use crate::net::Transport;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("release feed unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("release {tag} has no {extension} artifact")]
    ArtifactNotFound { tag: String, extension: String },
}

/// Looks up the latest upstream release. Nothing is cached: every call
/// reflects the feed as it is now.
pub struct ReleaseResolver<'a, T> {
    transport: &'a T,
    feed_url: &'a str,
    extension: &'a str,
}

impl<'a, T: Transport> ReleaseResolver<'a, T> {
    pub fn new(transport: &'a T, feed_url: &'a str, extension: &'a str) -> Self {
        Self {
            transport,
            feed_url,
            extension,
        }
    }

    pub fn resolve_latest(&self) -> Result<ReleaseInfo, ReleaseError> {
        let body = self
            .transport
            .get_text(self.feed_url)
            .map_err(|err| ReleaseError::UpstreamUnavailable(err.to_string()))?;
        let release = parse_release(&body, self.extension)?;
        tracing::info!(
            "latest release {} ({})",
            release.version,
            release.artifact_uri
        );
        Ok(release)
    }
}

/// Pick the bundle artifact out of a feed payload.
pub fn parse_release(body: &str, extension: &str) -> Result<ReleaseInfo, ReleaseError> {
    let release: FeedRelease = serde_json::from_str(body)
        .map_err(|err| ReleaseError::UpstreamUnavailable(format!("malformed payload: {err}")))?;

    let version = Version::parse_tag(&release.tag_name)
        .map_err(|err| ReleaseError::UpstreamUnavailable(err.to_string()))?;

    let wanted = extension.to_ascii_lowercase();
    let asset = release
        .assets
        .iter()
        .find(|asset| asset.name.to_ascii_lowercase().ends_with(&wanted))
        .ok_or_else(|| ReleaseError::ArtifactNotFound {
            tag: release.tag_name.clone(),
            extension: extension.to_string(),
        })?;

    Ok(ReleaseInfo {
        version,
        artifact_uri: asset.browser_download_url.clone(),
    })
}
