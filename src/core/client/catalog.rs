// ─── Client release catalog ───
// Resolves client builds from the GitHub releases API.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::platform::Platform;
use crate::core::error::{LauncherError, LauncherResult};

/// Pseudo-version selecting the newest stable release.
pub const LATEST: &str = "latest";

/// A downloadable client build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    /// Release tag the asset belongs to.
    pub version: String,
    pub name: String,
    pub url: String,
    /// Hex SHA-256 when the catalog publishes one.
    pub sha256: Option<String>,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Stable version tags, newest first.
    async fn list_versions(&self) -> LauncherResult<Vec<String>>;

    async fn resolve_asset(&self, version: &str, platform: Platform) -> LauncherResult<AssetRef>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    /// e.g. `sha256:ab12…`
    #[serde(default)]
    pub digest: Option<String>,
}

impl Release {
    fn is_stable(&self) -> bool {
        !self.prerelease && !self.draft
    }
}

/// Picks the release for `version` and its asset for `platform`.
pub fn select_asset(
    releases: &[Release],
    version: &str,
    platform: Platform,
) -> LauncherResult<AssetRef> {
    let not_found = || LauncherError::AssetNotFoundForPlatform {
        version: version.to_string(),
        platform: platform.to_string(),
    };

    let release = if version == LATEST {
        releases.iter().find(|r| r.is_stable())
    } else {
        releases.iter().find(|r| r.tag_name == version)
    }
    .ok_or_else(not_found)?;

    let asset = release
        .assets
        .iter()
        .find(|a| platform.matches_asset(&a.name))
        .ok_or_else(not_found)?;

    Ok(AssetRef {
        version: release.tag_name.clone(),
        name: asset.name.clone(),
        url: asset.browser_download_url.clone(),
        sha256: asset
            .digest
            .as_deref()
            .and_then(|d| d.strip_prefix("sha256:"))
            .map(str::to_string),
    })
}

/// Release list of one GitHub repository.
pub struct GitHubReleases {
    client: reqwest::Client,
    url: String,
}

impl GitHubReleases {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    async fn fetch(&self) -> LauncherResult<Vec<Release>> {
        debug!("Fetching releases from {}", self.url);
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        let releases: Vec<Release> = response.json().await?;
        info!("Loaded {} client releases", releases.len());
        Ok(releases)
    }
}

#[async_trait]
impl Catalog for GitHubReleases {
    async fn list_versions(&self) -> LauncherResult<Vec<String>> {
        Ok(self
            .fetch()
            .await?
            .into_iter()
            .filter(Release::is_stable)
            .map(|r| r.tag_name)
            .collect())
    }

    async fn resolve_asset(&self, version: &str, platform: Platform) -> LauncherResult<AssetRef> {
        let releases = self.fetch().await?;
        select_asset(&releases, version, platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn releases() -> Vec<Release> {
        serde_json::from_value(serde_json::json!([
            {
                "tag_name": "v0.2.0-rc1",
                "prerelease": true,
                "assets": [{"name": "OpenStarbound-Linux-Client.zip", "browser_download_url": "https://x/rc"}]
            },
            {
                "tag_name": "v0.1.9",
                "assets": [
                    {"name": "OpenStarbound-Linux-Client.zip", "browser_download_url": "https://x/linux", "digest": "sha256:abc123"},
                    {"name": "OpenStarbound-Windows-Client.zip", "browser_download_url": "https://x/win"}
                ]
            },
            {
                "tag_name": "v0.1.8",
                "assets": [{"name": "OpenStarbound-Windows-Client.zip", "browser_download_url": "https://x/old"}]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn latest_skips_prereleases() {
        let asset = select_asset(&releases(), LATEST, Platform::Linux).unwrap();
        assert_eq!(asset.version, "v0.1.9");
        assert_eq!(asset.url, "https://x/linux");
        assert_eq!(asset.sha256.as_deref(), Some("abc123"));
    }

    #[test]
    fn explicit_version_is_honoured() {
        let asset = select_asset(&releases(), "v0.1.8", Platform::Windows).unwrap();
        assert_eq!(asset.url, "https://x/old");
        assert!(asset.sha256.is_none());
    }

    #[test]
    fn missing_platform_build_is_reported() {
        let err = select_asset(&releases(), "v0.1.8", Platform::Linux).unwrap_err();
        assert!(matches!(err, LauncherError::AssetNotFoundForPlatform { .. }));
        assert!(!err.is_retryable());

        let err = select_asset(&releases(), "v9.9.9", Platform::Linux).unwrap_err();
        assert!(matches!(err, LauncherError::AssetNotFoundForPlatform { .. }));
    }
}
