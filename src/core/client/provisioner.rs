use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use super::catalog::Catalog;
use super::platform::Platform;
use crate::core::downloader::HttpFetch;
use crate::core::error::{LauncherError, LauncherResult};

/// Puts a runnable client tree into an instance directory.
///
/// Runs once per instance creation. There is no retry here and no partial
/// success: on any failure the instance directory is removed before the
/// error is returned.
pub struct ClientProvisioner {
    catalog: Arc<dyn Catalog>,
    fetch: Arc<dyn HttpFetch>,
    platform: Platform,
    /// Where release archives are downloaded before extraction.
    download_dir: PathBuf,
}

impl ClientProvisioner {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        fetch: Arc<dyn HttpFetch>,
        platform: Platform,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            catalog,
            fetch,
            platform,
            download_dir,
        }
    }

    /// Returns the path of the client executable inside `instance_path`.
    pub async fn provision(&self, version: &str, instance_path: &Path) -> LauncherResult<PathBuf> {
        match self.provision_inner(version, instance_path).await {
            Ok(client_path) => Ok(client_path),
            Err(err) => {
                error!(
                    "Provisioning {} into {:?} failed: {}",
                    version, instance_path, err
                );
                remove_tree(instance_path).await;
                Err(err)
            }
        }
    }

    async fn provision_inner(&self, version: &str, instance_path: &Path) -> LauncherResult<PathBuf> {
        let asset = self.catalog.resolve_asset(version, self.platform).await?;
        info!(
            "Provisioning client {} ({}) for {}",
            asset.version, asset.name, self.platform
        );

        let archive_path = self
            .download_dir
            .join(format!("{}-{}", Uuid::new_v4(), asset.name));
        let extracted = async {
            self.fetch
                .download(&asset.url, &archive_path, asset.sha256.as_deref())
                .await?;

            tokio::fs::create_dir_all(instance_path)
                .await
                .map_err(|e| LauncherError::io(instance_path, e))?;

            let layout = self.platform.layout();
            let source = archive_path.clone();
            let dest = instance_path.to_path_buf();
            tokio::task::spawn_blocking(move || layout.extract(&source, &dest))
                .await
                .map_err(|e| LauncherError::Other(format!("extraction task failed: {e}")))?
        }
        .await;

        if let Err(e) = tokio::fs::remove_file(&archive_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {:?}: {}", archive_path, e);
            }
        }

        let client_path = extracted?;
        info!("Client ready at {:?}", client_path);
        Ok(client_path)
    }
}

/// Recursive, best-effort removal. Absent paths are fine.
pub async fn remove_tree(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => info!("Removed {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {:?}: {}", path, e),
    }
}
