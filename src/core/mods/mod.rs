pub mod installer;
pub mod state;

use std::path::Path;

use crate::core::error::{LauncherError, LauncherResult};

pub use installer::{find_package, ModInstaller};
pub use state::ModStateManager;

/// Moves a file, falling back to copy + delete across filesystems.
pub(crate) async fn move_file(from: &Path, to: &Path) -> LauncherResult<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| LauncherError::io(to, e))?;
    tokio::fs::remove_file(from)
        .await
        .map_err(|e| LauncherError::io(from, e))?;
    Ok(())
}

/// Deletes a file, treating "already gone" as success.
pub(crate) async fn remove_file_if_exists(path: &Path) -> LauncherResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LauncherError::io(path, e)),
    }
}

pub(crate) async fn exists(path: &Path) -> LauncherResult<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| LauncherError::io(path, e))
}
