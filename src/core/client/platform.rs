use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::archive::{self, PathRewrite};
use crate::core::error::{LauncherError, LauncherResult};

/// Top-level folder every client release wraps its files in.
const DISTRIBUTION_PREFIX: &str = "client_distribution";
/// Tarball nested inside the Linux and macOS release zips.
const NESTED_TARBALL: &str = "client.tar";

/// Target platforms with a published client build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Windows,
    MacOs,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Linux => write!(f, "linux"),
            Platform::Windows => write!(f, "windows"),
            Platform::MacOs => write!(f, "macos"),
        }
    }
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Whether a release asset name is this platform's client build.
    pub fn matches_asset(self, asset_name: &str) -> bool {
        let name = asset_name.to_lowercase();
        if !name.contains("client") {
            return false;
        }
        match self {
            Platform::Linux => name.contains("linux"),
            Platform::Windows => name.contains("windows"),
            Platform::MacOs => ["macos", "osx", "mac"].iter().any(|k| name.contains(k)),
        }
    }

    /// Client executable relative to the instance root.
    pub fn executable_rel(self) -> PathBuf {
        match self {
            Platform::Linux => PathBuf::from("linux").join("starbound"),
            Platform::Windows => PathBuf::from("win").join("starbound.exe"),
            Platform::MacOs => PathBuf::from("osx").join("starbound"),
        }
    }

    pub fn layout(self) -> ClientLayout {
        match self {
            Platform::Linux | Platform::MacOs => ClientLayout::TarInZip {
                inner: NESTED_TARBALL,
                executable: self.executable_rel(),
            },
            Platform::Windows => ClientLayout::Zip {
                executable: self.executable_rel(),
            },
        }
    }
}

/// How a downloaded release archive is laid out, chosen once per platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLayout {
    /// Zip holding a single tarball that holds the distribution folder.
    TarInZip {
        inner: &'static str,
        executable: PathBuf,
    },
    /// Zip holding the distribution folder directly.
    Zip { executable: PathBuf },
}

impl ClientLayout {
    /// Unpacks `archive_path` into `dest` and returns the client executable.
    ///
    /// Blocking; fails with `ArchiveCorrupt` if the executable is not where
    /// the layout says it should be.
    pub fn extract(&self, archive_path: &Path, dest: &Path) -> LauncherResult<PathBuf> {
        let file = File::open(archive_path).map_err(|e| LauncherError::io(archive_path, e))?;
        let rewrite = PathRewrite::strip(DISTRIBUTION_PREFIX);

        let executable = match self {
            ClientLayout::TarInZip { inner, executable } => {
                archive::extract_tar_in_zip(file, inner, dest, &rewrite)?;
                executable
            }
            ClientLayout::Zip { executable } => {
                archive::extract_zip(file, dest, &rewrite)?;
                executable
            }
        };

        let client_path = dest.join(executable);
        if !client_path.is_file() {
            return Err(LauncherError::ArchiveCorrupt(format!(
                "client executable {:?} missing after extraction",
                executable
            )));
        }
        Ok(client_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_matching_requires_client_and_platform() {
        assert!(Platform::Linux.matches_asset("OpenStarbound-Linux-Client.zip"));
        assert!(!Platform::Linux.matches_asset("OpenStarbound-Linux-Server.zip"));
        assert!(!Platform::Windows.matches_asset("OpenStarbound-Linux-Client.zip"));
        assert!(Platform::Windows.matches_asset("OpenStarbound-Windows-Client.zip"));
        assert!(Platform::MacOs.matches_asset("OpenStarbound-macOS-Client.zip"));
    }

    #[test]
    fn layouts_follow_platform() {
        assert!(matches!(Platform::Linux.layout(), ClientLayout::TarInZip { .. }));
        assert!(matches!(Platform::Windows.layout(), ClientLayout::Zip { .. }));
    }
}
