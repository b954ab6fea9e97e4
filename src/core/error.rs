use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the entire launcher backend.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("SHA-256 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha256Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Instance ────────────────────────────────────────
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("An instance named '{0}' already exists")]
    DuplicateName(String),

    #[error("Invalid instance name: {0:?}")]
    InvalidName(String),

    #[error("Mod '{mod_id}' not found in instance '{instance}'")]
    ModNotFound { instance: String, mod_id: String },

    // ── External tool ───────────────────────────────────
    #[error("External tool not available at {0:?}")]
    ToolNotAvailable(PathBuf),

    #[error("{tool} exited with code {code:?}: {detail}")]
    ToolExecutionFailed {
        tool: String,
        code: Option<i32>,
        detail: String,
    },

    // ── Client provisioning ─────────────────────────────
    #[error("No client asset for version {version} on {platform}")]
    AssetNotFoundForPlatform { version: String, platform: String },

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Corrupt archive: {0}")]
    ArchiveCorrupt(String),

    // ── Mod content ─────────────────────────────────────
    #[error("Expected exactly one package file for mod {mod_id}, found {candidates}")]
    ContentAmbiguous { mod_id: String, candidates: usize },

    #[error("Filesystem conflict: {0}")]
    FilesystemConflict(String),

    #[error("Registry out of sync for mod '{mod_name}' in '{instance}': {detail}")]
    RegistryInconsistency {
        instance: String,
        mod_name: String,
        detail: String,
    },

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

/// Coarse failure classes callers and the scheduler reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DuplicateName,
    NotFound,
    ToolNotAvailable,
    ToolExecutionFailed,
    AssetNotFoundForPlatform,
    NetworkFailure,
    ArchiveCorrupt,
    ContentAmbiguous,
    FilesystemConflict,
    RegistryInconsistency,
    Io,
    Internal,
}

impl LauncherError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LauncherError::Io { .. } => ErrorKind::Io,
            LauncherError::Http(_)
            | LauncherError::DownloadFailed { .. }
            | LauncherError::Sha256Mismatch { .. } => ErrorKind::NetworkFailure,
            LauncherError::Json(_) | LauncherError::Other(_) => ErrorKind::Internal,
            LauncherError::InstanceNotFound(_) | LauncherError::ModNotFound { .. } => {
                ErrorKind::NotFound
            }
            LauncherError::DuplicateName(_) | LauncherError::InvalidName(_) => {
                ErrorKind::DuplicateName
            }
            LauncherError::ToolNotAvailable(_) => ErrorKind::ToolNotAvailable,
            LauncherError::ToolExecutionFailed { .. } => ErrorKind::ToolExecutionFailed,
            LauncherError::AssetNotFoundForPlatform { .. } => ErrorKind::AssetNotFoundForPlatform,
            LauncherError::Zip(_) | LauncherError::ArchiveCorrupt(_) => ErrorKind::ArchiveCorrupt,
            LauncherError::ContentAmbiguous { .. } => ErrorKind::ContentAmbiguous,
            LauncherError::FilesystemConflict(_) => ErrorKind::FilesystemConflict,
            LauncherError::RegistryInconsistency { .. } => ErrorKind::RegistryInconsistency,
        }
    }

    /// Whether a scheduled mod job failing with this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NetworkFailure
                | ErrorKind::ToolExecutionFailed
                | ErrorKind::ArchiveCorrupt
                | ErrorKind::ContentAmbiguous
        )
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// ── Serialization for the command surface ───────────────
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
