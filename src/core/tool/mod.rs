// ─── External tool gateway ───
// Subprocess execution for the content-fetch tool. Reports exit status and
// captured output; retry decisions belong to the caller.

pub mod steamcmd;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};

pub use steamcmd::SteamCmd;

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait ExternalTool: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, args: &[String], cwd: &Path) -> LauncherResult<ToolOutput>;
}

/// Runs a real executable on disk.
pub struct ProcessTool {
    executable: PathBuf,
}

impl ProcessTool {
    pub fn new(executable: PathBuf) -> Self {
        Self { executable }
    }
}

#[async_trait]
impl ExternalTool for ProcessTool {
    fn name(&self) -> &str {
        self.executable
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("tool")
    }

    async fn run(&self, args: &[String], cwd: &Path) -> LauncherResult<ToolOutput> {
        let present = tokio::fs::metadata(&self.executable)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !present {
            return Err(LauncherError::ToolNotAvailable(self.executable.clone()));
        }
        ensure_executable(&self.executable)?;

        debug!("Running {:?} {:?} in {:?}", self.executable, args, cwd);
        let output = tokio::process::Command::new(&self.executable)
            .args(args)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    LauncherError::ToolNotAvailable(self.executable.clone())
                }
                _ => LauncherError::io(&self.executable, e),
            })?;

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Marks a file as executable (0755) where that is meaningful.
pub fn ensure_executable(path: &Path) -> LauncherResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path).map_err(|e| LauncherError::io(path, e))?;
        if metadata.permissions().mode() & 0o111 != 0o111 {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
                .map_err(|e| LauncherError::io(path, e))?;
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
