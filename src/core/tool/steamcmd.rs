use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::{ensure_executable, ExternalTool, ProcessTool, ToolOutput};
use crate::core::archive::{self, PathRewrite};
use crate::core::downloader::HttpFetch;
use crate::core::error::{LauncherError, LauncherResult};

#[cfg(target_os = "windows")]
const EXECUTABLE_NAME: &str = "steamcmd.exe";
#[cfg(not(target_os = "windows"))]
const EXECUTABLE_NAME: &str = "steamcmd.sh";

/// Workshop downloads through Valve's steamcmd.
///
/// Items land in `<root>/steamapps/workshop/content/<app>/<item>`, which the
/// installer treats as scratch space.
pub struct SteamCmd {
    tool: Arc<dyn ExternalTool>,
    root: PathBuf,
    app_id: String,
}

impl SteamCmd {
    pub fn new(tool: Arc<dyn ExternalTool>, root: PathBuf, app_id: impl Into<String>) -> Self {
        Self {
            tool,
            root,
            app_id: app_id.into(),
        }
    }

    /// Gateway backed by the executable inside `root`.
    pub fn from_root(root: PathBuf, app_id: impl Into<String>) -> Self {
        let tool = Arc::new(ProcessTool::new(executable_path(&root)));
        Self::new(tool, root, app_id)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_installed(&self) -> bool {
        executable_path(&self.root).is_file()
    }

    pub fn content_dir(&self, item_id: &str) -> PathBuf {
        self.root
            .join("steamapps")
            .join("workshop")
            .join("content")
            .join(&self.app_id)
            .join(item_id)
    }

    /// Downloads one workshop item and returns the directory it was written to.
    pub async fn download_item(&self, item_id: &str) -> LauncherResult<PathBuf> {
        let args: Vec<String> = vec![
            "+force_install_dir".into(),
            self.root.to_string_lossy().into_owned(),
            "+login".into(),
            "anonymous".into(),
            "+workshop_download_item".into(),
            self.app_id.clone(),
            item_id.to_string(),
            "+quit".into(),
        ];

        info!("Fetching workshop item {} via {}", item_id, self.tool.name());
        let output = self.tool.run(&args, &self.root).await?;
        self.check(&output)?;

        let dir = self.content_dir(item_id);
        let is_dir = tokio::fs::metadata(&dir)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(LauncherError::ContentAmbiguous {
                mod_id: item_id.to_string(),
                candidates: 0,
            });
        }
        Ok(dir)
    }

    fn check(&self, output: &ToolOutput) -> LauncherResult<()> {
        // steamcmd sometimes reports a failed item with a zero exit code
        let reported_error = output
            .stdout
            .lines()
            .find(|line| line.trim_start().starts_with("ERROR!"));

        if output.success() && reported_error.is_none() {
            return Ok(());
        }

        let detail = reported_error
            .or_else(|| output.stderr.lines().rev().find(|l| !l.trim().is_empty()))
            .or_else(|| output.stdout.lines().rev().find(|l| !l.trim().is_empty()))
            .unwrap_or("no output")
            .trim()
            .to_string();

        Err(LauncherError::ToolExecutionFailed {
            tool: self.tool.name().to_string(),
            code: output.exit_code,
            detail,
        })
    }

    /// Downloads and unpacks the steamcmd distribution into the root folder.
    pub async fn install(&self, fetch: &dyn HttpFetch, url: &str) -> LauncherResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| LauncherError::io(&self.root, e))?;

        let tarball = self.root.join("steamcmd-download.tar.gz");
        fetch.download(url, &tarball, None).await?;

        let root = self.root.clone();
        let source = tarball.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&source).map_err(|e| LauncherError::io(&source, e))?;
            archive::extract_tar_gz(file, &root, &PathRewrite::default())
        })
        .await
        .map_err(|e| LauncherError::Other(format!("steamcmd extraction task failed: {e}")));

        if let Err(e) = tokio::fs::remove_file(&tarball).await {
            warn!("Could not remove {:?}: {}", tarball, e);
        }
        extracted??;

        let executable = executable_path(&self.root);
        let present = tokio::fs::metadata(&executable)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !present {
            return Err(LauncherError::ToolNotAvailable(executable));
        }
        ensure_executable(&executable)?;
        info!("steamcmd installed at {:?}", executable);
        Ok(())
    }
}

pub fn executable_path(root: &Path) -> PathBuf {
    root.join(EXECUTABLE_NAME)
}
