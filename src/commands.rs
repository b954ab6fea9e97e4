// ─── Commands ───
// The operation surface exposed to front ends (currently the CLI in lib.rs).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::client::Catalog;
use crate::core::error::LauncherError;
use crate::core::instance::{Instance, InstanceSummary, Mod, NewInstance};
use crate::core::launch;
use crate::core::scheduler::{DownloadJob, Submission};
use crate::core::state::{AppState, LauncherSettings};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInstancePayload {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameInstancePayload {
    pub old_name: String,
    pub new_name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
}

/// A workshop item to download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModRequest {
    pub id: String,
    /// Workshop title; used as the on-disk file name when present.
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub mod_id: String,
    pub submission: Submission,
}

pub async fn list_versions(state: &AppState) -> Result<Vec<String>, LauncherError> {
    state.catalog.list_versions().await
}

pub async fn list_instances(state: &AppState) -> Result<Vec<InstanceSummary>, LauncherError> {
    state.instances.list().await
}

pub async fn create_instance(
    state: &AppState,
    payload: CreateInstancePayload,
) -> Result<Instance, LauncherError> {
    state
        .instances
        .create(NewInstance {
            name: payload.name,
            description: payload.description,
            icon: payload.icon,
            version: payload.version,
        })
        .await
}

pub async fn delete_instance(state: &AppState, name: &str) -> Result<(), LauncherError> {
    state.instances.delete(name).await
}

pub async fn rename_instance(
    state: &AppState,
    payload: RenameInstancePayload,
) -> Result<Instance, LauncherError> {
    state
        .instances
        .rename(
            &payload.old_name,
            &payload.new_name,
            payload.description,
            payload.icon,
        )
        .await
}

/// Queues one workshop download. Requires a running Tokio runtime.
pub async fn enqueue_mod_download(
    state: &AppState,
    instance_name: &str,
    request: ModRequest,
) -> Result<Submission, LauncherError> {
    state.registry.get(instance_name).await?;
    Ok(state
        .scheduler
        .submit(DownloadJob::new(request.id, request.name, instance_name)))
}

pub async fn enqueue_mod_downloads(
    state: &AppState,
    instance_name: &str,
    requests: Vec<ModRequest>,
) -> Result<Vec<EnqueueResponse>, LauncherError> {
    // Fail fast on unknown instances instead of burning retries.
    state.registry.get(instance_name).await?;

    let responses = requests
        .into_iter()
        .map(|request| {
            let submission = state.scheduler.submit(DownloadJob::new(
                request.id.clone(),
                request.name,
                instance_name,
            ));
            EnqueueResponse {
                mod_id: request.id,
                submission,
            }
        })
        .collect();
    Ok(responses)
}

pub async fn set_mod_enabled(
    state: &AppState,
    instance_name: &str,
    mod_id: &str,
    enabled: bool,
) -> Result<(), LauncherError> {
    state
        .mod_state
        .set_enabled(instance_name, mod_id, enabled)
        .await
}

pub async fn delete_mod(
    state: &AppState,
    instance_name: &str,
    mod_id: &str,
) -> Result<(), LauncherError> {
    state.mod_state.delete(instance_name, mod_id).await
}

pub async fn import_mod(
    state: &AppState,
    instance_name: &str,
    file: &Path,
) -> Result<Mod, LauncherError> {
    state.mod_state.import(instance_name, file).await
}

pub async fn launch_instance(state: &AppState, name: &str) -> Result<u32, LauncherError> {
    let instance = state.registry.get(name).await?;
    launch::launch(&instance)
}

pub async fn install_steamcmd(state: &AppState) -> Result<PathBuf, LauncherError> {
    if state.steamcmd.is_installed() {
        info!("steamcmd already present in {:?}", state.steamcmd.root());
    } else {
        state
            .steamcmd
            .install(state.downloader.as_ref(), &state.settings.steamcmd_url)
            .await?;
    }
    Ok(state.steamcmd.root().to_path_buf())
}

/// Stores the base game asset pack used for instances created from now on.
pub fn set_packed_pak(state: &mut AppState, path: Option<PathBuf>) -> Result<(), LauncherError> {
    if let Some(path) = &path {
        if !path.is_file() {
            return Err(LauncherError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "asset pack not found"),
            ));
        }
    }
    state.settings.packed_pak_path = path;
    state.save_settings()
}

pub fn get_launcher_settings(state: &AppState) -> LauncherSettings {
    state.settings.clone()
}

pub fn update_launcher_settings(
    state: &mut AppState,
    settings: LauncherSettings,
) -> Result<(), LauncherError> {
    state.settings = settings;
    state.save_settings()?;
    info!("Launcher settings updated");
    Ok(())
}
