use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::client::{ClientProvisioner, GitHubReleases, Platform};
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::instance::{InstanceManager, InstanceRegistry};
use crate::core::mods::{ModInstaller, ModStateManager};
use crate::core::notify::NotificationBus;
use crate::core::scheduler::{ModDownloadScheduler, SchedulerConfig};
use crate::core::store::JsonFileStore;
use crate::core::tool::SteamCmd;

const APP_DIR_NAME: &str = "Stardeck";
const SETTINGS_FILE: &str = "launcher_settings.json";
const STORE_FILE: &str = "store.json";

pub const DEFAULT_RELEASE_API_URL: &str =
    "https://api.github.com/repos/OpenStarbound/OpenStarbound/releases";
pub const DEFAULT_STEAMCMD_URL: &str =
    "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz";
pub const DEFAULT_WORKSHOP_APP_ID: &str = "211820";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    pub max_concurrent_downloads: usize,
    pub max_download_retries: u32,
    pub release_api_url: String,
    pub steamcmd_url: String,
    pub workshop_app_id: String,
    /// Base game `packed.pak` linked into every new instance.
    pub packed_pak_path: Option<PathBuf>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        Self {
            max_concurrent_downloads: scheduler.max_concurrency,
            max_download_retries: scheduler.max_retries,
            release_api_url: DEFAULT_RELEASE_API_URL.to_string(),
            steamcmd_url: DEFAULT_STEAMCMD_URL.to_string(),
            workshop_app_id: DEFAULT_WORKSHOP_APP_ID.to_string(),
            packed_pak_path: None,
        }
    }
}

impl LauncherSettings {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrency: self.max_concurrent_downloads,
            max_retries: self.max_download_retries,
        }
    }

    /// Reads the settings file, falling back to defaults when it is absent
    /// or unreadable.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring corrupt {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, data_dir: &Path) -> LauncherResult<()> {
        let path = data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| LauncherError::io(&path, e))
    }
}

/// Everything the command surface needs, wired once per process.
pub struct AppState {
    pub data_dir: PathBuf,
    pub settings: LauncherSettings,
    pub http_client: Client,
    pub downloader: Arc<Downloader>,
    pub registry: Arc<InstanceRegistry>,
    pub instances: InstanceManager,
    pub steamcmd: Arc<SteamCmd>,
    pub scheduler: Arc<ModDownloadScheduler>,
    pub mod_state: ModStateManager,
    pub bus: NotificationBus,
    pub catalog: Arc<GitHubReleases>,
}

impl AppState {
    pub fn new(data_dir: PathBuf) -> LauncherResult<Self> {
        for dir in [
            data_dir.clone(),
            instances_dir(&data_dir),
            data_dir.join("tmp"),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| LauncherError::io(&dir, e))?;
        }
        debug!("Using data directory {:?}", data_dir);

        let settings = LauncherSettings::load(&data_dir);
        let http_client = build_http_client()?;
        let downloader = Arc::new(Downloader::new(http_client.clone()));

        let store = Arc::new(JsonFileStore::new(data_dir.join(STORE_FILE)));
        let registry = Arc::new(InstanceRegistry::new(store, instances_dir(&data_dir)));

        let catalog = Arc::new(GitHubReleases::new(
            http_client.clone(),
            settings.release_api_url.clone(),
        ));
        let provisioner = Arc::new(ClientProvisioner::new(
            catalog.clone(),
            downloader.clone(),
            Platform::current(),
            data_dir.join("tmp"),
        ));
        let instances = InstanceManager::new(registry.clone(), provisioner)
            .with_packed_pak(settings.packed_pak_path.clone());

        let steamcmd = Arc::new(SteamCmd::from_root(
            data_dir.join("steamcmd"),
            settings.workshop_app_id.clone(),
        ));
        let installer = Arc::new(ModInstaller::new(registry.clone(), steamcmd.clone()));
        let bus = NotificationBus::default();
        let scheduler = Arc::new(ModDownloadScheduler::new(
            settings.scheduler_config(),
            installer,
            bus.clone(),
        ));
        let mod_state = ModStateManager::new(registry.clone());

        Ok(Self {
            data_dir,
            settings,
            http_client,
            downloader,
            registry,
            instances,
            steamcmd,
            scheduler,
            mod_state,
            bus,
            catalog,
        })
    }

    pub fn instances_dir(&self) -> PathBuf {
        instances_dir(&self.data_dir)
    }

    pub fn save_settings(&self) -> LauncherResult<()> {
        self.settings.save(&self.data_dir)
    }
}

fn instances_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("instances")
}

/// `<platform data dir>/Stardeck`, or `./Stardeck` when the platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{ "max_concurrent_downloads": 8 }"#,
        )
        .unwrap();

        let settings = LauncherSettings::load(dir.path());
        assert_eq!(settings.max_concurrent_downloads, 8);
        assert_eq!(settings.max_download_retries, 5);
        assert_eq!(settings.workshop_app_id, DEFAULT_WORKSHOP_APP_ID);
    }

    #[test]
    fn settings_survive_a_save() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LauncherSettings {
            packed_pak_path: Some(PathBuf::from("/games/starbound/assets/packed.pak")),
            ..LauncherSettings::default()
        };
        settings.save(dir.path()).unwrap();
        assert_eq!(LauncherSettings::load(dir.path()), settings);
    }

    #[test]
    fn corrupt_settings_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ nope").unwrap();
        assert_eq!(LauncherSettings::load(dir.path()), LauncherSettings::default());
    }

    #[test]
    fn state_lays_out_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(dir.path().join("data")).unwrap();
        assert!(state.instances_dir().is_dir());
        assert!(state.data_dir.join("tmp").is_dir());
        assert_eq!(state.scheduler.config(), SchedulerConfig::default());
    }
}
