use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::model::Instance;
use super::registry::{check_consistency, InstanceRegistry};
use crate::core::client::{remove_tree, ClientProvisioner};
use crate::core::error::{LauncherError, LauncherResult};

/// File name of the base game asset pack inside an instance `assets/` folder.
pub const PACKED_PAK: &str = "packed.pak";

/// Parameters of a new instance.
#[derive(Debug, Clone, Default)]
pub struct NewInstance {
    pub name: String,
    pub description: String,
    pub icon: String,
    /// Release tag or `latest`.
    pub version: String,
}

/// An instance together with the problems found on its mods folder.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    #[serde(flatten)]
    pub instance: Instance,
    pub warnings: Vec<String>,
}

/// Manages the lifecycle of instances: directory tree plus registry record.
pub struct InstanceManager {
    registry: Arc<InstanceRegistry>,
    provisioner: Arc<ClientProvisioner>,
    /// Base game asset pack linked into new instances.
    packed_pak: Option<PathBuf>,
    /// Names with a create in progress.
    creating: Mutex<HashSet<String>>,
}

/// Holds a name in `creating` until dropped.
struct NameClaim<'a> {
    creating: &'a Mutex<HashSet<String>>,
    name: String,
}

impl Drop for NameClaim<'_> {
    fn drop(&mut self) {
        self.creating
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

impl InstanceManager {
    pub fn new(registry: Arc<InstanceRegistry>, provisioner: Arc<ClientProvisioner>) -> Self {
        Self {
            registry,
            provisioner,
            packed_pak: None,
            creating: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_packed_pak(mut self, packed_pak: Option<PathBuf>) -> Self {
        self.packed_pak = packed_pak;
        self
    }

    /// Creates the instance directory, provisions the client and records it.
    ///
    /// A duplicate name fails before touching the filesystem. The instance
    /// directory is claimed with a non-recursive mkdir, and only a directory
    /// claimed here is removed again when a later step fails.
    pub async fn create(&self, request: NewInstance) -> LauncherResult<Instance> {
        let name = validate_name(&request.name)?;
        let _claim = self.claim(&name)?;
        if self.registry.contains(&name).await? {
            return Err(LauncherError::DuplicateName(name));
        }

        let path = self.registry.instance_path(&name);
        claim_directory(&path).await?;

        let client_path = self.provisioner.provision(&request.version, &path).await?;

        let instance = Instance {
            name: name.clone(),
            description: request.description,
            icon: request.icon,
            version: request.version,
            path: path.clone(),
            client_path,
            mods: Vec::new(),
            created_at: Utc::now(),
        };

        if let Err(err) = self.finish_create(&instance).await {
            remove_tree(&path).await;
            return Err(err);
        }

        info!("Created instance '{}' ({})", name, instance.version);
        Ok(instance)
    }

    fn claim(&self, name: &str) -> LauncherResult<NameClaim<'_>> {
        let mut creating = self.creating.lock().unwrap_or_else(PoisonError::into_inner);
        if !creating.insert(name.to_string()) {
            return Err(LauncherError::DuplicateName(name.to_string()));
        }
        Ok(NameClaim {
            creating: &self.creating,
            name: name.to_string(),
        })
    }

    async fn finish_create(&self, instance: &Instance) -> LauncherResult<()> {
        for dir in [instance.mods_dir(), instance.assets_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| LauncherError::io(&dir, e))?;
        }
        if let Some(pak) = &self.packed_pak {
            link_packed_pak(pak, &instance.assets_dir().join(PACKED_PAK)).await?;
        }
        self.registry.insert(instance.clone()).await
    }

    /// Removes the instance directory (best effort) and its record.
    pub async fn delete(&self, name: &str) -> LauncherResult<()> {
        let instance = self.registry.get(name).await?;
        remove_tree(&instance.path).await;
        self.registry.remove(name).await?;
        info!("Deleted instance '{}'", name);
        Ok(())
    }

    /// Renames an instance and optionally updates its metadata.
    ///
    /// The directory moves first; the record is committed only afterwards.
    pub async fn rename(
        &self,
        old_name: &str,
        new_name: &str,
        description: Option<String>,
        icon: Option<String>,
    ) -> LauncherResult<Instance> {
        let new_name = validate_name(new_name)?;
        let new_path = self.registry.instance_path(&new_name);

        let mut txn = self.registry.begin().await?;
        if new_name != old_name && txn.contains(&new_name) {
            return Err(LauncherError::DuplicateName(new_name));
        }

        let instance = txn.require_mut(old_name)?;
        let old_path = instance.path.clone();
        let moved = new_name != old_name && old_path != new_path;

        if moved {
            if path_exists(&new_path).await? {
                return Err(LauncherError::FilesystemConflict(format!(
                    "{:?} already exists",
                    new_path
                )));
            }
            if path_exists(&old_path).await? {
                tokio::fs::rename(&old_path, &new_path)
                    .await
                    .map_err(|e| LauncherError::io(&old_path, e))?;
            } else {
                warn!("Instance directory {:?} is missing; renaming record only", old_path);
            }
            instance.relocate(&new_path);
        }

        instance.name = new_name.clone();
        if let Some(description) = description {
            instance.description = description;
        }
        if let Some(icon) = icon {
            instance.icon = icon;
        }
        let updated = instance.clone();

        if let Err(err) = txn.commit() {
            if moved && path_exists(&new_path).await.unwrap_or(false) {
                warn!("Registry write failed, moving {:?} back", new_path);
                if let Err(undo) = tokio::fs::rename(&new_path, &old_path).await {
                    warn!("Could not restore {:?}: {}", old_path, undo);
                }
            }
            return Err(err);
        }

        info!("Renamed instance '{}' to '{}'", old_name, new_name);
        Ok(updated)
    }

    /// All instances, each with the consistency warnings of its mods.
    pub async fn list(&self) -> LauncherResult<Vec<InstanceSummary>> {
        let instances = self.registry.list().await?;
        Ok(instances
            .into_iter()
            .map(|instance| {
                let warnings = check_consistency(&instance)
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                InstanceSummary { instance, warnings }
            })
            .collect())
    }
}

/// Rejects names that cannot be used as a single directory component.
pub fn validate_name(raw: &str) -> LauncherResult<String> {
    let name = raw.trim();
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control());
    if invalid {
        return Err(LauncherError::InvalidName(raw.to_string()));
    }
    Ok(name.to_string())
}

/// Creates the instance directory itself, failing if anything is already there.
async fn claim_directory(path: &Path) -> LauncherResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LauncherError::io(parent, e))?;
    }
    match tokio::fs::create_dir(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(LauncherError::FilesystemConflict(format!(
                "{:?} exists but belongs to no instance",
                path
            )))
        }
        Err(e) => Err(LauncherError::io(path, e)),
    }
}

async fn path_exists(path: &Path) -> LauncherResult<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| LauncherError::io(path, e))
}

/// Symlinks the asset pack into place, copying when links are unavailable.
async fn link_packed_pak(source: &Path, target: &Path) -> LauncherResult<()> {
    let is_file = tokio::fs::metadata(source)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(LauncherError::io(
            source,
            std::io::Error::new(std::io::ErrorKind::NotFound, "asset pack not found"),
        ));
    }

    #[cfg(unix)]
    let linked = tokio::fs::symlink(source, target).await;
    #[cfg(windows)]
    let linked = tokio::fs::symlink_file(source, target).await;

    match linked {
        Ok(()) => {
            debug!("Linked {:?} -> {:?}", target, source);
            Ok(())
        }
        Err(e) => {
            debug!("Symlink failed ({}), copying {:?}", e, source);
            tokio::fs::copy(source, target)
                .await
                .map_err(|e| LauncherError::io(target, e))?;
            Ok(())
        }
    }
}
