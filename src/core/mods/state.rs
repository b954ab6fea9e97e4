use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::{exists, move_file, remove_file_if_exists};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::model::{
    artifact_file_name, canonical_name, sanitize_file_stem, Mod, PAK_EXTENSION,
};
use crate::core::instance::InstanceRegistry;

/// Enable/disable, removal and local import of installed mods.
///
/// Every operation changes the filesystem first and writes the registry only
/// once that succeeded.
pub struct ModStateManager {
    registry: Arc<InstanceRegistry>,
}

impl ModStateManager {
    pub fn new(registry: Arc<InstanceRegistry>) -> Self {
        Self { registry }
    }

    /// Renames `<name>.pak` ⇄ `<name>.pak.disabled` and records the new flag.
    pub async fn set_enabled(
        &self,
        instance_name: &str,
        mod_id: &str,
        enabled: bool,
    ) -> LauncherResult<()> {
        let mut txn = self.registry.begin().await?;
        let instance = txn.require_mut(instance_name)?;
        let mods_dir = instance.mods_dir();
        let m = instance
            .find_mod_mut(mod_id)
            .ok_or_else(|| LauncherError::ModNotFound {
                instance: instance_name.to_string(),
                mod_id: mod_id.to_string(),
            })?;

        let canonical = canonical_name(&m.name);
        let source = mods_dir.join(artifact_file_name(&canonical, !enabled));
        let target = mods_dir.join(artifact_file_name(&canonical, enabled));

        match (exists(&source).await?, exists(&target).await?) {
            (true, false) => {
                tokio::fs::rename(&source, &target)
                    .await
                    .map_err(|e| LauncherError::io(&source, e))?;
            }
            (true, true) => {
                return Err(LauncherError::FilesystemConflict(format!(
                    "both {:?} and {:?} exist",
                    source, target
                )));
            }
            (false, true) if m.enabled == enabled => {
                // Already in the requested state on both sides.
                return Ok(());
            }
            (false, true) => {
                return Err(LauncherError::RegistryInconsistency {
                    instance: instance_name.to_string(),
                    mod_name: canonical,
                    detail: format!(
                        "file is already {} but the registry says otherwise",
                        if enabled { "enabled" } else { "disabled" }
                    ),
                });
            }
            (false, false) => {
                return Err(LauncherError::FilesystemConflict(format!(
                    "artifact for mod '{}' is missing from {:?}",
                    canonical, mods_dir
                )));
            }
        }

        m.enabled = enabled;
        m.name = canonical;
        if let Err(e) = txn.commit() {
            warn!("Registry write failed, restoring {:?}", source);
            if let Err(undo) = tokio::fs::rename(&target, &source).await {
                warn!("Could not restore {:?}: {}", source, undo);
            }
            return Err(e);
        }

        info!(
            "{} mod {} in '{}'",
            if enabled { "Enabled" } else { "Disabled" },
            mod_id,
            instance_name
        );
        Ok(())
    }

    /// Deletes a mod's artifact and then its record.
    pub async fn delete(&self, instance_name: &str, mod_id: &str) -> LauncherResult<()> {
        let mut txn = self.registry.begin().await?;
        let instance = txn.require_mut(instance_name)?;
        let mods_dir = instance.mods_dir();
        let m = instance
            .find_mod(mod_id)
            .ok_or_else(|| LauncherError::ModNotFound {
                instance: instance_name.to_string(),
                mod_id: mod_id.to_string(),
            })?;

        let canonical = canonical_name(&m.name);
        let mut removed = false;
        for enabled in [true, false] {
            removed |=
                remove_file_if_exists(&mods_dir.join(artifact_file_name(&canonical, enabled)))
                    .await?;
        }
        if !removed {
            warn!("No artifact found for mod {} in '{}'", mod_id, instance_name);
        }

        instance.mods.retain(|m| m.id != mod_id);
        txn.commit()?;
        info!("Deleted mod {} from '{}'", mod_id, instance_name);
        Ok(())
    }

    /// Copies a local `.pak` into the instance as an enabled, imported mod.
    pub async fn import(&self, instance_name: &str, file: &Path) -> LauncherResult<Mod> {
        let is_pak = file
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(PAK_EXTENSION))
            .unwrap_or(false);
        let is_file = tokio::fs::metadata(file)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_pak || !is_file {
            return Err(LauncherError::Other(format!(
                "{:?} is not a .{} file",
                file, PAK_EXTENSION
            )));
        }

        let name = file
            .file_stem()
            .map(|s| canonical_name(&sanitize_file_stem(&s.to_string_lossy())))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LauncherError::Other(format!("cannot derive a name from {:?}", file)))?;

        let mut txn = self.registry.begin().await?;
        let instance = txn.require_mut(instance_name)?;
        if let Some(owner) = instance.mods.iter().find(|m| canonical_name(&m.name) == name) {
            return Err(LauncherError::FilesystemConflict(format!(
                "'{}' is already installed as mod {}",
                name, owner.id
            )));
        }

        let mods_dir = instance.mods_dir();
        tokio::fs::create_dir_all(&mods_dir)
            .await
            .map_err(|e| LauncherError::io(&mods_dir, e))?;
        let target = mods_dir.join(artifact_file_name(&name, true));
        remove_file_if_exists(&mods_dir.join(artifact_file_name(&name, false))).await?;

        let staged = mods_dir.join(format!(".import-{}", Uuid::new_v4()));
        tokio::fs::copy(file, &staged)
            .await
            .map_err(|e| LauncherError::io(file, e))?;
        move_file(&staged, &target).await?;

        let record = Mod {
            id: format!("local-{}", Uuid::new_v4()),
            imported: true,
            ..Mod::new(String::new(), &name)
        };
        instance.mods.push(record.clone());
        if let Err(e) = txn.commit() {
            let _ = remove_file_if_exists(&target).await;
            return Err(e);
        }

        info!("Imported {:?} into '{}' as {}", file, instance_name, record.id);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::model::Instance;
    use crate::core::store::MemoryStore;
    use chrono::Utc;
    use std::path::PathBuf;

    async fn setup(dir: &Path) -> (Arc<InstanceRegistry>, ModStateManager, PathBuf) {
        let registry = Arc::new(InstanceRegistry::new(
            Arc::new(MemoryStore::new()),
            dir.to_path_buf(),
        ));
        let path = dir.join("A");
        std::fs::create_dir_all(path.join("mods")).unwrap();
        registry
            .insert(Instance {
                name: "A".into(),
                description: String::new(),
                icon: String::new(),
                version: "v1".into(),
                path: path.clone(),
                client_path: path.join("linux").join("starbound"),
                mods: vec![Mod::new("731", "Frackin")],
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let mods = path.join("mods");
        std::fs::write(mods.join("Frackin.pak"), b"pak").unwrap();
        (registry.clone(), ModStateManager::new(registry), mods)
    }

    #[tokio::test]
    async fn toggle_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, manager, mods) = setup(dir.path()).await;

        manager.set_enabled("A", "731", false).await.unwrap();
        assert!(!mods.join("Frackin.pak").exists());
        assert!(mods.join("Frackin.pak.disabled").exists());
        assert!(!registry.get("A").await.unwrap().mods[0].enabled);

        manager.set_enabled("A", "731", true).await.unwrap();
        assert!(mods.join("Frackin.pak").exists());
        assert!(!mods.join("Frackin.pak.disabled").exists());
        assert!(registry.get("A").await.unwrap().mods[0].enabled);
    }

    #[tokio::test]
    async fn repeating_a_toggle_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let (_registry, manager, mods) = setup(dir.path()).await;
        manager.set_enabled("A", "731", true).await.unwrap();
        assert!(mods.join("Frackin.pak").exists());
    }

    #[tokio::test]
    async fn missing_artifact_leaves_record_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, manager, mods) = setup(dir.path()).await;
        std::fs::remove_file(mods.join("Frackin.pak")).unwrap();

        let err = manager.set_enabled("A", "731", false).await.unwrap_err();
        assert!(matches!(err, LauncherError::FilesystemConflict(_)));
        assert!(registry.get("A").await.unwrap().mods[0].enabled);
    }

    #[tokio::test]
    async fn flag_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, manager, mods) = setup(dir.path()).await;
        std::fs::rename(mods.join("Frackin.pak"), mods.join("Frackin.pak.disabled")).unwrap();

        let err = manager.set_enabled("A", "731", false).await.unwrap_err();
        assert!(matches!(err, LauncherError::RegistryInconsistency { .. }));
        assert!(registry.get("A").await.unwrap().mods[0].enabled);
    }

    #[tokio::test]
    async fn delete_removes_file_then_record() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, manager, mods) = setup(dir.path()).await;

        manager.delete("A", "731").await.unwrap();
        assert!(!mods.join("Frackin.pak").exists());
        assert!(registry.get("A").await.unwrap().mods.is_empty());

        let err = manager.delete("A", "731").await.unwrap_err();
        assert!(matches!(err, LauncherError::ModNotFound { .. }));
    }

    #[tokio::test]
    async fn import_copies_pak_and_marks_it() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, manager, mods) = setup(dir.path()).await;
        let source = dir.path().join("Extra Hats.pak");
        std::fs::write(&source, b"hats").unwrap();

        let record = manager.import("A", &source).await.unwrap();
        assert!(record.imported);
        assert!(record.id.starts_with("local-"));
        assert_eq!(std::fs::read(mods.join("Extra Hats.pak")).unwrap(), b"hats");
        assert!(source.exists());
        assert_eq!(registry.get("A").await.unwrap().mods.len(), 2);

        let err = manager.import("A", &source).await.unwrap_err();
        assert!(matches!(err, LauncherError::FilesystemConflict(_)));
    }

    #[tokio::test]
    async fn import_rejects_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let (_registry, manager, _mods) = setup(dir.path()).await;
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, b"").unwrap();
        assert!(manager.import("A", &source).await.is_err());
    }
}
