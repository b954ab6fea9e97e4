use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{move_file, remove_file_if_exists};
use crate::core::client::remove_tree;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::model::{
    artifact_file_name, canonical_name, sanitize_file_stem, Mod, PAK_EXTENSION,
};
use crate::core::instance::InstanceRegistry;
use crate::core::scheduler::{DownloadJob, JobRunner};
use crate::core::tool::SteamCmd;

/// Turns a downloaded workshop item into `<name>.pak` inside an instance.
///
/// steamcmd writes every download of an item to the same content folder, so
/// jobs for one item are serialized even when they target different
/// instances. The folder is only ever removed by the job holding its lock.
pub struct ModInstaller {
    registry: Arc<InstanceRegistry>,
    steamcmd: Arc<SteamCmd>,
    item_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ModInstaller {
    pub fn new(registry: Arc<InstanceRegistry>, steamcmd: Arc<SteamCmd>) -> Self {
        Self {
            registry,
            steamcmd,
            item_locks: Mutex::new(HashMap::new()),
        }
    }

    fn item_lock(&self, item_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.item_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop locks nobody else is holding or waiting on.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(item_id.to_string()).or_default().clone()
    }

    pub async fn install(&self, job: &DownloadJob) -> LauncherResult<()> {
        let instance = self.registry.get(&job.instance_name).await?;
        if instance.find_mod(&job.mod_id).is_some() {
            info!(
                "Mod {} already installed in '{}', nothing to do",
                job.mod_id, job.instance_name
            );
            return Ok(());
        }

        let lock = self.item_lock(&job.mod_id);
        let _held = lock.lock().await;

        let scratch = self.steamcmd.content_dir(&job.mod_id);
        let result = self.fetch_and_merge(job).await;
        remove_tree(&scratch).await;
        result
    }

    async fn fetch_and_merge(&self, job: &DownloadJob) -> LauncherResult<()> {
        let scratch = self.steamcmd.download_item(&job.mod_id).await?;
        let mod_id = job.mod_id.clone();
        let package = tokio::task::spawn_blocking(move || find_package(&scratch, &mod_id))
            .await
            .map_err(|e| LauncherError::Other(format!("package search task failed: {e}")))??;
        let name = mod_file_stem(job, &package);

        let mut txn = self.registry.begin().await?;
        let instance = txn.require_mut(&job.instance_name)?;

        if instance.find_mod(&job.mod_id).is_some() {
            debug!("Mod {} appeared while downloading; keeping record", job.mod_id);
            return Ok(());
        }
        if let Some(owner) = instance.mods.iter().find(|m| canonical_name(&m.name) == name) {
            return Err(LauncherError::FilesystemConflict(format!(
                "'{}.{}' already belongs to mod {}",
                name, PAK_EXTENSION, owner.id
            )));
        }

        let mods_dir = instance.mods_dir();
        tokio::fs::create_dir_all(&mods_dir)
            .await
            .map_err(|e| LauncherError::io(&mods_dir, e))?;

        // Untracked leftovers with this name would break the one-artifact rule.
        let target = mods_dir.join(artifact_file_name(&name, true));
        remove_file_if_exists(&mods_dir.join(artifact_file_name(&name, false))).await?;
        move_file(&package, &target).await?;

        instance.mods.push(Mod::new(job.mod_id.clone(), &name));
        if let Err(e) = txn.commit() {
            warn!("Registry write failed, removing {:?}", target);
            let _ = remove_file_if_exists(&target).await;
            return Err(e);
        }

        info!(
            "Installed mod {} as {:?} into '{}'",
            job.mod_id, target, job.instance_name
        );
        Ok(())
    }
}

#[async_trait]
impl JobRunner for ModInstaller {
    async fn run(&self, job: &DownloadJob) -> LauncherResult<()> {
        self.install(job).await
    }
}

/// Locates the single package file of a downloaded item.
///
/// Looks at the root first and only descends one level when the root has
/// no package at all.
pub fn find_package(root: &Path, mod_id: &str) -> LauncherResult<PathBuf> {
    let mut candidates = packages_in(root)?;

    if candidates.is_empty() {
        let entries = std::fs::read_dir(root).map_err(|e| LauncherError::io(root, e))?;
        for entry in entries {
            let path = entry.map_err(|e| LauncherError::io(root, e))?.path();
            if path.is_dir() {
                candidates.extend(packages_in(&path)?);
            }
        }
    }

    if candidates.len() == 1 {
        Ok(candidates.remove(0))
    } else {
        Err(LauncherError::ContentAmbiguous {
            mod_id: mod_id.to_string(),
            candidates: candidates.len(),
        })
    }
}

fn packages_in(dir: &Path) -> LauncherResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| LauncherError::io(dir, e))?;
    let mut found = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| LauncherError::io(dir, e))?.path();
        let is_pak = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(PAK_EXTENSION))
            .unwrap_or(false);
        if is_pak && path.is_file() {
            found.push(path);
        }
    }
    Ok(found)
}

/// Canonical on-disk name: the job's title, else the package stem, else the id.
fn mod_file_stem(job: &DownloadJob, package: &Path) -> String {
    [
        sanitize_file_stem(&job.mod_name),
        package
            .file_stem()
            .map(|s| sanitize_file_stem(&s.to_string_lossy()))
            .unwrap_or_default(),
        sanitize_file_stem(&job.mod_id),
    ]
    .into_iter()
    .map(|name| canonical_name(&name))
    .find(|name| !name.is_empty())
    .unwrap_or_else(|| job.mod_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_package_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("contents.pak"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("other.pak"), b"").unwrap();

        let found = find_package(dir.path(), "1").unwrap();
        assert_eq!(found, dir.path().join("contents.pak"));
    }

    #[test]
    fn one_level_down_is_searched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("mod.PAK"), b"").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"").unwrap();

        let found = find_package(dir.path(), "1").unwrap();
        assert_eq!(found, dir.path().join("sub").join("mod.PAK"));
    }

    #[test]
    fn zero_or_many_candidates_are_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_package(dir.path(), "1").unwrap_err();
        assert!(matches!(err, LauncherError::ContentAmbiguous { candidates: 0, .. }));

        std::fs::write(dir.path().join("a.pak"), b"").unwrap();
        std::fs::write(dir.path().join("b.pak"), b"").unwrap();
        let err = find_package(dir.path(), "1").unwrap_err();
        assert!(matches!(err, LauncherError::ContentAmbiguous { candidates: 2, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn deeper_nesting_is_not_searched() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a").join("b");
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(deep.join("x.pak"), b"").unwrap();
        assert!(find_package(dir.path(), "1").is_err());
    }

    #[test]
    fn file_stem_prefers_title() {
        let job = DownloadJob::new("731", "Frackin' Universe", "A");
        assert_eq!(mod_file_stem(&job, Path::new("/x/contents.pak")), "Frackin' Universe");

        let untitled = DownloadJob::new("731", "  ", "A");
        assert_eq!(mod_file_stem(&untitled, Path::new("/x/contents.pak")), "contents");
    }
}
