use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::model::{artifact_file_name, canonical_name, Instance};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::store::KeyValueStore;

/// Store key holding the whole instance collection.
pub const INSTANCES_KEY: &str = "instances";

/// Durable name → instance mapping.
///
/// Every mutation reads the full collection, transforms it and writes it back.
/// Those spans are serialized through [`InstanceRegistry::begin`], which holds
/// the registry lock until the returned transaction is committed or dropped.
pub struct InstanceRegistry {
    store: Arc<dyn KeyValueStore>,
    instances_dir: PathBuf,
    lock: Mutex<()>,
}

/// An open read-modify-write span over the instance collection.
pub struct RegistryTxn<'a> {
    registry: &'a InstanceRegistry,
    _guard: MutexGuard<'a, ()>,
    pub instances: Vec<Instance>,
}

impl<'a> RegistryTxn<'a> {
    pub fn find(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn require_mut(&mut self, name: &str) -> LauncherResult<&mut Instance> {
        self.instances
            .iter_mut()
            .find(|i| i.name == name)
            .ok_or_else(|| LauncherError::InstanceNotFound(name.to_string()))
    }

    /// Writes the collection back and releases the lock.
    pub fn commit(self) -> LauncherResult<()> {
        self.registry.write_all(&self.instances)
    }
}

impl InstanceRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, instances_dir: PathBuf) -> Self {
        Self {
            store,
            instances_dir,
            lock: Mutex::new(()),
        }
    }

    pub fn instances_dir(&self) -> &Path {
        &self.instances_dir
    }

    /// Directory an instance with this name lives in.
    pub fn instance_path(&self, name: &str) -> PathBuf {
        self.instances_dir.join(name)
    }

    pub async fn begin(&self) -> LauncherResult<RegistryTxn<'_>> {
        let guard = self.lock.lock().await;
        let instances = self.read_all()?;
        Ok(RegistryTxn {
            registry: self,
            _guard: guard,
            instances,
        })
    }

    pub async fn list(&self) -> LauncherResult<Vec<Instance>> {
        let _guard = self.lock.lock().await;
        self.read_all()
    }

    pub async fn get(&self, name: &str) -> LauncherResult<Instance> {
        self.list()
            .await?
            .into_iter()
            .find(|i| i.name == name)
            .ok_or_else(|| LauncherError::InstanceNotFound(name.to_string()))
    }

    pub async fn contains(&self, name: &str) -> LauncherResult<bool> {
        Ok(self.list().await?.iter().any(|i| i.name == name))
    }

    /// Inserts a new record, rejecting duplicate names.
    pub async fn insert(&self, instance: Instance) -> LauncherResult<()> {
        let mut txn = self.begin().await?;
        if txn.contains(&instance.name) {
            return Err(LauncherError::DuplicateName(instance.name));
        }
        debug!("Registering instance '{}'", instance.name);
        txn.instances.push(instance);
        txn.commit()
    }

    /// Removes a record. Returns whether it existed.
    pub async fn remove(&self, name: &str) -> LauncherResult<bool> {
        let mut txn = self.begin().await?;
        let before = txn.instances.len();
        txn.instances.retain(|i| i.name != name);
        let removed = txn.instances.len() != before;
        txn.commit()?;
        Ok(removed)
    }

    /// Applies `f` to one record and persists the result if `f` succeeds.
    pub async fn update<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Instance) -> LauncherResult<T>,
    ) -> LauncherResult<T> {
        let mut txn = self.begin().await?;
        let value = f(txn.require_mut(name)?)?;
        txn.commit()?;
        Ok(value)
    }

    fn read_all(&self) -> LauncherResult<Vec<Instance>> {
        match self.store.get(INSTANCES_KEY)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_all(&self, instances: &[Instance]) -> LauncherResult<()> {
        self.store
            .set(INSTANCES_KEY, serde_json::to_value(instances)?)
    }
}

/// Compares every mod's `enabled` flag with the files actually present.
///
/// Mismatches are reported, never repaired.
pub fn check_consistency(instance: &Instance) -> Vec<LauncherError> {
    let mods_dir = instance.mods_dir();
    let mut problems = Vec::new();

    for m in &instance.mods {
        let canonical = canonical_name(&m.name);
        let expected = mods_dir.join(artifact_file_name(&canonical, m.enabled));
        let opposite = mods_dir.join(artifact_file_name(&canonical, !m.enabled));

        let detail = match (expected.exists(), opposite.exists()) {
            (true, false) => continue,
            (true, true) => "both enabled and disabled artifacts are present".to_string(),
            (false, true) => format!(
                "registry says {} but the file on disk is {}",
                if m.enabled { "enabled" } else { "disabled" },
                if m.enabled { "disabled" } else { "enabled" },
            ),
            (false, false) => format!("artifact {:?} is missing", expected),
        };

        let problem = LauncherError::RegistryInconsistency {
            instance: instance.name.clone(),
            mod_name: canonical,
            detail,
        };
        warn!("{}", problem);
        problems.push(problem);
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::model::Mod;
    use crate::core::store::MemoryStore;
    use chrono::Utc;

    fn instance(dir: &Path, name: &str) -> Instance {
        Instance {
            name: name.into(),
            description: String::new(),
            icon: String::new(),
            version: "v1".into(),
            path: dir.join(name),
            client_path: dir.join(name).join("linux").join("starbound"),
            mods: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let registry = InstanceRegistry::new(Arc::new(MemoryStore::new()), "/i".into());
        registry.insert(instance(Path::new("/i"), "Test")).await.unwrap();

        let err = registry
            .insert(instance(Path::new("/i"), "Test"))
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::DuplicateName(ref n) if n == "Test"));
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_update_is_not_persisted() {
        let registry = InstanceRegistry::new(Arc::new(MemoryStore::new()), "/i".into());
        registry.insert(instance(Path::new("/i"), "A")).await.unwrap();

        let result: LauncherResult<()> = registry
            .update("A", |inst| {
                inst.description = "changed".into();
                Err(LauncherError::Other("abort".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(registry.get("A").await.unwrap().description.is_empty());
    }

    #[tokio::test]
    async fn remove_reports_existence() {
        let registry = InstanceRegistry::new(Arc::new(MemoryStore::new()), "/i".into());
        registry.insert(instance(Path::new("/i"), "A")).await.unwrap();
        assert!(registry.remove("A").await.unwrap());
        assert!(!registry.remove("A").await.unwrap());
    }

    #[test]
    fn consistency_check_flags_missing_and_flipped_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut inst = instance(dir.path(), "A");
        std::fs::create_dir_all(inst.mods_dir()).unwrap();

        let ok = Mod::new("1", "ok");
        let missing = Mod::new("2", "missing");
        let flipped = Mod::new("3", "flipped");
        std::fs::write(inst.mods_dir().join("ok.pak"), b"").unwrap();
        std::fs::write(inst.mods_dir().join("flipped.pak.disabled"), b"").unwrap();
        inst.mods = vec![ok, missing, flipped];

        let problems = check_consistency(&inst);
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().all(|p| matches!(
            p,
            LauncherError::RegistryInconsistency { mod_name, .. } if mod_name != "ok"
        )));
    }
}
