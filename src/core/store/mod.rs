// ─── Persisted key-value store ───
// Whole-document JSON storage. Callers read a value, transform it and write
// it back; there are no partial updates and no transactions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> LauncherResult<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> LauncherResult<()>;
}

/// A JSON object on disk, one top-level field per key.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> LauncherResult<BTreeMap<String, Value>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(LauncherError::io(&self.path, source)),
        }
    }

    fn write_document(&self, document: &BTreeMap<String, Value>) -> LauncherResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }

        // Write-then-rename so a crash never leaves a truncated store behind.
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(document)?;
        std::fs::write(&tmp, json).map_err(|e| LauncherError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| LauncherError::io(&self.path, e))?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> LauncherResult<Option<Value>> {
        Ok(self.read_document()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> LauncherResult<()> {
        let mut document = self.read_document()?;
        document.insert(key.to_string(), value);
        self.write_document(&document)?;
        debug!("Stored key '{}' in {:?}", key, self.path);
        Ok(())
    }
}

/// Volatile store, used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> LauncherResult<Option<Value>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> LauncherResult<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value);
        Ok(())
    }
}
