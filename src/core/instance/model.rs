use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File extension of an enabled mod package.
pub const PAK_EXTENSION: &str = "pak";
/// Suffix appended to a package file to disable it.
pub const DISABLED_SUFFIX: &str = ".disabled";

/// A single add-on package installed into an instance.
///
/// On disk a mod is exactly one file inside the instance `mods/` folder:
/// `<name>.pak` when enabled, `<name>.pak.disabled` when disabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mod {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub imported: bool,
}

fn default_true() -> bool {
    true
}

impl Mod {
    pub fn new(id: impl Into<String>, name: &str) -> Self {
        Self {
            id: id.into(),
            name: canonical_name(name),
            enabled: true,
            imported: false,
        }
    }

    /// File name this mod should currently have on disk.
    pub fn artifact_file_name(&self) -> String {
        artifact_file_name(&canonical_name(&self.name), self.enabled)
    }
}

/// Strips any `.disabled` suffix and `.pak` extension from a file or mod name.
pub fn canonical_name(name: &str) -> String {
    let name = name.strip_suffix(DISABLED_SUFFIX).unwrap_or(name);
    let name = name
        .strip_suffix(&format!(".{PAK_EXTENSION}"))
        .unwrap_or(name);
    name.to_string()
}

pub fn artifact_file_name(canonical: &str, enabled: bool) -> String {
    if enabled {
        format!("{canonical}.{PAK_EXTENSION}")
    } else {
        format!("{canonical}.{PAK_EXTENSION}{DISABLED_SUFFIX}")
    }
}

/// Turns a display title into something usable as a file name.
pub fn sanitize_file_stem(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    cleaned.trim_matches(|c| c == '.' || c == ' ').to_string()
}

/// Full instance representation persisted in the registry.
///
/// Each instance owns `instances/<name>/` with:
/// - `mods/`   : one package file per mod
/// - `assets/` : link to the base game asset pack
/// - the extracted client tree (platform folder such as `linux/`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub version: String,
    pub path: PathBuf,
    pub client_path: PathBuf,
    #[serde(default)]
    pub mods: Vec<Mod>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Instance {
    pub fn mods_dir(&self) -> PathBuf {
        mods_dir(&self.path)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.path.join("assets")
    }

    pub fn find_mod(&self, mod_id: &str) -> Option<&Mod> {
        self.mods.iter().find(|m| m.id == mod_id)
    }

    pub fn find_mod_mut(&mut self, mod_id: &str) -> Option<&mut Mod> {
        self.mods.iter_mut().find(|m| m.id == mod_id)
    }

    /// Path of the artifact a mod is expected to have right now.
    pub fn artifact_path(&self, m: &Mod) -> PathBuf {
        self.mods_dir().join(m.artifact_file_name())
    }

    pub fn enabled_mod_paths(&self) -> Vec<PathBuf> {
        self.mods
            .iter()
            .filter(|m| m.enabled)
            .map(|m| self.artifact_path(m))
            .collect()
    }

    /// Re-roots every stored path after the instance directory moved.
    pub fn relocate(&mut self, new_path: &Path) {
        if let Ok(relative) = self.client_path.strip_prefix(&self.path) {
            self.client_path = new_path.join(relative);
        }
        self.path = new_path.to_path_buf();
    }
}

pub fn mods_dir(instance_path: &Path) -> PathBuf {
    instance_path.join("mods")
}
