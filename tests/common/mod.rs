#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use zip::write::SimpleFileOptions;

use stardeck_lib::core::client::{AssetRef, Catalog, Platform};
use stardeck_lib::core::downloader::HttpFetch;
use stardeck_lib::core::error::{LauncherError, LauncherResult};
use stardeck_lib::core::instance::{Instance, InstanceRegistry};
use stardeck_lib::core::store::MemoryStore;
use stardeck_lib::core::tool::{ExternalTool, ToolOutput};

pub const APP_ID: &str = "211820";
pub const CLIENT_URL: &str = "https://example.invalid/OpenStarbound-Linux-Client.zip";

// ── Archives ────────────────────────────────────────────

pub fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A Linux client release: zip → client.tar → client_distribution/…
pub fn linux_client_release() -> Vec<u8> {
    let tar = tar_bytes(&[
        ("client_distribution/linux/starbound", b"#!/bin/sh\n"),
        ("client_distribution/assets/user/.keep", b""),
    ]);
    zip_bytes(&[("client.tar", &tar)])
}

// ── Catalog ─────────────────────────────────────────────

pub struct StubCatalog {
    pub asset: Option<AssetRef>,
}

impl StubCatalog {
    pub fn serving(url: &str) -> Self {
        Self {
            asset: Some(AssetRef {
                version: "v0.1.14".into(),
                name: "OpenStarbound-Linux-Client.zip".into(),
                url: url.into(),
                sha256: None,
            }),
        }
    }

    pub fn empty() -> Self {
        Self { asset: None }
    }
}

#[async_trait]
impl Catalog for StubCatalog {
    async fn list_versions(&self) -> LauncherResult<Vec<String>> {
        Ok(self.asset.iter().map(|a| a.version.clone()).collect())
    }

    async fn resolve_asset(&self, version: &str, platform: Platform) -> LauncherResult<AssetRef> {
        self.asset
            .clone()
            .ok_or_else(|| LauncherError::AssetNotFoundForPlatform {
                version: version.to_string(),
                platform: platform.to_string(),
            })
    }
}

// ── HTTP ────────────────────────────────────────────────

/// Serves canned bodies by URL and counts requests.
#[derive(Default)]
pub struct FakeFetch {
    bodies: HashMap<String, Vec<u8>>,
    pub calls: AtomicUsize,
}

impl FakeFetch {
    pub fn with(url: &str, body: Vec<u8>) -> Self {
        let mut bodies = HashMap::new();
        bodies.insert(url.to_string(), body);
        Self {
            bodies,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpFetch for FakeFetch {
    async fn download(&self, url: &str, dest: &Path, _sha256: Option<&str>) -> LauncherResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self.bodies.get(url).ok_or_else(|| LauncherError::DownloadFailed {
            url: url.to_string(),
            status: 404,
        })?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(dest, body).unwrap();
        Ok(body.len() as u64)
    }
}

// ── steamcmd ────────────────────────────────────────────

/// What the fake steamcmd leaves behind for an item.
#[derive(Clone)]
pub enum Payload {
    /// `(relative path, bytes)` files under the item folder.
    Files(Vec<(String, Vec<u8>)>),
    /// Exit with this code and write nothing.
    Exit(i32),
}

/// Stands in for steamcmd: writes files into the workshop content folder.
pub struct FakeSteam {
    root: PathBuf,
    drops: Mutex<HashMap<String, Payload>>,
    /// How long a run lingers after writing its files.
    delay: Option<Duration>,
    pub runs: AtomicUsize,
}

impl FakeSteam {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            drops: Mutex::new(HashMap::new()),
            delay: None,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn drop_pak(self, item: &str, file: &str) -> Self {
        self.set(item, Payload::Files(vec![(file.to_string(), item.as_bytes().to_vec())]));
        self
    }

    pub fn set(&self, item: &str, drop: Payload) {
        self.drops.lock().unwrap().insert(item.to_string(), drop);
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn content_dir(&self, item: &str) -> PathBuf {
        self.root
            .join("steamapps")
            .join("workshop")
            .join("content")
            .join(APP_ID)
            .join(item)
    }
}

#[async_trait]
impl ExternalTool for FakeSteam {
    fn name(&self) -> &str {
        "steamcmd"
    }

    async fn run(&self, args: &[String], _cwd: &Path) -> LauncherResult<ToolOutput> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let item = args
            .iter()
            .position(|a| a == "+workshop_download_item")
            .and_then(|i| args.get(i + 2))
            .cloned()
            .unwrap_or_default();

        let drop = self.drops.lock().unwrap().get(&item).cloned();
        match drop {
            Some(Payload::Files(files)) => {
                let dir = self.content_dir(&item);
                for (rel, bytes) in files {
                    let path = dir.join(rel);
                    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                    std::fs::write(path, bytes).unwrap();
                }
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(ToolOutput {
                    exit_code: Some(0),
                    stdout: format!("Success. Downloaded item {item}\n"),
                    stderr: String::new(),
                })
            }
            Some(Payload::Exit(code)) => Ok(ToolOutput {
                exit_code: Some(code),
                stdout: String::new(),
                stderr: "Connection timed out\n".into(),
            }),
            None => Ok(ToolOutput {
                exit_code: Some(0),
                stdout: format!("ERROR! Download item {item} failed (File Not Found).\n"),
                stderr: String::new(),
            }),
        }
    }
}

// ── Registry ────────────────────────────────────────────

pub fn memory_registry(instances_dir: &Path) -> Arc<InstanceRegistry> {
    Arc::new(InstanceRegistry::new(
        Arc::new(MemoryStore::new()),
        instances_dir.to_path_buf(),
    ))
}

/// Registers an instance whose directory tree exists but holds no client.
pub async fn seed_instance(registry: &InstanceRegistry, name: &str) -> Instance {
    let path = registry.instance_path(name);
    std::fs::create_dir_all(path.join("mods")).unwrap();
    std::fs::create_dir_all(path.join("assets")).unwrap();
    let instance = Instance {
        name: name.into(),
        description: String::new(),
        icon: String::new(),
        version: "v0.1.14".into(),
        path: path.clone(),
        client_path: path.join("linux").join("starbound"),
        mods: Vec::new(),
        created_at: Utc::now(),
    };
    registry.insert(instance.clone()).await.unwrap();
    instance
}

pub fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}
