// ─── Stardeck Core ───
// Instance provisioning and workshop mod management for OpenStarbound.
//
// Architecture:
//   core/
//     store/      Key/value persistence (JSON file, in-memory)
//     instance/   Instance + Mod model, registry, lifecycle manager
//     downloader/ Streaming HTTP downloads with SHA-256 validation
//     archive     zip / tar / tar.gz extraction with path rewriting
//     tool/       External process gateway + steamcmd
//     client/     Release catalog, platform layouts, client provisioning
//     mods/       Workshop installs, enable/disable, import, delete
//     scheduler/  Bounded-concurrency download queue with retries
//     notify      Scheduler event fan-out
//     launch      Client process spawner
//     state/      Settings + application wiring

pub mod archive;
pub mod client;
pub mod downloader;
pub mod error;
pub mod http;
pub mod instance;
pub mod launch;
pub mod mods;
pub mod notify;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod tool;
