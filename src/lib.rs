pub mod commands;
pub mod core;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::{CreateInstancePayload, ModRequest, RenameInstancePayload};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::notify::SchedulerEvent;
use crate::core::state::{default_data_dir, AppState};

#[derive(Parser)]
#[command(name = "stardeck", version, about = "OpenStarbound instance and mod manager")]
struct Cli {
    /// Overrides the platform data directory.
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List instances and any mod inconsistencies.
    List,
    /// List client versions available for download.
    Versions,
    Create {
        name: String,
        #[arg(long, default_value = crate::core::client::LATEST)]
        version: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        icon: String,
    },
    Delete {
        name: String,
    },
    Rename {
        old_name: String,
        new_name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        icon: Option<String>,
    },
    /// Download workshop items (`ID` or `ID=Title`) and wait until done.
    Download {
        instance: String,
        #[arg(required = true, value_name = "MOD")]
        mods: Vec<String>,
    },
    Enable {
        instance: String,
        mod_id: String,
    },
    Disable {
        instance: String,
        mod_id: String,
    },
    DeleteMod {
        instance: String,
        mod_id: String,
    },
    /// Copy a local .pak into an instance.
    Import {
        instance: String,
        file: PathBuf,
    },
    Launch {
        name: String,
    },
    /// Set (or clear, when omitted) the base game packed.pak.
    SetPak {
        path: Option<PathBuf>,
    },
    InstallSteamcmd,
    /// Show current settings, optionally changing download limits.
    Settings {
        #[arg(long)]
        max_concurrent_downloads: Option<usize>,
        #[arg(long)]
        max_download_retries: Option<u32>,
    },
}

pub fn run() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stardeck_lib=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Could not start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(execute(cli)) {
        error!("{}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> LauncherResult<()> {
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let mut state = AppState::new(data_dir)?;

    match cli.command {
        Command::List => print_json(&commands::list_instances(&state).await?),
        Command::Versions => print_json(&commands::list_versions(&state).await?),
        Command::Create {
            name,
            version,
            description,
            icon,
        } => {
            let payload = CreateInstancePayload {
                name,
                version,
                description,
                icon,
            };
            print_json(&commands::create_instance(&state, payload).await?)
        }
        Command::Delete { name } => commands::delete_instance(&state, &name).await,
        Command::Rename {
            old_name,
            new_name,
            description,
            icon,
        } => {
            let payload = RenameInstancePayload {
                old_name,
                new_name,
                description,
                icon,
            };
            print_json(&commands::rename_instance(&state, payload).await?)
        }
        Command::Download { instance, mods } => download(&state, &instance, &mods).await,
        Command::Enable { instance, mod_id } => {
            commands::set_mod_enabled(&state, &instance, &mod_id, true).await
        }
        Command::Disable { instance, mod_id } => {
            commands::set_mod_enabled(&state, &instance, &mod_id, false).await
        }
        Command::DeleteMod { instance, mod_id } => {
            commands::delete_mod(&state, &instance, &mod_id).await
        }
        Command::Import { instance, file } => {
            print_json(&commands::import_mod(&state, &instance, &file).await?)
        }
        Command::Launch { name } => {
            let pid = commands::launch_instance(&state, &name).await?;
            println!("started '{name}' (pid {pid})");
            Ok(())
        }
        Command::SetPak { path } => commands::set_packed_pak(&mut state, path),
        Command::InstallSteamcmd => {
            let root = commands::install_steamcmd(&state).await?;
            println!("steamcmd ready in {}", root.display());
            Ok(())
        }
        Command::Settings {
            max_concurrent_downloads,
            max_download_retries,
        } => {
            let mut settings = commands::get_launcher_settings(&state);
            if max_concurrent_downloads.is_some() || max_download_retries.is_some() {
                if let Some(value) = max_concurrent_downloads {
                    settings.max_concurrent_downloads = value;
                }
                if let Some(value) = max_download_retries {
                    settings.max_download_retries = value;
                }
                commands::update_launcher_settings(&mut state, settings.clone())?;
            }
            print_json(&settings)
        }
    }
}

/// Submits the downloads and streams scheduler events until the queue drains.
async fn download(state: &AppState, instance: &str, mods: &[String]) -> LauncherResult<()> {
    let requests = mods.iter().map(|raw| parse_mod_request(raw)).collect();

    let mut events = state.bus.subscribe();
    for response in commands::enqueue_mod_downloads(state, instance, requests).await? {
        println!("{}: {:?}", response.mod_id, response.submission);
    }

    let idle = state.scheduler.wait_idle();
    tokio::pin!(idle);
    let mut failed = false;
    loop {
        tokio::select! {
            _ = &mut idle => break,
            event = events.recv() => match event {
                Ok(event) => failed |= print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} scheduler events", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }
    while let Ok(event) = events.try_recv() {
        failed |= print_event(&event);
    }

    if failed {
        return Err(LauncherError::Other("some downloads failed".into()));
    }
    Ok(())
}

fn parse_mod_request(raw: &str) -> ModRequest {
    match raw.split_once('=') {
        Some((id, name)) => ModRequest {
            id: id.trim().to_string(),
            name: name.trim().to_string(),
        },
        None => ModRequest {
            id: raw.trim().to_string(),
            name: String::new(),
        },
    }
}

/// Prints one event; returns whether it reported failures.
fn print_event(event: &SchedulerEvent) -> bool {
    match event {
        SchedulerEvent::Progress { active, total } => {
            println!("[{active} active / {total} queued this cycle]");
        }
        SchedulerEvent::JobStarted {
            mod_id,
            mod_name,
            attempt,
            ..
        } => println!("downloading {mod_id} {mod_name} (attempt {attempt})"),
        SchedulerEvent::ModInstalled {
            instance_name,
            mod_id,
            mod_name,
        } => println!("installed {mod_id} {mod_name} into '{instance_name}'"),
        SchedulerEvent::DownloadsFailed { failures } => {
            for failure in failures {
                eprintln!("failed: {}: {}", failure.mod_name, failure.error);
            }
            return true;
        }
    }
    false
}

fn print_json<T: Serialize>(value: &T) -> LauncherResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
