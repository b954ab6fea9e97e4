// ─── Launch ───
// Spawns the client of an instance with its assets and enabled mods.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::Instance;
use crate::core::tool::ensure_executable;

/// Environment variable the client reads its base asset folder from.
pub const ASSET_SOURCE_ENV: &str = "STARBOUND_ASSET_SOURCE";

/// Builds the launch command for an instance without spawning it.
pub fn build_command(instance: &Instance) -> LauncherResult<std::process::Command> {
    if !instance.client_path.is_file() {
        return Err(LauncherError::ToolNotAvailable(instance.client_path.clone()));
    }

    let mut cmd = std::process::Command::new(&instance.client_path);
    cmd.env(ASSET_SOURCE_ENV, instance.assets_dir());
    if let Some(arg) = mods_argument(instance) {
        cmd.arg(arg);
    }
    if let Some(client_dir) = instance.client_path.parent() {
        cmd.current_dir(client_dir);
    }
    Ok(cmd)
}

/// `--mods=<a.pak>,<b.pak>` for the enabled mods, if any.
pub fn mods_argument(instance: &Instance) -> Option<OsString> {
    let paths = instance.enabled_mod_paths();
    if paths.is_empty() {
        return None;
    }
    let mut arg = OsString::from("--mods=");
    for (i, path) in paths.iter().enumerate() {
        if i > 0 {
            arg.push(",");
        }
        arg.push(path.as_os_str());
    }
    Some(arg)
}

/// Starts the client detached from the launcher. Returns the child pid.
pub fn launch(instance: &Instance) -> LauncherResult<u32> {
    let mut cmd = build_command(instance)?;
    ensure_executable(&instance.client_path)?;
    configure_platform_spawn(&mut cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    info!("Launching '{}' from {:?}", instance.name, instance.client_path);
    debug!("Command: {:?}", cmd);

    let child = cmd.spawn().map_err(|e| LauncherError::ToolExecutionFailed {
        tool: display_name(&instance.client_path),
        code: None,
        detail: e.to_string(),
    })?;
    Ok(child.id())
}

fn configure_platform_spawn(cmd: &mut std::process::Command) {
    #[cfg(target_os = "windows")]
    {
        const DETACHED_PROCESS: u32 = 0x00000008;
        cmd.creation_flags(DETACHED_PROCESS);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group so the game outlives a Ctrl-C in the launcher.
        cmd.process_group(0);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
