//! Browser process discovery, used by startup (rendezvous pid) and the
//! force-close recovery path.

use std::path::Path;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{info, warn};
use warden_cdp::binary::family_matches;

fn refreshed_system() -> System {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
    );
    system
}

fn uses_user_data_dir(cmd_args: &[std::ffi::OsString], user_data_dir: &Path) -> bool {
    let wanted = user_data_dir.to_string_lossy().replace('\\', "/").to_lowercase();
    cmd_args.iter().any(|arg| {
        let arg = arg.to_string_lossy().replace('\\', "/").to_lowercase();
        arg.starts_with("--user-data-dir") && arg.contains(&wanted)
    })
}

/// Pid of the browser process launched with `--remote-debugging-port=<port>`.
pub fn find_browser_by_port(port: u16) -> Option<u32> {
    let needle = format!("--remote-debugging-port={port}");
    let system = refreshed_system();
    for (pid, process) in system.processes() {
        if !family_matches(&process.name().to_string_lossy()) {
            continue;
        }
        if process
            .cmd()
            .iter()
            .any(|arg| arg.to_string_lossy().contains(&needle))
        {
            return Some(pid.as_u32());
        }
    }
    None
}

/// Terminate every browser-family process bound to `user_data_dir`.
/// Returns the killed pids and the failures encountered along the way.
pub fn kill_browser_family(user_data_dir: &Path) -> (Vec<u32>, Vec<String>) {
    let mut killed = Vec::new();
    let mut errors = Vec::new();
    let system = refreshed_system();

    for (pid, process) in system.processes() {
        if !family_matches(&process.name().to_string_lossy()) {
            continue;
        }
        if !uses_user_data_dir(process.cmd(), user_data_dir) {
            continue;
        }
        if process.kill() {
            info!(target: "warden", pid = pid.as_u32(), "killed browser process");
            killed.push(pid.as_u32());
        } else {
            warn!(target: "warden", pid = pid.as_u32(), "failed to kill browser process");
            errors.push(format!("could not kill pid {}", pid.as_u32()));
        }
    }

    (killed, errors)
}
