//! systemd integration for running the daemon as `neewerd.service`.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::error::{NeewerError, Result};

/// systemd unit name.
pub const SERVICE_NAME: &str = "neewerd.service";

/// Where the unit file is installed.
pub const UNIT_PATH: &str = "/etc/systemd/system/neewerd.service";

const UNIT_MODE: u32 = 0o644;

/// Render the unit file for a daemon binary.
pub fn unit_file(exe: &Path, port: &str, socket: &Path) -> String {
    format!(
        "[Unit]\n\
         Description=Neewer light daemon\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart={} daemon run --port {} --socket {}\n\
         Restart=on-failure\n\
         RestartSec=2\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        exe.display(),
        port,
        socket.display()
    )
}

/// Write the unit file and reload systemd.
///
/// The unit runs the current executable.
///
/// # Errors
/// Returns `InvalidInput` if the unit cannot be written (usually missing root
/// privileges) or `systemctl daemon-reload` fails.
pub fn install_service(unit_path: &Path, port: &str, socket: &Path) -> Result<()> {
    let exe = std::env::current_exe()?;
    write_unit(unit_path, &unit_file(&exe, port, socket))?;
    systemctl(&["daemon-reload"])?;
    info!(path = %unit_path.display(), "Service installed");
    Ok(())
}

pub fn start_service() -> Result<()> {
    systemctl(&["start", SERVICE_NAME])
}

pub fn stop_service() -> Result<()> {
    systemctl(&["stop", SERVICE_NAME])
}

fn write_unit(path: &Path, contents: &str) -> Result<()> {
    let fail = |e: std::io::Error| {
        NeewerError::InvalidInput(format!("Failed to write {}: {}", path.display(), e))
    };
    fs::write(path, contents).map_err(fail)?;
    fs::set_permissions(path, fs::Permissions::from_mode(UNIT_MODE)).map_err(fail)?;
    Ok(())
}

fn systemctl(args: &[&str]) -> Result<()> {
    debug!(?args, "Running systemctl");
    let output = Command::new("systemctl")
        .args(args)
        .output()
        .map_err(|e| NeewerError::InvalidInput(format!("Failed to run systemctl: {}", e)))?;

    if output.status.success() {
        return Ok(());
    }

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Err(NeewerError::InvalidInput(format!(
        "systemctl {} failed ({}): {}",
        args.join(" "),
        output.status,
        combined.trim()
    )))
}
