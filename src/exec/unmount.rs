//! Best-effort detach of a mountpoint: graceful first, lazy as fallback.

use crate::config::settings::MountConfig;
use crate::config::types::{MountError, Result};
use crate::kernel::mount::probe::is_mounted;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

/// Runs the configured unmount commands.
#[derive(Clone, Debug)]
pub struct UnmountExecutor {
    graceful: Vec<String>,
    lazy: Vec<String>,
}

fn run(command: &[String], path: &Path) -> std::io::Result<ExitStatus> {
    let Some((program, args)) = command.split_first() else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty unmount command",
        ));
    };
    Command::new(program)
        .args(args)
        .arg(path)
        .stdin(Stdio::null())
        .status()
}

impl UnmountExecutor {
    pub fn new(config: &MountConfig) -> Self {
        Self {
            graceful: config.unmount_command.clone(),
            lazy: config.lazy_unmount_command.clone(),
        }
    }

    /// Detach `path`. Unmounting something that is not mounted succeeds.
    pub fn unmount(&self, path: &Path) -> Result<()> {
        if !is_mounted(path) {
            log::debug!("{} is not mounted, nothing to unmount", path.display());
            return Ok(());
        }

        log::info!("Unmounting {}", path.display());
        match run(&self.graceful, path) {
            Ok(status) if status.success() => {}
            Ok(status) => log::warn!(
                "{:?} exited with {} for {}",
                self.graceful,
                status,
                path.display()
            ),
            Err(e) => log::warn!("Failed to run {:?}: {}", self.graceful, e),
        }

        if !is_mounted(path) {
            return Ok(());
        }

        log::warn!("{} still mounted, trying lazy unmount", path.display());
        match run(&self.lazy, path) {
            Ok(status) => log::info!("Lazy unmount of {} finished with {}", path.display(), status),
            Err(e) => log::warn!("Failed to run {:?}: {}", self.lazy, e),
        }

        if is_mounted(path) {
            return Err(MountError::Teardown {
                path: path.display().to_string(),
                reason: "still mounted after graceful and lazy unmount".to_string(),
            });
        }
        Ok(())
    }
}
