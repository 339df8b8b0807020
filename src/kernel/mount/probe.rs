//! Mountpoint detection by device/inode comparison with the parent directory.

use crate::exec::worker::spawn_as_user;
use crate::kernel::credentials::Identity;
use nix::errno::Errno;
use nix::sys::stat::stat;
use nix::sys::wait::WaitStatus;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Worker exit code meaning "mounted".
const EXIT_MOUNTED: i32 = 0;
/// Worker exit code meaning "not mounted".
const EXIT_NOT_MOUNTED: i32 = 1;

/// Device and inode of one stat result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatIds {
    pub dev: u64,
    pub ino: u64,
}

impl From<&libc::stat> for StatIds {
    fn from(st: &libc::stat) -> Self {
        Self {
            dev: st.st_dev as u64,
            ino: st.st_ino as u64,
        }
    }
}

/// Decide from the two stat results whether `path` is a mountpoint.
///
/// ENOTCONN on the path itself is a FUSE mount whose daemon is gone; it still
/// counts so teardown can detach it.
pub fn classify(path: nix::Result<StatIds>, parent: nix::Result<StatIds>) -> bool {
    let current = match path {
        Ok(ids) => ids,
        Err(Errno::ENOTCONN) => return true,
        Err(_) => return false,
    };
    let Ok(parent) = parent else {
        return false;
    };

    // Same inode as `..` only happens at a filesystem root.
    current.dev != parent.dev || current.ino == parent.ino
}

fn parent_of(path: &Path) -> std::path::PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push("/..");
    raw.into()
}

/// Whether `path` is backed by its own (possibly hung) mount.
///
/// Runs inside forked workers, so it must not log.
pub fn is_mounted(path: &Path) -> bool {
    let current = stat(path).map(|st| StatIds::from(&st));
    if matches!(current, Err(Errno::ENOTCONN)) {
        return true;
    }
    let parent = stat(&parent_of(path)).map(|st| StatIds::from(&st));
    classify(current, parent)
}

/// `is_mounted` evaluated by a worker running as `identity`, so the answer
/// matches what the job itself would see.
pub fn is_mounted_as_user(path: &Path, identity: &Identity) -> bool {
    let Ok(path_c) = CString::new(path.as_os_str().as_bytes()) else {
        log::warn!("Mount path {} contains a NUL byte", path.display());
        return false;
    };

    let worker = spawn_as_user(identity, move |_report| {
        let path = Path::new(std::ffi::OsStr::from_bytes(path_c.as_bytes()));
        if is_mounted(path) {
            EXIT_MOUNTED
        } else {
            EXIT_NOT_MOUNTED
        }
    });

    let worker = match worker {
        Ok(worker) => worker,
        Err(e) => {
            log::warn!("Failed to spawn probe worker for {}: {}", path.display(), e);
            return false;
        }
    };

    let mounted = match worker.wait() {
        Ok(WaitStatus::Exited(_, EXIT_MOUNTED)) => true,
        Ok(WaitStatus::Exited(_, EXIT_NOT_MOUNTED)) => false,
        Ok(status) => {
            log::warn!(
                "Probe worker for {} ended unexpectedly: {:?}",
                path.display(),
                status
            );
            false
        }
        Err(e) => {
            log::warn!("Failed to wait for probe worker of {}: {}", path.display(), e);
            false
        }
    };
    log::debug!(
        "{} is {}mounted as uid {}",
        path.display(),
        if mounted { "" } else { "not " },
        identity.uid()
    );
    mounted
}
