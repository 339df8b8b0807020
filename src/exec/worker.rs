//! Run-as-user worker processes.
//!
//! A worker is a forked child that drops to the job identity and then runs a
//! body: a probe that exits with its answer, or the mount path that ends in
//! exec. Failures before exec travel back over a close-on-exec status pipe,
//! so the parent sees EOF exactly when exec succeeded.

use crate::config::types::{MountError, PathViolation, Result};
use crate::kernel::credentials::{drop_to, Identity};
use crate::kernel::signal::SignalHandler;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::kill;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, pipe2, write, ForkResult, Pid};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// Exit code of a worker whose body failed before doing its job.
pub const EXIT_WORKER_FAILURE: i32 = 125;

const REPORT_LEN: usize = 8;

const FORWARD_POLL: Duration = Duration::from_millis(20);

/// Where inside the worker things went wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureStage {
    PrivilegeDrop,
    InspectPath,
    CreateDir,
    Violation(PathViolation),
    Redirect,
    Exec,
}

impl FailureStage {
    fn code(self) -> u32 {
        match self {
            Self::PrivilegeDrop => 1,
            Self::InspectPath => 2,
            Self::CreateDir => 3,
            Self::Violation(PathViolation::NotDirectory) => 4,
            Self::Violation(PathViolation::WrongOwner) => 5,
            Self::Violation(PathViolation::NotEmpty) => 6,
            Self::Violation(PathViolation::NotWritable) => 7,
            Self::Redirect => 8,
            Self::Exec => 9,
        }
    }

    fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::PrivilegeDrop,
            2 => Self::InspectPath,
            3 => Self::CreateDir,
            4 => Self::Violation(PathViolation::NotDirectory),
            5 => Self::Violation(PathViolation::WrongOwner),
            6 => Self::Violation(PathViolation::NotEmpty),
            7 => Self::Violation(PathViolation::NotWritable),
            8 => Self::Redirect,
            9 => Self::Exec,
            _ => return None,
        })
    }
}

/// Failure sent from a worker to its parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerReport {
    pub stage: FailureStage,
    pub errno: Errno,
}

impl WorkerReport {
    pub fn new(stage: FailureStage, errno: Errno) -> Self {
        Self { stage, errno }
    }

    fn encode(self) -> [u8; REPORT_LEN] {
        let mut buf = [0u8; REPORT_LEN];
        buf[..4].copy_from_slice(&self.stage.code().to_le_bytes());
        buf[4..].copy_from_slice(&(self.errno as i32).to_le_bytes());
        buf
    }

    fn decode(buf: [u8; REPORT_LEN]) -> Option<Self> {
        let code = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let errno = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Some(Self {
            stage: FailureStage::from_code(code)?,
            errno: Errno::from_i32(errno),
        })
    }
}

/// Child-side end of the status pipe.
pub struct ReportPipe {
    fd: RawFd,
}

impl ReportPipe {
    /// Best effort: a parent that went away has nobody to tell.
    pub fn send(&self, report: WorkerReport) {
        let buf = report.encode();
        let mut written = 0;
        while written < buf.len() {
            match write(self.fd, &buf[written..]) {
                Ok(0) => return,
                Ok(n) => written += n,
                Err(Errno::EINTR) => continue,
                Err(_) => return,
            }
        }
    }
}

/// Parent-side handle of a running worker.
#[derive(Debug)]
pub struct Worker {
    pid: Pid,
    report: File,
}

impl Worker {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Block until the worker execs (`None`) or reports a failure.
    pub fn read_report(&mut self) -> Result<Option<WorkerReport>> {
        let mut buf = [0u8; REPORT_LEN];
        let mut filled = 0;
        while filled < REPORT_LEN {
            match self.report.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(MountError::Io(e)),
            }
        }

        match filled {
            0 => Ok(None),
            REPORT_LEN => WorkerReport::decode(buf).map(Some).ok_or_else(|| {
                MountError::Spawn(format!("worker {} sent an unknown status", self.pid))
            }),
            _ => Err(MountError::Spawn(format!(
                "worker {} sent a truncated status ({} bytes)",
                self.pid, filled
            ))),
        }
    }

    /// Non-blocking exit check. `None` while the worker is still running.
    pub fn try_wait(&self) -> Result<Option<WaitStatus>> {
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => Ok(None),
            Ok(status) => Ok(Some(status)),
            Err(Errno::EINTR) => Ok(None),
            Err(e) => Err(MountError::Spawn(format!("waitpid({}): {}", self.pid, e))),
        }
    }

    /// Block until the worker exits and reap it.
    pub fn wait(self) -> Result<WaitStatus> {
        loop {
            match waitpid(self.pid, None) {
                Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                    return Ok(status)
                }
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    return Err(MountError::Spawn(format!("waitpid({}): {}", self.pid, e)))
                }
            }
        }
    }

    /// Wait for the worker while passing on any signal `signals` caught
    /// meanwhile, so the caller gets to clean up after it.
    pub fn wait_forwarding(self, signals: &SignalHandler) -> Result<WaitStatus> {
        loop {
            if let Some(signal) = signals.take_signal() {
                log::info!("Forwarding {} to worker {}", signal, self.pid);
                if let Err(e) = kill(self.pid, signal) {
                    log::warn!("Failed to forward {} to {}: {}", signal, self.pid, e);
                }
            }
            match self.try_wait()? {
                Some(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                    return Ok(status)
                }
                _ => std::thread::sleep(FORWARD_POLL),
            }
        }
    }
}

/// Pipe whose both ends are close-on-exec.
pub(crate) fn pipe_cloexec() -> Result<(OwnedFd, OwnedFd)> {
    let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| MountError::Spawn(format!("pipe2 failed: {}", e)))?;
    // SAFETY: pipe2 just returned both descriptors; nothing else owns them.
    Ok(unsafe { (OwnedFd::from_raw_fd(read_end), OwnedFd::from_raw_fd(write_end)) })
}

/// Fork a worker that becomes `identity` and then runs `body`.
///
/// `body` runs in the child and returns its exit code unless it execs. It
/// must only touch state prepared before the call.
pub fn spawn_as_user<F>(identity: &Identity, body: F) -> Result<Worker>
where
    F: FnOnce(&ReportPipe) -> i32,
{
    let (read_end, write_end) = pipe_cloexec()?;

    // SAFETY: the child only drops privileges, runs `body` on pre-built data
    // and leaves through _exit or exec.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            drop(read_end);
            let report = ReportPipe {
                fd: write_end.as_raw_fd(),
            };
            let code = match drop_to(identity) {
                Ok(()) => body(&report),
                Err(errno) => {
                    report.send(WorkerReport::new(FailureStage::PrivilegeDrop, errno));
                    EXIT_WORKER_FAILURE
                }
            };
            // SAFETY: _exit skips atexit handlers and stdio flushing that
            // belong to the parent.
            unsafe { libc::_exit(code) }
        }
        Ok(ForkResult::Parent { child }) => {
            drop(write_end);
            log::debug!(
                "Spawned worker {} as uid={} gid={}",
                child,
                identity.uid(),
                identity.gid()
            );
            Ok(Worker {
                pid: child,
                report: File::from(read_end),
            })
        }
        Err(e) => Err(MountError::Spawn(format!("fork failed: {}", e))),
    }
}
