//! Bounded wait for a mount helper to bring its mountpoint up.

use crate::config::types::{MountError, Result};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::time::{Duration, Instant};

/// How long to wait and how often to look.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl ReadinessPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Outcome of `wait_for_readiness`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// The process ended first; it has been reaped.
    ExitedEarly(WaitStatus),
    /// The deadline passed with the process still running.
    TimedOut,
}

/// Poll `probe` until it reports ready, `pid` exits, or the timeout expires.
///
/// The probe is consulted before the exit check on every round, so a helper
/// that mounts and then exits still counts as ready.
pub fn wait_for_readiness<P>(pid: Pid, policy: &ReadinessPolicy, mut probe: P) -> Result<Readiness>
where
    P: FnMut() -> bool,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;

    loop {
        if probe() {
            log::debug!(
                "Process {} ready after {}ms",
                pid,
                started.elapsed().as_millis()
            );
            return Ok(Readiness::Ready);
        }

        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => {}
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                return Ok(Readiness::ExitedEarly(status));
            }
            Ok(_) => {}
            Err(Errno::EINTR) => {}
            Err(e) => {
                return Err(MountError::Spawn(format!("waitpid({}): {}", pid, e)));
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(Readiness::TimedOut);
        }
        std::thread::sleep(policy.interval.min(deadline - now));
    }
}
