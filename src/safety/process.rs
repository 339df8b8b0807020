//! Termination of helper and relay processes.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::time::{Duration, Instant};

const POLL_STEP: Duration = Duration::from_millis(10);

/// What happened while stopping one process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KillReport {
    pub term_sent: bool,
    pub kill_sent: bool,
    /// The process is confirmed gone (reaped, or no longer exists).
    pub gone: bool,
    pub waited_ms: u64,
    pub notes: Vec<String>,
}

enum Liveness {
    Alive,
    Gone,
}

/// Reap `pid` if it is our child and has exited. Processes we did not fork
/// are checked with signal 0 instead.
fn check(pid: Pid, notes: &mut Vec<String>) -> Liveness {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) => Liveness::Alive,
        Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) => Liveness::Gone,
        Ok(_) => Liveness::Alive,
        Err(Errno::EINTR) => Liveness::Alive,
        Err(Errno::ECHILD) => match kill(pid, None) {
            Err(Errno::ESRCH) => Liveness::Gone,
            _ => Liveness::Alive,
        },
        Err(e) => {
            notes.push(format!("waitpid({}) failed: {}", pid, e));
            Liveness::Gone
        }
    }
}

fn wait_until_gone(pid: Pid, budget: Duration, notes: &mut Vec<String>) -> bool {
    let deadline = Instant::now() + budget;
    loop {
        if let Liveness::Gone = check(pid, notes) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep(POLL_STEP.min(deadline - now));
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL and reap.
pub fn terminate_and_reap(pid: Pid, grace: Duration) -> KillReport {
    let mut report = KillReport::default();
    let start = Instant::now();

    match kill(pid, Signal::SIGTERM) {
        Ok(()) => report.term_sent = true,
        Err(Errno::ESRCH) => {
            // Already exited; a zombie still answers kill, so this means
            // someone else reaped it.
            report.gone = true;
        }
        Err(e) => report.notes.push(format!("SIGTERM to {} failed: {}", pid, e)),
    }

    if !report.gone {
        report.gone = wait_until_gone(pid, grace, &mut report.notes);
    }

    if !report.gone {
        match kill(pid, Signal::SIGKILL) {
            Ok(()) => report.kill_sent = true,
            Err(Errno::ESRCH) => {}
            Err(e) => report.notes.push(format!("SIGKILL to {} failed: {}", pid, e)),
        }
        report.gone = wait_until_gone(pid, grace.max(Duration::from_millis(500)), &mut report.notes);
        if !report.gone {
            log::warn!("Process {} survived SIGKILL within the wait budget", pid);
        }
    }

    report.waited_ms = start.elapsed().as_millis() as u64;
    log::debug!("Stopped process {}: {:?}", pid, report);
    report
}

/// Give a process `grace` to exit on its own before terminating it.
///
/// Used for log relays, which exit once every writer of their pipe closes.
pub fn reap_or_kill(pid: Pid, grace: Duration) -> KillReport {
    let mut notes = Vec::new();
    let start = Instant::now();
    if wait_until_gone(pid, grace, &mut notes) {
        return KillReport {
            gone: true,
            waited_ms: start.elapsed().as_millis() as u64,
            notes,
            ..KillReport::default()
        };
    }
    let mut report = terminate_and_reap(pid, grace);
    report.notes.splice(0..0, notes);
    report
}
