//! Per-step record of mounts this process started, and their teardown.

use crate::exec::MountBackend;
use crate::safety::process::{reap_or_kill, terminate_and_reap, KillReport};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_GRACE: Duration = Duration::from_millis(200);

/// One mount started during step setup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountRecord {
    pub mount_path: PathBuf,
    pub helper: Pid,
    pub relay: Option<Pid>,
}

impl MountRecord {
    pub fn new(mount_path: impl Into<PathBuf>, helper: Pid, relay: Option<Pid>) -> Self {
        Self {
            mount_path: mount_path.into(),
            helper,
            relay,
        }
    }
}

/// Teardown result for a single record.
#[derive(Debug)]
pub struct RecordTeardown {
    pub mount_path: PathBuf,
    pub unmount_error: Option<String>,
    pub helper: KillReport,
    pub relay: Option<KillReport>,
}

/// Everything `drain_and_teardown` did.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub records: Vec<RecordTeardown>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.records
            .iter()
            .all(|r| r.unmount_error.is_none() && r.helper.gone)
    }

    pub fn failures(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.unmount_error.is_some() || !r.helper.gone)
            .count()
    }
}

/// Owned collection of `MountRecord`s for one job step.
#[derive(Debug)]
pub struct LifecycleTracker {
    records: Vec<MountRecord>,
    grace: Duration,
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::with_grace(DEFAULT_GRACE)
    }

    /// `grace` is how long a helper gets between SIGTERM and SIGKILL.
    pub fn with_grace(grace: Duration) -> Self {
        Self {
            records: Vec::new(),
            grace,
        }
    }

    /// Must be called right after the mount came up.
    pub fn register(&mut self, record: MountRecord) {
        log::debug!(
            "Tracking {} (helper {}, relay {:?})",
            record.mount_path.display(),
            record.helper,
            record.relay
        );
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.iter().any(|r| r.mount_path == path)
    }

    /// Unmount every record in reverse creation order, stop its helper and
    /// relay, and empty the tracker. Safe to call again; a second call has
    /// nothing to do.
    pub fn drain_and_teardown(&mut self, backend: &dyn MountBackend) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.records.is_empty() {
            return report;
        }

        log::info!("Tearing down {} step mount(s)", self.records.len());
        for record in self.records.drain(..).rev() {
            let unmount_error = backend.unmount(&record.mount_path).err().map(|e| {
                log::warn!("{}", e);
                e.to_string()
            });

            let helper = terminate_and_reap(record.helper, self.grace);
            let relay = record.relay.map(|pid| reap_or_kill(pid, self.grace));

            report.records.push(RecordTeardown {
                mount_path: record.mount_path,
                unmount_error,
                helper,
                relay,
            });
        }
        report
    }
}
