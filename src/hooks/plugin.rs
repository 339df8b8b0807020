//! The five hook entry points: capture on the submit side, node setup and
//! teardown once per job, step setup and teardown once per step.

use crate::config::types::{MountError, Result};
use crate::directive::{conflict, decode, decode_lenient, encode_bounded, resolver, Directive, DirectiveList};
use crate::exec::{MountBackend, MountOutcome};
use crate::hooks::transport::DirectiveTransport;
use crate::kernel::credentials::Identity;
use crate::safety::lifecycle::{LifecycleTracker, MountRecord, TeardownReport};
use std::path::Path;

/// Add the directives in `raw` to the transport.
///
/// Relative paths are resolved against `cwd`. Any malformed token, conflict or
/// overflow rejects the whole call and leaves the transport untouched.
pub fn capture(transport: &mut dyn DirectiveTransport, raw: &str, cwd: &Path) -> Result<DirectiveList> {
    let requested = decode(raw)?;
    if requested.is_empty() {
        return Err(MountError::parse(raw, "no mount directive given"));
    }
    let resolved = resolver::resolve_all(&requested, cwd)?;

    let existing = match transport.load()? {
        Some(current) => decode(&current)?,
        None => DirectiveList::new(),
    };
    let merged = conflict::merge(&existing, &resolved)?;
    let encoded = encode_bounded(&merged, transport.capacity())?;

    transport.store(&encoded)?;
    log::debug!("Captured {} directive(s): {}", merged.len(), encoded);
    Ok(merged)
}

/// Per-directive outcome of a setup hook.
#[derive(Debug, Default)]
pub struct SetupReport {
    pub mounted: Vec<String>,
    pub already_mounted: Vec<String>,
    pub failed: Vec<(String, MountError)>,
}

impl SetupReport {
    pub fn total(&self) -> usize {
        self.mounted.len() + self.already_mounted.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// `Setup` error when anything failed, after everything was attempted.
    pub fn into_result(self) -> Result<()> {
        if self.failed.is_empty() {
            Ok(())
        } else {
            Err(MountError::Setup {
                failed: self.failed.len(),
                total: self.total(),
            })
        }
    }

    fn fail(&mut self, what: String, error: MountError) {
        log::error!("{}", error);
        self.failed.push((what, error));
    }
}

/// Decode the transported list, keeping whatever parses.
fn load_for_setup(transport: &dyn DirectiveTransport, report: &mut SetupReport) -> Result<DirectiveList> {
    let Some(encoded) = transport.load()? else {
        return Ok(DirectiveList::new());
    };
    let (list, errors) = decode_lenient(&encoded);
    for error in errors {
        let token = match &error {
            MountError::Parse { token, .. } => token.clone(),
            other => other.to_string(),
        };
        report.fail(token, error);
    }
    Ok(list)
}

fn mount_all<F>(
    transport: &dyn DirectiveTransport,
    backend: &dyn MountBackend,
    identity: &Identity,
    mut on_mounted: F,
) -> Result<SetupReport>
where
    F: FnMut(&Directive, MountOutcome),
{
    let mut report = SetupReport::default();
    let list = load_for_setup(transport, &mut report)?;

    for directive in &list {
        let label = directive.to_string();
        if !directive.is_absolute() {
            report.fail(
                label,
                MountError::parse(&directive.to_string(), "mount path is not absolute"),
            );
            continue;
        }
        match backend.mount(directive, identity) {
            Ok(MountOutcome::AlreadyMounted) => report.already_mounted.push(label),
            Ok(outcome) => {
                on_mounted(directive, outcome);
                report.mounted.push(label);
            }
            Err(e) => report.fail(label, e),
        }
    }
    Ok(report)
}

/// Mount every transported directive for the job owner. Helpers started here
/// live until node teardown.
pub fn node_setup(
    transport: &dyn DirectiveTransport,
    backend: &dyn MountBackend,
    identity: &Identity,
) -> Result<SetupReport> {
    let report = mount_all(transport, backend, identity, |_, _| {})?;
    log::info!(
        "Node setup via {}: {} mounted, {} already mounted, {} failed",
        backend.backend_name(),
        report.mounted.len(),
        report.already_mounted.len(),
        report.failed.len()
    );
    Ok(report)
}

/// Unmount every directive of the job. Failures are logged and counted, never
/// escalated.
pub fn node_teardown(transport: &dyn DirectiveTransport, backend: &dyn MountBackend) -> Result<usize> {
    let Some(encoded) = transport.load()? else {
        return Ok(0);
    };
    let (list, errors) = decode_lenient(&encoded);
    for error in &errors {
        log::warn!("Skipping token during teardown: {}", error);
    }

    let mut failures = 0;
    for directive in &list {
        if let Err(e) = backend.unmount(directive.path()) {
            log::warn!("{}", e);
            failures += 1;
        }
    }
    Ok(failures)
}

/// Mount whatever node setup did not, and remember it in `tracker`.
pub fn step_setup(
    transport: &dyn DirectiveTransport,
    backend: &dyn MountBackend,
    identity: &Identity,
    tracker: &mut LifecycleTracker,
) -> Result<SetupReport> {
    let report = mount_all(transport, backend, identity, |directive, outcome| {
        if let MountOutcome::Mounted { helper, relay } = outcome {
            tracker.register(MountRecord::new(directive.path(), helper, relay));
        }
    })?;
    log::info!(
        "Step setup: {} mounted, {} already mounted, {} failed",
        report.mounted.len(),
        report.already_mounted.len(),
        report.failed.len()
    );
    Ok(report)
}

/// Undo exactly what `step_setup` mounted.
pub fn step_teardown(tracker: &mut LifecycleTracker, backend: &dyn MountBackend) -> TeardownReport {
    let report = tracker.drain_and_teardown(backend);
    if !report.is_clean() {
        log::warn!("Step teardown left {} mount(s) unclean", report.failures());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::encode;
    use crate::hooks::transport::{EnvTransport, MemoryTransport};
    use crate::safety::process::terminate_and_reap;
    use nix::unistd::Pid;
    use serial_test::serial;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::process::Command;
    use std::time::Duration;

    /// Backend that pretends: paths in `mounted` are mountpoints, `broken`
    /// paths fail, everything else mounts with a real `sleep` as helper.
    #[derive(Default)]
    struct FakeBackend {
        mounted: RefCell<HashSet<PathBuf>>,
        broken: HashSet<PathBuf>,
        unmount_calls: RefCell<Vec<PathBuf>>,
        helpers: RefCell<Vec<Pid>>,
    }

    impl FakeBackend {
        fn with_mounted(paths: &[&str]) -> Self {
            let backend = Self::default();
            backend
                .mounted
                .borrow_mut()
                .extend(paths.iter().map(PathBuf::from));
            backend
        }

        fn stop_helpers(&self) {
            for pid in self.helpers.borrow_mut().drain(..) {
                terminate_and_reap(pid, Duration::from_millis(50));
            }
        }
    }

    impl MountBackend for FakeBackend {
        fn backend_name(&self) -> &str {
            "fake"
        }

        fn mount(&self, directive: &Directive, _: &Identity) -> Result<MountOutcome> {
            let path = directive.path().to_path_buf();
            if self.broken.contains(&path) {
                return Err(MountError::Exec(format!("cannot mount {}", path.display())));
            }
            if !self.mounted.borrow_mut().insert(path) {
                return Ok(MountOutcome::AlreadyMounted);
            }
            let child = Command::new("sleep").arg("30").spawn().unwrap();
            let helper = Pid::from_raw(child.id() as i32);
            self.helpers.borrow_mut().push(helper);
            Ok(MountOutcome::Mounted {
                helper,
                relay: None,
            })
        }

        fn unmount(&self, path: &Path) -> Result<()> {
            self.unmount_calls.borrow_mut().push(path.to_path_buf());
            self.mounted.borrow_mut().remove(path);
            Ok(())
        }
    }

    fn transport(value: &str) -> MemoryTransport {
        MemoryTransport::with_value(value, 4096)
    }

    #[test]
    fn capture_resolves_and_stores() {
        let mut t = MemoryTransport::new(4096);
        let list = capture(&mut t, "b1:./p1;b2:/p2", Path::new("/home/user/project")).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(
            t.load().unwrap().as_deref(),
            Some("b1:/home/user/project/p1;b2:/p2")
        );
    }

    #[test]
    fn capture_appends_to_existing_list() {
        let mut t = transport("bucket1:/tmp/m1");
        capture(&mut t, "bucket2:/tmp/m2:--implicit-dirs", Path::new("/")).unwrap();
        assert_eq!(
            t.load().unwrap().as_deref(),
            Some("bucket1:/tmp/m1;bucket2:/tmp/m2:--implicit-dirs")
        );
    }

    #[test]
    fn capture_redeclaration_keeps_single_entry() {
        let mut t = transport("bucket1:/tmp/m1");
        capture(&mut t, "bucket1:/tmp/m1", Path::new("/")).unwrap();
        assert_eq!(t.load().unwrap().as_deref(), Some("bucket1:/tmp/m1"));
    }

    #[test]
    fn capture_conflict_leaves_transport_unchanged() {
        let mut t = transport("bucket1:/tmp/m1;bucket2:/tmp/m2");
        let err = capture(&mut t, "other:/tmp/m1", Path::new("/")).unwrap_err();
        assert!(matches!(err, MountError::Conflict { .. }));
        assert_eq!(
            t.load().unwrap().as_deref(),
            Some("bucket1:/tmp/m1;bucket2:/tmp/m2")
        );
    }

    #[test]
    fn capture_with_malformed_token_rejects_everything() {
        let mut t = transport("bucket1:/tmp/m1");
        let err = capture(&mut t, "good:/tmp/ok;bucket:", Path::new("/")).unwrap_err();
        assert!(matches!(err, MountError::Parse { .. }));
        assert_eq!(t.load().unwrap().as_deref(), Some("bucket1:/tmp/m1"));
    }

    #[test]
    fn capture_rejects_empty_option() {
        let mut t = MemoryTransport::new(4096);
        assert!(capture(&mut t, ";;", Path::new("/")).is_err());
        assert_eq!(t.load().unwrap(), None);
    }

    #[test]
    fn capture_overflow_is_rejected() {
        let mut t = MemoryTransport::new(16);
        let err = capture(&mut t, "bucket:/a/very/long/path", Path::new("/")).unwrap_err();
        assert!(matches!(err, MountError::Config(_)));
        assert_eq!(t.load().unwrap(), None);
    }

    #[test]
    #[serial]
    fn capture_into_environment() {
        const VAR: &str = "BUCKETMOUNT_CAPTURE_TEST";
        std::env::remove_var(VAR);
        let mut t = EnvTransport::new(VAR, 4096);
        capture(&mut t, "data:./in", Path::new("/scratch/")).unwrap();
        capture(&mut t, ":/mnt/all", Path::new("/scratch")).unwrap();
        assert_eq!(std::env::var(VAR).unwrap(), "data:/scratch/in;:/mnt/all");

        assert!(capture(&mut t, "/mnt/all:--x", Path::new("/")).is_ok());
        assert!(capture(&mut t, "named:/mnt/all", Path::new("/")).is_err());
        assert_eq!(
            std::env::var(VAR).unwrap(),
            "data:/scratch/in;:/mnt/all;/mnt/all:--x"
        );
        std::env::remove_var(VAR);
    }

    #[test]
    fn node_setup_without_transport_value_does_nothing() {
        let backend = FakeBackend::default();
        let report = node_setup(&MemoryTransport::new(4096), &backend, &Identity::current()).unwrap();
        assert_eq!(report.total(), 0);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn node_setup_attempts_every_directive() {
        let mut backend = FakeBackend::with_mounted(&["/mnt/b"]);
        backend.broken.insert(PathBuf::from("/mnt/c"));
        let t = transport("a:/mnt/a;b:/mnt/b;c:/mnt/c;bucket:;d:/mnt/d");

        let report = node_setup(&t, &backend, &Identity::current()).unwrap();

        assert_eq!(report.mounted, vec!["a:/mnt/a", "d:/mnt/d"]);
        assert_eq!(report.already_mounted, vec!["b:/mnt/b"]);
        assert_eq!(report.failed.len(), 2);
        assert!(matches!(
            report.into_result(),
            Err(MountError::Setup {
                failed: 2,
                total: 5
            })
        ));
        backend.stop_helpers();
    }

    #[test]
    fn step_setup_tracks_only_fresh_mounts() {
        let backend = FakeBackend::with_mounted(&["/mnt/prolog"]);
        let t = transport("p:/mnt/prolog;s:/mnt/step");
        let mut tracker = LifecycleTracker::with_grace(Duration::from_millis(100));

        let report = step_setup(&t, &backend, &Identity::current(), &mut tracker).unwrap();

        assert!(report.is_success());
        assert_eq!(tracker.len(), 1);
        assert!(tracker.contains(Path::new("/mnt/step")));
        assert!(!tracker.contains(Path::new("/mnt/prolog")));

        let teardown = step_teardown(&mut tracker, &backend);
        assert!(teardown.is_clean());
        assert_eq!(*backend.unmount_calls.borrow(), vec![PathBuf::from("/mnt/step")]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn node_teardown_unmounts_every_directive() {
        let backend = FakeBackend::with_mounted(&["/mnt/a", "/mnt/b"]);
        let t = transport("a:/mnt/a;broken:;/mnt/b:--flag");
        assert_eq!(node_teardown(&t, &backend).unwrap(), 0);
        assert_eq!(
            *backend.unmount_calls.borrow(),
            vec![PathBuf::from("/mnt/a"), PathBuf::from("/mnt/b")]
        );
    }

    #[test]
    fn relative_path_in_transport_is_not_mounted() {
        let backend = FakeBackend::default();
        let list = DirectiveList::from(vec![crate::directive::parse("b:rel").unwrap()]);
        let t = transport(&encode(&list));
        let report = node_setup(&t, &backend, &Identity::current()).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(backend.mounted.borrow().is_empty());
    }
}
