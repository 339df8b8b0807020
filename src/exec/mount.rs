//! Mount executor: validate the mountpoint as the job user, start the helper,
//! and wait for the mount to appear.

use crate::config::settings::MountConfig;
use crate::config::types::{MountError, PathViolation, Result};
use crate::directive::Directive;
use crate::exec::readiness::{wait_for_readiness, Readiness, ReadinessPolicy};
use crate::exec::relay::{redirect_output, LogRelay};
use crate::exec::worker::{spawn_as_user, FailureStage, WorkerReport, EXIT_WORKER_FAILURE};
use crate::kernel::credentials::Identity;
use crate::kernel::mount::probe::is_mounted_as_user;
use crate::safety::process::{reap_or_kill, terminate_and_reap};
use nix::errno::Errno;
use nix::sys::stat::{stat, Mode, SFlag};
use nix::unistd::{access, execvpe, mkdir, AccessFlags, Pid, Uid};
use std::ffi::CString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;

/// Result of a successful `mount` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MountOutcome {
    /// The path was already a mountpoint; nothing was started.
    AlreadyMounted,
    /// A helper now serves the mount and keeps running after this call.
    Mounted { helper: Pid, relay: Option<Pid> },
}

/// Check an existing mount directory or create a missing one.
///
/// Called inside the worker after the identity drop, so permission checks
/// reflect the job user.
pub fn prepare_mount_point(
    path: &Path,
    uid: Uid,
    mode: u32,
) -> std::result::Result<(), WorkerReport> {
    let st = match stat(path) {
        Ok(st) => st,
        Err(Errno::ENOENT) => {
            return mkdir(path, Mode::from_bits_truncate(mode as libc::mode_t))
                .map_err(|errno| WorkerReport::new(FailureStage::CreateDir, errno));
        }
        Err(errno) => return Err(WorkerReport::new(FailureStage::InspectPath, errno)),
    };

    let violation = |v| WorkerReport::new(FailureStage::Violation(v), Errno::UnknownErrno);

    if SFlag::from_bits_truncate(st.st_mode) & SFlag::S_IFMT != SFlag::S_IFDIR {
        return Err(violation(PathViolation::NotDirectory));
    }
    if st.st_uid != uid.as_raw() {
        return Err(violation(PathViolation::WrongOwner));
    }
    let mut entries = std::fs::read_dir(path).map_err(|e| {
        WorkerReport::new(
            FailureStage::InspectPath,
            Errno::from_i32(e.raw_os_error().unwrap_or(libc::EIO)),
        )
    })?;
    if entries.next().is_some() {
        return Err(violation(PathViolation::NotEmpty));
    }
    if access(path, AccessFlags::W_OK).is_err() {
        return Err(violation(PathViolation::NotWritable));
    }
    Ok(())
}

fn report_to_error(report: WorkerReport, directive: &Directive, helper: &str, identity: &Identity) -> MountError {
    let path = directive.mount_path().to_string();
    match report.stage {
        FailureStage::PrivilegeDrop => MountError::Privilege(format!(
            "failed to switch to uid={} gid={}: {}",
            identity.uid(),
            identity.gid(),
            report.errno
        )),
        FailureStage::InspectPath => MountError::Io(std::io::Error::new(
            std::io::Error::from(report.errno).kind(),
            format!("failed to inspect {}: {}", path, report.errno),
        )),
        FailureStage::CreateDir => MountError::Io(std::io::Error::new(
            std::io::Error::from(report.errno).kind(),
            format!("failed to create {}: {}", path, report.errno),
        )),
        FailureStage::Violation(violation) => MountError::Validation { path, violation },
        FailureStage::Redirect => {
            MountError::Spawn(format!("failed to redirect helper output: {}", report.errno))
        }
        FailureStage::Exec => MountError::Exec(format!("execvp failed for {}: {}", helper, report.errno)),
    }
}

fn to_cstring(value: impl Into<Vec<u8>>) -> Result<CString> {
    CString::new(value).map_err(|e| MountError::Config(format!("argument contains NUL byte: {}", e)))
}

/// Starts mount helpers.
#[derive(Clone, Debug)]
pub struct MountExecutor {
    config: MountConfig,
}

impl MountExecutor {
    pub fn new(config: MountConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// Helper argument vector, argv[0] included.
    pub fn helper_argv(&self, directive: &Directive, identity: &Identity) -> Vec<String> {
        let config = &self.config;
        let mut argv = vec![
            config.helper_binary.clone(),
            "--foreground".to_string(),
            "--uid".to_string(),
            identity.uid().to_string(),
            "--gid".to_string(),
            identity.gid().to_string(),
            format!("--file-mode={:o}", config.file_mode),
            format!("--dir-mode={:o}", config.dir_mode),
            format!("--log-format={}", config.log_format),
        ];
        argv.extend(config.helper_options.iter().cloned());
        argv.extend(directive.flag_args().map(str::to_string));
        if let Some(bucket) = directive.bucket().helper_arg() {
            argv.push(bucket.to_string());
        }
        argv.push(directive.mount_path().to_string());
        argv
    }

    /// Helper environment: ours, with HOME pointing at the job user's home.
    fn helper_env(&self, identity: &Identity) -> Result<Vec<CString>> {
        let mut env = Vec::new();
        for (key, value) in std::env::vars_os() {
            if key == "HOME" && identity.home().is_some() {
                continue;
            }
            let mut entry = key.into_vec();
            entry.push(b'=');
            entry.extend(value.into_vec());
            env.push(to_cstring(entry)?);
        }
        if let Some(home) = identity.home() {
            let mut entry = b"HOME=".to_vec();
            entry.extend_from_slice(home.as_os_str().as_bytes());
            env.push(to_cstring(entry)?);
        }
        Ok(env)
    }

    fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy::new(self.config.readiness_timeout(), self.config.poll_interval())
    }

    /// Mount one directive as `identity`. A path that is already a
    /// mountpoint is left alone.
    pub fn mount(&self, directive: &Directive, identity: &Identity) -> Result<MountOutcome> {
        let path = directive.path();
        if is_mounted_as_user(path, identity) {
            log::info!("{} is already a mountpoint, skipping", path.display());
            return Ok(MountOutcome::AlreadyMounted);
        }

        let argv = self.helper_argv(directive, identity);
        let argv_c = argv
            .iter()
            .map(|arg| to_cstring(arg.as_bytes()))
            .collect::<Result<Vec<_>>>()?;
        let env_c = self.helper_env(identity)?;
        let mode = self.config.mount_dir_mode;
        let uid = identity.uid();

        let relay = match LogRelay::spawn(&self.config.log_relay_command) {
            Ok(relay) => relay,
            Err(e) => {
                log::warn!("{} (helper output for {} is not captured)", e, path.display());
                None
            }
        };
        let relay_fd = relay.as_ref().map(LogRelay::writer_fd);

        log::info!("Mounting {} as uid={}: {:?}", directive, uid, argv);
        let spawned = spawn_as_user(identity, |report| {
            if let Err(failure) = prepare_mount_point(path, uid, mode) {
                report.send(failure);
                return EXIT_WORKER_FAILURE;
            }
            if let Some(fd) = relay_fd {
                if let Err(errno) = redirect_output(fd) {
                    report.send(WorkerReport::new(FailureStage::Redirect, errno));
                    return EXIT_WORKER_FAILURE;
                }
            }
            let errno = match execvpe(&argv_c[0], &argv_c, &env_c) {
                Ok(never) => match never {},
                Err(errno) => errno,
            };
            report.send(WorkerReport::new(FailureStage::Exec, errno));
            EXIT_WORKER_FAILURE
        });

        let relay_pid = relay.map(LogRelay::detach);
        let grace = self.config.helper_grace();
        let release_relay = || {
            if let Some(pid) = relay_pid {
                reap_or_kill(pid, grace);
            }
        };

        let mut worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                release_relay();
                return Err(e);
            }
        };

        if let Some(report) = worker.read_report()? {
            let error = report_to_error(report, directive, &self.config.helper_binary, identity);
            if let Err(e) = worker.wait() {
                log::warn!("{}", e);
            }
            release_relay();
            return Err(error);
        }

        let helper = worker.pid();
        let policy = self.readiness_policy();
        match wait_for_readiness(helper, &policy, || is_mounted_as_user(path, identity))? {
            Readiness::Ready => {
                log::info!("Mounted {} (helper pid {})", path.display(), helper);
                Ok(MountOutcome::Mounted {
                    helper,
                    relay: relay_pid,
                })
            }
            Readiness::ExitedEarly(status) => {
                release_relay();
                Err(MountError::HelperExited {
                    path: directive.mount_path().to_string(),
                    status: format!("{:?}", status),
                })
            }
            Readiness::TimedOut => {
                let report = terminate_and_reap(helper, grace);
                log::debug!("Killed helper {} after timeout: {:?}", helper, report);
                release_relay();
                Err(MountError::Timeout {
                    path: directive.mount_path().to_string(),
                    waited_ms: policy.timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl From<&MountConfig> for MountExecutor {
    fn from(config: &MountConfig) -> Self {
        Self::new(config.clone())
    }
}
