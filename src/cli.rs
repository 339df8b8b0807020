use crate::config::settings::MountConfig;
use crate::config::types::MountError;
use crate::directive::decode;
use crate::exec::worker::{spawn_as_user, FailureStage, WorkerReport, EXIT_WORKER_FAILURE};
use crate::exec::{HelperBackend, MountBackend};
use crate::hooks::{self, DirectiveTransport, EnvTransport};
use crate::kernel::credentials::Identity;
use crate::kernel::mount::probe::{is_mounted, is_mounted_as_user};
use crate::kernel::signal::SignalHandler;
use crate::safety::LifecycleTracker;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nix::sys::wait::WaitStatus;
use nix::unistd::execvp;
use std::ffi::CString;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Mount object-storage buckets for batch jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone, Copy, Debug)]
struct JobUser {
    /// Job owner uid (defaults to the caller)
    #[arg(long)]
    uid: Option<u32>,
    /// Job owner gid (defaults to the caller)
    #[arg(long)]
    gid: Option<u32>,
}

impl JobUser {
    fn identity(self) -> Identity {
        let uid = self
            .uid
            .unwrap_or_else(|| nix::unistd::getuid().as_raw());
        let gid = self
            .gid
            .unwrap_or_else(|| nix::unistd::getgid().as_raw());
        Identity::resolve(uid, gid)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Add mount directives to the transport variable and print its new value
    Capture {
        /// Directive in the form [BUCKET:]PATH[:FLAGS]; may hold several, separated by ';'
        #[arg(long = "mount", value_name = "SPEC", required = true)]
        mounts: Vec<String>,
        /// Base for relative mount paths (defaults to the working directory)
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
    /// Print the captured directives as JSON
    Show,
    /// Mount every captured directive for the job (node setup)
    Prolog {
        #[command(flatten)]
        user: JobUser,
    },
    /// Unmount every captured directive (node teardown)
    Epilog,
    /// Mount what is missing, run a command, then undo those mounts
    Step {
        #[command(flatten)]
        user: JobUser,
        /// Command and arguments to run
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Report whether a path is a mountpoint
    Probe {
        path: PathBuf,
        #[command(flatten)]
        user: JobUser,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = MountConfig::from_env().context("failed to load configuration")?;
    let mut transport = EnvTransport::from_config(&config);

    match cli.command {
        Commands::Capture { mounts, cwd } => {
            let cwd = match cwd {
                Some(dir) => dir,
                None => std::env::current_dir().context("cannot determine working directory")?,
            };
            for spec in &mounts {
                hooks::capture(&mut transport, spec, &cwd)
                    .with_context(|| format!("rejected --mount {}", spec))?;
            }
            println!("{}", transport.load()?.unwrap_or_default());
        }
        Commands::Show => {
            let list = match transport.load()? {
                Some(encoded) => decode(&encoded)?,
                None => Default::default(),
            };
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        Commands::Prolog { user } => {
            let backend = HelperBackend::new(&config);
            let report = hooks::node_setup(&transport, &backend, &user.identity())?;
            for (what, error) in &report.failed {
                eprintln!("{}: {}", what, error);
            }
            report.into_result()?;
        }
        Commands::Epilog => {
            let backend = HelperBackend::new(&config);
            let failures = hooks::node_teardown(&transport, &backend)?;
            if failures > 0 {
                eprintln!("Warning: {} mount(s) could not be detached", failures);
            }
        }
        Commands::Step { user, command } => {
            let code = run_step(&config, &transport, user.identity(), &command)?;
            std::process::exit(code);
        }
        Commands::Probe { path, user } => {
            let mounted = if user.uid.is_some() || user.gid.is_some() {
                is_mounted_as_user(&path, &user.identity())
            } else {
                is_mounted(&path)
            };
            println!(
                "{} is {}",
                path.display(),
                if mounted { "mounted" } else { "not mounted" }
            );
            if !mounted {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Step setup, the command itself, step teardown. Returns the command's exit
/// code; teardown runs even when setup partly failed.
fn run_step(
    config: &MountConfig,
    transport: &dyn DirectiveTransport,
    identity: Identity,
    command: &[String],
) -> Result<i32> {
    let argv = command
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("command contains a NUL byte")?;
    if argv.is_empty() {
        anyhow::bail!("no command given");
    }

    let backend = HelperBackend::new(config);
    let mut tracker = LifecycleTracker::with_grace(config.helper_grace());
    step_with(transport, &backend, &identity, &mut tracker, &argv)
}

/// A SIGINT, SIGTERM or SIGHUP during the step is passed on to the command
/// and ends the step with 128 + signal, after teardown.
fn step_with(
    transport: &dyn DirectiveTransport,
    backend: &dyn MountBackend,
    identity: &Identity,
    tracker: &mut LifecycleTracker,
    argv: &[CString],
) -> Result<i32> {
    let signals = SignalHandler::init()?;

    let setup = hooks::step_setup(transport, backend, identity, tracker)?;
    for (what, error) in &setup.failed {
        eprintln!("{}: {}", what, error);
    }
    if !setup.is_success() {
        eprintln!(
            "Warning: {} of {} mounts failed via {}",
            setup.failed.len(),
            setup.total(),
            backend.backend_name()
        );
    }

    let outcome = match signals.take_signal() {
        Some(signal) => {
            log::info!("Received {} during setup, skipping command", signal);
            Ok(128 + signal as i32)
        }
        None => run_as(identity, argv, &signals),
    };

    hooks::step_teardown(tracker, backend);

    outcome.with_context(|| format!("failed to run {}", argv[0].to_string_lossy()))
}

/// Exec `argv` as `identity` in a worker and wait for it, forwarding caught
/// signals.
fn run_as(
    identity: &Identity,
    argv: &[CString],
    signals: &SignalHandler,
) -> crate::config::types::Result<i32> {
    let mut worker = spawn_as_user(identity, |report| {
        let errno = match execvp(&argv[0], argv) {
            Ok(never) => match never {},
            Err(errno) => errno,
        };
        report.send(WorkerReport::new(FailureStage::Exec, errno));
        EXIT_WORKER_FAILURE
    })?;

    let failure = worker.read_report()?;
    let status = worker.wait_forwarding(signals)?;
    if let Some(report) = failure {
        return Err(MountError::Exec(format!(
            "{:?} failed: {}",
            report.stage, report.errno
        )));
    }
    Ok(match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(_, signal, _) => 128 + signal as i32,
        _ => EXIT_WORKER_FAILURE,
    })
}
