//! Log relay: a side process that reads helper output and forwards it to the
//! host log under a fixed tag.

use crate::config::types::{MountError, Result};
use crate::exec::worker::pipe_cloexec;
use nix::unistd::{dup2, Pid};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::process::{Command, Stdio};

/// A running relay and the write end of its input pipe.
#[derive(Debug)]
pub struct LogRelay {
    pid: Pid,
    writer: OwnedFd,
}

impl LogRelay {
    /// Start `command` with a pipe on stdin. An empty command means no relay.
    pub fn spawn(command: &[String]) -> Result<Option<Self>> {
        let Some((program, args)) = command.split_first() else {
            return Ok(None);
        };

        let (reader, writer) = pipe_cloexec()?;
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::from(reader))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MountError::Spawn(format!("failed to start log relay {}: {}", program, e)))?;

        let pid = Pid::from_raw(child.id() as i32);
        log::debug!("Started log relay {} ({})", pid, program);
        Ok(Some(Self { pid, writer }))
    }

    /// Descriptor a worker dups onto stdout/stderr.
    pub fn writer_fd(&self) -> RawFd {
        self.writer.as_raw_fd()
    }

    /// Close the parent's copy of the write end; the relay exits once the
    /// helper's copies close too.
    pub fn detach(self) -> Pid {
        self.pid
    }
}

/// Point stdout and stderr of the calling (worker) process at `fd`.
pub(crate) fn redirect_output(fd: RawFd) -> nix::Result<()> {
    // dup2 leaves the copies without FD_CLOEXEC, so they survive exec.
    dup2(fd, libc::STDOUT_FILENO)?;
    dup2(fd, libc::STDERR_FILENO)?;
    Ok(())
}
