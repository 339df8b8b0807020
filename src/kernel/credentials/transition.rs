//! One-way transition to the job identity.
//!
//! Runs inside freshly forked workers: no logging, no allocation, errno only.
//! CRITICAL: setresgid MUST be called BEFORE setresuid to prevent
//! privilege escalation through saved-set-user-ID.

use super::identity::Identity;
use nix::errno::Errno;
use nix::unistd::{getegid, geteuid, getgid, getuid, setgroups, setresgid, setresuid};

/// 4-step transition: groups -> setresgid -> setresuid -> verify.
///
/// Without root the only reachable identity is the current one: asking for
/// it succeeds, asking for any other fails with EPERM.
pub fn drop_to(identity: &Identity) -> nix::Result<()> {
    if !geteuid().is_root() {
        return verify_transition(identity);
    }

    setgroups(identity.groups())?;
    // CRITICAL: GID before UID
    set_gid(identity)?;
    set_uid(identity)?;
    verify_transition(identity)
}

/// MUST be called BEFORE set_uid.
fn set_gid(identity: &Identity) -> nix::Result<()> {
    let gid = identity.gid();
    setresgid(gid, gid, gid)
}

/// MUST be called AFTER set_gid. After this the process cannot regain root.
fn set_uid(identity: &Identity) -> nix::Result<()> {
    let uid = identity.uid();
    setresuid(uid, uid, uid)
}

fn verify_transition(identity: &Identity) -> nix::Result<()> {
    if getuid() != identity.uid() || geteuid() != identity.uid() {
        return Err(Errno::EPERM);
    }
    if getgid() != identity.gid() || getegid() != identity.gid() {
        return Err(Errno::EPERM);
    }
    Ok(())
}
