//! Resolved job identity.
//!
//! Lookups (passwd, group list) happen here, in the parent, so a forked worker
//! only has to issue the id syscalls.

use nix::unistd::{getgid, getgrouplist, getuid, Gid, Uid, User};
use std::ffi::CString;
use std::path::{Path, PathBuf};

/// The uid/gid a job runs as, plus what the worker needs to become it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    uid: Uid,
    gid: Gid,
    home: Option<PathBuf>,
    groups: Vec<Gid>,
}

impl Identity {
    /// Look up the account behind `uid`. A missing passwd entry is not an
    /// error: the worker then runs with only `gid` and no HOME override.
    pub fn resolve(uid: u32, gid: u32) -> Self {
        let uid = Uid::from_raw(uid);
        let gid = Gid::from_raw(gid);

        let user = match User::from_uid(uid) {
            Ok(user) => user,
            Err(e) => {
                log::warn!("Failed to look up passwd entry for uid {}: {}", uid, e);
                None
            }
        };

        let groups = user
            .as_ref()
            .and_then(|u| CString::new(u.name.as_str()).ok())
            .and_then(|name| match getgrouplist(&name, gid) {
                Ok(groups) => Some(groups),
                Err(e) => {
                    log::warn!("Failed to read group list for uid {}: {}", uid, e);
                    None
                }
            })
            .unwrap_or_else(|| vec![gid]);

        Self {
            uid,
            gid,
            home: user.map(|u| u.dir),
            groups,
        }
    }

    /// Identity of the calling process.
    pub fn current() -> Self {
        Self::resolve(getuid().as_raw(), getgid().as_raw())
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn gid(&self) -> Gid {
        self.gid
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    pub fn groups(&self) -> &[Gid] {
        &self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_identity_matches_process() {
        let identity = Identity::current();
        assert_eq!(identity.uid(), getuid());
        assert_eq!(identity.gid(), getgid());
        assert!(!identity.groups().is_empty());
    }

    #[test]
    fn unknown_uid_still_resolves() {
        let identity = Identity::resolve(4_000_000_000, 4_000_000_000);
        assert_eq!(identity.uid().as_raw(), 4_000_000_000);
        assert_eq!(identity.home(), None);
        assert_eq!(identity.groups(), &[Gid::from_raw(4_000_000_000)]);
    }
}
