//! Execution control
//!
//! Runs the mount helper as the job user, waits for the mount, and detaches
//! it again. Hooks talk to a `MountBackend` so they can be driven without a
//! real FUSE helper.

pub mod mount;
pub mod readiness;
pub mod relay;
pub mod unmount;
pub mod worker;

use crate::config::settings::MountConfig;
use crate::config::types::Result;
use crate::directive::Directive;
use crate::kernel::credentials::Identity;
use std::path::Path;

pub use mount::{MountExecutor, MountOutcome};
pub use unmount::UnmountExecutor;

/// Mount/unmount operations used by the hooks.
pub trait MountBackend {
    fn backend_name(&self) -> &str;
    fn mount(&self, directive: &Directive, identity: &Identity) -> Result<MountOutcome>;
    fn unmount(&self, path: &Path) -> Result<()>;
}

/// Backend that execs the configured helper binary.
#[derive(Clone, Debug)]
pub struct HelperBackend {
    mounter: MountExecutor,
    unmounter: UnmountExecutor,
}

impl HelperBackend {
    pub fn new(config: &MountConfig) -> Self {
        Self {
            mounter: MountExecutor::from(config),
            unmounter: UnmountExecutor::new(config),
        }
    }
}

impl MountBackend for HelperBackend {
    fn backend_name(&self) -> &str {
        &self.mounter.config().helper_binary
    }

    fn mount(&self, directive: &Directive, identity: &Identity) -> Result<MountOutcome> {
        self.mounter.mount(directive, identity)
    }

    fn unmount(&self, path: &Path) -> Result<()> {
        self.unmounter.unmount(path)
    }
}
