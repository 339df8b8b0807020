//! Safety and cleanup
//!
//! Tracks what a step started so teardown leaves no mount or helper behind.

pub mod lifecycle;
pub mod process;

pub use lifecycle::{LifecycleTracker, MountRecord, TeardownReport};
pub use process::{terminate_and_reap, KillReport};
