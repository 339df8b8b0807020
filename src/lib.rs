//! bucketmount: object-storage bucket mounts for batch-scheduler jobs
//!
//! Users declare mounts at submission time; the list travels with the job in
//! a bounded environment variable and is mounted on the compute node as the
//! job owner before any task starts.
//!
//! # Architecture
//!
//! ## Directives ([`directive`])
//! - [`directive::parser`]: `[BUCKET:]PATH[:FLAGS]` grammar
//! - [`directive::resolver`]: relative paths made absolute at capture time
//! - [`directive::codec`]: `;`-joined wire form with a size bound
//! - [`directive::conflict`]: one bucket scope per mount path
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::credentials`]: job identity lookup and privilege drop
//! - [`kernel::mount`]: mountpoint detection
//!
//! ## Execution Control ([`exec`])
//! - [`exec::worker`]: forked run-as-user workers with a status pipe
//! - [`exec::mount`]: helper launch and readiness wait
//! - [`exec::unmount`]: graceful then lazy detach
//! - [`exec::readiness`], [`exec::relay`]: polling and helper log forwarding
//!
//! ## Safety & Cleanup ([`safety`])
//! - [`safety::lifecycle`]: per-step mount records and their teardown
//! - [`safety::process`]: SIGTERM/SIGKILL escalation and reaping
//!
//! ## Hooks ([`hooks`])
//! - [`hooks::plugin`]: capture, node setup/teardown, step setup/teardown
//! - [`hooks::transport`]: where the encoded list is kept
//!
//! ## Configuration ([`config`])
//! - [`config::settings`]: JSON configuration with defaults
//! - [`config::types`]: error types

// Mount directives
pub mod directive;

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod exec;

// Safety & Cleanup
pub mod safety;

// Scheduler hooks
pub mod hooks;

// Configuration
pub mod config;

// CLI entrypoint wiring for the bucketmount binary.
pub mod cli;

pub use config::types::{MountError, Result};
pub use directive::{Bucket, Directive, DirectiveList};
