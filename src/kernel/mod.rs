//! Thin wrappers around Linux kernel primitives.
//!
//! Dependency direction: credentials -> mount

pub mod credentials;
pub mod mount;
pub mod signal;
