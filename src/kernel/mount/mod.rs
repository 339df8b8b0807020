//! Mountpoint probing.

pub mod probe;

pub use probe::{is_mounted, is_mounted_as_user};
