//! Scheduler hook entry points and the transport they share.

pub mod plugin;
pub mod transport;

pub use plugin::{capture, node_setup, node_teardown, step_setup, step_teardown, SetupReport};
pub use transport::{DirectiveTransport, EnvTransport, MemoryTransport};
