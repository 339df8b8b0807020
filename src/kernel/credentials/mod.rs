//! Job identity lookup and one-way UID/GID transitions.
//!
//! CRITICAL: setresgid MUST be called BEFORE setresuid.

mod identity;
mod transition;

pub use identity::Identity;
pub use transition::drop_to;
