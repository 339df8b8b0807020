//! Termination signals caught while a step command runs.
//!
//! The handler only stores the signal number; the main loop picks it up,
//! forwards it and still gets to tear down what the step mounted.

use crate::config::types::{MountError, Result};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicI32, Ordering};

/// Last signal received, 0 when none is pending.
static SIGNAL_RECEIVED: AtomicI32 = AtomicI32::new(0);

const CAUGHT: [Signal; 3] = [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP];

extern "C" fn record_signal(signal: libc::c_int) {
    SIGNAL_RECEIVED.store(signal, Ordering::SeqCst);
}

/// Installed SIGINT/SIGTERM/SIGHUP handlers. Dropping it restores the
/// previous dispositions.
pub struct SignalHandler {
    previous: Vec<(Signal, SigAction)>,
}

impl SignalHandler {
    /// Install the handlers. Callers poll `take_signal`; interrupted system
    /// calls are restarted.
    pub fn init() -> Result<Self> {
        SIGNAL_RECEIVED.store(0, Ordering::SeqCst);
        let action = SigAction::new(
            SigHandler::Handler(record_signal),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );

        let mut handler = Self {
            previous: Vec::with_capacity(CAUGHT.len()),
        };
        for sig in CAUGHT {
            // SAFETY: record_signal only performs an atomic store.
            let previous = unsafe { signal::sigaction(sig, &action) }.map_err(|e| {
                MountError::Io(std::io::Error::new(
                    std::io::Error::from(e).kind(),
                    format!("failed to install {} handler: {}", sig, e),
                ))
            })?;
            handler.previous.push((sig, previous));
        }
        log::debug!("Signal handlers installed (SIGINT, SIGTERM, SIGHUP)");
        Ok(handler)
    }

    /// Pending signal, cleared by the call.
    pub fn take_signal(&self) -> Option<Signal> {
        match SIGNAL_RECEIVED.swap(0, Ordering::SeqCst) {
            0 => None,
            raw => Signal::try_from(raw).ok(),
        }
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        for (sig, previous) in self.previous.drain(..).rev() {
            // SAFETY: restores a disposition the kernel handed back earlier.
            if let Err(e) = unsafe { signal::sigaction(sig, &previous) } {
                log::warn!("Failed to restore {} handler: {}", sig, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::raise;
    use serial_test::serial;

    #[test]
    #[serial]
    fn caught_signal_is_reported_once() {
        let handler = SignalHandler::init().unwrap();
        assert_eq!(handler.take_signal(), None);

        raise(Signal::SIGHUP).unwrap();

        assert_eq!(handler.take_signal(), Some(Signal::SIGHUP));
        assert_eq!(handler.take_signal(), None);
    }

    #[test]
    #[serial]
    fn drop_restores_previous_disposition() {
        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        let original = unsafe { signal::sigaction(Signal::SIGHUP, &ignore) }.unwrap();

        drop(SignalHandler::init().unwrap());

        let current = unsafe { signal::sigaction(Signal::SIGHUP, &original) }.unwrap();
        assert_eq!(current.handler(), SigHandler::SigIgn);
    }
}
