//! Where the captured directive list lives between the submit side and the
//! node side.

use crate::config::settings::MountConfig;
use crate::config::types::{MountError, Result};

/// Bounded text slot carrying the encoded directive list.
pub trait DirectiveTransport {
    /// Current value, `None` when nothing was captured yet.
    fn load(&self) -> Result<Option<String>>;
    fn store(&mut self, encoded: &str) -> Result<()>;
    /// Buffer size on the receiving side, terminating NUL included.
    fn capacity(&self) -> usize;
}

/// Process environment variable, inherited by everything the job starts.
#[derive(Clone, Debug)]
pub struct EnvTransport {
    var: String,
    capacity: usize,
}

impl EnvTransport {
    pub fn new(var: impl Into<String>, capacity: usize) -> Self {
        Self {
            var: var.into(),
            capacity,
        }
    }

    pub fn from_config(config: &MountConfig) -> Self {
        Self::new(config.transport_var.clone(), config.transport_capacity)
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl DirectiveTransport for EnvTransport {
    fn load(&self) -> Result<Option<String>> {
        match std::env::var(&self.var) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(MountError::Config(format!(
                "{} is not valid UTF-8",
                self.var
            ))),
        }
    }

    fn store(&mut self, encoded: &str) -> Result<()> {
        std::env::set_var(&self.var, encoded);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// In-process slot, for callers that hand the value over themselves.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    value: Option<String>,
    capacity: usize,
}

impl MemoryTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            value: None,
            capacity,
        }
    }

    pub fn with_value(value: impl Into<String>, capacity: usize) -> Self {
        Self {
            value: Some(value.into()),
            capacity,
        }
    }
}

impl DirectiveTransport for MemoryTransport {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.value.clone())
    }

    fn store(&mut self, encoded: &str) -> Result<()> {
        self.value = Some(encoded.to_string());
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VAR: &str = "BUCKETMOUNT_TRANSPORT_TEST";

    #[test]
    #[serial]
    fn env_transport_round_trips_through_environment() {
        std::env::remove_var(VAR);
        let mut transport = EnvTransport::new(VAR, 4096);
        assert_eq!(transport.load().unwrap(), None);

        transport.store("b:/tmp/x").unwrap();
        assert_eq!(std::env::var(VAR).unwrap(), "b:/tmp/x");
        assert_eq!(transport.load().unwrap().as_deref(), Some("b:/tmp/x"));
        std::env::remove_var(VAR);
    }

    #[test]
    fn env_transport_takes_config_values() {
        let transport = EnvTransport::from_config(&MountConfig::default());
        assert_eq!(transport.var(), "GCSFUSE_MOUNTS");
        assert_eq!(transport.capacity(), 4096);
    }

    #[test]
    fn memory_transport_starts_empty() {
        let mut transport = MemoryTransport::new(64);
        assert_eq!(transport.load().unwrap(), None);
        transport.store("/tmp/a").unwrap();
        assert_eq!(transport.load().unwrap().as_deref(), Some("/tmp/a"));
    }
}
