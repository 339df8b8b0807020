/// Runtime configuration loaded from a JSON file
use crate::config::types::{MountError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an optional JSON config file.
pub const CONFIG_PATH_VAR: &str = "BUCKETMOUNT_CONFIG";

/// Deployment knobs for the mount helper, the transport, and teardown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Variable carrying the encoded directive list between contexts
    pub transport_var: String,
    /// Buffer size the host offers when reading the variable, NUL included
    pub transport_capacity: usize,
    /// Mount helper executable, resolved through PATH
    pub helper_binary: String,
    /// Extra helper options inserted after the baseline flags
    pub helper_options: Vec<String>,
    /// Permission bits reported for files inside the mount
    pub file_mode: u32,
    /// Permission bits reported for directories inside the mount
    pub dir_mode: u32,
    /// Helper log format
    pub log_format: String,
    /// Mode used when the mount directory has to be created
    pub mount_dir_mode: u32,
    /// Graceful detach command; the mount path is appended
    pub unmount_command: Vec<String>,
    /// Lazy detach command used when the graceful one leaves the mount behind
    pub lazy_unmount_command: Vec<String>,
    /// Process that receives helper stdout/stderr on stdin; empty disables it
    pub log_relay_command: Vec<String>,
    pub poll_interval_ms: u64,
    pub readiness_timeout_ms: u64,
    /// Time a helper gets between SIGTERM and SIGKILL at teardown
    pub helper_grace_ms: u64,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            transport_var: "GCSFUSE_MOUNTS".to_string(),
            transport_capacity: 4096,
            helper_binary: "gcsfuse".to_string(),
            helper_options: Vec::new(),
            file_mode: 0o644,
            dir_mode: 0o755,
            log_format: "json".to_string(),
            mount_dir_mode: 0o755,
            unmount_command: vec!["fusermount".to_string(), "-u".to_string()],
            lazy_unmount_command: vec!["fusermount".to_string(), "-uz".to_string()],
            log_relay_command: vec![
                "logger".to_string(),
                "-t".to_string(),
                "gcsfuse-mount".to_string(),
            ],
            poll_interval_ms: 500,
            readiness_timeout_ms: 10_000,
            helper_grace_ms: 200,
        }
    }
}

impl MountConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            MountError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            MountError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `BUCKETMOUNT_CONFIG` when it is set, defaults otherwise.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_PATH_VAR) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.transport_var.is_empty() || self.transport_var.contains('=') {
            errors.push(format!("invalid transport_var '{}'", self.transport_var));
        }
        if self.transport_capacity == 0 {
            errors.push("transport_capacity must be positive".to_string());
        }
        if self.helper_binary.is_empty() {
            errors.push("helper_binary must not be empty".to_string());
        }
        if self.unmount_command.is_empty() || self.lazy_unmount_command.is_empty() {
            errors.push("unmount commands must not be empty".to_string());
        }
        for (name, mode) in [
            ("file_mode", self.file_mode),
            ("dir_mode", self.dir_mode),
            ("mount_dir_mode", self.mount_dir_mode),
        ] {
            if mode > 0o7777 {
                errors.push(format!("{} {:o} is not a permission mode", name, mode));
            }
        }
        if self.poll_interval_ms == 0 {
            errors.push("poll_interval_ms must be positive".to_string());
        }
        if self.readiness_timeout_ms < self.poll_interval_ms {
            errors.push(format!(
                "readiness_timeout_ms ({}) is shorter than poll_interval_ms ({})",
                self.readiness_timeout_ms, self.poll_interval_ms
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MountError::Config(errors.join("; ")))
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn helper_grace(&self) -> Duration {
        Duration::from_millis(self.helper_grace_ms)
    }
}
