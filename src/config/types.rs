/// Core error types for the bucketmount system
use std::fmt;
use thiserror::Error;

/// Reason a mount path was refused before the helper ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathViolation {
    /// Path exists but is not a directory
    NotDirectory,
    /// Directory is owned by someone other than the job user
    WrongOwner,
    /// Directory already has entries
    NotEmpty,
    /// Job user cannot write to the directory
    NotWritable,
}

impl fmt::Display for PathViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotDirectory => "exists and is not a directory",
            Self::WrongOwner => "is not owned by the job user",
            Self::NotEmpty => "is not empty",
            Self::NotWritable => "is not writable by the job user",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
pub enum MountError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in '{token}': {reason}")]
    Parse { token: String, reason: String },

    #[error(
        "Conflict: mountpoint '{path}' is already assigned to bucket {existing}, cannot mount bucket {requested}"
    )]
    Conflict {
        path: String,
        existing: String,
        requested: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Mount path {path} {violation}")]
    Validation { path: String, violation: PathViolation },

    #[error("Privilege error: {0}")]
    Privilege(String),

    #[error("Spawn error: {0}")]
    Spawn(String),

    #[error("Exec error: {0}")]
    Exec(String),

    #[error("Timed out after {waited_ms}ms waiting for mountpoint {path}")]
    Timeout { path: String, waited_ms: u64 },

    #[error("Mount helper for {path} exited before the mount was ready: {status}")]
    HelperExited { path: String, status: String },

    #[error("Teardown of {path} failed: {reason}")]
    Teardown { path: String, reason: String },

    #[error("{failed} of {total} mount directives failed")]
    Setup { failed: usize, total: usize },
}

impl MountError {
    pub(crate) fn parse(token: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MountError>;
