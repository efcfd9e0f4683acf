//! Error taxonomy shared by every component in this crate.
//!
//! Every public operation returns a `Result<_, WardenError>` (or a narrower
//! error that converts into it) with a preserved cause chain via
//! `#[source]`/`#[from]`. Panics are reserved for invariant violations that a
//! caller should have prevented (an already-validated lock name containing a
//! path separator, for instance).

use std::path::PathBuf;
use thiserror::Error;

/// The complete error surface of `warden-core`.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Client supplied a forbidden name, empty command, or an out-of-range bound.
    #[error("invalid argument: {0}")]
    InvalidArgs(String),

    /// Reading a file failed.
    #[error("failed to read {path}: {source}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a file failed.
    #[error("failed to write {path}: {source}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating a directory failed.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A subprocess exited non-zero, or failed to spawn.
    #[error("command `{command}` failed: {stderr}")]
    ExecFailure { command: String, stderr: String },

    /// Key generation, encryption, or decryption failed.
    #[error("crypto error: {message}")]
    Crypto {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A UID or subuid range is exhausted.
    #[error("no space left in {space} (searched [{lo}, {hi}])")]
    NoSpace { space: String, lo: u64, hi: u64 },

    /// Lock acquisition timed out after retrying for the configured budget.
    #[error("Timeout acquiring lock '{name}' after {waited_ms}ms")]
    LockTimeout { name: String, waited_ms: u64 },

    /// Requested secret is absent from the decrypted bundle.
    #[error("secret '{name}' not found for service '{service}'")]
    NotFound { service: String, name: String },

    /// Structured configuration failed validation.
    #[error("configuration invalid: {0}")]
    ConfigValidation(String),
}

/// Internal, retryable outcome of a single lock-acquisition attempt.
///
/// Never escapes the lock module: callers only ever observe `LockTimeout`
/// (via [`WardenError`]) once the retry budget is exhausted.
#[derive(Debug, Error)]
pub(crate) enum LockAttemptError {
    #[error("lock is held by a live owner")]
    Busy,
    #[error(transparent)]
    Fatal(#[from] WardenError),
}

pub type Result<T> = std::result::Result<T, WardenError>;
