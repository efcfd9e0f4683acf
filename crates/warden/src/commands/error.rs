//! Maps the core error taxonomy onto process exit codes (see SPEC_FULL §6).

use thiserror::Error;
use warden_core::WardenError;

/// Wraps every failure a subcommand can produce, carrying the exit code it
/// maps to.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Core(#[from] WardenError),

    #[error("configuration error: {0}")]
    Config(#[from] warden_core::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CommandError {
    /// Process exit code per the error taxonomy.
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Core(e) => match e {
                WardenError::InvalidArgs(_) => 2,
                WardenError::ExecFailure { .. } => 3,
                WardenError::IoRead { .. } | WardenError::IoWrite { .. } | WardenError::DirectoryCreate { .. } => 4,
                WardenError::NoSpace { .. } => 5,
                WardenError::LockTimeout { .. } => 6,
                WardenError::Crypto { .. } => 7,
                WardenError::NotFound { .. } => 8,
                WardenError::ConfigValidation(_) => 9,
            },
            CommandError::Config(_) => 9,
            CommandError::Io(_) => 4,
            CommandError::Json(_) => 1,
        }
    }
}
