//! CLI command dispatch and execution.

use clap::{Parser, Subcommand};

mod alloc_subuid;
mod alloc_uid;
mod config_cmd;
pub mod error;
mod ensure_secrets;
mod ensure_sysctl;
mod get_secret;

use error::CommandError;

/// Provisions host UIDs/subuids, sysctl knobs, and per-service secrets for
/// rootless container hosts.
#[derive(Parser, Debug)]
#[command(
    name = "warden",
    version,
    about = "Provisions host UIDs/subuids, sysctl knobs, and per-service secrets for rootless container hosts"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Allocate a free host UID in the configured range
    AllocUid(alloc_uid::AllocUidArgs),

    /// Allocate (or return the existing) subuid range for a host user
    AllocSubuid(alloc_subuid::AllocSubuidArgs),

    /// Generate-or-reuse a service's secrets and reconcile them with the engine
    EnsureSecrets(ensure_secrets::EnsureSecretsArgs),

    /// Read one secret value out of a service's encrypted backup
    GetSecret(get_secret::GetSecretArgs),

    /// Idempotently lower the unprivileged low-port threshold
    EnsureSysctl(ensure_sysctl::EnsureSysctlArgs),

    /// Show the fully resolved configuration
    Config(config_cmd::ConfigArgs),
}

impl Cli {
    pub fn execute(self) -> Result<(), CommandError> {
        match self.command {
            Commands::AllocUid(args) => alloc_uid::execute(args),
            Commands::AllocSubuid(args) => alloc_subuid::execute(args),
            Commands::EnsureSecrets(args) => ensure_secrets::execute(args),
            Commands::GetSecret(args) => get_secret::execute(args),
            Commands::EnsureSysctl(args) => ensure_sysctl::execute(args),
            Commands::Config(args) => config_cmd::execute(args),
        }
    }
}
