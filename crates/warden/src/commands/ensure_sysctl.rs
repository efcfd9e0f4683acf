//! `ensure-sysctl` subcommand.

use clap::Args;
use std::path::PathBuf;

use warden_core::runner::SystemCommandRunner;
use warden_core::sysctl::ensure_unprivileged_ports;

use super::error::CommandError;

#[derive(Args, Debug)]
pub struct EnsureSysctlArgs {
    /// Override the unprivileged port threshold (defaults to config)
    #[arg(long)]
    threshold: Option<u32>,
}

pub fn execute(args: EnsureSysctlArgs) -> Result<(), CommandError> {
    let overrides = warden_core::config::ConfigOverrides::default();
    let config = warden_core::config::resolve_config(&overrides)?;

    let threshold = args.threshold.unwrap_or(config.sysctl.unprivileged_port_threshold);
    let drop_in_path = PathBuf::from(&config.sysctl.drop_in_path);

    let runner = SystemCommandRunner::new();
    ensure_unprivileged_ports(&runner, &drop_in_path, threshold)?;
    println!("unprivileged port threshold <= {threshold}");
    Ok(())
}
