//! `get-secret` subcommand.

use clap::Args;
use std::path::PathBuf;

use warden_core::secrets::get_service_secret;

use super::error::CommandError;

#[derive(Args, Debug)]
pub struct GetSecretArgs {
    /// Service the secret belongs to
    service: String,

    /// Secret name
    name: String,

    /// Home directory the service's key and backup live under
    #[arg(long)]
    home_dir: PathBuf,
}

pub fn execute(args: GetSecretArgs) -> Result<(), CommandError> {
    let value = get_service_secret(&args.service, &args.name, &args.home_dir)?;
    println!("{value}");
    Ok(())
}
