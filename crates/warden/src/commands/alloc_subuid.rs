//! `alloc-subuid` subcommand.

use clap::Args;
use serde_json::json;
use std::path::PathBuf;

use warden_core::uid_allocator::{allocate_subuid_range, IdentityPaths};

use super::error::CommandError;

#[derive(Args, Debug)]
pub struct AllocSubuidArgs {
    /// Host username the range is owned by
    owner: String,

    /// Override the subuid database path (primarily for testing)
    #[arg(long, default_value = "/etc/subuid")]
    subuid_path: PathBuf,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

pub fn execute(args: AllocSubuidArgs) -> Result<(), CommandError> {
    let overrides = warden_core::config::ConfigOverrides::default();
    let config = warden_core::config::resolve_config(&overrides)?;

    let paths = IdentityPaths {
        passwd: PathBuf::from("/etc/passwd"),
        subuid: args.subuid_path.clone(),
        subgid: args.subuid_path,
    };
    let lock_dir = PathBuf::from(&config.allocator.lock_dir);

    let start = allocate_subuid_range(
        &lock_dir,
        config.allocator.lock_options(),
        &paths,
        &args.owner,
        config.allocator.subuid_start,
        config.allocator.subuid_size,
        config.allocator.subuid_ceiling,
    )?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "owner": args.owner,
                "start": start,
                "size": config.allocator.subuid_size,
            }))?
        );
    } else {
        println!("{start}");
    }
    Ok(())
}
