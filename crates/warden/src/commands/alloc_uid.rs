//! `alloc-uid` subcommand.

use clap::Args;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

use warden_core::runner::{CancellationToken, SystemCommandRunner};
use warden_core::uid_allocator::{allocate_and_create_user, IdentityPaths};

use super::error::CommandError;

#[derive(Args, Debug)]
pub struct AllocUidArgs {
    /// Host username to create with the allocated UID
    username: String,

    /// Lowest UID to consider (defaults to the resolved config value)
    #[arg(long)]
    lo: Option<u32>,

    /// Highest UID to consider (defaults to the resolved config value)
    #[arg(long)]
    hi: Option<u32>,

    /// Override the passwd database path (primarily for testing)
    #[arg(long, default_value = "/etc/passwd")]
    passwd_path: PathBuf,

    /// Abort user creation if it runs longer than this many milliseconds,
    /// terminating the in-flight `useradd` subprocess
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

pub fn execute(args: AllocUidArgs) -> Result<(), CommandError> {
    let overrides = warden_core::config::ConfigOverrides {
        uid_lo: args.lo,
        uid_hi: args.hi,
        ..Default::default()
    };
    let config = warden_core::config::resolve_config(&overrides)?;

    let paths = IdentityPaths {
        passwd: args.passwd_path,
        subuid: PathBuf::from("/etc/subuid"),
        subgid: PathBuf::from("/etc/subgid"),
    };
    let lock_dir = PathBuf::from(&config.allocator.lock_dir);
    let runner = SystemCommandRunner::new();
    let cancel = args
        .timeout_ms
        .map(|ms| CancellationToken::with_timeout(Duration::from_millis(ms)));

    let uid = allocate_and_create_user(
        &runner,
        &lock_dir,
        config.allocator.lock_options(),
        &paths,
        config.allocator.uid_lo,
        config.allocator.uid_hi,
        &args.username,
        &config.allocator.useradd_binary,
        cancel.as_ref(),
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&json!({ "uid": uid }))?);
    } else {
        println!("{uid}");
    }
    Ok(())
}
