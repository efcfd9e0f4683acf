//! `ensure-secrets` subcommand.

use clap::Args;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

use warden_core::runner::{CancellationToken, SystemCommandRunner};
use warden_core::secrets::{ensure_service_secrets, SecretDefinition};

use super::error::CommandError;

#[derive(Args, Debug)]
pub struct EnsureSecretsArgs {
    /// Service name this bundle belongs to
    service: String,

    /// Secret definitions as `name:description[:length]`, repeatable
    #[arg(long = "secret", required = true)]
    secrets: Vec<String>,

    /// Host UID owning the service's secret material
    #[arg(long)]
    uid: u32,

    /// Host GID owning the service's secret material
    #[arg(long)]
    gid: u32,

    /// Home directory under which the key and backup are stored
    #[arg(long)]
    home_dir: PathBuf,

    /// Abort the engine reconciliation if it runs longer than this many
    /// milliseconds, terminating any in-flight engine subprocess
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn parse_definition(raw: &str, default_length: usize) -> Result<SecretDefinition, CommandError> {
    let mut parts = raw.splitn(3, ':');
    let name = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| warden_core::WardenError::InvalidArgs(format!("malformed --secret value: {raw}")))?;
    let description = parts.next().unwrap_or("").to_string();
    let length = match parts.next() {
        Some(s) => s
            .parse::<usize>()
            .map_err(|_| warden_core::WardenError::InvalidArgs(format!("non-numeric secret length in: {raw}")))?,
        None => default_length,
    };
    Ok(SecretDefinition::new(name, description).with_length(length))
}

pub fn execute(args: EnsureSecretsArgs) -> Result<(), CommandError> {
    let overrides = warden_core::config::ConfigOverrides::default();
    let config = warden_core::config::resolve_config(&overrides)?;

    let defs = args
        .secrets
        .iter()
        .map(|raw| parse_definition(raw, config.secrets.default_secret_length))
        .collect::<Result<Vec<_>, _>>()?;

    let runner = SystemCommandRunner::new();
    let cancel = args
        .timeout_ms
        .map(|ms| CancellationToken::with_timeout(Duration::from_millis(ms)));
    let lock_dir = PathBuf::from(&config.allocator.lock_dir);

    let bundle = ensure_service_secrets(
        &runner,
        &lock_dir,
        config.allocator.lock_options(),
        &config.secrets.engine_binary,
        &config.secrets.secret_name_prefix,
        &args.service,
        &defs,
        args.uid,
        args.gid,
        &args.home_dir,
        cancel.as_ref(),
    )?;

    if args.json {
        let names: Vec<&String> = bundle.keys().collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "service": args.service, "secrets": names }))?
        );
    } else {
        for name in bundle.keys() {
            println!("{name}");
        }
    }
    Ok(())
}
