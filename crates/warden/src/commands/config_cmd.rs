//! `config` subcommand: print the fully resolved configuration.

use clap::Args;
use serde_json::json;

use super::error::CommandError;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub fn execute(args: ConfigArgs) -> Result<(), CommandError> {
    let overrides = warden_core::config::ConfigOverrides::default();
    let config = warden_core::config::resolve_config(&overrides)?;

    if args.json {
        let output = json!({
            "allocator": {
                "uidLo": config.allocator.uid_lo,
                "uidHi": config.allocator.uid_hi,
                "subuidStart": config.allocator.subuid_start,
                "subuidSize": config.allocator.subuid_size,
                "subuidCeiling": config.allocator.subuid_ceiling,
                "lockDir": config.allocator.lock_dir,
                "stalenessHorizonMs": config.allocator.staleness_horizon_ms,
                "maxWaitMs": config.allocator.max_wait_ms,
                "retryIntervalMs": config.allocator.retry_interval_ms,
                "useraddBinary": config.allocator.useradd_binary,
            },
            "secrets": {
                "engineBinary": config.secrets.engine_binary,
                "secretNamePrefix": config.secrets.secret_name_prefix,
                "defaultSecretLength": config.secrets.default_secret_length,
            },
            "sysctl": {
                "unprivilegedPortThreshold": config.sysctl.unprivileged_port_threshold,
                "dropInPath": config.sysctl.drop_in_path,
                "sysctlKey": config.sysctl.sysctl_key,
            },
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("allocator:");
        println!("  uid range: [{}, {}]", config.allocator.uid_lo, config.allocator.uid_hi);
        println!(
            "  subuid: start={} size={} ceiling={}",
            config.allocator.subuid_start, config.allocator.subuid_size, config.allocator.subuid_ceiling
        );
        println!("  lock_dir: {}", config.allocator.lock_dir);
        println!("  useradd_binary: {}", config.allocator.useradd_binary);
        println!();
        println!("secrets:");
        println!("  engine_binary: {}", config.secrets.engine_binary);
        println!("  secret_name_prefix: {}", config.secrets.secret_name_prefix);
        println!();
        println!("sysctl:");
        println!("  unprivileged_port_threshold: {}", config.sysctl.unprivileged_port_threshold);
        println!("  drop_in_path: {}", config.sysctl.drop_in_path);
    }
    Ok(())
}
