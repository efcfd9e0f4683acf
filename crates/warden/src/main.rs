//! warden - privileged helper for rootless container host provisioning
//!
//! Allocates host UIDs and subuid ranges, provisions per-service secrets
//! against a container engine's secret store, and lowers the unprivileged
//! low-port sysctl threshold. This binary is a thin demonstration and
//! integration-test harness over `warden-core`; the allocation, locking,
//! and secret-lifecycle logic all live there.

use clap::Parser;

mod commands;

use commands::Cli;

fn main() {
    warden_core::logging::init();

    let cli = Cli::parse();

    if let Err(e) = cli.execute() {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}
