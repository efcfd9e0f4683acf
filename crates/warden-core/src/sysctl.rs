//! Idempotently lowers the unprivileged low-port threshold so rootless
//! container services can bind ports below 1024 without capabilities.

use std::path::Path;

use tracing::info;

use crate::error::{Result, WardenError};
use crate::runner::{CommandRunner, CommandSpec, RunAs};

const SYSCTL_KEY: &str = "net.ipv4.ip_unprivileged_port_start";

fn read_current_threshold(runner: &dyn CommandRunner) -> Result<u32> {
    let args = ["-n", SYSCTL_KEY];
    let spec = CommandSpec {
        program: "sysctl",
        args: &args,
        run_as: RunAs::default(),
        stdin: None,
        working_dir: None,
        cancel: None,
    };
    let output = runner.run(&spec)?;
    if !output.success() {
        return Err(WardenError::ExecFailure {
            command: "sysctl -n".to_string(),
            stderr: output.stderr,
        });
    }
    output
        .stdout
        .trim()
        .parse::<u32>()
        .map_err(|e| WardenError::ExecFailure {
            command: "sysctl -n".to_string(),
            stderr: format!("unexpected sysctl output: {e}"),
        })
}

fn apply_runtime(runner: &dyn CommandRunner, threshold: u32) -> Result<()> {
    let assignment = format!("{SYSCTL_KEY}={threshold}");
    let args = ["-w", &assignment];
    let spec = CommandSpec {
        program: "sysctl",
        args: &args,
        run_as: RunAs::default(),
        stdin: None,
        working_dir: None,
        cancel: None,
    };
    let output = runner.run(&spec)?;
    if !output.success() {
        return Err(WardenError::ExecFailure {
            command: "sysctl -w".to_string(),
            stderr: output.stderr,
        });
    }
    Ok(())
}

fn write_drop_in(drop_in_path: &Path, threshold: u32) -> Result<()> {
    if let Some(parent) = drop_in_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| WardenError::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let contents = format!("# managed by warden\n{SYSCTL_KEY} = {threshold}\n");
    std::fs::write(drop_in_path, contents).map_err(|source| WardenError::IoWrite {
        path: drop_in_path.to_path_buf(),
        source,
    })
}

/// Ensure the unprivileged low-port threshold is at most `threshold`.
/// No-op if the current value already satisfies that bound.
pub fn ensure_unprivileged_ports(
    runner: &dyn CommandRunner,
    drop_in_path: &Path,
    threshold: u32,
) -> Result<()> {
    let current = read_current_threshold(runner)?;
    if current <= threshold {
        info!(current, threshold, "unprivileged port threshold already satisfied");
        return Ok(());
    }

    write_drop_in(drop_in_path, threshold)?;
    apply_runtime(runner, threshold)?;
    info!(previous = current, threshold, "lowered unprivileged port threshold");
    Ok(())
}
