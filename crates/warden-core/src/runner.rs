//! Abstraction over "run this program, possibly as another user, possibly
//! cancellable" so the allocator and secret lifecycle can be tested against
//! a real process without mocking in production code paths.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, WardenError};

/// Environment variables preserved across a privilege-drop exec. Anything
/// else in the caller's environment is dropped rather than leaked to a
/// process running as a different user.
pub const ENV_ALLOW_LIST: &[&str] = &["XDG_RUNTIME_DIR", "DBUS_SESSION_BUS_ADDRESS", "HOME", "PATH"];

/// A cheap, clonable cancellation flag. Checked between poll intervals
/// while waiting on a child process; does not interrupt blocking syscalls.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// A token that cancels itself after `timeout` elapses, via a detached
    /// timer thread. Used to give CLI callers a `--timeout-ms`-style knob
    /// without threading a `Duration` through every `CommandRunner` call.
    pub fn with_timeout(timeout: Duration) -> Self {
        let token = Self::new();
        let timer = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(timeout);
            timer.cancel();
        });
        token
    }
}

/// Captured result of running a command to completion.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

/// Identity to exec the child process as. `None` inherits the caller's
/// current identity (used for commands that don't need privilege drop).
#[derive(Debug, Clone, Copy, Default)]
pub struct RunAs {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// Describes a single invocation.
pub struct CommandSpec<'a> {
    pub program: &'a str,
    pub args: &'a [&'a str],
    pub run_as: RunAs,
    pub stdin: Option<&'a str>,
    pub working_dir: Option<&'a Path>,
    pub cancel: Option<&'a CancellationToken>,
}

impl<'a> CommandSpec<'a> {
    pub fn new(program: &'a str, args: &'a [&'a str]) -> Self {
        Self {
            program,
            args,
            run_as: RunAs::default(),
            stdin: None,
            working_dir: None,
            cancel: None,
        }
    }
}

/// Runs processes on behalf of the allocator and secret lifecycle.
///
/// Kept as a trait (rather than calling `std::process::Command` directly
/// from those components) so tests can substitute a stub binary without
/// mocking production logic.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec<'_>) -> Result<CommandOutput>;
}

/// Default implementation backed by `std::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }

    fn poll_interval() -> Duration {
        Duration::from_millis(25)
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, spec: &CommandSpec<'_>) -> Result<CommandOutput> {
        let mut cmd = Command::new(spec.program);
        cmd.args(spec.args);
        cmd.env_clear();
        for key in ENV_ALLOW_LIST {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }
        if let Some(dir) = spec.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        apply_run_as(&mut cmd, spec.run_as);

        debug!(command = spec.program, args = ?spec.args, "spawning command");

        let mut child = cmd.spawn().map_err(|e| WardenError::ExecFailure {
            command: spec.program.to_string(),
            stderr: e.to_string(),
        })?;

        if let Some(input) = spec.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(input.as_bytes()) {
                    warn!(command = spec.program, error = %e, "failed writing to child stdin");
                }
            }
        } else {
            drop(child.stdin.take());
        }

        if let Some(token) = spec.cancel {
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) => {
                        if token.is_cancelled() {
                            let _ = child.kill();
                            let _ = child.wait();
                            return Err(WardenError::ExecFailure {
                                command: spec.program.to_string(),
                                stderr: "cancelled".to_string(),
                            });
                        }
                        std::thread::sleep(Self::poll_interval());
                    }
                    Err(e) => {
                        return Err(WardenError::ExecFailure {
                            command: spec.program.to_string(),
                            stderr: e.to_string(),
                        })
                    }
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| WardenError::ExecFailure {
                command: spec.program.to_string(),
                stderr: e.to_string(),
            })?;

        Ok(CommandOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(unix)]
fn apply_run_as(cmd: &mut Command, run_as: RunAs) {
    use std::os::unix::process::CommandExt;
    if let Some(gid) = run_as.gid {
        cmd.gid(gid);
    }
    if let Some(uid) = run_as.uid {
        cmd.uid(uid);
    }
}

#[cfg(not(unix))]
fn apply_run_as(_cmd: &mut Command, _run_as: RunAs) {}

/// `true` if `stderr` indicates the engine reported the resource already
/// exists — treated as success by the secret lifecycle (§4.F).
pub fn indicates_already_exists(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("already exists")
}

pub type EnvAllowList = HashMap<&'static str, Option<String>>;
