//! Cross-process named lock with stale-owner takeover.
//!
//! Each lock is a file at `<lock_dir>/<name>.lock` whose mere presence
//! signifies ownership. The content is two ASCII lines: the owning PID and
//! the acquisition-time millisecond epoch. On startup (or any acquisition
//! attempt) a lock file is inspected: if the recorded PID is dead, or the
//! timestamp is older than the staleness horizon, or the content doesn't
//! parse at all, the lock is stale and eligible for atomic takeover via a
//! write-temp-then-rename.
//!
//! # Liveness check
//!
//! On Unix, `libc::kill(pid, 0)` sends no signal but reports whether the
//! process exists (and the caller has permission to signal it). A stale PID
//! could in principle alias an unrelated process reusing the same number
//! (worse inside a PID namespace); this is a known, bounded residual risk —
//! the staleness horizon limits the exposure window.
//!
//! # Retry as a state machine
//!
//! `with_lock` is modeled as `Attempt -> Busy -> Sleep -> Attempt`,
//! `Attempt -> Held`, `Attempt -> Fatal`, `Sleep -> Timeout` rather than a
//! recursive closure chain, so a future cancellation hook has one obvious
//! place to interpose between `Sleep` and the next `Attempt`.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::{LockAttemptError, Result, WardenError};

/// Default window beyond which a lock with no observable live owner is
/// treated as abandoned.
pub const DEFAULT_STALENESS_HORIZON_MS: u64 = 60_000;

/// Tuning knobs for a single `with_lock` call.
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    pub max_wait_ms: u64,
    pub retry_interval_ms: u64,
    pub staleness_horizon_ms: u64,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            max_wait_ms: 5_000,
            retry_interval_ms: 100,
            staleness_horizon_ms: DEFAULT_STALENESS_HORIZON_MS,
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.contains('\0')
    {
        return Err(WardenError::InvalidArgs(format!(
            "invalid lock name: {name:?}"
        )));
    }
    Ok(())
}

fn lock_path(lock_dir: &Path, name: &str) -> PathBuf {
    lock_dir.join(format!("{name}.lock"))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn lock_contents(pid: u32, timestamp_ms: u64) -> String {
    format!("{pid}\n{timestamp_ms}\n")
}

/// Parsed lock file content: owning PID and acquisition timestamp.
struct LockState {
    pid: u32,
    timestamp_ms: u64,
}

fn parse_lock_file(text: &str) -> Option<LockState> {
    let mut lines = text.lines();
    let pid: u32 = lines.next()?.trim().parse().ok()?;
    let timestamp_ms: u64 = lines.next()?.trim().parse().ok()?;
    Some(LockState { pid, timestamp_ms })
}

#[cfg(unix)]
fn pid_is_alive(pid: u32) -> bool {
    // SAFETY: signal 0 delivers nothing; it only probes whether `pid`
    // exists and is signalable by this process.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: u32) -> bool {
    false
}

fn is_stale(state: &LockState, staleness_horizon_ms: u64) -> bool {
    let now = now_ms();
    let age_exceeded = now.saturating_sub(state.timestamp_ms) > staleness_horizon_ms;
    age_exceeded || !pid_is_alive(state.pid)
}

fn read_lock_state(path: &Path) -> Option<LockState> {
    let text = fs::read_to_string(path).ok()?;
    parse_lock_file(&text)
}

/// Attempt atomic takeover of a stale lock: write a PID-scoped temp file,
/// re-check staleness (an owner may have refreshed between our read and
/// now), then rename the temp file over the lock path. POSIX rename is
/// atomic, so the recheck-then-rename sequence is safe against a racing
/// legitimate refresh: if the owner refreshed in between, the recheck sees
/// a live lock and we bail before renaming.
fn attempt_takeover(path: &Path, staleness_horizon_ms: u64) -> Result<bool> {
    let pid = std::process::id();
    let tmp_path = path.with_extension(format!("{pid}.tmp"));

    let contents = lock_contents(pid, now_ms());
    {
        let mut file = fs::File::create(&tmp_path).map_err(|source| WardenError::IoWrite {
            path: tmp_path.clone(),
            source,
        })?;
        file.write_all(contents.as_bytes())
            .map_err(|source| WardenError::IoWrite {
                path: tmp_path.clone(),
                source,
            })?;
    }

    let still_stale = match read_lock_state(path) {
        Some(state) => is_stale(&state, staleness_horizon_ms),
        None => true,
    };

    if !still_stale {
        let _ = fs::remove_file(&tmp_path);
        return Ok(false);
    }

    match fs::rename(&tmp_path, path) {
        Ok(()) => Ok(true),
        Err(source) => {
            let _ = fs::remove_file(&tmp_path);
            Err(WardenError::IoWrite {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

/// A single acquisition attempt. Returns `Ok(())` on success, `Err(Busy)` if
/// a live owner holds the lock, `Err(Fatal(_))` on any I/O failure.
fn try_acquire(path: &Path, opts: &LockOptions) -> std::result::Result<(), LockAttemptError> {
    let pid = std::process::id();
    let contents = lock_contents(pid, now_ms());

    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(mut file) => {
            file.write_all(contents.as_bytes())
                .map_err(|source| WardenError::IoWrite {
                    path: path.to_path_buf(),
                    source,
                })?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            let stale = match read_lock_state(path) {
                Some(state) => is_stale(&state, opts.staleness_horizon_ms),
                None => true,
            };
            if !stale {
                return Err(LockAttemptError::Busy);
            }
            if attempt_takeover(path, opts.staleness_horizon_ms)? {
                Ok(())
            } else {
                Err(LockAttemptError::Busy)
            }
        }
        Err(source) => Err(WardenError::IoWrite {
            path: path.to_path_buf(),
            source,
        }
        .into()),
    }
}

fn release(path: &Path) {
    // Deletion errors are swallowed: a takeover may already have reaped
    // this file out from under us.
    let _ = fs::remove_file(path);
}

/// Releases the held lock file when dropped, whether `op` returned
/// normally, returned an error, or unwound via panic. This is what makes
/// "the lock must still be released" hold even if `op` panics without
/// aborting the process (e.g. a caller wraps `with_lock` in
/// `catch_unwind`), not just on the ordinary success/error paths.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        release(&self.path);
    }
}

/// Acquire the named lock, run `op`, and release the lock regardless of
/// whether `op` succeeds, errors, or panics. Retries on contention up to
/// `opts.max_wait_ms` (fixed interval `opts.retry_interval_ms`); on
/// timeout returns [`WardenError::LockTimeout`]. Filesystem errors surface
/// immediately, without retry.
pub fn with_lock<T>(
    lock_dir: &Path,
    name: &str,
    opts: LockOptions,
    op: impl FnOnce() -> Result<T>,
) -> Result<T> {
    validate_name(name)?;
    fs::create_dir_all(lock_dir).map_err(|source| WardenError::DirectoryCreate {
        path: lock_dir.to_path_buf(),
        source,
    })?;

    let path = lock_path(lock_dir, name);
    let deadline = Instant::now() + Duration::from_millis(opts.max_wait_ms);

    loop {
        match try_acquire(&path, &opts) {
            Ok(()) => break,
            Err(LockAttemptError::Fatal(e)) => return Err(e),
            Err(LockAttemptError::Busy) => {
                if Instant::now() >= deadline {
                    return Err(WardenError::LockTimeout {
                        name: name.to_string(),
                        waited_ms: opts.max_wait_ms,
                    });
                }
                std::thread::sleep(Duration::from_millis(opts.retry_interval_ms));
            }
        }
    }

    let _guard = LockGuard { path };
    op()
}
