//! Allocates host UIDs and subuid ranges for container service users.
//!
//! Every mutating operation runs under the `"uid-alloc"` named lock
//! ([`crate::lock`]) so the read-parse-search-mutate cycle is atomic with
//! respect to other instances of this tool running on the same host.

use std::path::Path;

use tracing::info;

use crate::error::{Result, WardenError};
use crate::identity::{parse_passwd_uids_vec, parse_subid_ranges_vec};
use crate::lock::{with_lock, LockOptions};
use crate::range::{find_first_available_integer, find_gap_for_range};
use crate::runner::{CancellationToken, CommandRunner, CommandSpec, RunAs};

/// Paths to the host's identity databases. Exists so tests can point at
/// fixture files instead of the real `/etc/passwd` et al.
#[derive(Debug, Clone)]
pub struct IdentityPaths {
    pub passwd: std::path::PathBuf,
    pub subuid: std::path::PathBuf,
    pub subgid: std::path::PathBuf,
}

fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| WardenError::IoRead {
        path: path.to_path_buf(),
        source,
    })
}

/// `true` if `username` has an entry in the passwd database.
pub fn user_exists(paths: &IdentityPaths, username: &str) -> Result<bool> {
    Ok(uid_of(paths, username)?.is_some())
}

/// The UID associated with `username`, if any.
///
/// passwd's first colon-delimited field is the username; the parser in
/// [`crate::identity`] only extracts UIDs, so this re-scans the raw text
/// directly rather than reusing it.
pub fn uid_of(paths: &IdentityPaths, username: &str) -> Result<Option<u32>> {
    let text = read_to_string(&paths.passwd)?;
    for line in text.lines() {
        if line.trim_start().starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split(':');
        let name = fields.next();
        let uid = fields.nth(1).and_then(|f| f.parse::<u32>().ok());
        if name == Some(username) {
            return Ok(uid);
        }
    }
    Ok(None)
}

/// Pick the smallest free UID in `[lo, hi]` not present in the passwd
/// database. Must be called from inside the `"uid-alloc"` lock.
fn allocate_uid_locked(paths: &IdentityPaths, lo: u32, hi: u32) -> Result<u32> {
    let text = read_to_string(&paths.passwd)?;
    let used = parse_passwd_uids_vec(&text);
    find_first_available_integer(lo, hi, &used).ok_or_else(|| WardenError::NoSpace {
        space: "uid".to_string(),
        lo: lo as u64,
        hi: hi as u64,
    })
}

/// Allocate the smallest free UID in `[lo, hi]`, serialized against other
/// allocators on the host via the `"uid-alloc"` lock.
pub fn allocate_uid(lock_dir: &Path, opts: LockOptions, paths: &IdentityPaths, lo: u32, hi: u32) -> Result<u32> {
    with_lock(lock_dir, "uid-alloc", opts, || allocate_uid_locked(paths, lo, hi))
}

/// Allocate the smallest free UID in `[lo, hi]` and create the host user for
/// it, both inside the same `"uid-alloc"` lock acquisition so the
/// read-allocate-create cycle is atomic against other instances of this
/// tool racing on the same passwd database.
#[allow(clippy::too_many_arguments)]
pub fn allocate_and_create_user(
    runner: &dyn CommandRunner,
    lock_dir: &Path,
    opts: LockOptions,
    paths: &IdentityPaths,
    lo: u32,
    hi: u32,
    username: &str,
    useradd_binary: &str,
    cancel: Option<&CancellationToken>,
) -> Result<u32> {
    with_lock(lock_dir, "uid-alloc", opts, || {
        let uid = allocate_uid_locked(paths, lo, hi)?;
        create_system_user(runner, username, uid, useradd_binary, cancel)?;
        Ok(uid)
    })
}

/// If `owner` already has a subuid range, return its existing start
/// (idempotent). Otherwise find a free gap of `size` starting no earlier
/// than `desired_start`, bounded by `ceiling`.
fn allocate_subuid_range_locked(
    paths: &IdentityPaths,
    owner: &str,
    desired_start: u64,
    size: u64,
    ceiling: u64,
) -> Result<u64> {
    let text = read_to_string(&paths.subuid)?;
    let ranges = parse_subid_ranges_vec(&text);

    if let Some(existing) = ranges.iter().find(|r| r.owner == owner) {
        return Ok(existing.start);
    }

    find_gap_for_range(&ranges, desired_start, size, ceiling).ok_or_else(|| WardenError::NoSpace {
        space: "subuid".to_string(),
        lo: desired_start,
        hi: ceiling,
    })
}

/// Allocate (or return the existing) subuid range for `owner`, serialized
/// via the `"uid-alloc"` lock.
pub fn allocate_subuid_range(
    lock_dir: &Path,
    opts: LockOptions,
    paths: &IdentityPaths,
    owner: &str,
    desired_start: u64,
    size: u64,
    ceiling: u64,
) -> Result<u64> {
    with_lock(lock_dir, "uid-alloc", opts, || {
        allocate_subuid_range_locked(paths, owner, desired_start, size, ceiling)
    })
}

/// Create the host user `username` with the allocated `uid`, via the
/// command runner. Called from inside [`allocate_and_create_user`]'s lock
/// acquisition so the read-allocate-create cycle is atomic against
/// concurrent instances.
fn create_system_user(
    runner: &dyn CommandRunner,
    username: &str,
    uid: u32,
    useradd_binary: &str,
    cancel: Option<&CancellationToken>,
) -> Result<()> {
    let uid_str = uid.to_string();
    let args = ["-u", &uid_str, "-r", "-M", "-s", "/usr/sbin/nologin", username];
    let spec = CommandSpec {
        program: useradd_binary,
        args: &args,
        run_as: RunAs::default(),
        stdin: None,
        working_dir: None,
        cancel,
    };
    let output = runner.run(&spec)?;
    if !output.success() {
        return Err(WardenError::ExecFailure {
            command: useradd_binary.to_string(),
            stderr: output.stderr,
        });
    }
    info!(uid, username, "created system user");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutput;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every `useradd` invocation it receives.
    struct StubUseradd {
        invocations: Mutex<Vec<Vec<String>>>,
    }

    impl StubUseradd {
        fn new() -> Self {
            Self {
                invocations: Mutex::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for StubUseradd {
        fn run(&self, spec: &CommandSpec<'_>) -> Result<CommandOutput> {
            self.invocations
                .lock()
                .unwrap()
                .push(spec.args.iter().map(|s| s.to_string()).collect());
            Ok(CommandOutput {
                status_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn write_fixture(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn paths(dir: &TempDir, passwd: &str, subuid: &str) -> IdentityPaths {
        IdentityPaths {
            passwd: write_fixture(dir, "passwd", passwd),
            subuid: write_fixture(dir, "subuid", subuid),
            subgid: write_fixture(dir, "subgid", subuid),
        }
    }

    #[test]
    fn uid_of_finds_existing_user() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir, "alice:x:1000:1000::/home/alice:/bin/sh\n", "");
        assert_eq!(uid_of(&paths, "alice").unwrap(), Some(1000));
        assert_eq!(uid_of(&paths, "bob").unwrap(), None);
        assert!(user_exists(&paths, "alice").unwrap());
        assert!(!user_exists(&paths, "bob").unwrap());
    }

    #[test]
    fn allocate_uid_picks_smallest_free_in_range() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir, "a:x:10000:10000::/:/bin/sh\nb:x:10001:10001::/:/bin/sh\n", "");
        let lock_dir = dir.path().join("locks");
        let uid = allocate_uid(&lock_dir, LockOptions::default(), &paths, 10000, 59999).unwrap();
        assert_eq!(uid, 10002);
    }

    #[test]
    fn allocate_uid_exhausted_range_is_no_space() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir, "a:x:10:10::/:/bin/sh\n", "");
        let lock_dir = dir.path().join("locks");
        let result = allocate_uid(&lock_dir, LockOptions::default(), &paths, 10, 10);
        assert!(matches!(result, Err(WardenError::NoSpace { .. })));
    }

    #[test]
    fn allocate_subuid_range_is_idempotent_for_existing_owner() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir, "", "myservice:100000:65536\n");
        let lock_dir = dir.path().join("locks");
        let start = allocate_subuid_range(&lock_dir, LockOptions::default(), &paths, "myservice", 100000, 65536, 400000).unwrap();
        assert_eq!(start, 100000);
    }

    #[test]
    fn allocate_subuid_range_finds_gap_for_new_owner() {
        let dir = TempDir::new().unwrap();
        let paths = paths(
            &dir,
            "",
            "a:100000:65536\nb:200000:65536\n",
        );
        let lock_dir = dir.path().join("locks");
        let start = allocate_subuid_range(&lock_dir, LockOptions::default(), &paths, "newsvc", 100000, 65536, 400000).unwrap();
        assert_eq!(start, 265536);
    }

    #[test]
    fn allocate_and_create_user_runs_useradd_with_the_allocated_uid() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir, "a:x:10000:10000::/:/bin/sh\n", "");
        let lock_dir = dir.path().join("locks");
        let runner = StubUseradd::new();

        let uid = allocate_and_create_user(
            &runner,
            &lock_dir,
            LockOptions::default(),
            &paths,
            10000,
            59999,
            "newservice",
            "useradd",
            None,
        )
        .unwrap();

        assert_eq!(uid, 10001);
        let invocations = runner.invocations.lock().unwrap();
        assert_eq!(invocations.len(), 1);
        assert!(invocations[0].contains(&"10001".to_string()));
        assert!(invocations[0].contains(&"newservice".to_string()));
    }
}
