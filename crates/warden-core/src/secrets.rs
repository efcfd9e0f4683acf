//! Per-service secret lifecycle: generate-or-reuse values, reconcile with
//! the container engine's secret store, and keep an age-encrypted backup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{info, warn};

use crate::crypto::{decrypt, encrypt, ensure_keypair};
use crate::error::{Result, WardenError};
use crate::identity::{parse_key_value, to_key_value_text};
use crate::lock::{with_lock, LockOptions};
use crate::runner::{indicates_already_exists, CancellationToken, CommandRunner, CommandSpec, RunAs};

/// A secret a service wants provisioned: name, human description, and the
/// generated length to use if no existing value is found.
#[derive(Debug, Clone)]
pub struct SecretDefinition {
    pub name: String,
    pub description: String,
    pub length: usize,
}

impl SecretDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            length: 32,
        }
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }
}

/// Paths derived for a service's secret material, all rooted under the
/// service owner's home directory.
struct SecretPaths {
    key_path: PathBuf,
    backup_path: PathBuf,
}

fn derive_paths(home_dir: &Path, service: &str) -> SecretPaths {
    let key_dir = home_dir.join("config").join(".age");
    SecretPaths {
        key_path: key_dir.join(format!("{service}.key")),
        backup_path: home_dir.join("config").join(format!("{service}.secrets.age")),
    }
}

fn engine_secret_name(prefix: &str, service: &str, secret: &str) -> String {
    format!("{prefix}-{service}-{secret}")
}

fn generate_password(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn engine_secret_exists(
    runner: &dyn CommandRunner,
    engine_binary: &str,
    name: &str,
    cancel: Option<&CancellationToken>,
) -> Result<bool> {
    let args = ["secret", "exists", name];
    let spec = CommandSpec {
        program: engine_binary,
        args: &args,
        run_as: RunAs::default(),
        stdin: None,
        working_dir: None,
        cancel,
    };
    Ok(runner.run(&spec)?.success())
}

fn engine_secret_create(
    runner: &dyn CommandRunner,
    engine_binary: &str,
    name: &str,
    value: &str,
    cancel: Option<&CancellationToken>,
) -> Result<()> {
    let args = ["secret", "create", name, "-"];
    let spec = CommandSpec {
        program: engine_binary,
        args: &args,
        run_as: RunAs::default(),
        stdin: Some(value),
        working_dir: None,
        cancel,
    };
    let output = runner.run(&spec)?;
    if output.success() || indicates_already_exists(&output.stderr) {
        return Ok(());
    }
    Err(WardenError::ExecFailure {
        command: format!("{engine_binary} secret create {name}"),
        stderr: output.stderr,
    })
}

/// Load the prior secret bundle from `backup_path`, if it exists and
/// decrypts cleanly. A decryption failure on an existing backup is treated
/// as an empty prior bundle: a corrupt backup must not block provisioning,
/// at the cost of forcing regeneration of every secret in it.
fn load_prior_bundle(backup_path: &Path, secret_identity: &str) -> HashMap<String, String> {
    let Ok(ciphertext) = std::fs::read_to_string(backup_path) else {
        return HashMap::new();
    };
    match decrypt(&ciphertext, secret_identity) {
        Ok(plaintext) => parse_key_value(&plaintext),
        Err(e) => {
            warn!(path = %backup_path.display(), error = %e, "existing secret backup failed to decrypt, regenerating");
            HashMap::new()
        }
    }
}

/// Ensure `key_dir` exists, owned by `(owner_uid, owner_gid)`, mode 0700.
#[cfg(unix)]
fn ensure_key_dir(key_dir: &Path, owner_uid: u32, owner_gid: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::create_dir_all(key_dir).map_err(|source| WardenError::DirectoryCreate {
        path: key_dir.to_path_buf(),
        source,
    })?;
    std::fs::set_permissions(key_dir, std::fs::Permissions::from_mode(0o700)).map_err(|source| {
        WardenError::IoWrite {
            path: key_dir.to_path_buf(),
            source,
        }
    })?;
    // SAFETY: chown requires privilege the caller is expected to hold;
    // failure here surfaces as an IoWrite error rather than panicking.
    let path_c = std::ffi::CString::new(key_dir.as_os_str().as_encoded_bytes())
        .map_err(|_| WardenError::InvalidArgs(format!("non-UTF8 path: {key_dir:?}")))?;
    let rc = unsafe { libc::chown(path_c.as_ptr(), owner_uid, owner_gid) };
    if rc != 0 {
        return Err(WardenError::IoWrite {
            path: key_dir.to_path_buf(),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_key_dir(key_dir: &Path, _owner_uid: u32, _owner_gid: u32) -> Result<()> {
    std::fs::create_dir_all(key_dir).map_err(|source| WardenError::DirectoryCreate {
        path: key_dir.to_path_buf(),
        source,
    })
}

/// Generate-or-reuse every secret in `defs` for `service`, reconcile each
/// with the engine's secret store, and persist the complete bundle as an
/// age-encrypted backup.
///
/// The whole read-prior-bundle → generate-or-reuse → reconcile → write-backup
/// sequence runs under a `secrets-<service>` named lock ([`crate::lock`]), so
/// two concurrent invocations for the *same* service can't each observe the
/// same absent prior value, generate two different secrets, and race to
/// write conflicting backups. Concurrent invocations for *different*
/// services use different lock names and so don't serialize against each
/// other; the corresponding cross-service race on the engine's own secret
/// store is absorbed by `engine_secret_create`'s already-exists handling.
///
/// Idempotent: a second call with the same definitions reuses every value
/// from the prior backup and makes no further engine mutations.
#[allow(clippy::too_many_arguments)]
pub fn ensure_service_secrets(
    runner: &dyn CommandRunner,
    lock_dir: &Path,
    lock_opts: LockOptions,
    engine_binary: &str,
    secret_name_prefix: &str,
    service: &str,
    defs: &[SecretDefinition],
    owner_uid: u32,
    owner_gid: u32,
    home_dir: &Path,
    cancel: Option<&CancellationToken>,
) -> Result<HashMap<String, String>> {
    let lock_name = format!("secrets-{service}");
    with_lock(lock_dir, &lock_name, lock_opts, || {
        ensure_service_secrets_locked(
            runner,
            engine_binary,
            secret_name_prefix,
            service,
            defs,
            owner_uid,
            owner_gid,
            home_dir,
            cancel,
        )
    })
}

#[allow(clippy::too_many_arguments)]
fn ensure_service_secrets_locked(
    runner: &dyn CommandRunner,
    engine_binary: &str,
    secret_name_prefix: &str,
    service: &str,
    defs: &[SecretDefinition],
    owner_uid: u32,
    owner_gid: u32,
    home_dir: &Path,
    cancel: Option<&CancellationToken>,
) -> Result<HashMap<String, String>> {
    let paths = derive_paths(home_dir, service);
    let key_dir = paths
        .key_path
        .parent()
        .expect("key_path always has a parent")
        .to_path_buf();

    ensure_key_dir(&key_dir, owner_uid, owner_gid)?;
    let keypair = ensure_keypair(&paths.key_path)?;

    let prior = load_prior_bundle(&paths.backup_path, &keypair.secret_identity);

    let mut bundle = HashMap::new();
    for def in defs {
        let engine_name = engine_secret_name(secret_name_prefix, service, &def.name);
        let present_in_engine = engine_secret_exists(runner, engine_binary, &engine_name, cancel)?;
        let prior_value = prior.get(&def.name).cloned();

        let value = prior_value.unwrap_or_else(|| generate_password(def.length));

        if !present_in_engine {
            engine_secret_create(runner, engine_binary, &engine_name, &value, cancel)?;
            info!(service, secret = def.name, "created engine secret");
        } else {
            info!(service, secret = def.name, "reusing existing engine secret");
        }

        bundle.insert(def.name.clone(), value);
    }

    let plaintext = to_key_value_text(&bundle);
    let ciphertext = encrypt(&plaintext, &keypair.public_recipient)?;
    std::fs::write(&paths.backup_path, ciphertext).map_err(|source| WardenError::IoWrite {
        path: paths.backup_path.clone(),
        source,
    })?;

    Ok(bundle)
}

/// Decrypt the backup for `service` and return the value for `name`.
pub fn get_service_secret(service: &str, name: &str, home_dir: &Path) -> Result<String> {
    let bundle = decrypt_bundle(service, home_dir)?;
    bundle
        .get(name)
        .cloned()
        .ok_or_else(|| WardenError::NotFound {
            service: service.to_string(),
            name: name.to_string(),
        })
}

/// Decrypt the backup for `service` and return the set of secret names.
pub fn list_service_secrets(service: &str, home_dir: &Path) -> Result<Vec<String>> {
    let bundle = decrypt_bundle(service, home_dir)?;
    Ok(bundle.into_keys().collect())
}

fn decrypt_bundle(service: &str, home_dir: &Path) -> Result<HashMap<String, String>> {
    let paths = derive_paths(home_dir, service);
    let text = std::fs::read_to_string(&paths.key_path).map_err(|source| WardenError::IoRead {
        path: paths.key_path.clone(),
        source,
    })?;
    let secret_identity = text.trim().to_string();

    let ciphertext = std::fs::read_to_string(&paths.backup_path).map_err(|source| WardenError::IoRead {
        path: paths.backup_path.clone(),
        source,
    })?;
    let plaintext = decrypt(&ciphertext, &secret_identity)?;
    Ok(parse_key_value(&plaintext))
}
