//! Age-based envelope encryption for per-service secret backups.
//!
//! A service's backup is encrypted to a single recipient keypair generated
//! on first use and persisted at a fixed path. All crypto failures collapse
//! to [`WardenError::Crypto`] with the underlying cause preserved where the
//! `age` crate exposes one.

use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

use age::secrecy::ExposeSecret;
use age::x25519;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::{Result, WardenError};

/// An X25519 keypair: public recipient and secret identity, both in their
/// bech32 text encoding.
#[derive(Debug, Clone)]
pub struct AgeKeypair {
    pub public_recipient: String,
    pub secret_identity: String,
}

fn crypto_err(message: impl Into<String>) -> WardenError {
    WardenError::Crypto {
        message: message.into(),
        source: None,
    }
}

fn crypto_err_source(
    message: impl Into<String>,
    source: impl std::error::Error + Send + Sync + 'static,
) -> WardenError {
    WardenError::Crypto {
        message: message.into(),
        source: Some(Box::new(source)),
    }
}

/// Generate a fresh X25519 keypair.
pub fn generate_keypair() -> AgeKeypair {
    let identity = x25519::Identity::generate();
    let recipient = identity.to_public();
    AgeKeypair {
        public_recipient: recipient.to_string(),
        secret_identity: identity.to_string().expose_secret().to_string(),
    }
}

/// Encrypt `plaintext` to `recipient`, returning base64 text of the age
/// ciphertext.
pub fn encrypt(plaintext: &str, recipient: &str) -> Result<String> {
    let recipient = x25519::Recipient::from_str(recipient)
        .map_err(|e| crypto_err(format!("invalid recipient: {e}")))?;

    let encryptor = age::Encryptor::with_recipients(vec![Box::new(recipient)])
        .ok_or_else(|| crypto_err("failed to construct encryptor"))?;

    let mut ciphertext = Vec::new();
    let mut writer = encryptor
        .wrap_output(&mut ciphertext)
        .map_err(|e| crypto_err_source("failed to wrap age output", e))?;
    writer
        .write_all(plaintext.as_bytes())
        .map_err(|e| crypto_err_source("failed to write plaintext", e))?;
    writer
        .finish()
        .map_err(|e| crypto_err_source("failed to finalize ciphertext", e))?;

    Ok(BASE64.encode(&ciphertext))
}

/// Decrypt base64-encoded age ciphertext with `identity`.
pub fn decrypt(base64_text: &str, identity: &str) -> Result<String> {
    let identity = x25519::Identity::from_str(identity)
        .map_err(|e| crypto_err(format!("invalid identity: {e}")))?;

    let ciphertext = BASE64
        .decode(base64_text.trim())
        .map_err(|e| crypto_err(format!("malformed base64 ciphertext: {e}")))?;

    let decryptor = age::Decryptor::new(&ciphertext[..])
        .map_err(|e| crypto_err_source("failed to parse age header", e))?;

    let mut plaintext = Vec::new();
    let mut reader = decryptor
        .decrypt(std::iter::once(&identity as &dyn age::Identity))
        .map_err(|e| crypto_err_source("decryption failed", e))?;
    reader
        .read_to_end(&mut plaintext)
        .map_err(|e| crypto_err_source("failed to read decrypted plaintext", e))?;

    String::from_utf8(plaintext).map_err(|e| crypto_err(format!("decrypted payload is not UTF-8: {e}")))
}

/// Ensure a keypair exists at `path`: exclusive-create a file containing
/// `"<secret>\n"` and return the newly generated pair; on `EEXIST`, read
/// the existing secret back and re-derive its public recipient.
///
/// The exclusive-create makes this race-safe against concurrent first use:
/// only one caller ever wins the create, everyone else falls back to the
/// read path.
pub fn ensure_keypair(path: &Path) -> Result<AgeKeypair> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| WardenError::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let keypair = generate_keypair();
    let contents = format!("{}\n", keypair.secret_identity);

    match std::fs::OpenOptions::new()
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
            set_owner_only_permissions(path)?;
            Ok(keypair)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => read_existing_keypair(path),
        Err(source) => Err(WardenError::IoWrite {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn read_existing_keypair(path: &Path) -> Result<AgeKeypair> {
    let text = std::fs::read_to_string(path).map_err(|source| WardenError::IoRead {
        path: path.to_path_buf(),
        source,
    })?;
    let secret_identity = text.trim().to_string();
    let identity = x25519::Identity::from_str(&secret_identity)
        .map_err(|e| crypto_err(format!("existing keypair at {path:?} is corrupt: {e}")))?;
    Ok(AgeKeypair {
        public_recipient: identity.to_public().to_string(),
        secret_identity,
    })
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms).map_err(|source| WardenError::IoWrite {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
