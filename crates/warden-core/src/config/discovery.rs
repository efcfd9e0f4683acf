//! Layered configuration resolution: defaults → file → environment → CLI.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use super::types::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("{0}")]
    Validation(String),
}

/// Command-line overrides layered on top of file and environment config.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub uid_lo: Option<u32>,
    pub uid_hi: Option<u32>,
    pub lock_dir: Option<String>,
    pub engine_binary: Option<String>,
}

const DEFAULT_CONFIG_PATH: &str = "/etc/warden/config.toml";

/// Resolve configuration from all sources, poorest to richest precedence:
/// built-in defaults → config file → environment variables → CLI flags.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    let config_path = overrides
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    if config_path.exists() {
        match load_config_file(&config_path) {
            Ok(file_config) => config = file_config,
            Err(e) => warn!(path = %config_path.display(), error = %e, "failed to parse config file, using defaults"),
        }
    }

    apply_env_overrides(&mut config);
    apply_cli_overrides(&mut config, overrides);

    config
        .allocator
        .validate()
        .map_err(ConfigError::Validation)?;

    Ok(config)
}

fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn apply_env_overrides(config: &mut Config) {
    if let Some(v) = env_u32("WARDEN_UID_LO") {
        config.allocator.uid_lo = v;
    }
    if let Some(v) = env_u32("WARDEN_UID_HI") {
        config.allocator.uid_hi = v;
    }
    if let Some(v) = env_u64("WARDEN_SUBUID_START") {
        config.allocator.subuid_start = v;
    }
    if let Some(v) = env_u64("WARDEN_SUBUID_SIZE") {
        config.allocator.subuid_size = v;
    }
    if let Some(v) = env_u64("WARDEN_SUBUID_CEILING") {
        config.allocator.subuid_ceiling = v;
    }
    if let Ok(v) = std::env::var("WARDEN_LOCK_DIR") {
        config.allocator.lock_dir = v;
    }
    if let Some(v) = env_u64("WARDEN_STALENESS_HORIZON_MS") {
        config.allocator.staleness_horizon_ms = v;
    }
    if let Ok(v) = std::env::var("WARDEN_USERADD_BINARY") {
        config.allocator.useradd_binary = v;
    }
    if let Ok(v) = std::env::var("WARDEN_ENGINE_BINARY") {
        config.secrets.engine_binary = v;
    }
    if let Ok(v) = std::env::var("WARDEN_SECRET_NAME_PREFIX") {
        config.secrets.secret_name_prefix = v;
    }
    if let Some(v) = env_u32("WARDEN_UNPRIVILEGED_PORT_THRESHOLD") {
        config.sysctl.unprivileged_port_threshold = v;
    }
}

fn apply_cli_overrides(config: &mut Config, overrides: &ConfigOverrides) {
    if let Some(v) = overrides.uid_lo {
        config.allocator.uid_lo = v;
    }
    if let Some(v) = overrides.uid_hi {
        config.allocator.uid_hi = v;
    }
    if let Some(ref v) = overrides.lock_dir {
        config.allocator.lock_dir = v.clone();
    }
    if let Some(ref v) = overrides.engine_binary {
        config.secrets.engine_binary = v.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env() {
        for key in [
            "WARDEN_UID_LO",
            "WARDEN_UID_HI",
            "WARDEN_SUBUID_START",
            "WARDEN_SUBUID_SIZE",
            "WARDEN_SUBUID_CEILING",
            "WARDEN_LOCK_DIR",
            "WARDEN_STALENESS_HORIZON_MS",
            "WARDEN_USERADD_BINARY",
            "WARDEN_ENGINE_BINARY",
            "WARDEN_SECRET_NAME_PREFIX",
            "WARDEN_UNPRIVILEGED_PORT_THRESHOLD",
        ] {
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn defaults_when_nothing_overrides() {
        clear_env();
        let overrides = ConfigOverrides {
            config_path: Some(PathBuf::from("/nonexistent/warden.toml")),
            ..Default::default()
        };
        let config = resolve_config(&overrides).unwrap();
        assert_eq!(config.allocator.uid_lo, 10_000);
        assert_eq!(config.secrets.engine_binary, "podman");
    }

    #[test]
    #[serial]
    fn env_overrides_defaults() {
        clear_env();
        unsafe { env::set_var("WARDEN_UID_LO", "20000") };
        let overrides = ConfigOverrides {
            config_path: Some(PathBuf::from("/nonexistent/warden.toml")),
            ..Default::default()
        };
        let config = resolve_config(&overrides).unwrap();
        assert_eq!(config.allocator.uid_lo, 20000);
        clear_env();
    }

    #[test]
    #[serial]
    fn cli_overrides_beat_env() {
        clear_env();
        unsafe { env::set_var("WARDEN_UID_LO", "20000") };
        let overrides = ConfigOverrides {
            config_path: Some(PathBuf::from("/nonexistent/warden.toml")),
            uid_lo: Some(30000),
            ..Default::default()
        };
        let config = resolve_config(&overrides).unwrap();
        assert_eq!(config.allocator.uid_lo, 30000);
        clear_env();
    }

    #[test]
    fn config_file_is_loaded_when_present() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[allocator]\nuid_lo = 15000\nuid_hi = 16000\n").unwrap();

        let overrides = ConfigOverrides {
            config_path: Some(path),
            ..Default::default()
        };
        let config = resolve_config(&overrides).unwrap();
        assert_eq!(config.allocator.uid_lo, 15000);
        assert_eq!(config.allocator.uid_hi, 16000);
    }

    #[test]
    fn invalid_bounds_fail_validation() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[allocator]\nuid_lo = 99999\nuid_hi = 1\n").unwrap();

        let overrides = ConfigOverrides {
            config_path: Some(path),
            ..Default::default()
        };
        let result = resolve_config(&overrides);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn malformed_config_file_falls_back_to_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not valid toml [[[").unwrap();

        let overrides = ConfigOverrides {
            config_path: Some(path),
            ..Default::default()
        };
        let config = resolve_config(&overrides).unwrap();
        assert_eq!(config.allocator.uid_lo, 10_000);
    }
}
