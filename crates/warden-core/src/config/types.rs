//! Typed configuration for the allocation, secret, and sysctl components.
//!
//! Every field carries `serde(default)` so a partial TOML file only
//! overrides what it mentions; the rest falls back to the built-in
//! defaults named in the component design.

use serde::{Deserialize, Serialize};

/// Complete configuration: one section per tunable component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub allocator: AllocatorConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub sysctl: SysctlConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allocator: AllocatorConfig::default(),
            secrets: SecretsConfig::default(),
            sysctl: SysctlConfig::default(),
        }
    }
}

/// Tunables for the UID allocator (component D) and the lock it runs
/// under (component C).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    pub uid_lo: u32,
    pub uid_hi: u32,
    pub subuid_start: u64,
    pub subuid_size: u64,
    pub subuid_ceiling: u64,
    pub lock_dir: String,
    pub staleness_horizon_ms: u64,
    pub max_wait_ms: u64,
    pub retry_interval_ms: u64,
    pub useradd_binary: String,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            uid_lo: 10_000,
            uid_hi: 59_999,
            subuid_start: 100_000,
            subuid_size: 65_536,
            subuid_ceiling: 4_294_967_295,
            lock_dir: "/run/warden/locks".to_string(),
            staleness_horizon_ms: crate::lock::DEFAULT_STALENESS_HORIZON_MS,
            max_wait_ms: 5_000,
            retry_interval_ms: 100,
            useradd_binary: "useradd".to_string(),
        }
    }
}

impl AllocatorConfig {
    /// Structural validation: `uid_lo <= uid_hi` and a non-zero subuid size.
    pub fn validate(&self) -> Result<(), String> {
        if self.uid_lo > self.uid_hi {
            return Err(format!(
                "uid_lo ({}) must not exceed uid_hi ({})",
                self.uid_lo, self.uid_hi
            ));
        }
        if self.subuid_size == 0 {
            return Err("subuid_size must be non-zero".to_string());
        }
        Ok(())
    }

    pub fn lock_options(&self) -> crate::lock::LockOptions {
        crate::lock::LockOptions {
            max_wait_ms: self.max_wait_ms,
            retry_interval_ms: self.retry_interval_ms,
            staleness_horizon_ms: self.staleness_horizon_ms,
        }
    }
}

/// Tunables for the secret lifecycle (component F).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub engine_binary: String,
    pub secret_name_prefix: String,
    pub default_secret_length: usize,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            engine_binary: "podman".to_string(),
            secret_name_prefix: "warden".to_string(),
            default_secret_length: 32,
        }
    }
}

/// Tunables for the sysctl configurator (component G).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SysctlConfig {
    pub unprivileged_port_threshold: u32,
    pub drop_in_path: String,
    pub sysctl_key: String,
}

impl Default for SysctlConfig {
    fn default() -> Self {
        Self {
            unprivileged_port_threshold: 80,
            drop_in_path: "/etc/sysctl.d/99-warden-unprivileged-ports.conf".to_string(),
            sysctl_key: "net.ipv4.ip_unprivileged_port_start".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_bounds() {
        let config = Config::default();
        assert_eq!(config.allocator.uid_lo, 10_000);
        assert_eq!(config.allocator.uid_hi, 59_999);
        assert_eq!(config.allocator.subuid_start, 100_000);
        assert_eq!(config.allocator.subuid_size, 65_536);
        assert_eq!(config.secrets.default_secret_length, 32);
        assert_eq!(config.sysctl.unprivileged_port_threshold, 80);
        assert_eq!(config.allocator.useradd_binary, "useradd");
    }

    #[test]
    fn serialization_round_trips() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.allocator.uid_lo, deserialized.allocator.uid_lo);
        assert_eq!(config.secrets.engine_binary, deserialized.secrets.engine_binary);
    }

    #[test]
    fn partial_toml_only_overrides_mentioned_fields() {
        let toml_str = "[allocator]\nuid_lo = 20000\n";
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.allocator.uid_lo, 20000);
        assert_eq!(config.allocator.uid_hi, 59_999);
        assert_eq!(config.secrets.engine_binary, "podman");
    }

    #[test]
    fn validate_rejects_inverted_uid_bounds() {
        let mut config = AllocatorConfig::default();
        config.uid_lo = 100;
        config.uid_hi = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_subuid_size() {
        let mut config = AllocatorConfig::default();
        config.subuid_size = 0;
        assert!(config.validate().is_err());
    }
}
