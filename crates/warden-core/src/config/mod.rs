//! Layered configuration for the allocator, secret, and sysctl components.
//!
//! Resolution order, poorest to richest precedence:
//! 1. Built-in defaults
//! 2. Config file (`/etc/warden/config.toml` or a path override)
//! 3. Environment variables (`WARDEN_UID_LO`, etc.)
//! 4. Explicit CLI flags

mod discovery;
mod types;

pub use discovery::{resolve_config, ConfigError, ConfigOverrides};
pub use types::{AllocatorConfig, Config, SecretsConfig, SysctlConfig};
