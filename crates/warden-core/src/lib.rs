//! Allocation and safety layer for rootless container host provisioning.
//!
//! This crate owns the parts of the system that must be correct under
//! concurrent invocation, partial failure, and state left behind by a
//! crashed predecessor: parsing the host's identity databases, finding
//! free UID/subuid ranges, a cross-process lock with stale-owner takeover,
//! age-encrypted secret backups reconciled against a container engine's
//! secret store, and the sysctl knob that enables unprivileged low-port
//! binding. A `CommandRunner` trait is the only seam between this crate
//! and the outside world for anything that spawns a process.

pub mod config;
pub mod crypto;
pub mod error;
pub mod home;
pub mod identity;
pub mod lock;
pub mod logging;
pub mod range;
pub mod runner;
pub mod secrets;
pub mod sysctl;
pub mod uid_allocator;

pub use error::{Result, WardenError};

// Re-export toml for CLI config subcommands.
pub use toml;
