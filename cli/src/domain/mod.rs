//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod context;
pub mod error;
pub mod vm;

pub use config::{DevboxConfig, PollPolicy, VolumeTier, validate_config_key, validate_config_value};
pub use context::RequestContext;
pub use error::{BootstrapError, ConfigError, ProvisionError, VmError, WaitError};
