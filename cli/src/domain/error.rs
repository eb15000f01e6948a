//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use devbox_common::{BootstrapStatus, VmState};
use thiserror::Error;

use crate::domain::config::VolumeTier;

// ── VM precondition errors ────────────────────────────────────────────────────

/// Fatal preconditions. Returned before any mutating call is made.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("No VM named '{name}' found for owner '{owner}'. Run 'devbox start' to create one.")]
    NotFound { owner: String, name: String },

    #[error("VM '{name}' is {state}; {operation} requires it to be {expected}.")]
    IllegalState {
        name: String,
        state: VmState,
        operation: &'static str,
        expected: &'static str,
    },

    #[error("{name} is already running instance type {instance_type}")]
    SameInstanceType { name: String, instance_type: String },

    #[error("instance type '{requested}' is not offered in {region}")]
    UnsupportedInstanceType { requested: String, region: String },
}

// ── Provisioning errors ───────────────────────────────────────────────────────

/// Provisioning failures, split by whether anything was created yet.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("cannot {step}; no resources were created: {cause:#}")]
    PreCheck {
        step: &'static str,
        cause: anyhow::Error,
    },

    #[error(
        "{step} failed after creating {created}. Nothing was rolled back; \
         run 'devbox destroy' to clean up or 'devbox start' to retry: {cause:#}"
    )]
    MidSequence {
        step: &'static str,
        created: String,
        cause: anyhow::Error,
    },
}

// ── Wait errors ───────────────────────────────────────────────────────────────

/// Bounded waits on instance state.
#[derive(Debug, Error)]
pub enum WaitError {
    #[error(
        "timed out after {waited_secs}s waiting for {instance_id} to become {target} (last state: {last})"
    )]
    TimedOut {
        instance_id: String,
        target: VmState,
        last: String,
        waited_secs: u64,
    },

    #[error("cancelled while waiting for {instance_id} to become {target}")]
    Cancelled { instance_id: String, target: VmState },

    #[error("{instance_id} is {state} and can no longer become {target}")]
    Unreachable {
        instance_id: String,
        target: VmState,
        state: VmState,
    },
}

// ── Bootstrap errors ──────────────────────────────────────────────────────────

/// Why the guest bootstrap did not reach `complete`. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootstrapError {
    #[error("bootstrap reported failure; see /var/log/devbox-bootstrap.log on the VM")]
    Failed,

    #[error("bootstrap did not finish within {waited_secs}s (last status: {last})")]
    TimedOut {
        waited_secs: u64,
        last: BootstrapStatus,
    },

    #[error("bootstrap wait cancelled (last status: {last})")]
    Cancelled { last: BootstrapStatus },
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration key/value validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting: {key}\n\nValid settings: {valid}")]
    UnknownKey { key: String, valid: String },

    #[error("Invalid value for {key}: {value}\n\nValid values: {valid}")]
    InvalidValue {
        key: String,
        value: String,
        valid: String,
    },

    #[error("A {tier} volume must be at least {min_gib} GiB (configured: {size_gib} GiB)")]
    VolumeTooSmall {
        tier: VolumeTier,
        size_gib: u32,
        min_gib: u32,
    },

    #[error("Cannot determine VM owner. Set one with: devbox config set owner <name>")]
    MissingOwner,
}
