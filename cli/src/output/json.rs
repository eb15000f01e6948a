//! JSON output for `--json`.
//!
//! Successful results are pretty-printed to stdout as the serde form of the
//! result type. Failures are printed as an error object carrying a stable code.

use anyhow::{Context, Result};
use devbox_common::{TagError, Vm};
use serde::Serialize;

use crate::domain::{ConfigError, ProvisionError, VmError, WaitError};

/// Renders results as pretty-printed JSON on stdout.
pub struct JsonRenderer;

impl JsonRenderer {
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let out = serde_json::to_string_pretty(value).context("JSON serialization failed")?;
        println!("{out}");
        Ok(())
    }

    /// `{"exists": false}` when the caller has no VM.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_status(&self, vm: Option<&Vm>) -> Result<()> {
        match vm {
            Some(vm) => self.render(&serde_json::json!({ "exists": true, "vm": vm })),
            None => self.render(&serde_json::json!({ "exists": false })),
        }
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_config_set(&self, key: &str, value: &str) -> Result<()> {
        self.render(&serde_json::json!({ "key": key, "value": value }))
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_version(&self, version: &str) -> Result<()> {
        self.render(&serde_json::json!({ "version": version }))
    }
}

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Stable machine-readable code for an error chain.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<VmError>() {
            return match e {
                VmError::NotFound { .. } => "VM_NOT_FOUND",
                VmError::IllegalState { .. } => "ILLEGAL_STATE",
                VmError::SameInstanceType { .. } => "SAME_INSTANCE_TYPE",
                VmError::UnsupportedInstanceType { .. } => "UNSUPPORTED_INSTANCE_TYPE",
            };
        }
        if let Some(e) = cause.downcast_ref::<ProvisionError>() {
            return match e {
                ProvisionError::PreCheck { .. } => "PRECHECK_FAILED",
                ProvisionError::MidSequence { .. } => "PROVISION_INCOMPLETE",
            };
        }
        if let Some(e) = cause.downcast_ref::<WaitError>() {
            return match e {
                WaitError::TimedOut { .. } => "WAIT_TIMEOUT",
                WaitError::Cancelled { .. } => "CANCELLED",
                WaitError::Unreachable { .. } => "STATE_UNREACHABLE",
            };
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return "INVALID_CONFIG";
        }
        if cause.downcast_ref::<TagError>().is_some() {
            return "INVALID_IDENTITY";
        }
    }
    "COMMAND_FAILED"
}
