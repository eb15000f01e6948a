use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tags::keys;

/// Power state of a VM as reported by the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum VmState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
}

impl VmState {
    /// Every state except `terminated`; used to filter live instances.
    pub const LIVE: [VmState; 5] = [
        VmState::Pending,
        VmState::Running,
        VmState::Stopping,
        VmState::Stopped,
        VmState::ShuttingDown,
    ];

    /// Provider state name, e.g. `shutting-down`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised provider state name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown instance state '{0}'")]
pub struct UnknownState(pub String);

impl FromStr for VmState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            "shutting-down" => Ok(Self::ShuttingDown),
            "terminated" => Ok(Self::Terminated),
            other => Err(UnknownState(other.to_owned())),
        }
    }
}

/// Guest-side first-boot progress, read from the bootstrap tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapStatus {
    Pending,
    Complete,
    Failed,
    #[default]
    Unknown,
}

impl BootstrapStatus {
    /// Parse a tag value. Missing or unrecognised values are `Unknown`.
    #[must_use]
    pub fn from_tag(value: Option<&str>) -> Self {
        match value {
            Some("pending") => Self::Pending,
            Some("complete") => Self::Complete,
            Some("failed") => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// `complete` and `failed` end the bootstrap poll.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BootstrapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of one devbox VM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vm {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub state: VmState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_address: Option<String>,
    pub instance_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_time: Option<DateTime<Utc>>,
    pub bootstrap: BootstrapStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Vm {
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// True when the ownership tags match `(owner, name)` and the marker is present.
    #[must_use]
    pub fn is_owned_by(&self, owner: &str, name: &str) -> bool {
        self.tags.contains_key(keys::MANAGED)
            && self.tag(keys::OWNER) == Some(owner)
            && self.tag(keys::NAME) == Some(name)
    }
}

/// Outcome of `devbox start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionResult {
    pub instance_id: String,
    pub public_address: Option<String>,
    pub volume_id: Option<String>,
    pub allocation_id: Option<String>,
    pub restarted: bool,
    pub already_running: bool,
    pub bootstrap_status: BootstrapStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_error: Option<String>,
}

/// Outcome of `devbox destroy`. Warnings are in the order they occurred.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DestroyResult {
    pub instance_id: String,
    pub volumes_deleted: usize,
    pub address_released: bool,
    pub warnings: Vec<String>,
}

/// Outcome of `devbox resize`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResizeResult {
    pub instance_id: String,
    pub previous_type: String,
    pub new_type: String,
    /// The VM was running and has been stopped and started again.
    pub restarted: bool,
    pub message: String,
}

/// Outcome of `devbox stop`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StopResult {
    pub instance_id: String,
    pub already_stopped: bool,
}
