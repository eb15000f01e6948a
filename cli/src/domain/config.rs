//! Domain types and validators for devbox configuration.
//!
//! Pure functions only. No I/O, no async.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

pub const VALID_CONFIG_KEYS: &[&str] = &[
    "owner",
    "name",
    "region",
    "instance.type",
    "instance.image_id",
    "instance.subnet_id",
    "instance.key_name",
    "instance.instance_profile",
    "volume.size_gib",
    "volume.tier",
    "bootstrap.timeout_secs",
    "waits.timeout_secs",
    "waits.wait_for_termination",
];

pub const VALID_VOLUME_TIERS: &[&str] = &["standard", "performance", "provisioned"];

/// Provider limits for a gp3/io2 data volume.
const VOLUME_SIZE_RANGE: std::ops::RangeInclusive<u32> = 1..=16_384;

// ── Volume tier ──────────────────────────────────────────────────────────────

/// Performance tier of the project data volume.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VolumeTier {
    #[default]
    Standard,
    Performance,
    Provisioned,
}

/// Provider parameters a tier maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumePerformance {
    pub volume_type: &'static str,
    pub iops: u32,
    /// MB/s; only meaningful for gp3.
    pub throughput: Option<u32>,
    /// Smallest volume that can carry `iops` (gp3 and io2 allow 500 IOPS per GiB).
    pub min_size_gib: u32,
}

impl VolumeTier {
    #[must_use]
    pub fn performance(self) -> VolumePerformance {
        match self {
            Self::Standard => VolumePerformance {
                volume_type: "gp3",
                iops: 3000,
                throughput: Some(125),
                min_size_gib: 1,
            },
            Self::Performance => VolumePerformance {
                volume_type: "gp3",
                iops: 6000,
                throughput: Some(500),
                min_size_gib: 12,
            },
            Self::Provisioned => VolumePerformance {
                volume_type: "io2",
                iops: 16_000,
                throughput: None,
                min_size_gib: 32,
            },
        }
    }

    /// Check that a volume of `size_gib` can be created at this tier.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::VolumeTooSmall`] below the tier's minimum size.
    pub fn check_size(self, size_gib: u32) -> Result<(), ConfigError> {
        let min_gib = self.performance().min_size_gib;
        if size_gib < min_gib {
            return Err(ConfigError::VolumeTooSmall {
                tier: self,
                size_gib,
                min_gib,
            });
        }
        Ok(())
    }
}

impl fmt::Display for VolumeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Standard => "standard",
            Self::Performance => "performance",
            Self::Provisioned => "provisioned",
        })
    }
}

impl FromStr for VolumeTier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "performance" => Ok(Self::Performance),
            "provisioned" => Ok(Self::Provisioned),
            other => Err(ConfigError::InvalidValue {
                key: "volume.tier".to_string(),
                value: other.to_string(),
                valid: VALID_VOLUME_TIERS.join(", "),
            }),
        }
    }
}

// ── Poll policy ──────────────────────────────────────────────────────────────

/// Fixed-interval poll bounded by a total timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.devbox/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevboxConfig {
    /// Owner tag value. Falls back to `$DEVBOX_OWNER`, then `$USER`.
    pub owner: Option<String>,
    /// VM name within the owner's namespace.
    pub name: String,
    pub region: String,
    pub instance: InstanceConfig,
    pub volume: VolumeConfig,
    pub bootstrap: BootstrapConfig,
    pub waits: WaitConfig,
}

impl Default for DevboxConfig {
    fn default() -> Self {
        Self {
            owner: None,
            name: "dev".to_string(),
            region: "us-east-1".to_string(),
            instance: InstanceConfig::default(),
            volume: VolumeConfig::default(),
            bootstrap: BootstrapConfig::default(),
            waits: WaitConfig::default(),
        }
    }
}

/// Compute instance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    #[serde(rename = "type")]
    pub instance_type: String,
    /// Pin an exact image; skips the name-pattern lookup.
    pub image_id: Option<String>,
    pub image_name_pattern: String,
    pub image_owner: String,
    /// Pin a subnet; otherwise the region's default subnet is used.
    pub subnet_id: Option<String>,
    pub security_groups: Vec<String>,
    pub key_name: Option<String>,
    /// IAM instance profile that lets the guest tag itself.
    pub instance_profile: Option<String>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            instance_type: "t3.medium".to_string(),
            image_id: None,
            image_name_pattern: "ubuntu/images/hvm-ssd-gp3/ubuntu-noble-24.04-amd64-server-*"
                .to_string(),
            image_owner: "099720109477".to_string(),
            subnet_id: None,
            security_groups: vec!["devbox".to_string()],
            key_name: None,
            instance_profile: Some("devbox-instance".to_string()),
        }
    }
}

/// Project data volume settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub size_gib: u32,
    pub tier: VolumeTier,
    pub device: String,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            size_gib: 50,
            tier: VolumeTier::Standard,
            device: "/dev/sdf".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub timeout_secs: u64,
    pub interval_secs: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 900,
            interval_secs: 10,
        }
    }
}

/// Instance state waits (running, stopped, terminated).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    pub timeout_secs: u64,
    pub interval_secs: u64,
    /// Wait for `terminated` before deleting attached volumes.
    pub wait_for_termination: bool,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            interval_secs: 5,
            wait_for_termination: true,
        }
    }
}

impl DevboxConfig {
    #[must_use]
    pub fn bootstrap_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.bootstrap.interval_secs.max(1)),
            timeout: Duration::from_secs(self.bootstrap.timeout_secs),
        }
    }

    #[must_use]
    pub fn wait_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.waits.interval_secs.max(1)),
            timeout: Duration::from_secs(self.waits.timeout_secs),
        }
    }

    /// Apply a validated `config set` to this config.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value is invalid for it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_config_key(key)?;
        validate_config_value(key, value)?;
        match key {
            "volume.size_gib" => self.volume.tier.check_size(parse_number(key, value)?)?,
            "volume.tier" => value.parse::<VolumeTier>()?.check_size(self.volume.size_gib)?,
            _ => {}
        }
        let optional = |v: &str| (!v.is_empty()).then(|| v.to_string());
        match key {
            "owner" => self.owner = optional(value),
            "name" => value.clone_into(&mut self.name),
            "region" => value.clone_into(&mut self.region),
            "instance.type" => value.clone_into(&mut self.instance.instance_type),
            "instance.image_id" => self.instance.image_id = optional(value),
            "instance.subnet_id" => self.instance.subnet_id = optional(value),
            "instance.key_name" => self.instance.key_name = optional(value),
            "instance.instance_profile" => self.instance.instance_profile = optional(value),
            "volume.size_gib" => self.volume.size_gib = parse_number(key, value)?,
            "volume.tier" => self.volume.tier = value.parse()?,
            "bootstrap.timeout_secs" => self.bootstrap.timeout_secs = parse_number(key, value)?,
            "waits.timeout_secs" => self.waits.timeout_secs = parse_number(key, value)?,
            "waits.wait_for_termination" => {
                self.waits.wait_for_termination = parse_bool(key, value)?;
            }
            _ => {
                return Err(ConfigError::UnknownKey {
                    key: key.to_string(),
                    valid: VALID_CONFIG_KEYS.join(", "),
                }
                .into());
            }
        }
        Ok(())
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a configuration key against the whitelist.
///
/// # Errors
///
/// Returns an error if the key is not in the allowed list.
pub fn validate_config_key(key: &str) -> Result<()> {
    if !VALID_CONFIG_KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey {
            key: key.to_string(),
            valid: VALID_CONFIG_KEYS.join(", "),
        }
        .into());
    }
    Ok(())
}

/// Validates a configuration value for the given key.
///
/// # Errors
///
/// Returns an error if the value is not valid for the key.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    match key {
        "owner" if !value.is_empty() => devbox_common::validate_owner(value)?,
        "name" => devbox_common::validate_name(value)?,
        "region" | "instance.type" if value.is_empty() => {
            return Err(invalid(key, value, "a non-empty identifier"));
        }
        "volume.tier" => {
            value.parse::<VolumeTier>()?;
        }
        "volume.size_gib" => {
            let size: u32 = parse_number(key, value)?;
            if !VOLUME_SIZE_RANGE.contains(&size) {
                return Err(invalid(key, value, "1-16384"));
            }
        }
        "bootstrap.timeout_secs" | "waits.timeout_secs" => {
            parse_number::<u64>(key, value)?;
        }
        "waits.wait_for_termination" => {
            parse_bool(key, value)?;
        }
        _ => {}
    }
    Ok(())
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| invalid(key, value, "a positive integer"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid(key, value, "true, false")),
    }
}

fn invalid(key: &str, value: &str, valid: &str) -> anyhow::Error {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        valid: valid.to_string(),
    }
    .into()
}

// ── Unit tests ───────────────────────────────────────────────────────────────
