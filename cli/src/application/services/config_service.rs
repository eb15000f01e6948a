//! Application service: configuration use-cases.

use anyhow::{Context, Result};

use crate::application::ports::ConfigStore;
use crate::domain::DevboxConfig;

/// Load configuration.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
pub fn load_config(store: &impl ConfigStore) -> Result<DevboxConfig> {
    store.load()
}

/// Validate and persist a single `key = value` change; returns the new config.
///
/// # Errors
///
/// Returns an error if the key or value is invalid or the file cannot be written.
pub fn set_value(store: &impl ConfigStore, key: &str, value: &str) -> Result<DevboxConfig> {
    let mut config = store.load()?;
    config.set(key, value)?;
    store
        .save(&config)
        .with_context(|| format!("saving {key}"))?;
    tracing::debug!(key, value, "config updated");
    Ok(config)
}
