//! Request-scoped identity of the VM an invocation operates on.

use anyhow::Result;

use crate::domain::config::DevboxConfig;
use crate::domain::error::ConfigError;

/// Who and where: built once per invocation and passed to every service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub owner: String,
    pub name: String,
    pub region: String,
}

impl RequestContext {
    /// Validate and build a context.
    ///
    /// # Errors
    ///
    /// Returns an error if the owner or name would not be a valid tag value.
    pub fn new(owner: &str, name: &str, region: &str) -> Result<Self> {
        devbox_common::validate_owner(owner)?;
        devbox_common::validate_name(name)?;
        Ok(Self {
            owner: owner.to_owned(),
            name: name.to_owned(),
            region: region.to_owned(),
        })
    }

    /// Resolve the context from config, an optional `--name` override, and
    /// the caller's environment values (`DEVBOX_OWNER`/`USER`, `DEVBOX_REGION`/`AWS_REGION`).
    ///
    /// # Errors
    ///
    /// Returns an error if no owner can be determined or validation fails.
    pub fn resolve(
        config: &DevboxConfig,
        name_override: Option<&str>,
        env_owner: Option<&str>,
        env_region: Option<&str>,
    ) -> Result<Self> {
        let owner = config
            .owner
            .as_deref()
            .or(env_owner)
            .map(str::to_lowercase)
            .ok_or(ConfigError::MissingOwner)?;
        let name = name_override.unwrap_or(&config.name);
        let region = env_region.unwrap_or(&config.region);
        Self::new(&owner, name, region)
    }

    /// e.g. `alice/dev`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}
