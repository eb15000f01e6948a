//! Tag keys that form the durable identity and state record of a devbox VM.
//!
//! The cloud account is the only store devbox has. Everything it needs to
//! find a VM again lives in these tags.

use thiserror::Error;

/// Tag keys written on instances, volumes and address allocations.
pub mod keys {
    /// Presence marks a resource as managed by devbox.
    /// Value: always `"true"`.
    pub const MANAGED: &str = "devbox:managed";

    /// The user who owns the VM.
    pub const OWNER: &str = "devbox:owner";

    /// The VM's logical name within the owner's namespace.
    pub const NAME: &str = "devbox:name";

    /// Guest-reported bootstrap progress.
    /// Values: `pending` (set at launch), `complete` / `failed` (set by the guest).
    pub const BOOTSTRAP: &str = "devbox:bootstrap";

    /// Role of a volume.
    /// Values: [`super::role::PROJECT`] or [`super::role::PERSISTENT`].
    pub const VOLUME_ROLE: &str = "devbox:volume-role";

    /// On the instance: allocation id of its reserved public address.
    pub const ALLOCATION_ID: &str = "devbox:allocation-id";

    /// On the instance: id of its project volume.
    pub const PROJECT_VOLUME: &str = "devbox:project-volume";

    /// Provider display name.
    pub const DISPLAY_NAME: &str = "Name";
}

/// Values of [`keys::VOLUME_ROLE`].
pub mod role {
    /// Secondary data disk owned by one VM; deleted on destroy.
    pub const PROJECT: &str = "project";

    /// User-scoped storage shared across VM re-creations; never deleted.
    pub const PERSISTENT: &str = "persistent";
}

/// Value written under [`keys::MANAGED`].
pub const MANAGED_VALUE: &str = "true";

/// Invalid owner or VM name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("invalid owner '{0}': use 1-64 lowercase letters, digits, '.', '_' or '-', starting with a letter or digit")]
    InvalidOwner(String),

    #[error("invalid VM name '{0}': must match ^[a-z0-9]([a-z0-9-]{{0,61}}[a-z0-9])?$")]
    InvalidName(String),
}

/// The tags that identify a resource as belonging to `(owner, name)`.
#[must_use]
pub fn ownership_tags(owner: &str, name: &str) -> Vec<(String, String)> {
    vec![
        (keys::MANAGED.to_owned(), MANAGED_VALUE.to_owned()),
        (keys::OWNER.to_owned(), owner.to_owned()),
        (keys::NAME.to_owned(), name.to_owned()),
    ]
}

/// Provider-visible display name, e.g. `alice-dev`.
#[must_use]
pub fn vm_display_name(owner: &str, name: &str) -> String {
    format!("{owner}-{name}")
}

/// Validate an owner identifier before it is written into a tag or filter.
pub fn validate_owner(owner: &str) -> Result<(), TagError> {
    let valid = !owner.is_empty()
        && owner.len() <= 64
        && owner
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && owner
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(TagError::InvalidOwner(owner.to_owned()))
    }
}

/// Validate a VM name: a DNS-label style identifier.
pub fn validate_name(name: &str) -> Result<(), TagError> {
    let bytes = name.as_bytes();
    let label_char = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let valid = !bytes.is_empty()
        && bytes.len() <= 63
        && bytes.first().is_some_and(label_char)
        && bytes.last().is_some_and(label_char)
        && bytes.iter().all(|b| label_char(b) || *b == b'-');
    if valid {
        Ok(())
    } else {
        Err(TagError::InvalidName(name.to_owned()))
    }
}
