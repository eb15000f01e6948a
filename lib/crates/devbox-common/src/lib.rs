//! Types shared between the devbox CLI and the tools that consume its results
//! (SSH access, host-key pinning).

pub mod tags;
pub mod types;

pub use tags::{
    MANAGED_VALUE, TagError, keys, ownership_tags, role, validate_name, validate_owner,
    vm_display_name,
};
pub use types::*;
