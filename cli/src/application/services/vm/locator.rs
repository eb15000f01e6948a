//! VM Locator: resolve `(owner, name)` to at most one live instance.
//!
//! Imports only from `crate::domain`, `crate::application::ports` and
//! `devbox_common`.

use anyhow::{Context, Result};
use devbox_common::{MANAGED_VALUE, Vm, VmState, keys};

use crate::application::ports::{AddressAllocation, AddressDescriber, Filter, InstanceDescriber};
use crate::domain::{RequestContext, VmError};

/// Provider-side filters for the caller's live instances.
#[must_use]
pub fn instance_filters(ctx: &RequestContext) -> Vec<Filter> {
    let mut filters = ownership_filters(ctx);
    filters.push(Filter::new(
        "instance-state-name",
        VmState::LIVE.iter().map(|s| s.as_str().to_owned()).collect(),
    ));
    filters
}

/// Marker, owner and name tag filters; shared by instances and addresses.
#[must_use]
pub fn ownership_filters(ctx: &RequestContext) -> Vec<Filter> {
    vec![
        Filter::tag(keys::MANAGED, MANAGED_VALUE),
        Filter::tag(keys::OWNER, &ctx.owner),
        Filter::tag(keys::NAME, &ctx.name),
    ]
}

/// Find the caller's live VM, if any.
///
/// Filters are re-applied client-side. When more than one instance matches,
/// the most recently launched one wins.
///
/// # Errors
///
/// Returns an error if the describe call fails.
pub async fn find_vm(cloud: &impl InstanceDescriber, ctx: &RequestContext) -> Result<Option<Vm>> {
    let candidates = cloud
        .describe_instances(&ctx.region, &instance_filters(ctx))
        .await
        .with_context(|| format!("looking up VM {} in {}", ctx.label(), ctx.region))?;

    let mut live: Vec<Vm> = candidates
        .into_iter()
        .filter(|vm| vm.state != VmState::Terminated && vm.is_owned_by(&ctx.owner, &ctx.name))
        .collect();

    if live.len() > 1 {
        tracing::warn!(
            vm = %ctx.label(),
            instances = ?live.iter().map(|vm| vm.id.as_str()).collect::<Vec<_>>(),
            "more than one live instance carries the same owner and name; using the newest"
        );
    }
    live.sort_by(|a, b| a.launch_time.cmp(&b.launch_time));
    let found = live.pop();
    match &found {
        Some(vm) => tracing::debug!(instance = %vm.id, state = %vm.state, "located VM"),
        None => tracing::debug!(vm = %ctx.label(), "no live VM"),
    }
    Ok(found)
}

/// Like [`find_vm`] but absence is an error.
///
/// # Errors
///
/// Returns [`VmError::NotFound`] if no live VM matches.
pub async fn require_vm(cloud: &impl InstanceDescriber, ctx: &RequestContext) -> Result<Vm> {
    find_vm(cloud, ctx).await?.ok_or_else(|| {
        VmError::NotFound {
            owner: ctx.owner.clone(),
            name: ctx.name.clone(),
        }
        .into()
    })
}

/// Find the VM's reserved address: the id recorded on the instance first,
/// then any allocation carrying the ownership tags.
///
/// # Errors
///
/// Returns an error if the describe call fails.
pub async fn find_address(
    cloud: &impl AddressDescriber,
    ctx: &RequestContext,
    vm: &Vm,
) -> Result<Option<AddressAllocation>> {
    let filters = match vm.tag(keys::ALLOCATION_ID) {
        Some(id) => vec![Filter::new("allocation-id", vec![id.to_owned()])],
        None => ownership_filters(ctx),
    };
    let addresses = cloud
        .describe_addresses(&ctx.region, &filters)
        .await
        .with_context(|| format!("looking up the reserved address of {}", vm.id))?;
    Ok(addresses.into_iter().next())
}
