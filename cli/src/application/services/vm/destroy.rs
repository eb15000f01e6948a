//! Destroyer: best-effort teardown of a VM and the resources devbox made for it.
//!
//! Only instance termination can fail the operation. Every later step
//! records a warning and carries on. Volumes tagged with the persistent role,
//! and untagged volumes, are never deleted.

use anyhow::{Context, Result};
use devbox_common::{DestroyResult, Vm};

use super::locator::{find_address, require_vm};
use super::poll::WaitContext;
use super::wait;
use crate::application::ports::{
    AddressAllocation, Clock, Filter, ProgressReporter, TeardownCloud, Volume,
};
use crate::domain::RequestContext;
use crate::domain::vm::is_project_volume;

#[derive(Debug, Clone, Copy)]
pub struct DestroyOptions {
    /// Wait for `terminated` before deleting volumes.
    pub wait_for_termination: bool,
}

/// Collects warnings in the order they occur and mirrors them to the reporter.
struct Warnings<'a, R: ProgressReporter> {
    reporter: &'a R,
    items: Vec<String>,
}

impl<R: ProgressReporter> Warnings<'_, R> {
    fn push(&mut self, message: String) {
        tracing::warn!("{message}");
        self.reporter.warn(&message);
        self.items.push(message);
    }
}

/// Terminate the caller's VM and clean up its project volumes and address.
///
/// # Errors
///
/// Returns [`crate::domain::VmError::NotFound`] if there is no VM, or the
/// terminate error. Everything after terminate is reported as warnings.
pub async fn destroy(
    cloud: &impl TeardownCloud,
    ctx: &RequestContext,
    opts: DestroyOptions,
    waits: &WaitContext<'_, impl Clock>,
    reporter: &impl ProgressReporter,
) -> Result<DestroyResult> {
    let vm = require_vm(cloud, ctx).await?;
    let region = ctx.region.as_str();
    let mut warnings = Warnings {
        reporter,
        items: Vec::new(),
    };

    // Discovery happens while the attachments are still visible.
    let volumes = match project_volumes(cloud, region, &vm).await {
        Ok(volumes) => volumes,
        Err(e) => {
            warnings.push(format!("could not list volumes of {}: {e:#}", vm.id));
            Vec::new()
        }
    };
    let address = match find_address(cloud, ctx, &vm).await {
        Ok(address) => address,
        Err(e) => {
            warnings.push(format!("{e:#}"));
            None
        }
    };
    tracing::info!(
        instance = %vm.id,
        volumes = ?volumes.iter().map(|v| v.id.as_str()).collect::<Vec<_>>(),
        address = ?address.as_ref().map(|a| a.allocation_id.as_str()),
        "destroy"
    );

    reporter.step(&format!("terminating {}...", vm.id));
    cloud
        .terminate_instance(region, &vm.id)
        .await
        .with_context(|| format!("terminating instance {}", vm.id))?;

    if opts.wait_for_termination {
        reporter.waiting(&format!("waiting for {} to terminate...", vm.id));
        match wait::until_terminated(cloud, region, &vm.id, waits).await {
            Ok(()) => reporter.success(&format!("instance {} terminated", vm.id)),
            Err(e) => warnings.push(format!("{e:#}")),
        }
    }

    let mut volumes_deleted = 0;
    for volume in &volumes {
        reporter.step(&format!("deleting project volume {}...", volume.id));
        match cloud.delete_volume(region, &volume.id).await {
            Ok(()) => volumes_deleted += 1,
            Err(e) => warnings.push(format!("could not delete volume {}: {e:#}", volume.id)),
        }
    }

    let address_released = match &address {
        Some(AddressAllocation {
            allocation_id,
            public_ip,
            ..
        }) => {
            reporter.step(&format!("releasing address {public_ip}..."));
            match cloud.release_address(region, allocation_id).await {
                Ok(()) => true,
                Err(e) => {
                    warnings.push(format!("could not release address {allocation_id}: {e:#}"));
                    false
                }
            }
        }
        None => false,
    };

    Ok(DestroyResult {
        instance_id: vm.id,
        volumes_deleted,
        address_released,
        warnings: warnings.items,
    })
}

/// Volumes attached to `vm` that carry the project role.
async fn project_volumes(
    cloud: &impl TeardownCloud,
    region: &str,
    vm: &Vm,
) -> Result<Vec<Volume>> {
    let attached = cloud
        .describe_volumes(
            region,
            &[Filter::new("attachment.instance-id", vec![vm.id.clone()])],
        )
        .await?;
    let (project, kept): (Vec<Volume>, Vec<Volume>) =
        attached.into_iter().partition(|v| is_project_volume(&v.tags));
    for volume in &kept {
        tracing::debug!(volume = %volume.id, "keeping volume without the project role");
    }
    Ok(project)
}
