//! Resizer: change the instance type of a running or stopped VM.

use anyhow::{Context, Result};
use devbox_common::ResizeResult;

use super::locator::require_vm;
use super::poll::WaitContext;
use super::provision::ensure_offered;
use super::wait;
use crate::application::ports::{Clock, ProgressReporter, ResizeCloud};
use crate::domain::RequestContext;
use crate::domain::vm::{ResizePath, resize_path};

/// Resize the caller's VM to `target`.
///
/// A running VM is stopped, modified and started again. A stopped VM is only
/// modified and stays stopped.
///
/// # Errors
///
/// Returns [`crate::domain::VmError`] for an illegal entry state, the current
/// type, or a type the region does not offer; these are detected before any
/// mutating call. Later failures carry the provider error with the step
/// that failed.
pub async fn resize(
    cloud: &impl ResizeCloud,
    ctx: &RequestContext,
    target: &str,
    waits: &WaitContext<'_, impl Clock>,
    reporter: &impl ProgressReporter,
) -> Result<ResizeResult> {
    let vm = require_vm(cloud, ctx).await?;
    let path = resize_path(&vm, target)?;
    ensure_offered(cloud, &ctx.region, target).await?;
    tracing::info!(instance = %vm.id, from = %vm.instance_type, to = target, ?path, "resize");

    let region = ctx.region.as_str();
    if path == ResizePath::CycleRunning {
        reporter.step(&format!("stopping {}...", ctx.name));
        cloud
            .stop_instance(region, &vm.id)
            .await
            .with_context(|| format!("stopping {} for resize", vm.id))?;
        reporter.waiting(&format!("waiting for {} to stop...", ctx.name));
        wait::until_stopped(cloud, region, &vm.id, waits).await?;
        reporter.success(&format!("{} stopped", ctx.name));
    }

    reporter.step(&format!("changing instance type to {target}..."));
    cloud
        .modify_instance_type(region, &vm.id, target)
        .await
        .with_context(|| format!("changing {} to {target} (the instance is stopped)", vm.id))?;

    let restarted = path == ResizePath::CycleRunning;
    if restarted {
        reporter.step(&format!("starting {}...", ctx.name));
        cloud
            .start_instance(region, &vm.id)
            .await
            .with_context(|| format!("starting {} after resize to {target}", vm.id))?;
        reporter.waiting(&format!("waiting for {} to run...", ctx.name));
        wait::until_running(cloud, region, &vm.id, waits).await?;
    }

    let message = if restarted {
        format!("{} is now running as {target}", ctx.name)
    } else {
        format!(
            "{} is now {target} (still stopped; run 'devbox start' to boot it)",
            ctx.name
        )
    };
    reporter.success(&message);

    Ok(ResizeResult {
        instance_id: vm.id,
        previous_type: vm.instance_type,
        new_type: target.to_owned(),
        restarted,
        message,
    })
}
