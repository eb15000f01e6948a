//! Stopper: power a VM off without releasing any of its resources.

use anyhow::{Context, Result};
use devbox_common::StopResult;

use super::locator::require_vm;
use super::poll::WaitContext;
use super::wait;
use crate::application::ports::{Clock, InstanceDescriber, InstanceStopper, ProgressReporter};
use crate::domain::RequestContext;
use crate::domain::vm::{StopPath, stop_path};

/// # Errors
///
/// Returns [`crate::domain::VmError`] if there is no VM or it is not running,
/// stopping or stopped; otherwise the stop call or wait error.
pub async fn stop(
    cloud: &(impl InstanceDescriber + InstanceStopper),
    ctx: &RequestContext,
    waits: &WaitContext<'_, impl Clock>,
    reporter: &impl ProgressReporter,
) -> Result<StopResult> {
    let vm = require_vm(cloud, ctx).await?;
    let path = stop_path(&vm)?;
    tracing::info!(instance = %vm.id, ?path, "stop");

    match path {
        StopPath::AlreadyStopped => {
            reporter.success(&format!("{} is already stopped", ctx.name));
            return Ok(StopResult {
                instance_id: vm.id,
                already_stopped: true,
            });
        }
        StopPath::Stop => {
            reporter.step(&format!("stopping {}...", ctx.name));
            cloud
                .stop_instance(&ctx.region, &vm.id)
                .await
                .with_context(|| format!("stopping instance {}", vm.id))?;
        }
        StopPath::AwaitStopped => {}
    }

    reporter.waiting(&format!("waiting for {} to stop...", ctx.name));
    wait::until_stopped(cloud, &ctx.region, &vm.id, waits).await?;
    reporter.success(&format!("{} stopped", ctx.name));
    Ok(StopResult {
        instance_id: vm.id,
        already_stopped: false,
    })
}
