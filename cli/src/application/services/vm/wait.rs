//! Bounded waits on instance state, built on `describe_instance`.

use anyhow::Result;
use devbox_common::{Vm, VmState};

use super::poll::{Deadline, Tick, WaitContext};
use crate::application::ports::{Clock, InstanceDescriber};
use crate::domain::WaitError;

/// Wait until the instance reports `running`; returns the fresh snapshot.
///
/// # Errors
///
/// Returns [`WaitError`] on timeout, cancellation, or if the instance is
/// shutting down.
pub async fn until_running(
    cloud: &impl InstanceDescriber,
    region: &str,
    instance_id: &str,
    waits: &WaitContext<'_, impl Clock>,
) -> Result<Vm> {
    until_state(cloud, region, instance_id, VmState::Running, waits)
        .await?
        .ok_or_else(|| unreachable_gone(instance_id, VmState::Running))
}

/// Wait until the instance reports `stopped`; returns the fresh snapshot.
///
/// # Errors
///
/// Returns [`WaitError`] on timeout, cancellation, or if the instance is
/// shutting down.
pub async fn until_stopped(
    cloud: &impl InstanceDescriber,
    region: &str,
    instance_id: &str,
    waits: &WaitContext<'_, impl Clock>,
) -> Result<Vm> {
    until_state(cloud, region, instance_id, VmState::Stopped, waits)
        .await?
        .ok_or_else(|| unreachable_gone(instance_id, VmState::Stopped))
}

/// Wait until the instance is `terminated` or no longer listed.
///
/// # Errors
///
/// Returns [`WaitError`] on timeout or cancellation.
pub async fn until_terminated(
    cloud: &impl InstanceDescriber,
    region: &str,
    instance_id: &str,
    waits: &WaitContext<'_, impl Clock>,
) -> Result<()> {
    until_state(cloud, region, instance_id, VmState::Terminated, waits).await?;
    Ok(())
}

/// Poll until `target`. `Ok(None)` only when waiting for `terminated` and the
/// instance has disappeared.
async fn until_state(
    cloud: &impl InstanceDescriber,
    region: &str,
    instance_id: &str,
    target: VmState,
    waits: &WaitContext<'_, impl Clock>,
) -> Result<Option<Vm>> {
    let deadline = Deadline::start(waits.clock, waits.instance);
    let mut last = String::from("unknown");

    loop {
        let observed = deadline
            .bounded(waits.cancel, cloud.describe_instance(region, instance_id))
            .await;
        let observed = match observed {
            Ok(observed) => observed,
            Err(stop) => return Err(ended(stop, instance_id, target, &last, &deadline)),
        };
        match observed {
            Ok(Some(vm)) if vm.state == target => {
                tracing::debug!(instance = instance_id, state = %target, "reached state");
                return Ok(Some(vm));
            }
            Ok(Some(vm)) if target != VmState::Terminated && is_dead(vm.state) => {
                return Err(WaitError::Unreachable {
                    instance_id: instance_id.to_owned(),
                    target,
                    state: vm.state,
                }
                .into());
            }
            Ok(Some(vm)) => {
                tracing::debug!(instance = instance_id, state = %vm.state, target = %target, "waiting");
                last = vm.state.to_string();
            }
            Ok(None) if target == VmState::Terminated => return Ok(None),
            Ok(None) => "not yet visible".clone_into(&mut last),
            Err(e) => {
                tracing::warn!(instance = instance_id, error = %format!("{e:#}"), "describe failed while waiting");
                last = format!("describe failed: {e:#}");
            }
        }

        match deadline.tick(waits.cancel).await {
            Tick::Continue => {}
            stop => return Err(ended(stop, instance_id, target, &last, &deadline)),
        }
    }
}

fn ended(
    stop: Tick,
    instance_id: &str,
    target: VmState,
    last: &str,
    deadline: &Deadline<'_, impl Clock>,
) -> anyhow::Error {
    let instance_id = instance_id.to_owned();
    match stop {
        Tick::Cancelled => WaitError::Cancelled {
            instance_id,
            target,
        }
        .into(),
        Tick::Continue | Tick::Expired => WaitError::TimedOut {
            instance_id,
            target,
            last: last.to_owned(),
            waited_secs: deadline.elapsed().as_secs(),
        }
        .into(),
    }
}

fn is_dead(state: VmState) -> bool {
    matches!(state, VmState::ShuttingDown | VmState::Terminated)
}

fn unreachable_gone(instance_id: &str, target: VmState) -> anyhow::Error {
    WaitError::Unreachable {
        instance_id: instance_id.to_owned(),
        target,
        state: VmState::Terminated,
    }
    .into()
}
