//! State-gating rules for the VM lifecycle operations.
//!
//! Pure decisions only. The application services look up the VM, ask these
//! functions what is allowed, and then make the cloud calls.

use devbox_common::{Vm, VmState, keys};

use crate::domain::error::VmError;

const BOOTSTRAP_SCRIPT: &str = include_str!("../../assets/bootstrap.sh");

/// What `devbox start` does for a given current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionPath {
    /// No live VM: create everything.
    Create,
    /// Stopped: start it.
    Resume,
    /// Stopping: wait for stopped, then start it.
    AwaitStopThenResume,
    /// Pending: wait for running, then report.
    AwaitRunning,
    /// Running: report only.
    AlreadyRunning,
}

/// Decide the provisioning path.
///
/// # Errors
///
/// Returns [`VmError::IllegalState`] for a VM that is shutting down.
pub fn provision_path(name: &str, state: Option<VmState>) -> Result<ProvisionPath, VmError> {
    match state {
        None | Some(VmState::Terminated) => Ok(ProvisionPath::Create),
        Some(VmState::Stopped) => Ok(ProvisionPath::Resume),
        Some(VmState::Stopping) => Ok(ProvisionPath::AwaitStopThenResume),
        Some(VmState::Pending) => Ok(ProvisionPath::AwaitRunning),
        Some(VmState::Running) => Ok(ProvisionPath::AlreadyRunning),
        Some(state @ VmState::ShuttingDown) => Err(VmError::IllegalState {
            name: name.to_owned(),
            state,
            operation: "start",
            expected: "stopped, running, or absent (wait for termination to finish)",
        }),
    }
}

/// What `devbox resize` does for a given entry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePath {
    /// Running: stop, wait until stopped, modify, start.
    CycleRunning,
    /// Stopped: modify only.
    ModifyStopped,
}

/// Check a resize request against the VM snapshot. Makes no calls.
///
/// # Errors
///
/// Returns [`VmError::IllegalState`] for transitional or terminated VMs and
/// [`VmError::SameInstanceType`] when the target equals the current type.
pub fn resize_path(vm: &Vm, target: &str) -> Result<ResizePath, VmError> {
    let path = match vm.state {
        VmState::Running => ResizePath::CycleRunning,
        VmState::Stopped => ResizePath::ModifyStopped,
        state => {
            return Err(VmError::IllegalState {
                name: vm.name.clone(),
                state,
                operation: "resize",
                expected: "running or stopped",
            });
        }
    };
    if vm.instance_type == target {
        return Err(VmError::SameInstanceType {
            name: vm.name.clone(),
            instance_type: target.to_owned(),
        });
    }
    Ok(path)
}

/// What `devbox stop` does for a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPath {
    Stop,
    AwaitStopped,
    AlreadyStopped,
}

/// # Errors
///
/// Returns [`VmError::IllegalState`] for pending, shutting-down or terminated VMs.
pub fn stop_path(vm: &Vm) -> Result<StopPath, VmError> {
    match vm.state {
        VmState::Running => Ok(StopPath::Stop),
        VmState::Stopping => Ok(StopPath::AwaitStopped),
        VmState::Stopped => Ok(StopPath::AlreadyStopped),
        state => Err(VmError::IllegalState {
            name: vm.name.clone(),
            state,
            operation: "stop",
            expected: "running",
        }),
    }
}

/// True for volumes devbox created for one VM and may delete with it.
#[must_use]
pub fn is_project_volume(tags: &std::collections::BTreeMap<String, String>) -> bool {
    tags.get(keys::VOLUME_ROLE).map(String::as_str) == Some(devbox_common::role::PROJECT)
}

/// Render the first-boot script passed as user data.
#[must_use]
pub fn render_user_data(device: &str) -> String {
    BOOTSTRAP_SCRIPT
        .replace("__BOOTSTRAP_TAG__", keys::BOOTSTRAP)
        .replace("__DEVICE__", device)
}
