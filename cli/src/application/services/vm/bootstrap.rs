//! BootstrapPoller: wait for the guest to report first-boot completion.
//!
//! The guest writes `pending`, `complete` or `failed` into the bootstrap tag
//! on its own instance. The outcome is advisory: it never fails the
//! surrounding operation.

use anyhow::Result;
use devbox_common::{BootstrapStatus, Vm, keys};

use super::poll::{Deadline, Tick, WaitContext};
use crate::application::ports::{Clock, InstanceDescriber, ProgressReporter};
use crate::domain::BootstrapError;

/// Last observed status plus why it is not `complete`, if it isn't.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOutcome {
    pub status: BootstrapStatus,
    pub error: Option<BootstrapError>,
}

impl BootstrapOutcome {
    /// Read the outcome from a snapshot without polling.
    #[must_use]
    pub fn from_snapshot(vm: &Vm) -> Self {
        let status = BootstrapStatus::from_tag(vm.tag(keys::BOOTSTRAP));
        let error = (status == BootstrapStatus::Failed).then_some(BootstrapError::Failed);
        Self { status, error }
    }

    /// Error text for the result object.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Poll the bootstrap tag until it is terminal, the deadline passes, or the
/// caller cancels.
pub async fn await_bootstrap(
    cloud: &impl InstanceDescriber,
    region: &str,
    instance_id: &str,
    waits: &WaitContext<'_, impl Clock>,
    reporter: &impl ProgressReporter,
) -> BootstrapOutcome {
    reporter.waiting("waiting for first-boot setup to finish...");
    let deadline = Deadline::start(waits.clock, waits.bootstrap);
    let mut last = BootstrapStatus::Unknown;

    loop {
        let observed = deadline
            .bounded(waits.cancel, cloud.describe_instance(region, instance_id))
            .await;
        let stop = match observed {
            Ok(observed) => {
                record(observed, instance_id, &mut last);
                match settle(last, reporter) {
                    Some(outcome) => return outcome,
                    None => deadline.tick(waits.cancel).await,
                }
            }
            Err(stop) => stop,
        };
        let error = match stop {
            Tick::Continue => continue,
            Tick::Expired => BootstrapError::TimedOut {
                waited_secs: deadline.elapsed().as_secs(),
                last,
            },
            Tick::Cancelled => BootstrapError::Cancelled { last },
        };
        reporter.warn(&error.to_string());
        return BootstrapOutcome {
            status: last,
            error: Some(error),
        };
    }
}

fn record(observed: Result<Option<Vm>>, instance_id: &str, last: &mut BootstrapStatus) {
    match observed {
        Ok(Some(vm)) => *last = BootstrapStatus::from_tag(vm.tag(keys::BOOTSTRAP)),
        Ok(None) => tracing::warn!(instance = instance_id, "instance not listed while polling bootstrap"),
        Err(e) => {
            tracing::warn!(instance = instance_id, error = %format!("{e:#}"), "bootstrap poll failed; retrying");
        }
    }
    tracing::debug!(instance = instance_id, status = %last, "bootstrap poll");
}

/// The outcome once the guest has reported a terminal status.
fn settle(last: BootstrapStatus, reporter: &impl ProgressReporter) -> Option<BootstrapOutcome> {
    match last {
        BootstrapStatus::Complete => {
            reporter.success("first-boot setup complete");
            Some(BootstrapOutcome {
                status: last,
                error: None,
            })
        }
        BootstrapStatus::Failed => {
            let error = BootstrapError::Failed;
            reporter.warn(&error.to_string());
            Some(BootstrapOutcome {
                status: last,
                error: Some(error),
            })
        }
        BootstrapStatus::Pending | BootstrapStatus::Unknown => None,
    }
}
