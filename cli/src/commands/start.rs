//! `devbox start`: provision a new VM or resume the existing one.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::vm::provision::{self as service, ProvisionOptions};
use crate::domain::VolumeTier;

/// Arguments for the start command.
#[derive(Args, Default)]
pub struct StartArgs {
    /// Project volume tier for a new VM (standard, performance, provisioned)
    #[arg(long, value_name = "TIER")]
    pub volume_tier: Option<VolumeTier>,
}

/// Run `devbox start`.
///
/// # Errors
///
/// Returns an error if a pre-check fails, a provisioning step fails, or the
/// VM cannot be resumed. A bootstrap failure is reported on the result.
pub async fn run(args: &StartArgs, app: &AppContext) -> Result<ExitCode> {
    let config = app.config()?;
    let ctx = app.request_context(&config)?;
    let opts = ProvisionOptions::from_config(&config, args.volume_tier);
    let reporter = app.reporter();

    let result = service::provision(
        &app.cloud,
        &ctx,
        &opts,
        &app.wait_context(&config),
        &reporter,
    )
    .await?;
    drop(reporter);

    app.renderer().render_provision(&result)?;
    Ok(ExitCode::SUCCESS)
}
