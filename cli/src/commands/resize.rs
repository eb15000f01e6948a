//! `devbox resize`: change the VM's instance type.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::vm::resize as service;

/// Arguments for the resize command.
#[derive(Args)]
pub struct ResizeArgs {
    /// Target instance type, e.g. m6i.xlarge
    #[arg(value_name = "INSTANCE_TYPE")]
    pub instance_type: String,
}

/// Run `devbox resize`.
///
/// # Errors
///
/// Returns an error if the VM is missing or transitional, already has the
/// requested type, the type is not offered, or a lifecycle step fails.
pub async fn run(args: &ResizeArgs, app: &AppContext) -> Result<ExitCode> {
    let config = app.config()?;
    let ctx = app.request_context(&config)?;
    let reporter = app.reporter();

    let result = service::resize(
        &app.cloud,
        &ctx,
        &args.instance_type,
        &app.wait_context(&config),
        &reporter,
    )
    .await?;
    drop(reporter);

    app.renderer().render_resize(&result)?;
    Ok(ExitCode::SUCCESS)
}
