//! `devbox stop`: power off the VM, keeping its volume and address.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::vm::stop as service;

/// Run `devbox stop`.
///
/// # Errors
///
/// Returns an error if there is no VM, it cannot be stopped from its current
/// state, or the stop does not complete in time.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let config = app.config()?;
    let ctx = app.request_context(&config)?;
    let reporter = app.reporter();

    let result =
        service::stop(&app.cloud, &ctx, &app.wait_context(&config), &reporter).await?;
    drop(reporter);

    app.renderer().render_stop(&result)?;
    Ok(ExitCode::SUCCESS)
}
