//! `devbox status`: show the VM snapshot.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::vm::locator;

/// Run `devbox status`. A missing VM is not an error.
///
/// # Errors
///
/// Returns an error if the provider lookup fails.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let config = app.config()?;
    let ctx = app.request_context(&config)?;
    let vm = locator::find_vm(&app.cloud, &ctx).await?;
    app.renderer().render_status(vm.as_ref())?;
    Ok(ExitCode::SUCCESS)
}
