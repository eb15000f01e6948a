//! `devbox destroy`: terminate the VM and clean up what devbox created for it.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::vm::destroy::{self as service, DestroyOptions};
use crate::application::services::vm::locator;

/// Run `devbox destroy`.
///
/// Cleanup failures after termination are reported as warnings and do not
/// change the exit code.
///
/// # Errors
///
/// Returns an error if there is no VM or it cannot be terminated.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let config = app.config()?;
    let ctx = app.request_context(&config)?;
    let vm = locator::require_vm(&app.cloud, &ctx).await?;

    if !app.output.quiet {
        println!();
        println!(
            "This will terminate {} ({}) and delete its project volume and address.",
            ctx.label(),
            vm.id
        );
        println!("Volumes tagged as persistent are kept.");
        println!();
    }
    if !app.non_interactive && !app.confirm("Continue?", false)? {
        app.output.info("Cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let opts = DestroyOptions {
        wait_for_termination: config.waits.wait_for_termination,
    };
    let reporter = app.reporter();
    let result = service::destroy(
        &app.cloud,
        &ctx,
        opts,
        &app.wait_context(&config),
        &reporter,
    )
    .await?;
    drop(reporter);

    app.renderer().render_destroy(&result)?;
    Ok(ExitCode::SUCCESS)
}
