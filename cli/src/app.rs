//! Application context: unified state passed to every command handler.
//!
//! `AppContext` owns the cloud adapter, config store, clock and the
//! cancellation token that Ctrl-C trips. Commands never construct adapters
//! themselves.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::application::services::config_service;
use crate::application::services::vm::poll::WaitContext;
use crate::domain::{DevboxConfig, RequestContext};
use crate::infra::aws::AwsCliCloud;
use crate::infra::clock::TokioClock;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config::YamlConfigStore;
use crate::output::{HumanRenderer, JsonRenderer, OutputContext, Renderer, TerminalReporter};

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `DEVBOX_YES` env vars).
    pub yes: bool,
    /// Operate on this VM name instead of the configured one.
    pub name: Option<String>,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Behaviour options.
    pub behaviour: BehaviourFlags,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context. Quiet in JSON mode so stdout stays parseable.
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// Cloud provider adapter.
    pub cloud: AwsCliCloud<TokioCommandRunner>,
    /// Config file store.
    pub config_store: YamlConfigStore,
    pub clock: TokioClock,
    /// Cancelled on Ctrl-C; every wait loop observes it.
    pub cancel: CancellationToken,
    /// When `true`, skip interactive prompts and use defaults.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` or `DEVBOX_YES`
    /// environment variables are present.
    pub non_interactive: bool,
    name_override: Option<String>,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// This function currently always succeeds.
    pub fn new(flags: &AppFlags, cancel: CancellationToken) -> Result<Self> {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("DEVBOX_YES").is_ok();
        let non_interactive = flags.behaviour.yes || ci_env;

        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        Ok(Self {
            output: OutputContext::new(
                flags.output.no_color,
                flags.output.quiet || flags.output.json,
            ),
            mode,
            cloud: AwsCliCloud::new(TokioCommandRunner::default()).with_cancel(cancel.clone()),
            config_store: YamlConfigStore::new(),
            clock: TokioClock,
            cancel,
            non_interactive,
            name_override: flags.behaviour.name.clone(),
        })
    }

    /// Load the config file, or defaults when none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn config(&self) -> Result<DevboxConfig> {
        config_service::load_config(&self.config_store)
    }

    /// Identity of the VM this invocation targets.
    ///
    /// # Errors
    ///
    /// Returns an error if no owner can be determined or a value is invalid.
    pub fn request_context(&self, config: &DevboxConfig) -> Result<RequestContext> {
        let env_owner = std::env::var("DEVBOX_OWNER")
            .or_else(|_| std::env::var("USER"))
            .ok();
        let env_region = std::env::var("DEVBOX_REGION")
            .or_else(|_| std::env::var("AWS_REGION"))
            .ok();
        RequestContext::resolve(
            config,
            self.name_override.as_deref(),
            env_owner.as_deref(),
            env_region.as_deref(),
        )
    }

    /// Poll policies and cancellation for the service wait loops.
    #[must_use]
    pub fn wait_context(&self, config: &DevboxConfig) -> WaitContext<'_, TokioClock> {
        WaitContext {
            clock: &self.clock,
            cancel: &self.cancel,
            instance: config.wait_policy(),
            bootstrap: config.bootstrap_policy(),
        }
    }

    /// Progress reporter bound to this context's output settings.
    #[must_use]
    pub fn reporter(&self) -> TerminalReporter<'_> {
        TerminalReporter::new(&self.output)
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Returns the appropriate `Renderer` variant for the current output mode.
    #[must_use]
    pub fn renderer(&self) -> Renderer<'_> {
        match self.mode {
            OutputMode::Human => Renderer::Human(HumanRenderer::new(&self.output)),
            OutputMode::Json => Renderer::Json(JsonRenderer),
        }
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true` (CI, `--yes` flag, or `DEVBOX_YES` env),
    /// returns `default` immediately without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }
}
