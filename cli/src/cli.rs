//! CLI argument parsing with clap derive

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;

/// Personal cloud development VMs
#[derive(Parser)]
#[command(
    name = "devbox",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Log provider calls and poll ticks to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip confirmation prompts
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// VM name to operate on (defaults to the configured name)
    #[arg(long, global = true, value_name = "NAME")]
    pub name: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the VM, or start it if it is stopped
    Start(commands::start::StartArgs),

    /// Stop the VM (keeps its volume and address)
    Stop,

    /// Change the VM's instance type
    Resize(commands::resize::ResizeArgs),

    /// Terminate the VM and release what devbox created for it
    Destroy,

    /// Show VM state
    Status,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self, cancel: CancellationToken) -> Result<ExitCode> {
        let Cli {
            json,
            quiet,
            no_color,
            verbose: _,
            yes,
            name,
            command,
        } = self;
        let flags = AppFlags {
            output: OutputFlags {
                no_color,
                quiet,
                json,
            },
            behaviour: BehaviourFlags { yes, name },
        };
        let app = AppContext::new(&flags, cancel)?;

        match command {
            Command::Start(args) => commands::start::run(&args, &app).await,
            Command::Stop => commands::stop::run(&app).await,
            Command::Resize(args) => commands::resize::run(&args, &app).await,
            Command::Destroy => commands::destroy::run(&app).await,
            Command::Status => commands::status::run(&app).await,
            Command::Config(cmd) => commands::config::run(&app, cmd),
            Command::Version => commands::version::run(&app),
        }
    }
}
