//! Human-readable terminal renderer.

use std::path::Path;

use devbox_common::{
    BootstrapStatus, DestroyResult, ProvisionResult, ResizeResult, StopResult, Vm,
};
use owo_colors::OwoColorize as _;

use crate::domain::DevboxConfig;
use crate::output::OutputContext;

/// Renders results as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    pub fn render_provision(&self, result: &ProvisionResult) {
        let headline = if result.already_running {
            format!("{} is already running", result.instance_id)
        } else if result.restarted {
            format!("{} started", result.instance_id)
        } else {
            format!("{} created", result.instance_id)
        };
        self.ctx.success(&headline);
        if let Some(addr) = &result.public_address {
            self.ctx.kv("Address:", addr);
        }
        if let Some(vol) = &result.volume_id {
            self.ctx.kv("Volume:", vol);
        }
        self.ctx
            .kv("Bootstrap:", result.bootstrap_status.as_str());
        if let Some(err) = &result.bootstrap_error {
            self.ctx.warn(err);
        }
        if result.bootstrap_status == BootstrapStatus::Complete {
            if let Some(addr) = &result.public_address {
                self.ctx.info(&format!("Connect: ssh ubuntu@{addr}"));
            }
        }
    }

    pub fn render_resize(&self, result: &ResizeResult) {
        self.ctx.success(&result.message);
        self.ctx.kv(
            "Type:",
            &format!("{} -> {}", result.previous_type, result.new_type),
        );
    }

    pub fn render_stop(&self, result: &StopResult) {
        if result.already_stopped {
            self.ctx
                .info(&format!("{} is already stopped", result.instance_id));
        } else {
            self.ctx.success(&format!("{} stopped", result.instance_id));
        }
        self.ctx.info("Data is preserved. Resume: devbox start");
    }

    pub fn render_destroy(&self, result: &DestroyResult) {
        if result.warnings.is_empty() {
            self.ctx
                .success(&format!("{} destroyed", result.instance_id));
        } else {
            self.ctx.warn(&format!(
                "{} terminated with {} warning(s); some resources may need manual cleanup",
                result.instance_id,
                result.warnings.len()
            ));
        }
        self.ctx
            .kv("Volumes:", &format!("{} deleted", result.volumes_deleted));
        self.ctx.kv(
            "Address:",
            if result.address_released {
                "released"
            } else {
                "none released"
            },
        );
    }

    pub fn render_status(&self, vm: Option<&Vm>) {
        let Some(vm) = vm else {
            self.ctx.info("No VM. Create one: devbox start");
            return;
        };
        if self.ctx.quiet {
            return;
        }
        self.ctx.kv("Name:", &vm.name);
        self.ctx.kv("Instance:", &vm.id);
        println!(
            "  {:<16}{}",
            "State:".style(self.ctx.styles.dim),
            vm.state.as_str().style(self.ctx.styles.state(vm.state))
        );
        self.ctx.kv("Type:", &vm.instance_type);
        self.ctx
            .kv("Address:", vm.public_address.as_deref().unwrap_or("-"));
        self.ctx.kv("Bootstrap:", vm.bootstrap.as_str());
        if let Some(launched) = vm.launch_time {
            self.ctx
                .kv("Launched:", &launched.format("%Y-%m-%d %H:%M UTC").to_string());
        }
    }

    pub fn render_config(&self, config: &DevboxConfig, path: &Path) {
        if self.ctx.quiet {
            return;
        }
        println!();
        println!(
            "  {}",
            format!("Configuration ({})", path.display()).style(self.ctx.styles.header)
        );
        println!();
        let unset = "(not set)";
        let rows: [(&str, String); 12] = [
            ("owner", config.owner.clone().unwrap_or_else(|| unset.to_string())),
            ("name", config.name.clone()),
            ("region", config.region.clone()),
            ("instance.type", config.instance.instance_type.clone()),
            (
                "instance.image_id",
                config
                    .instance
                    .image_id
                    .clone()
                    .unwrap_or_else(|| unset.to_string()),
            ),
            (
                "instance.subnet_id",
                config
                    .instance
                    .subnet_id
                    .clone()
                    .unwrap_or_else(|| unset.to_string()),
            ),
            (
                "instance.key_name",
                config
                    .instance
                    .key_name
                    .clone()
                    .unwrap_or_else(|| unset.to_string()),
            ),
            (
                "instance.instance_profile",
                config
                    .instance
                    .instance_profile
                    .clone()
                    .unwrap_or_else(|| unset.to_string()),
            ),
            ("volume.size_gib", config.volume.size_gib.to_string()),
            ("volume.tier", config.volume.tier.to_string()),
            ("bootstrap.timeout_secs", config.bootstrap.timeout_secs.to_string()),
            ("waits.timeout_secs", config.waits.timeout_secs.to_string()),
        ];
        for (key, value) in &rows {
            println!("  {:<28}{value}", format!("{key}:"));
        }
        println!(
            "  {:<28}{}",
            "waits.wait_for_termination:", config.waits.wait_for_termination
        );
        println!();
        println!("  {}", "Environment:".style(self.ctx.styles.header));
        for var in ["DEVBOX_CONFIG", "DEVBOX_OWNER", "DEVBOX_REGION", "AWS_PROFILE"] {
            println!(
                "    {:<18}{}",
                format!("{var}:"),
                std::env::var(var).unwrap_or_else(|_| unset.to_string())
            );
        }
        println!();
    }

    pub fn render_config_set(&self, key: &str, value: &str) {
        self.ctx.success(&format!("Set {key} = {value}"));
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if self.ctx.quiet {
            return;
        }
        println!("devbox {version}");
    }
}
