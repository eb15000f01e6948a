//! Provisioner: create a new VM or resume an existing one.
//!
//! Imports only from `crate::domain`, `crate::application::ports` and
//! `devbox_common`.

use std::fmt;

use anyhow::{Context, Result};
use devbox_common::{BootstrapStatus, ProvisionResult, Vm, keys, ownership_tags, role};

use super::bootstrap::{BootstrapOutcome, await_bootstrap};
use super::locator::{find_address, find_vm};
use super::poll::WaitContext;
use super::wait;
use crate::application::ports::{
    Clock, ImageQuery, InstanceTypeCatalog, LaunchSpec, ProgressReporter, ProvisionCloud,
    VolumeSpec,
};
use crate::domain::vm::{ProvisionPath, provision_path, render_user_data};
use crate::domain::{DevboxConfig, ProvisionError, RequestContext, VmError, VolumeTier};

/// Everything a fresh provision needs beyond the request context.
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub instance_type: String,
    pub image_id: Option<String>,
    pub image_name_pattern: String,
    pub image_owner: String,
    pub subnet_id: Option<String>,
    pub security_groups: Vec<String>,
    pub key_name: Option<String>,
    pub instance_profile: Option<String>,
    pub volume_size_gib: u32,
    pub volume_tier: VolumeTier,
    pub device: String,
}

impl ProvisionOptions {
    /// Build from config; `tier` overrides the configured volume tier.
    #[must_use]
    pub fn from_config(config: &DevboxConfig, tier: Option<VolumeTier>) -> Self {
        Self {
            instance_type: config.instance.instance_type.clone(),
            image_id: config.instance.image_id.clone(),
            image_name_pattern: config.instance.image_name_pattern.clone(),
            image_owner: config.instance.image_owner.clone(),
            subnet_id: config.instance.subnet_id.clone(),
            security_groups: config.instance.security_groups.clone(),
            key_name: config.instance.key_name.clone(),
            instance_profile: config.instance.instance_profile.clone(),
            volume_size_gib: config.volume.size_gib,
            volume_tier: tier.unwrap_or(config.volume.tier),
            device: config.volume.device.clone(),
        }
    }
}

/// Bring the caller's VM to `running`, creating it if absent.
///
/// # Errors
///
/// Returns [`VmError`] for a VM that is shutting down or an instance type the
/// region does not offer, [`ProvisionError::PreCheck`] when a pre-check fails
/// (nothing created), and [`ProvisionError::MidSequence`] when a step fails
/// after resources were created.
pub async fn provision(
    cloud: &impl ProvisionCloud,
    ctx: &RequestContext,
    opts: &ProvisionOptions,
    waits: &WaitContext<'_, impl Clock>,
    reporter: &impl ProgressReporter,
) -> Result<ProvisionResult> {
    let existing = find_vm(cloud, ctx).await?;
    let path = provision_path(&ctx.name, existing.as_ref().map(|vm| vm.state))?;
    tracing::info!(vm = %ctx.label(), ?path, "provision");

    match (path, existing) {
        (ProvisionPath::AlreadyRunning, Some(vm)) => report_running(cloud, ctx, &vm).await,
        (ProvisionPath::AwaitRunning, Some(vm)) => {
            reporter.waiting(&format!("{} is starting, waiting for it...", ctx.name));
            let vm = wait::until_running(cloud, &ctx.region, &vm.id, waits).await?;
            reporter.success(&format!("{} is running", ctx.name));
            report_running(cloud, ctx, &vm).await
        }
        (ProvisionPath::Resume, Some(vm)) => resume(cloud, ctx, &vm, waits, reporter).await,
        (ProvisionPath::AwaitStopThenResume, Some(vm)) => {
            reporter.waiting(&format!("{} is stopping, waiting before restart...", ctx.name));
            let vm = wait::until_stopped(cloud, &ctx.region, &vm.id, waits).await?;
            resume(cloud, ctx, &vm, waits, reporter).await
        }
        _ => create(cloud, ctx, opts, waits, reporter).await,
    }
}

/// Running already: read-only report, zero mutating calls.
async fn report_running(
    cloud: &impl ProvisionCloud,
    ctx: &RequestContext,
    vm: &Vm,
) -> Result<ProvisionResult> {
    let address = find_address(cloud, ctx, vm).await.unwrap_or_else(|e| {
        tracing::warn!(error = %format!("{e:#}"), "could not read reserved address");
        None
    });
    let bootstrap = BootstrapOutcome::from_snapshot(vm);
    Ok(ProvisionResult {
        instance_id: vm.id.clone(),
        public_address: address
            .as_ref()
            .map(|a| a.public_ip.clone())
            .or_else(|| vm.public_address.clone()),
        volume_id: vm.tag(keys::PROJECT_VOLUME).map(str::to_owned),
        allocation_id: address.map(|a| a.allocation_id),
        restarted: false,
        already_running: true,
        bootstrap_status: bootstrap.status,
        bootstrap_error: bootstrap.error_message(),
    })
}

/// Stopped: start, wait, re-associate the reserved address, poll bootstrap.
async fn resume(
    cloud: &impl ProvisionCloud,
    ctx: &RequestContext,
    vm: &Vm,
    waits: &WaitContext<'_, impl Clock>,
    reporter: &impl ProgressReporter,
) -> Result<ProvisionResult> {
    reporter.step(&format!("starting {}...", ctx.name));
    cloud
        .start_instance(&ctx.region, &vm.id)
        .await
        .with_context(|| format!("starting instance {}", vm.id))?;
    reporter.waiting(&format!("waiting for {} to run...", ctx.name));
    let running = wait::until_running(cloud, &ctx.region, &vm.id, waits).await?;
    reporter.success(&format!("{} is running", ctx.name));

    let address = find_address(cloud, ctx, &running).await?;
    if let Some(addr) = &address
        && addr.instance_id.as_deref() != Some(running.id.as_str())
    {
        reporter.step(&format!("re-associating address {}...", addr.public_ip));
        cloud
            .associate_address(&ctx.region, &addr.allocation_id, &running.id)
            .await
            .with_context(|| {
                format!(
                    "re-associating address {} with {} (the instance is running)",
                    addr.allocation_id, running.id
                )
            })?;
    }

    let bootstrap = await_bootstrap(cloud, &ctx.region, &running.id, waits, reporter).await;
    Ok(ProvisionResult {
        instance_id: running.id.clone(),
        public_address: address
            .as_ref()
            .map(|a| a.public_ip.clone())
            .or_else(|| running.public_address.clone()),
        volume_id: running.tag(keys::PROJECT_VOLUME).map(str::to_owned),
        allocation_id: address.map(|a| a.allocation_id),
        restarted: true,
        already_running: false,
        bootstrap_status: bootstrap.status,
        bootstrap_error: bootstrap.error_message(),
    })
}

/// Resource ids created so far, for mid-sequence error messages.
#[derive(Default)]
struct Created(Vec<(&'static str, String)>);

impl Created {
    fn push(&mut self, kind: &'static str, id: &str) {
        self.0.push((kind, id.to_owned()));
    }

    fn fail(&self, step: &'static str) -> impl FnOnce(anyhow::Error) -> anyhow::Error + '_ {
        move |cause| {
            tracing::error!(
                step,
                created = %self,
                error = %format!("{cause:#}"),
                "provisioning failed mid-sequence"
            );
            ProvisionError::MidSequence {
                step,
                created: self.to_string(),
                cause,
            }
            .into()
        }
    }
}

impl fmt::Display for Created {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (kind, id)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{kind} {id}")?;
        }
        Ok(())
    }
}

fn pre_check(step: &'static str) -> impl FnOnce(anyhow::Error) -> anyhow::Error {
    move |cause| ProvisionError::PreCheck { step, cause }.into()
}

/// Absent: pre-check, launch, wait, volume, address, tag, bootstrap.
async fn create(
    cloud: &impl ProvisionCloud,
    ctx: &RequestContext,
    opts: &ProvisionOptions,
    waits: &WaitContext<'_, impl Clock>,
    reporter: &impl ProgressReporter,
) -> Result<ProvisionResult> {
    let region = ctx.region.as_str();

    // Pre-checks: read-only.
    opts.volume_tier
        .check_size(opts.volume_size_gib)
        .map_err(|e| pre_check("check project volume size")(e.into()))?;
    reporter.step("checking image, network and instance type...");
    let image_id = match &opts.image_id {
        Some(id) => id.clone(),
        None => cloud
            .resolve_image(
                region,
                &ImageQuery {
                    name_pattern: &opts.image_name_pattern,
                    owner: &opts.image_owner,
                },
            )
            .await
            .map_err(pre_check("resolve machine image"))?,
    };
    let placement = cloud
        .resolve_subnet(region, opts.subnet_id.as_deref())
        .await
        .map_err(pre_check("resolve subnet"))?;
    let group_ids = cloud
        .resolve_security_groups(region, &opts.security_groups)
        .await
        .map_err(pre_check("resolve security groups"))?;
    ensure_offered(cloud, region, &opts.instance_type)
        .await
        .map_err(|e| match e.downcast::<VmError>() {
            Ok(vm_error) => vm_error.into(),
            Err(e) => pre_check("list offered instance types")(e),
        })?;
    tracing::debug!(%image_id, subnet = %placement.subnet_id, groups = ?group_ids, "pre-checks passed");

    // Launch.
    let mut instance_tags = ownership_tags(&ctx.owner, &ctx.name);
    instance_tags.push((
        keys::DISPLAY_NAME.to_owned(),
        devbox_common::vm_display_name(&ctx.owner, &ctx.name),
    ));
    instance_tags.push((
        keys::BOOTSTRAP.to_owned(),
        BootstrapStatus::Pending.to_string(),
    ));
    let user_data = render_user_data(&opts.device);

    reporter.step(&format!("launching {} instance...", opts.instance_type));
    let instance_id = cloud
        .run_instance(
            region,
            &LaunchSpec {
                image_id: &image_id,
                instance_type: &opts.instance_type,
                subnet_id: &placement.subnet_id,
                security_group_ids: &group_ids,
                key_name: opts.key_name.as_deref(),
                instance_profile: opts.instance_profile.as_deref(),
                user_data: &user_data,
                tags: &instance_tags,
            },
        )
        .await
        .context("launching instance")?;
    tracing::info!(instance = %instance_id, "instance launched");
    let mut created = Created::default();
    created.push("instance", &instance_id);

    reporter.waiting(&format!("waiting for {instance_id} to run..."));
    let running = wait::until_running(cloud, region, &instance_id, waits)
        .await
        .map_err(created.fail("wait for instance to run"))?;
    reporter.success(&format!("instance {instance_id} is running"));

    // Storage.
    let zone = running
        .availability_zone
        .clone()
        .unwrap_or_else(|| placement.availability_zone.clone());
    let mut volume_tags = ownership_tags(&ctx.owner, &ctx.name);
    volume_tags.push((keys::VOLUME_ROLE.to_owned(), role::PROJECT.to_owned()));
    volume_tags.push((
        keys::DISPLAY_NAME.to_owned(),
        format!("{}-project", devbox_common::vm_display_name(&ctx.owner, &ctx.name)),
    ));

    reporter.step(&format!(
        "creating {} GiB {} project volume...",
        opts.volume_size_gib, opts.volume_tier
    ));
    let volume_id = cloud
        .create_volume(
            region,
            &VolumeSpec {
                availability_zone: &zone,
                size_gib: opts.volume_size_gib,
                performance: opts.volume_tier.performance(),
                tags: &volume_tags,
            },
        )
        .await
        .map_err(created.fail("create project volume"))?;
    created.push("volume", &volume_id);
    cloud
        .attach_volume(region, &volume_id, &instance_id, &opts.device)
        .await
        .map_err(created.fail("attach project volume"))?;
    reporter.success(&format!("volume {volume_id} attached at {}", opts.device));

    // Network.
    let mut address_tags = ownership_tags(&ctx.owner, &ctx.name);
    address_tags.push((
        keys::DISPLAY_NAME.to_owned(),
        devbox_common::vm_display_name(&ctx.owner, &ctx.name),
    ));
    reporter.step("reserving public address...");
    let address = cloud
        .allocate_address(region, &address_tags)
        .await
        .map_err(created.fail("allocate address"))?;
    created.push("address", &address.allocation_id);
    cloud
        .associate_address(region, &address.allocation_id, &instance_id)
        .await
        .map_err(created.fail("associate address"))?;
    reporter.success(&format!("address {} associated", address.public_ip));

    cloud
        .create_tags(
            region,
            &[instance_id.as_str()],
            &[
                (keys::PROJECT_VOLUME.to_owned(), volume_id.clone()),
                (keys::ALLOCATION_ID.to_owned(), address.allocation_id.clone()),
            ],
        )
        .await
        .map_err(created.fail("tag instance"))?;

    let bootstrap = await_bootstrap(cloud, region, &instance_id, waits, reporter).await;
    Ok(ProvisionResult {
        instance_id,
        public_address: Some(address.public_ip),
        volume_id: Some(volume_id),
        allocation_id: Some(address.allocation_id),
        restarted: false,
        already_running: false,
        bootstrap_status: bootstrap.status,
        bootstrap_error: bootstrap.error_message(),
    })
}

/// Fail with [`VmError::UnsupportedInstanceType`] unless the region offers `instance_type`.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read or does not list the type.
pub async fn ensure_offered(
    cloud: &impl InstanceTypeCatalog,
    region: &str,
    instance_type: &str,
) -> Result<()> {
    let offered = cloud
        .offered_instance_types(region)
        .await
        .with_context(|| format!("listing instance types offered in {region}"))?;
    if !offered.iter().any(|t| t == instance_type) {
        return Err(VmError::UnsupportedInstanceType {
            requested: instance_type.to_owned(),
            region: region.to_owned(),
        }
        .into());
    }
    Ok(())
}
