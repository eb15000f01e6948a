//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! Each cloud verb is its own trait so a service (and its test fakes) only
//! implements the verbs it actually calls. Every cloud verb takes the region
//! explicitly. This file imports only from `crate::domain` and
//! `devbox_common`, never from `crate::infra`, `crate::commands`, or
//! `crate::output`.

use std::collections::BTreeMap;
use std::process::Output;
use std::time::{Duration, Instant};

use anyhow::Result;
use devbox_common::Vm;

use crate::domain::DevboxConfig;
use crate::domain::config::VolumePerformance;

// ── Value Types ───────────────────────────────────────────────────────────────

/// A provider-side filter, e.g. `tag:devbox:owner = [alice]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Match resources carrying `key=value`.
    #[must_use]
    pub fn tag(key: &str, value: &str) -> Self {
        Self::new(format!("tag:{key}"), vec![value.to_owned()])
    }
}

/// Launch parameters for a new compute instance.
pub struct LaunchSpec<'a> {
    pub image_id: &'a str,
    pub instance_type: &'a str,
    pub subnet_id: &'a str,
    pub security_group_ids: &'a [String],
    pub key_name: Option<&'a str>,
    pub instance_profile: Option<&'a str>,
    /// First-boot script.
    pub user_data: &'a str,
    /// Applied to the instance and its root volume at launch.
    pub tags: &'a [(String, String)],
}

/// Machine image lookup by name pattern and publisher account.
pub struct ImageQuery<'a> {
    pub name_pattern: &'a str,
    pub owner: &'a str,
}

/// Where an instance will be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetPlacement {
    pub subnet_id: String,
    pub availability_zone: String,
}

/// Creation parameters for a data volume.
pub struct VolumeSpec<'a> {
    pub availability_zone: &'a str,
    pub size_gib: u32,
    pub performance: VolumePerformance,
    pub tags: &'a [(String, String)],
}

/// A block volume as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub id: String,
    pub state: String,
    pub attached_instance: Option<String>,
    pub tags: BTreeMap<String, String>,
}

/// A reserved public address allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressAllocation {
    pub allocation_id: String,
    pub public_ip: String,
    pub instance_id: Option<String>,
}

// ── Instance Port Traits ──────────────────────────────────────────────────────

/// Instance lookup. Also the basis of every bounded state wait.
#[allow(async_fn_in_trait)]
pub trait InstanceDescriber {
    /// All instances matching every filter.
    async fn describe_instances(&self, region: &str, filters: &[Filter]) -> Result<Vec<Vm>>;
    /// One instance by id, `None` when the provider no longer knows it.
    async fn describe_instance(&self, region: &str, instance_id: &str) -> Result<Option<Vm>>;
}

/// Launch a compute instance; returns its id.
#[allow(async_fn_in_trait)]
pub trait InstanceLauncher {
    async fn run_instance(&self, region: &str, spec: &LaunchSpec<'_>) -> Result<String>;
}

#[allow(async_fn_in_trait)]
pub trait InstanceStarter {
    async fn start_instance(&self, region: &str, instance_id: &str) -> Result<()>;
}

#[allow(async_fn_in_trait)]
pub trait InstanceStopper {
    async fn stop_instance(&self, region: &str, instance_id: &str) -> Result<()>;
}

#[allow(async_fn_in_trait)]
pub trait InstanceTerminator {
    async fn terminate_instance(&self, region: &str, instance_id: &str) -> Result<()>;
}

/// Change the instance type of a stopped instance.
#[allow(async_fn_in_trait)]
pub trait InstanceModifier {
    async fn modify_instance_type(
        &self,
        region: &str,
        instance_id: &str,
        instance_type: &str,
    ) -> Result<()>;
}

/// Live per-region catalog of instance types that can be launched.
#[allow(async_fn_in_trait)]
pub trait InstanceTypeCatalog {
    async fn offered_instance_types(&self, region: &str) -> Result<Vec<String>>;
}

// ── Pre-check Port Traits ─────────────────────────────────────────────────────

/// Resolve the newest image matching a query; returns the image id.
#[allow(async_fn_in_trait)]
pub trait ImageResolver {
    async fn resolve_image(&self, region: &str, query: &ImageQuery<'_>) -> Result<String>;
}

/// Resolve subnet placement and security group ids.
#[allow(async_fn_in_trait)]
pub trait NetworkResolver {
    /// `subnet_id` pins a subnet; `None` selects the region's default subnet.
    async fn resolve_subnet(&self, region: &str, subnet_id: Option<&str>)
    -> Result<SubnetPlacement>;
    /// Group names to ids. Fails if any name does not exist.
    async fn resolve_security_groups(&self, region: &str, names: &[String])
    -> Result<Vec<String>>;
}

// ── Volume Port Traits ────────────────────────────────────────────────────────

/// Create a volume and return its id once it can be attached.
#[allow(async_fn_in_trait)]
pub trait VolumeCreator {
    async fn create_volume(&self, region: &str, spec: &VolumeSpec<'_>) -> Result<String>;
}

#[allow(async_fn_in_trait)]
pub trait VolumeAttacher {
    async fn attach_volume(
        &self,
        region: &str,
        volume_id: &str,
        instance_id: &str,
        device: &str,
    ) -> Result<()>;
}

#[allow(async_fn_in_trait)]
pub trait VolumeDescriber {
    async fn describe_volumes(&self, region: &str, filters: &[Filter]) -> Result<Vec<Volume>>;
}

#[allow(async_fn_in_trait)]
pub trait VolumeDeleter {
    async fn delete_volume(&self, region: &str, volume_id: &str) -> Result<()>;
}

// ── Address Port Traits ───────────────────────────────────────────────────────

/// Allocate a reserved public address, tagged at allocation.
#[allow(async_fn_in_trait)]
pub trait AddressAllocator {
    async fn allocate_address(
        &self,
        region: &str,
        tags: &[(String, String)],
    ) -> Result<AddressAllocation>;
}

#[allow(async_fn_in_trait)]
pub trait AddressAssociator {
    async fn associate_address(
        &self,
        region: &str,
        allocation_id: &str,
        instance_id: &str,
    ) -> Result<()>;
}

#[allow(async_fn_in_trait)]
pub trait AddressDescriber {
    async fn describe_addresses(
        &self,
        region: &str,
        filters: &[Filter],
    ) -> Result<Vec<AddressAllocation>>;
}

#[allow(async_fn_in_trait)]
pub trait AddressReleaser {
    async fn release_address(&self, region: &str, allocation_id: &str) -> Result<()>;
}

// ── Tagging Port ──────────────────────────────────────────────────────────────

#[allow(async_fn_in_trait)]
pub trait ResourceTagger {
    async fn create_tags(
        &self,
        region: &str,
        resource_ids: &[&str],
        tags: &[(String, String)],
    ) -> Result<()>;
}

// ── Composite Traits ──────────────────────────────────────────────────────────

/// Every verb the provisioner uses.
pub trait ProvisionCloud:
    InstanceDescriber
    + InstanceLauncher
    + InstanceStarter
    + InstanceTypeCatalog
    + ImageResolver
    + NetworkResolver
    + VolumeCreator
    + VolumeAttacher
    + VolumeDescriber
    + AddressAllocator
    + AddressAssociator
    + AddressDescriber
    + ResourceTagger
{
}

impl<T> ProvisionCloud for T where
    T: InstanceDescriber
        + InstanceLauncher
        + InstanceStarter
        + InstanceTypeCatalog
        + ImageResolver
        + NetworkResolver
        + VolumeCreator
        + VolumeAttacher
        + VolumeDescriber
        + AddressAllocator
        + AddressAssociator
        + AddressDescriber
        + ResourceTagger
{
}

/// Every verb the resizer uses.
pub trait ResizeCloud:
    InstanceDescriber + InstanceStopper + InstanceStarter + InstanceModifier + InstanceTypeCatalog
{
}

impl<T> ResizeCloud for T where
    T: InstanceDescriber
        + InstanceStopper
        + InstanceStarter
        + InstanceModifier
        + InstanceTypeCatalog
{
}

/// Every verb the destroyer uses.
pub trait TeardownCloud:
    InstanceDescriber
    + InstanceTerminator
    + VolumeDescriber
    + VolumeDeleter
    + AddressDescriber
    + AddressReleaser
{
}

impl<T> TeardownCloud for T where
    T: InstanceDescriber
        + InstanceTerminator
        + VolumeDescriber
        + VolumeDeleter
        + AddressDescriber
        + AddressReleaser
{
}

/// The full provider surface, implemented by the production adapter.
pub trait CloudApi: ProvisionCloud + ResizeCloud + TeardownCloud + InstanceStopper {}

impl<T> CloudApi for T where T: ProvisionCloud + ResizeCloud + TeardownCloud + InstanceStopper {}

// ── Clock Port ────────────────────────────────────────────────────────────────

/// Time source for wait loops, so tests can advance time without sleeping.
#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Synchronous.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
    /// Start a long wait. Ended by the next `success` or `warn`.
    fn waiting(&self, message: &str) {
        self.step(message);
    }
}

// ── Config Port ───────────────────────────────────────────────────────────────

/// Abstracts config persistence (load/save).
pub trait ConfigStore {
    /// Load the config, returning defaults when no file exists.
    fn load(&self) -> Result<DevboxConfig>;
    /// Persist the config.
    fn save(&self, config: &DevboxConfig) -> Result<()>;
    /// Location of the config file.
    fn path(&self) -> Result<std::path::PathBuf>;
}
