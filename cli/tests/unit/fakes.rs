//! Shared fakes for service tests.
//!
//! [`FakeCloud`] is an in-memory provider that records every call, advances
//! transitional instance states one step per `describe_instance`, and fails
//! any verb on request. [`FakeClock`] advances virtual time on `sleep`.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use devbox_cli::application::ports::{
    AddressAllocation, AddressAllocator, AddressAssociator, AddressDescriber, AddressReleaser,
    Clock, Filter, ImageQuery, ImageResolver, InstanceDescriber, InstanceLauncher,
    InstanceModifier, InstanceStarter, InstanceStopper, InstanceTerminator, InstanceTypeCatalog,
    LaunchSpec, NetworkResolver, ProgressReporter, ResourceTagger, SubnetPlacement, Volume,
    VolumeAttacher, VolumeCreator, VolumeDeleter, VolumeDescriber, VolumeSpec,
};
use devbox_cli::application::services::vm::poll::WaitContext;
use devbox_cli::domain::{PollPolicy, RequestContext};
use devbox_common::{BootstrapStatus, Vm, VmState, keys, ownership_tags, role};
use tokio_util::sync::CancellationToken;

pub const OWNER: &str = "alice";
pub const NAME: &str = "dev";
pub const REGION: &str = "us-east-1";
pub const EXISTING: &str = "i-existing";

/// Verbs that change provider state.
pub const MUTATING: &[&str] = &[
    "run_instance",
    "start_instance",
    "stop_instance",
    "terminate_instance",
    "modify_instance_type",
    "create_volume",
    "attach_volume",
    "delete_volume",
    "allocate_address",
    "associate_address",
    "release_address",
    "create_tags",
];

pub fn ctx() -> RequestContext {
    RequestContext::new(OWNER, NAME, REGION).expect("valid context")
}

// ── FakeCloud ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct StoredAddress {
    allocation: AddressAllocation,
    tags: BTreeMap<String, String>,
}

pub struct FakeCloud {
    calls: Mutex<Vec<String>>,
    instances: Mutex<Vec<Vm>>,
    volumes: Mutex<Vec<Volume>>,
    addresses: Mutex<Vec<StoredAddress>>,
    offered: Vec<String>,
    failures: Mutex<HashMap<String, String>>,
    /// What the guest writes into the bootstrap tag once the instance runs.
    guest_bootstrap: Mutex<Option<BootstrapStatus>>,
    /// Transitional states never advance.
    frozen: Mutex<bool>,
    /// `describe_instance` never returns.
    hung: Mutex<bool>,
    next_id: Mutex<u32>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            instances: Mutex::new(Vec::new()),
            volumes: Mutex::new(Vec::new()),
            addresses: Mutex::new(Vec::new()),
            offered: ["t3.medium", "t3.large", "m6i.xlarge"]
                .map(str::to_owned)
                .to_vec(),
            failures: Mutex::new(HashMap::new()),
            guest_bootstrap: Mutex::new(Some(BootstrapStatus::Complete)),
            frozen: Mutex::new(false),
            hung: Mutex::new(false),
            next_id: Mutex::new(0),
        }
    }
}

impl FakeCloud {
    /// An account holding the caller's VM in `state`.
    pub fn with_vm(state: VmState, instance_type: &str) -> Self {
        let cloud = Self::default();
        cloud.add_instance(EXISTING, state, instance_type, OWNER, NAME);
        cloud
    }

    pub fn add_instance(&self, id: &str, state: VmState, instance_type: &str, owner: &str, name: &str) {
        let mut tags: BTreeMap<String, String> = ownership_tags(owner, name).into_iter().collect();
        tags.insert(keys::BOOTSTRAP.to_owned(), "complete".to_owned());
        self.instances.lock().unwrap().push(Vm {
            id: id.to_owned(),
            name: name.to_owned(),
            owner: owner.to_owned(),
            state,
            public_address: None,
            instance_type: instance_type.to_owned(),
            launch_time: None,
            bootstrap: BootstrapStatus::Complete,
            availability_zone: Some("us-east-1a".to_owned()),
            tags,
        });
    }

    /// Attach a volume to `instance_id`; `role` `None` means untagged.
    pub fn add_volume(&self, id: &str, instance_id: &str, volume_role: Option<&str>) {
        let mut tags: BTreeMap<String, String> = ownership_tags(OWNER, NAME).into_iter().collect();
        if let Some(r) = volume_role {
            tags.insert(keys::VOLUME_ROLE.to_owned(), r.to_owned());
        }
        self.volumes.lock().unwrap().push(Volume {
            id: id.to_owned(),
            state: "in-use".to_owned(),
            attached_instance: Some(instance_id.to_owned()),
            tags,
        });
    }

    /// A reserved address carrying the ownership tags.
    pub fn add_address(&self, allocation_id: &str, public_ip: &str, instance_id: Option<&str>) {
        self.addresses.lock().unwrap().push(StoredAddress {
            allocation: AddressAllocation {
                allocation_id: allocation_id.to_owned(),
                public_ip: public_ip.to_owned(),
                instance_id: instance_id.map(str::to_owned),
            },
            tags: ownership_tags(OWNER, NAME).into_iter().collect(),
        });
    }

    pub fn set_tag(&self, instance_id: &str, key: &str, value: &str) {
        let mut instances = self.instances.lock().unwrap();
        if let Some(vm) = instances.iter_mut().find(|vm| vm.id == instance_id) {
            vm.tags.insert(key.to_owned(), value.to_owned());
            vm.bootstrap = BootstrapStatus::from_tag(vm.tag(keys::BOOTSTRAP));
        }
    }

    /// Fail `verb` (any argument) or `"verb arg"` (one argument) with `message`.
    pub fn fail_on(&self, key: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(key.to_owned(), message.to_owned());
    }

    /// The guest never reports (`None`) or reports `status`.
    pub fn guest_reports(&self, status: Option<BootstrapStatus>) {
        *self.guest_bootstrap.lock().unwrap() = status;
    }

    pub fn freeze_transitions(&self) {
        *self.frozen.lock().unwrap() = true;
    }

    pub fn hang_describe(&self) {
        *self.hung.lock().unwrap() = true;
    }

    // ── inspection ────────────────────────────────────────────────────────────

    /// Every call as `"verb arg"`, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn verbs(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| c.split(' ').next().unwrap_or_default().to_owned())
            .collect()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.verbs().iter().filter(|v| *v == verb).count()
    }

    pub fn mutating_calls(&self) -> Vec<String> {
        self.verbs()
            .into_iter()
            .filter(|v| MUTATING.contains(&v.as_str()))
            .collect()
    }

    /// Index of the first call to `verb`.
    pub fn position(&self, verb: &str) -> Option<usize> {
        self.verbs().iter().position(|v| v == verb)
    }

    pub fn instance(&self, id: &str) -> Option<Vm> {
        self.instances
            .lock()
            .unwrap()
            .iter()
            .find(|vm| vm.id == id)
            .cloned()
    }

    pub fn instances_owned_by(&self, owner: &str, name: &str) -> Vec<Vm> {
        self.instances
            .lock()
            .unwrap()
            .iter()
            .filter(|vm| vm.is_owned_by(owner, name))
            .cloned()
            .collect()
    }

    pub fn volume_ids(&self) -> Vec<String> {
        self.volumes
            .lock()
            .unwrap()
            .iter()
            .map(|v| v.id.clone())
            .collect()
    }

    pub fn address_ids(&self) -> Vec<String> {
        self.addresses
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.allocation.allocation_id.clone())
            .collect()
    }

    // ── internals ─────────────────────────────────────────────────────────────

    fn call(&self, verb: &str, arg: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("{verb} {arg}"));
        let failures = self.failures.lock().unwrap();
        if let Some(message) = failures
            .get(&format!("{verb} {arg}"))
            .or_else(|| failures.get(verb))
        {
            bail!("{message}");
        }
        Ok(())
    }

    fn next(&self, prefix: &str) -> String {
        let mut n = self.next_id.lock().unwrap();
        *n += 1;
        format!("{prefix}-{n:04}")
    }

    fn with_instance<T>(&self, id: &str, f: impl FnOnce(&mut Vm) -> Result<T>) -> Result<T> {
        let mut instances = self.instances.lock().unwrap();
        match instances.iter_mut().find(|vm| vm.id == id) {
            Some(vm) => f(vm),
            None => bail!("InvalidInstanceID.NotFound: {id}"),
        }
    }

    /// One provider-side step of progress for a transitional instance.
    fn advance(&self, vm: &mut Vm) {
        if *self.frozen.lock().unwrap() {
            return;
        }
        vm.state = match vm.state {
            VmState::Pending => VmState::Running,
            VmState::Stopping => VmState::Stopped,
            VmState::ShuttingDown => VmState::Terminated,
            other => other,
        };
        if vm.state == VmState::Running
            && let Some(status) = *self.guest_bootstrap.lock().unwrap()
        {
            vm.tags
                .insert(keys::BOOTSTRAP.to_owned(), status.as_str().to_owned());
            vm.bootstrap = status;
        }
    }
}

fn tags_match(tags: &BTreeMap<String, String>, filters: &[Filter]) -> bool {
    filters
        .iter()
        .filter_map(|f| f.name.strip_prefix("tag:").map(|key| (key, &f.values)))
        .all(|(key, values)| tags.get(key).is_some_and(|v| values.contains(v)))
}

fn field_matches(filters: &[Filter], name: &str, value: Option<&str>) -> bool {
    filters
        .iter()
        .filter(|f| f.name == name)
        .all(|f| value.is_some_and(|v| f.values.iter().any(|x| x == v)))
}

impl InstanceDescriber for FakeCloud {
    async fn describe_instances(&self, region: &str, filters: &[Filter]) -> Result<Vec<Vm>> {
        self.call("describe_instances", region)?;
        Ok(self
            .instances
            .lock()
            .unwrap()
            .iter()
            .filter(|vm| tags_match(&vm.tags, filters))
            .filter(|vm| field_matches(filters, "instance-state-name", Some(vm.state.as_str())))
            .cloned()
            .collect())
    }

    async fn describe_instance(&self, _region: &str, instance_id: &str) -> Result<Option<Vm>> {
        self.call("describe_instance", instance_id)?;
        let hung = *self.hung.lock().unwrap();
        if hung {
            std::future::pending::<()>().await;
        }
        let mut instances = self.instances.lock().unwrap();
        let Some(vm) = instances.iter_mut().find(|vm| vm.id == instance_id) else {
            return Ok(None);
        };
        self.advance(vm);
        Ok(Some(vm.clone()))
    }
}

impl InstanceLauncher for FakeCloud {
    async fn run_instance(&self, _region: &str, spec: &LaunchSpec<'_>) -> Result<String> {
        self.call("run_instance", spec.instance_type)?;
        let id = self.next("i");
        let tags: BTreeMap<String, String> = spec.tags.iter().cloned().collect();
        self.instances.lock().unwrap().push(Vm {
            id: id.clone(),
            name: tags.get(keys::NAME).cloned().unwrap_or_default(),
            owner: tags.get(keys::OWNER).cloned().unwrap_or_default(),
            state: VmState::Pending,
            public_address: None,
            instance_type: spec.instance_type.to_owned(),
            launch_time: None,
            bootstrap: BootstrapStatus::from_tag(tags.get(keys::BOOTSTRAP).map(String::as_str)),
            availability_zone: Some("us-east-1a".to_owned()),
            tags,
        });
        Ok(id)
    }
}

impl InstanceStarter for FakeCloud {
    async fn start_instance(&self, _region: &str, instance_id: &str) -> Result<()> {
        self.call("start_instance", instance_id)?;
        self.with_instance(instance_id, |vm| {
            if vm.state != VmState::Stopped {
                bail!("IncorrectInstanceState: {instance_id} is {}", vm.state);
            }
            vm.state = VmState::Pending;
            Ok(())
        })
    }
}

impl InstanceStopper for FakeCloud {
    async fn stop_instance(&self, _region: &str, instance_id: &str) -> Result<()> {
        self.call("stop_instance", instance_id)?;
        self.with_instance(instance_id, |vm| {
            vm.state = VmState::Stopping;
            Ok(())
        })
    }
}

impl InstanceTerminator for FakeCloud {
    async fn terminate_instance(&self, _region: &str, instance_id: &str) -> Result<()> {
        self.call("terminate_instance", instance_id)?;
        self.with_instance(instance_id, |vm| {
            vm.state = VmState::ShuttingDown;
            Ok(())
        })?;
        for volume in self.volumes.lock().unwrap().iter_mut() {
            if volume.attached_instance.as_deref() == Some(instance_id) {
                volume.attached_instance = None;
                "available".clone_into(&mut volume.state);
            }
        }
        Ok(())
    }
}

impl InstanceModifier for FakeCloud {
    async fn modify_instance_type(
        &self,
        _region: &str,
        instance_id: &str,
        instance_type: &str,
    ) -> Result<()> {
        self.call("modify_instance_type", instance_type)?;
        self.with_instance(instance_id, |vm| {
            if vm.state != VmState::Stopped {
                bail!("IncorrectInstanceState: {instance_id} is {}", vm.state);
            }
            instance_type.clone_into(&mut vm.instance_type);
            Ok(())
        })
    }
}

impl InstanceTypeCatalog for FakeCloud {
    async fn offered_instance_types(&self, region: &str) -> Result<Vec<String>> {
        self.call("offered_instance_types", region)?;
        Ok(self.offered.clone())
    }
}

impl ImageResolver for FakeCloud {
    async fn resolve_image(&self, _region: &str, query: &ImageQuery<'_>) -> Result<String> {
        self.call("resolve_image", query.owner)?;
        Ok("ami-0123456789".to_owned())
    }
}

impl NetworkResolver for FakeCloud {
    async fn resolve_subnet(&self, _region: &str, subnet_id: Option<&str>) -> Result<SubnetPlacement> {
        self.call("resolve_subnet", subnet_id.unwrap_or("default"))?;
        Ok(SubnetPlacement {
            subnet_id: subnet_id.unwrap_or("subnet-default").to_owned(),
            availability_zone: "us-east-1a".to_owned(),
        })
    }

    async fn resolve_security_groups(&self, _region: &str, names: &[String]) -> Result<Vec<String>> {
        self.call("resolve_security_groups", &names.join(","))?;
        Ok(names.iter().map(|n| format!("sg-{n}")).collect())
    }
}

impl VolumeCreator for FakeCloud {
    async fn create_volume(&self, _region: &str, spec: &VolumeSpec<'_>) -> Result<String> {
        self.call("create_volume", &spec.size_gib.to_string())?;
        let id = self.next("vol");
        self.volumes.lock().unwrap().push(Volume {
            id: id.clone(),
            state: "available".to_owned(),
            attached_instance: None,
            tags: spec.tags.iter().cloned().collect(),
        });
        Ok(id)
    }
}

impl VolumeAttacher for FakeCloud {
    async fn attach_volume(
        &self,
        _region: &str,
        volume_id: &str,
        instance_id: &str,
        _device: &str,
    ) -> Result<()> {
        self.call("attach_volume", volume_id)?;
        let mut volumes = self.volumes.lock().unwrap();
        let Some(volume) = volumes.iter_mut().find(|v| v.id == volume_id) else {
            bail!("InvalidVolume.NotFound: {volume_id}");
        };
        volume.attached_instance = Some(instance_id.to_owned());
        "in-use".clone_into(&mut volume.state);
        Ok(())
    }
}

impl VolumeDescriber for FakeCloud {
    async fn describe_volumes(&self, region: &str, filters: &[Filter]) -> Result<Vec<Volume>> {
        self.call("describe_volumes", region)?;
        Ok(self
            .volumes
            .lock()
            .unwrap()
            .iter()
            .filter(|v| tags_match(&v.tags, filters))
            .filter(|v| field_matches(filters, "attachment.instance-id", v.attached_instance.as_deref()))
            .cloned()
            .collect())
    }
}

impl VolumeDeleter for FakeCloud {
    async fn delete_volume(&self, _region: &str, volume_id: &str) -> Result<()> {
        self.call("delete_volume", volume_id)?;
        self.volumes.lock().unwrap().retain(|v| v.id != volume_id);
        Ok(())
    }
}

impl AddressAllocator for FakeCloud {
    async fn allocate_address(
        &self,
        region: &str,
        tags: &[(String, String)],
    ) -> Result<AddressAllocation> {
        self.call("allocate_address", region)?;
        let allocation_id = self.next("eipalloc");
        let n = self.addresses.lock().unwrap().len() + 10;
        let allocation = AddressAllocation {
            allocation_id,
            public_ip: format!("203.0.113.{n}"),
            instance_id: None,
        };
        self.addresses.lock().unwrap().push(StoredAddress {
            allocation: allocation.clone(),
            tags: tags.iter().cloned().collect(),
        });
        Ok(allocation)
    }
}

impl AddressAssociator for FakeCloud {
    async fn associate_address(
        &self,
        _region: &str,
        allocation_id: &str,
        instance_id: &str,
    ) -> Result<()> {
        self.call("associate_address", allocation_id)?;
        let mut addresses = self.addresses.lock().unwrap();
        let Some(addr) = addresses
            .iter_mut()
            .find(|a| a.allocation.allocation_id == allocation_id)
        else {
            bail!("InvalidAllocationID.NotFound: {allocation_id}");
        };
        addr.allocation.instance_id = Some(instance_id.to_owned());
        Ok(())
    }
}

impl AddressDescriber for FakeCloud {
    async fn describe_addresses(
        &self,
        region: &str,
        filters: &[Filter],
    ) -> Result<Vec<AddressAllocation>> {
        self.call("describe_addresses", region)?;
        Ok(self
            .addresses
            .lock()
            .unwrap()
            .iter()
            .filter(|a| tags_match(&a.tags, filters))
            .filter(|a| field_matches(filters, "allocation-id", Some(&a.allocation.allocation_id)))
            .map(|a| a.allocation.clone())
            .collect())
    }
}

impl AddressReleaser for FakeCloud {
    async fn release_address(&self, _region: &str, allocation_id: &str) -> Result<()> {
        self.call("release_address", allocation_id)?;
        self.addresses
            .lock()
            .unwrap()
            .retain(|a| a.allocation.allocation_id != allocation_id);
        Ok(())
    }
}

impl ResourceTagger for FakeCloud {
    async fn create_tags(
        &self,
        _region: &str,
        resource_ids: &[&str],
        tags: &[(String, String)],
    ) -> Result<()> {
        self.call("create_tags", &resource_ids.join(","))?;
        for id in resource_ids {
            for (key, value) in tags {
                self.set_tag(id, key, value);
            }
        }
        Ok(())
    }
}

// ── FakeClock ─────────────────────────────────────────────────────────────────

/// Virtual time: `sleep` advances `now` instantly.
pub struct FakeClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }
}

impl FakeClock {
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.offset.lock().unwrap() += duration;
    }
}

/// Clock plus cancellation token, with the default poll policies.
#[derive(Default)]
pub struct Waits {
    pub clock: FakeClock,
    pub cancel: CancellationToken,
}

impl Waits {
    pub fn context(&self) -> WaitContext<'_, FakeClock> {
        WaitContext {
            clock: &self.clock,
            cancel: &self.cancel,
            instance: PollPolicy {
                interval: Duration::from_secs(5),
                timeout: Duration::from_secs(600),
            },
            bootstrap: PollPolicy {
                interval: Duration::from_secs(10),
                timeout: Duration::from_secs(900),
            },
        }
    }
}

// ── RecordingReporter ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingReporter {
    pub warnings: Mutex<Vec<String>>,
    pub lines: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("step: {message}"));
    }

    fn success(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("ok: {message}"));
    }

    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_owned());
    }
}

/// Role tag helpers for readability in destroy tests.
pub const PROJECT: Option<&str> = Some(role::PROJECT);
pub const PERSISTENT: Option<&str> = Some(role::PERSISTENT);
