//! Infrastructure implementation of the cloud port traits.
//!
//! `AwsCliCloud<R>` drives `aws ec2 <verb> ... --region <r> --output json`
//! through a `CommandRunner` and parses the JSON replies with serde. A
//! non-zero exit becomes an error carrying the CLI's stderr verbatim. Every
//! call is abandoned, and its process killed, when the invocation is
//! cancelled.

use std::collections::BTreeMap;
use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use devbox_common::{BootstrapStatus, Vm, keys};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AddressAllocation, AddressAllocator, AddressAssociator, AddressDescriber, AddressReleaser,
    CommandRunner, Filter, ImageQuery, ImageResolver, InstanceDescriber, InstanceLauncher,
    InstanceModifier, InstanceStarter, InstanceStopper, InstanceTerminator, InstanceTypeCatalog,
    LaunchSpec, NetworkResolver, ResourceTagger, SubnetPlacement, Volume, VolumeAttacher,
    VolumeCreator, VolumeDeleter, VolumeDescriber, VolumeSpec,
};
use crate::infra::command_runner::DEFAULT_CMD_TIMEOUT;

const AWS: &str = "aws";

/// Upper bound for `aws ec2 wait volume-available`.
const VOLUME_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Error codes meaning "this id is unknown to the provider".
const NOT_FOUND_CODES: &[&str] = &["InvalidInstanceID.NotFound", "InvalidInstanceID.Malformed"];

/// Cloud adapter that routes every call through a `CommandRunner`.
///
/// Generic over `R: CommandRunner` so tests can inject a scripted runner
/// without spawning real processes.
pub struct AwsCliCloud<R: CommandRunner> {
    runner: R,
    cancel: CancellationToken,
}

impl<R: CommandRunner> AwsCliCloud<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            cancel: CancellationToken::new(),
        }
    }

    /// Abandon in-flight calls once `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn aws(&self, args: &[&str], timeout: Duration) -> Result<Output> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                anyhow::bail!("interrupted before `aws {}` finished", args.join(" "))
            }
            output = self.runner.run_with_timeout(AWS, args, timeout) => output,
        }
    }

    /// Run `aws ec2 <verb> <args> --region <region> --output json`.
    async fn ec2(&self, region: &str, verb: &str, args: &[&str]) -> Result<Vec<u8>> {
        let mut argv = vec!["ec2", verb];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["--region", region, "--output", "json"]);

        let output = self
            .aws(&argv, DEFAULT_CMD_TIMEOUT)
            .await
            .with_context(|| format!("aws ec2 {verb}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("aws ec2 {verb} failed: {}", stderr.trim());
        }
        Ok(output.stdout)
    }

    async fn ec2_json<T: DeserializeOwned>(
        &self,
        region: &str,
        verb: &str,
        args: &[&str],
    ) -> Result<T> {
        let stdout = self.ec2(region, verb, args).await?;
        serde_json::from_slice(&stdout).with_context(|| format!("parsing aws ec2 {verb} output"))
    }
}

// ── Argument encoding ─────────────────────────────────────────────────────────

/// `--filters` values, one `Name=..,Values=..` argument per filter.
fn filter_args(filters: &[Filter]) -> Vec<String> {
    filters
        .iter()
        .map(|f| format!("Name={},Values={}", f.name, f.values.join(",")))
        .collect()
}

fn tag_list(tags: &[(String, String)]) -> serde_json::Value {
    tags.iter()
        .map(|(k, v)| serde_json::json!({ "Key": k, "Value": v }))
        .collect()
}

/// JSON `--tag-specifications` for the given resource types.
fn tag_specifications(resource_types: &[&str], tags: &[(String, String)]) -> String {
    let specs: Vec<serde_json::Value> = resource_types
        .iter()
        .map(|rt| serde_json::json!({ "ResourceType": rt, "Tags": tag_list(tags) }))
        .collect();
    serde_json::Value::Array(specs).to_string()
}

/// Push `--filters a b c` when there are filters.
fn push_filters<'a>(args: &mut Vec<&'a str>, encoded: &'a [String]) {
    if !encoded.is_empty() {
        args.push("--filters");
        args.extend(encoded.iter().map(String::as_str));
    }
}

// ── Response shapes ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Tag {
    key: String,
    value: String,
}

fn tag_map(tags: Vec<Tag>) -> BTreeMap<String, String> {
    tags.into_iter().map(|t| (t.key, t.value)).collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesOutput {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Instance {
    instance_id: String,
    instance_type: String,
    state: InstanceStateName,
    #[serde(default)]
    public_ip_address: Option<String>,
    #[serde(default)]
    launch_time: Option<DateTime<Utc>>,
    #[serde(default)]
    placement: Option<Placement>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceStateName {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Placement {
    availability_zone: Option<String>,
}

impl TryFrom<Instance> for Vm {
    type Error = anyhow::Error;

    fn try_from(instance: Instance) -> Result<Self> {
        let state = instance
            .state
            .name
            .parse()
            .with_context(|| format!("instance {}", instance.instance_id))?;
        let tags = tag_map(instance.tags);
        Ok(Vm {
            name: tags.get(keys::NAME).cloned().unwrap_or_default(),
            owner: tags.get(keys::OWNER).cloned().unwrap_or_default(),
            bootstrap: BootstrapStatus::from_tag(tags.get(keys::BOOTSTRAP).map(String::as_str)),
            id: instance.instance_id,
            state,
            public_address: instance.public_ip_address,
            instance_type: instance.instance_type,
            launch_time: instance.launch_time,
            availability_zone: instance.placement.and_then(|p| p.availability_zone),
            tags,
        })
    }
}

fn instances_to_vms(output: DescribeInstancesOutput) -> Result<Vec<Vm>> {
    output
        .reservations
        .into_iter()
        .flat_map(|r| r.instances)
        .map(Vm::try_from)
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstancesOutput {
    instances: Vec<LaunchedInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LaunchedInstance {
    instance_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TypeOfferingsOutput {
    #[serde(default)]
    instance_type_offerings: Vec<TypeOffering>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TypeOffering {
    instance_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeImagesOutput {
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Image {
    image_id: String,
    #[serde(default)]
    creation_date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSubnetsOutput {
    #[serde(default)]
    subnets: Vec<Subnet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Subnet {
    subnet_id: String,
    availability_zone: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecurityGroupsOutput {
    #[serde(default)]
    security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroup {
    group_id: String,
    group_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateVolumeOutput {
    volume_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeVolumesOutput {
    #[serde(default)]
    volumes: Vec<VolumeItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VolumeItem {
    volume_id: String,
    state: String,
    #[serde(default)]
    attachments: Vec<VolumeAttachment>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VolumeAttachment {
    instance_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AllocateAddressOutput {
    allocation_id: String,
    public_ip: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeAddressesOutput {
    #[serde(default)]
    addresses: Vec<AddressItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddressItem {
    allocation_id: String,
    public_ip: String,
    #[serde(default)]
    instance_id: Option<String>,
}

// ── Port implementations ──────────────────────────────────────────────────────

impl<R: CommandRunner> InstanceDescriber for AwsCliCloud<R> {
    async fn describe_instances(&self, region: &str, filters: &[Filter]) -> Result<Vec<Vm>> {
        let encoded = filter_args(filters);
        let mut args = Vec::new();
        push_filters(&mut args, &encoded);
        let output: DescribeInstancesOutput =
            self.ec2_json(region, "describe-instances", &args).await?;
        instances_to_vms(output)
    }

    async fn describe_instance(&self, region: &str, instance_id: &str) -> Result<Option<Vm>> {
        let output: DescribeInstancesOutput = match self
            .ec2_json(region, "describe-instances", &["--instance-ids", instance_id])
            .await
        {
            Ok(output) => output,
            Err(e) if NOT_FOUND_CODES.iter().any(|code| format!("{e:#}").contains(code)) => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        Ok(instances_to_vms(output)?.into_iter().next())
    }
}

impl<R: CommandRunner> InstanceLauncher for AwsCliCloud<R> {
    async fn run_instance(&self, region: &str, spec: &LaunchSpec<'_>) -> Result<String> {
        let tags = tag_specifications(&["instance", "volume"], spec.tags);
        let profile = spec.instance_profile.map(|p| format!("Name={p}"));
        let mut args = vec![
            "--image-id",
            spec.image_id,
            "--instance-type",
            spec.instance_type,
            "--subnet-id",
            spec.subnet_id,
            "--count",
            "1",
            "--user-data",
            spec.user_data,
            "--tag-specifications",
            tags.as_str(),
            "--metadata-options",
            "HttpTokens=required,HttpEndpoint=enabled",
        ];
        if !spec.security_group_ids.is_empty() {
            args.push("--security-group-ids");
            args.extend(spec.security_group_ids.iter().map(String::as_str));
        }
        if let Some(key) = spec.key_name {
            args.extend(["--key-name", key]);
        }
        if let Some(profile) = &profile {
            args.extend(["--iam-instance-profile", profile.as_str()]);
        }
        let output: RunInstancesOutput = self.ec2_json(region, "run-instances", &args).await?;
        output
            .instances
            .into_iter()
            .next()
            .map(|i| i.instance_id)
            .context("aws ec2 run-instances returned no instance")
    }
}

impl<R: CommandRunner> InstanceStarter for AwsCliCloud<R> {
    async fn start_instance(&self, region: &str, instance_id: &str) -> Result<()> {
        self.ec2(region, "start-instances", &["--instance-ids", instance_id])
            .await
            .map(drop)
    }
}

impl<R: CommandRunner> InstanceStopper for AwsCliCloud<R> {
    async fn stop_instance(&self, region: &str, instance_id: &str) -> Result<()> {
        self.ec2(region, "stop-instances", &["--instance-ids", instance_id])
            .await
            .map(drop)
    }
}

impl<R: CommandRunner> InstanceTerminator for AwsCliCloud<R> {
    async fn terminate_instance(&self, region: &str, instance_id: &str) -> Result<()> {
        self.ec2(region, "terminate-instances", &["--instance-ids", instance_id])
            .await
            .map(drop)
    }
}

impl<R: CommandRunner> InstanceModifier for AwsCliCloud<R> {
    async fn modify_instance_type(
        &self,
        region: &str,
        instance_id: &str,
        instance_type: &str,
    ) -> Result<()> {
        let value = format!("Value={instance_type}");
        self.ec2(
            region,
            "modify-instance-attribute",
            &["--instance-id", instance_id, "--instance-type", value.as_str()],
        )
        .await
        .map(drop)
    }
}

impl<R: CommandRunner> InstanceTypeCatalog for AwsCliCloud<R> {
    async fn offered_instance_types(&self, region: &str) -> Result<Vec<String>> {
        let output: TypeOfferingsOutput = self
            .ec2_json(
                region,
                "describe-instance-type-offerings",
                &["--location-type", "region"],
            )
            .await?;
        Ok(output
            .instance_type_offerings
            .into_iter()
            .map(|o| o.instance_type)
            .collect())
    }
}

impl<R: CommandRunner> ImageResolver for AwsCliCloud<R> {
    async fn resolve_image(&self, region: &str, query: &ImageQuery<'_>) -> Result<String> {
        let encoded = filter_args(&[
            Filter::new("name", vec![query.name_pattern.to_owned()]),
            Filter::new("state", vec!["available".to_owned()]),
        ]);
        let mut args = vec!["--owners", query.owner];
        push_filters(&mut args, &encoded);
        let output: DescribeImagesOutput = self.ec2_json(region, "describe-images", &args).await?;
        output
            .images
            .into_iter()
            .max_by(|a, b| a.creation_date.cmp(&b.creation_date))
            .map(|image| image.image_id)
            .with_context(|| {
                format!(
                    "no image named '{}' published by {} in {region}",
                    query.name_pattern, query.owner
                )
            })
    }
}

impl<R: CommandRunner> NetworkResolver for AwsCliCloud<R> {
    async fn resolve_subnet(
        &self,
        region: &str,
        subnet_id: Option<&str>,
    ) -> Result<SubnetPlacement> {
        let encoded = filter_args(&[Filter::new("default-for-az", vec!["true".to_owned()])]);
        let mut args = Vec::new();
        match subnet_id {
            Some(id) => args.extend(["--subnet-ids", id]),
            None => push_filters(&mut args, &encoded),
        }
        let output: DescribeSubnetsOutput = self.ec2_json(region, "describe-subnets", &args).await?;
        output
            .subnets
            .into_iter()
            .min_by(|a, b| a.availability_zone.cmp(&b.availability_zone))
            .map(|s| SubnetPlacement {
                subnet_id: s.subnet_id,
                availability_zone: s.availability_zone,
            })
            .with_context(|| match subnet_id {
                Some(id) => format!("subnet {id} not found in {region}"),
                None => format!("{region} has no default subnet; set instance.subnet_id"),
            })
    }

    async fn resolve_security_groups(&self, region: &str, names: &[String]) -> Result<Vec<String>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let encoded = filter_args(&[Filter::new("group-name", names.to_vec())]);
        let mut args = Vec::new();
        push_filters(&mut args, &encoded);
        let output: DescribeSecurityGroupsOutput = self
            .ec2_json(region, "describe-security-groups", &args)
            .await?;
        names
            .iter()
            .map(|name| {
                output
                    .security_groups
                    .iter()
                    .find(|g| &g.group_name == name)
                    .map(|g| g.group_id.clone())
                    .with_context(|| format!("security group '{name}' not found in {region}"))
            })
            .collect()
    }
}

impl<R: CommandRunner> VolumeCreator for AwsCliCloud<R> {
    async fn create_volume(&self, region: &str, spec: &VolumeSpec<'_>) -> Result<String> {
        let size = spec.size_gib.to_string();
        let iops = spec.performance.iops.to_string();
        let throughput = spec.performance.throughput.map(|t| t.to_string());
        let tags = tag_specifications(&["volume"], spec.tags);
        let mut args = vec![
            "--availability-zone",
            spec.availability_zone,
            "--size",
            size.as_str(),
            "--volume-type",
            spec.performance.volume_type,
            "--iops",
            iops.as_str(),
            "--tag-specifications",
            tags.as_str(),
        ];
        if let Some(throughput) = &throughput {
            args.extend(["--throughput", throughput.as_str()]);
        }
        let output: CreateVolumeOutput = self.ec2_json(region, "create-volume", &args).await?;

        self.aws(
            &[
                "ec2",
                "wait",
                "volume-available",
                "--volume-ids",
                output.volume_id.as_str(),
                "--region",
                region,
            ],
            VOLUME_WAIT_TIMEOUT,
        )
        .await
            .and_then(|o| {
                anyhow::ensure!(
                    o.status.success(),
                    "{}",
                    String::from_utf8_lossy(&o.stderr).trim()
                );
                Ok(())
            })
            .with_context(|| format!("waiting for volume {} to become available", output.volume_id))?;
        Ok(output.volume_id)
    }
}

impl<R: CommandRunner> VolumeAttacher for AwsCliCloud<R> {
    async fn attach_volume(
        &self,
        region: &str,
        volume_id: &str,
        instance_id: &str,
        device: &str,
    ) -> Result<()> {
        self.ec2(
            region,
            "attach-volume",
            &[
                "--volume-id",
                volume_id,
                "--instance-id",
                instance_id,
                "--device",
                device,
            ],
        )
        .await
        .map(drop)
    }
}

impl<R: CommandRunner> VolumeDescriber for AwsCliCloud<R> {
    async fn describe_volumes(&self, region: &str, filters: &[Filter]) -> Result<Vec<Volume>> {
        let encoded = filter_args(filters);
        let mut args = Vec::new();
        push_filters(&mut args, &encoded);
        let output: DescribeVolumesOutput =
            self.ec2_json(region, "describe-volumes", &args).await?;
        Ok(output
            .volumes
            .into_iter()
            .map(|v| Volume {
                id: v.volume_id,
                state: v.state,
                attached_instance: v.attachments.into_iter().find_map(|a| a.instance_id),
                tags: tag_map(v.tags),
            })
            .collect())
    }
}

impl<R: CommandRunner> VolumeDeleter for AwsCliCloud<R> {
    async fn delete_volume(&self, region: &str, volume_id: &str) -> Result<()> {
        self.ec2(region, "delete-volume", &["--volume-id", volume_id])
            .await
            .map(drop)
    }
}

impl<R: CommandRunner> AddressAllocator for AwsCliCloud<R> {
    async fn allocate_address(
        &self,
        region: &str,
        tags: &[(String, String)],
    ) -> Result<AddressAllocation> {
        let tags = tag_specifications(&["elastic-ip"], tags);
        let output: AllocateAddressOutput = self
            .ec2_json(
                region,
                "allocate-address",
                &["--domain", "vpc", "--tag-specifications", tags.as_str()],
            )
            .await?;
        Ok(AddressAllocation {
            allocation_id: output.allocation_id,
            public_ip: output.public_ip,
            instance_id: None,
        })
    }
}

impl<R: CommandRunner> AddressAssociator for AwsCliCloud<R> {
    async fn associate_address(
        &self,
        region: &str,
        allocation_id: &str,
        instance_id: &str,
    ) -> Result<()> {
        self.ec2(
            region,
            "associate-address",
            &["--allocation-id", allocation_id, "--instance-id", instance_id],
        )
        .await
        .map(drop)
    }
}

impl<R: CommandRunner> AddressDescriber for AwsCliCloud<R> {
    async fn describe_addresses(
        &self,
        region: &str,
        filters: &[Filter],
    ) -> Result<Vec<AddressAllocation>> {
        let encoded = filter_args(filters);
        let mut args = Vec::new();
        push_filters(&mut args, &encoded);
        let output: DescribeAddressesOutput =
            self.ec2_json(region, "describe-addresses", &args).await?;
        Ok(output
            .addresses
            .into_iter()
            .map(|a| AddressAllocation {
                allocation_id: a.allocation_id,
                public_ip: a.public_ip,
                instance_id: a.instance_id,
            })
            .collect())
    }
}

impl<R: CommandRunner> AddressReleaser for AwsCliCloud<R> {
    async fn release_address(&self, region: &str, allocation_id: &str) -> Result<()> {
        self.ec2(region, "release-address", &["--allocation-id", allocation_id])
            .await
            .map(drop)
    }
}

impl<R: CommandRunner> ResourceTagger for AwsCliCloud<R> {
    async fn create_tags(
        &self,
        region: &str,
        resource_ids: &[&str],
        tags: &[(String, String)],
    ) -> Result<()> {
        let tags = tag_list(tags).to_string();
        let mut args = vec!["--resources"];
        args.extend_from_slice(resource_ids);
        args.extend(["--tags", tags.as_str()]);
        self.ec2(region, "create-tags", &args).await.map(drop)
    }
}
