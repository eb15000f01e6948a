//! Destroyer scenarios against the recording fake cloud.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use devbox_cli::application::services::vm::destroy::{DestroyOptions, destroy};
use devbox_cli::domain::VmError;
use devbox_common::{VmState, keys};

use super::fakes::{
    EXISTING, FakeCloud, PERSISTENT, PROJECT, RecordingReporter, Waits, ctx,
};

const WAIT: DestroyOptions = DestroyOptions {
    wait_for_termination: true,
};

#[tokio::test]
async fn one_failed_volume_delete_does_not_block_the_rest() {
    let cloud = FakeCloud::with_vm(VmState::Running, "t3.medium");
    cloud.add_volume("vol-a", EXISTING, PROJECT);
    cloud.add_volume("vol-b", EXISTING, PROJECT);
    cloud.add_address("eipalloc-1", "203.0.113.7", Some(EXISTING));
    cloud.fail_on("delete_volume vol-a", "VolumeInUse: vol-a");
    let waits = Waits::default();
    let reporter = RecordingReporter::default();

    let result = destroy(&cloud, &ctx(), WAIT, &waits.context(), &reporter)
        .await
        .expect("destroy");

    assert_eq!(result.instance_id, EXISTING);
    assert_eq!(result.volumes_deleted, 1);
    assert!(result.address_released);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("vol-a"));
    assert!(result.warnings[0].contains("VolumeInUse"));
    assert_eq!(reporter.warnings(), result.warnings);
    assert_eq!(cloud.instance(EXISTING).unwrap().state, VmState::Terminated);
    assert_eq!(cloud.count("release_address"), 1);
}

#[tokio::test]
async fn persistent_and_untagged_volumes_are_kept() {
    let cloud = FakeCloud::with_vm(VmState::Stopped, "t3.medium");
    cloud.add_volume("vol-project", EXISTING, PROJECT);
    cloud.add_volume("vol-home", EXISTING, PERSISTENT);
    cloud.add_volume("vol-root", EXISTING, None);
    let waits = Waits::default();

    let result = destroy(
        &cloud,
        &ctx(),
        WAIT,
        &waits.context(),
        &RecordingReporter::default(),
    )
    .await
    .expect("destroy");

    assert_eq!(result.volumes_deleted, 1);
    assert_eq!(cloud.volume_ids(), ["vol-home", "vol-root"]);
    assert!(!cloud.calls().contains(&"delete_volume vol-home".to_owned()));
}

#[tokio::test]
async fn volume_delete_waits_for_termination() {
    let cloud = FakeCloud::with_vm(VmState::Running, "t3.medium");
    cloud.add_volume("vol-a", EXISTING, PROJECT);
    let waits = Waits::default();

    destroy(
        &cloud,
        &ctx(),
        WAIT,
        &waits.context(),
        &RecordingReporter::default(),
    )
    .await
    .expect("destroy");

    let verbs = cloud.verbs();
    let terminate = cloud.position("terminate_instance").unwrap();
    let delete = cloud.position("delete_volume").unwrap();
    assert!(verbs[terminate..delete].iter().any(|v| v == "describe_instance"));
}

#[tokio::test]
async fn volumes_are_discovered_before_terminate() {
    let cloud = FakeCloud::with_vm(VmState::Running, "t3.medium");
    cloud.add_volume("vol-a", EXISTING, PROJECT);
    let waits = Waits::default();

    destroy(
        &cloud,
        &ctx(),
        DestroyOptions {
            wait_for_termination: false,
        },
        &waits.context(),
        &RecordingReporter::default(),
    )
    .await
    .expect("destroy");

    assert!(cloud.position("describe_volumes") < cloud.position("terminate_instance"));
    assert_eq!(cloud.count("describe_instance"), 0);
}

#[tokio::test]
async fn terminate_failure_is_fatal_and_cleans_nothing() {
    let cloud = FakeCloud::with_vm(VmState::Running, "t3.medium");
    cloud.add_volume("vol-a", EXISTING, PROJECT);
    cloud.add_address("eipalloc-1", "203.0.113.7", Some(EXISTING));
    cloud.fail_on("terminate_instance", "UnauthorizedOperation");
    let waits = Waits::default();

    let err = destroy(
        &cloud,
        &ctx(),
        WAIT,
        &waits.context(),
        &RecordingReporter::default(),
    )
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("UnauthorizedOperation"));
    assert_eq!(cloud.count("delete_volume"), 0);
    assert_eq!(cloud.count("release_address"), 0);
}

#[tokio::test]
async fn address_release_failure_is_a_warning() {
    let cloud = FakeCloud::with_vm(VmState::Running, "t3.medium");
    cloud.set_tag(EXISTING, keys::ALLOCATION_ID, "eipalloc-1");
    cloud.add_address("eipalloc-1", "203.0.113.7", Some(EXISTING));
    cloud.fail_on("release_address", "AuthFailure");
    let waits = Waits::default();

    let result = destroy(
        &cloud,
        &ctx(),
        WAIT,
        &waits.context(),
        &RecordingReporter::default(),
    )
    .await
    .expect("destroy");

    assert!(!result.address_released);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("eipalloc-1"));
}

#[tokio::test]
async fn missing_vm_is_not_found() {
    let cloud = FakeCloud::default();
    let waits = Waits::default();

    let err = destroy(
        &cloud,
        &ctx(),
        WAIT,
        &waits.context(),
        &RecordingReporter::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<VmError>(),
        Some(VmError::NotFound { .. })
    ));
    assert!(cloud.mutating_calls().is_empty());
}

#[tokio::test]
async fn another_owners_vm_is_never_touched() {
    let cloud = FakeCloud::default();
    cloud.add_instance("i-bob", VmState::Running, "t3.medium", "bob", "dev");
    let waits = Waits::default();

    let err = destroy(
        &cloud,
        &ctx(),
        WAIT,
        &waits.context(),
        &RecordingReporter::default(),
    )
    .await
    .unwrap_err();

    assert!(err.downcast_ref::<VmError>().is_some());
    assert_eq!(cloud.instance("i-bob").unwrap().state, VmState::Running);
}
