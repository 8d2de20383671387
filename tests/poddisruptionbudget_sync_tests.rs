//! PodDisruptionBudget sync scenarios
//!
//! Create, spec update and selector update against in-memory clusters, plus
//! status mirroring and steady-state behaviour.

mod common;

use std::collections::BTreeMap;

use k8s_openapi::api::policy::v1::{
    PodDisruptionBudget, PodDisruptionBudgetSpec, PodDisruptionBudgetStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use vcluster_syncer::resources::PodDisruptionBudgetSyncer;
use vcluster_syncer::store::ObjectStore;
use vcluster_syncer::syncer::{SyncResult, Synchronizer};
use vcluster_syncer::translate::{
    KIND_ANNOTATION, MARKER_LABEL, NAMESPACE_ANNOTATION, NAMESPACE_LABEL, NAME_ANNOTATION,
    UID_ANNOTATION,
};

use common::{
    only_object, string_map, translator, virtual_meta, Harness, FIXTURE_RESOURCE_VERSION,
    TARGET_NAMESPACE, VCLUSTER_NAME,
};

// ============================================================================
// Fixtures
// ============================================================================

const HOST_NAME: &str = "testPDB-x-default-x-suffix";

fn virtual_pdb(spec: PodDisruptionBudgetSpec) -> PodDisruptionBudget {
    PodDisruptionBudget {
        metadata: virtual_meta("testPDB", "default"),
        spec: Some(spec),
        status: None,
    }
}

fn host_meta() -> ObjectMeta {
    ObjectMeta {
        name: Some(HOST_NAME.to_string()),
        namespace: Some(TARGET_NAMESPACE.to_string()),
        annotations: Some(string_map(&[
            (NAME_ANNOTATION, "testPDB"),
            (NAMESPACE_ANNOTATION, "default"),
            (UID_ANNOTATION, ""),
            (KIND_ANNOTATION, "policy/v1, Kind=PodDisruptionBudget"),
        ])),
        labels: Some(string_map(&[
            (NAMESPACE_LABEL, "default"),
            (MARKER_LABEL, VCLUSTER_NAME),
        ])),
        resource_version: Some(FIXTURE_RESOURCE_VERSION.to_string()),
        ..Default::default()
    }
}

fn min_available_spec() -> PodDisruptionBudgetSpec {
    PodDisruptionBudgetSpec {
        min_available: Some(IntOrString::Int(10)),
        ..Default::default()
    }
}

fn max_unavailable_spec() -> PodDisruptionBudgetSpec {
    PodDisruptionBudgetSpec {
        max_unavailable: Some(IntOrString::Int(5)),
        ..Default::default()
    }
}

fn synced_host_pdb() -> PodDisruptionBudget {
    PodDisruptionBudget {
        metadata: host_meta(),
        spec: Some(min_available_spec()),
        status: None,
    }
}

fn harness(
    virtual_objects: Vec<PodDisruptionBudget>,
    host_objects: Vec<PodDisruptionBudget>,
) -> Harness<PodDisruptionBudgetSyncer> {
    Harness::new(
        PodDisruptionBudgetSyncer::new(translator()),
        virtual_objects,
        host_objects,
    )
}

fn assert_same_metadata(actual: &ObjectMeta, expected: &ObjectMeta) {
    assert_eq!(actual.name, expected.name);
    assert_eq!(actual.namespace, expected.namespace);
    assert_eq!(actual.annotations, expected.annotations);
    assert_eq!(actual.labels, expected.labels);
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_host_pdb() {
    let vpdb = virtual_pdb(min_available_spec());
    let h = harness(vec![vpdb.clone()], vec![]);

    let result = h.syncer().sync_to_host(&h.context(), &vpdb).await.unwrap();
    assert_eq!(result, SyncResult::Created);

    let host = only_object(&h.host_store);
    assert_same_metadata(&host.metadata, &host_meta());
    assert_eq!(host.spec, Some(min_available_spec()));
    assert_eq!(host.status, None);

    // Virtual side untouched
    assert_eq!(only_object(&h.virtual_store), vpdb);
}

#[tokio::test]
async fn test_reconcile_creates_missing_host_pdb() {
    let vpdb = virtual_pdb(min_available_spec());
    let h = harness(vec![vpdb.clone()], vec![]);

    let id = vcluster_syncer::mappings::NamespacedName::new("default", "testPDB");
    let result = h.reconciler.reconcile_virtual(&id).await.unwrap();
    assert_eq!(result, SyncResult::Created);
    assert_same_metadata(&only_object(&h.host_store).metadata, &host_meta());
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn test_update_host_pdb_spec() {
    let vpdb = virtual_pdb(max_unavailable_spec());
    let hpdb = synced_host_pdb();
    let h = harness(vec![vpdb.clone()], vec![hpdb.clone()]);

    let result = h.syncer().sync(&h.context(), &hpdb, &vpdb).await.unwrap();
    assert_eq!(result, SyncResult::Updated);

    let host = only_object(&h.host_store);
    assert_same_metadata(&host.metadata, &host_meta());
    assert_eq!(host.spec, Some(max_unavailable_spec()));
    assert_eq!(only_object(&h.virtual_store), vpdb);
}

#[tokio::test]
async fn test_update_host_pdb_selector() {
    let vpdb = virtual_pdb(PodDisruptionBudgetSpec {
        max_unavailable: Some(IntOrString::Int(5)),
        selector: Some(LabelSelector {
            match_labels: Some(string_map(&[("app", "nginx")])),
            match_expressions: None,
        }),
        ..Default::default()
    });
    let hpdb = synced_host_pdb();
    let h = harness(vec![vpdb.clone()], vec![hpdb.clone()]);

    let result = h.syncer().sync(&h.context(), &hpdb, &vpdb).await.unwrap();
    assert_eq!(result, SyncResult::Updated);

    let host = only_object(&h.host_store);
    let spec = host.spec.unwrap();
    assert_eq!(spec.max_unavailable, Some(IntOrString::Int(5)));
    assert_eq!(spec.min_available, None);

    let expected_labels: BTreeMap<String, String> = string_map(&[
        ("app", "nginx"),
        (NAMESPACE_LABEL, "default"),
        (MARKER_LABEL, VCLUSTER_NAME),
    ]);
    let selector = spec.selector.unwrap();
    assert_eq!(selector.match_labels, Some(expected_labels));
    assert_eq!(selector.match_expressions, None);
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let vpdb = virtual_pdb(max_unavailable_spec());
    let h = harness(vec![vpdb.clone()], vec![synced_host_pdb()]);

    let first = h.syncer().sync(&h.context(), &synced_host_pdb(), &vpdb).await.unwrap();
    assert_eq!(first, SyncResult::Updated);
    let writes = h.host_store.write_count();

    let current = only_object(&h.host_store);
    let second = h.syncer().sync(&h.context(), &current, &vpdb).await.unwrap();
    assert_eq!(second, SyncResult::Unchanged);
    assert_eq!(h.host_store.write_count(), writes);
    assert_eq!(h.virtual_store.write_count(), 0);
}

// ============================================================================
// Status
// ============================================================================

#[tokio::test]
async fn test_host_status_is_mirrored_to_virtual() {
    let status = PodDisruptionBudgetStatus {
        current_healthy: 3,
        desired_healthy: 2,
        disruptions_allowed: 1,
        expected_pods: 3,
        ..Default::default()
    };
    let vpdb = virtual_pdb(min_available_spec());
    let mut hpdb = synced_host_pdb();
    hpdb.status = Some(status.clone());
    let h = harness(vec![vpdb.clone()], vec![hpdb.clone()]);

    let result = h.syncer().sync(&h.context(), &hpdb, &vpdb).await.unwrap();
    assert_eq!(result, SyncResult::Updated);

    let virtual_now = only_object(&h.virtual_store);
    assert_eq!(virtual_now.status, Some(status));
    assert_eq!(virtual_now.spec, vpdb.spec);

    // Host spec already matched, so only the virtual side was written
    assert_eq!(h.host_store.write_count(), 0);
}

#[tokio::test]
async fn test_virtual_status_is_ignored_on_host() {
    let mut vpdb = virtual_pdb(min_available_spec());
    vpdb.status = Some(PodDisruptionBudgetStatus {
        expected_pods: 42,
        ..Default::default()
    });
    let h = harness(vec![vpdb.clone()], vec![]);

    h.syncer().sync_to_host(&h.context(), &vpdb).await.unwrap();
    let host = h
        .host_store
        .get(TARGET_NAMESPACE, HOST_NAME)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(host.status, None);
}

#[tokio::test]
async fn test_mirrored_status_tracks_virtual_generation() {
    let mut vpdb = virtual_pdb(min_available_spec());
    vpdb.metadata.generation = Some(4);

    let mut hpdb = synced_host_pdb();
    hpdb.metadata.generation = Some(1);
    hpdb.status = Some(PodDisruptionBudgetStatus {
        observed_generation: Some(1),
        current_healthy: 3,
        desired_healthy: 2,
        disruptions_allowed: 1,
        expected_pods: 3,
        ..Default::default()
    });
    let h = harness(vec![vpdb.clone()], vec![hpdb]);

    let id = vcluster_syncer::mappings::NamespacedName::new("default", "testPDB");
    let result = h.reconciler.reconcile_virtual(&id).await.unwrap();
    assert_eq!(result, SyncResult::Updated);

    let status = only_object(&h.virtual_store).status.unwrap();
    assert_eq!(status.observed_generation, Some(4));
    assert_eq!(status.disruptions_allowed, 1);
    assert_eq!(status.current_healthy, 3);

    // The rewritten generation is stable across passes
    let result = h.reconciler.reconcile_virtual(&id).await.unwrap();
    assert_eq!(result, SyncResult::Unchanged);
}

#[tokio::test]
async fn test_mirrored_status_keeps_virtual_generation_while_host_lags() {
    let mut vpdb = virtual_pdb(min_available_spec());
    vpdb.metadata.generation = Some(4);
    vpdb.status = Some(PodDisruptionBudgetStatus {
        observed_generation: Some(3),
        disruptions_allowed: 0,
        ..Default::default()
    });

    let mut hpdb = synced_host_pdb();
    hpdb.metadata.generation = Some(2);
    hpdb.status = Some(PodDisruptionBudgetStatus {
        observed_generation: Some(1),
        disruptions_allowed: 2,
        ..Default::default()
    });
    let h = harness(vec![vpdb.clone()], vec![hpdb.clone()]);

    let result = h.syncer().sync(&h.context(), &hpdb, &vpdb).await.unwrap();
    assert_eq!(result, SyncResult::Updated);

    let status = only_object(&h.virtual_store).status.unwrap();
    assert_eq!(status.observed_generation, Some(3));
    assert_eq!(status.disruptions_allowed, 2);
}
