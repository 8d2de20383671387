//! ServiceAccount sync scenarios

mod common;

use k8s_openapi::api::core::v1::{LocalObjectReference, ObjectReference, ServiceAccount};
use tokio_test::assert_ok;
use vcluster_syncer::resources::ServiceAccountSyncer;
use vcluster_syncer::syncer::{SyncResult, Synchronizer};
use vcluster_syncer::translate::{
    KIND_ANNOTATION, MANAGED_ANNOTATIONS_ANNOTATION, MARKER_LABEL, NAMESPACE_ANNOTATION,
    NAMESPACE_LABEL, NAME_ANNOTATION, UID_ANNOTATION,
};

use common::{only_object, string_map, translator, virtual_meta, Harness, TARGET_NAMESPACE, VCLUSTER_NAME};

fn virtual_service_account() -> ServiceAccount {
    let mut metadata = virtual_meta("test-serviceaccount", "test");
    metadata.annotations = Some(string_map(&[("test", "test")]));

    ServiceAccount {
        metadata,
        secrets: Some(vec![ObjectReference {
            kind: Some("Test".to_string()),
            ..Default::default()
        }]),
        image_pull_secrets: Some(vec![LocalObjectReference::default()]),
        automount_service_account_token: None,
    }
}

fn harness(virtual_objects: Vec<ServiceAccount>) -> Harness<ServiceAccountSyncer> {
    Harness::new(ServiceAccountSyncer::new(translator()), virtual_objects, vec![])
}

#[tokio::test]
async fn test_service_account_sync_to_host() {
    let vsa = virtual_service_account();
    let h = harness(vec![vsa.clone()]);

    let result = assert_ok!(h.syncer().sync_to_host(&h.context(), &vsa).await);
    assert_eq!(result, SyncResult::Created);

    let host = only_object(&h.host_store);
    assert_eq!(
        host.metadata.name.as_deref(),
        Some("test-serviceaccount-x-test-x-suffix")
    );
    assert_eq!(host.metadata.namespace.as_deref(), Some(TARGET_NAMESPACE));
    assert_eq!(
        host.metadata.annotations,
        Some(string_map(&[
            ("test", "test"),
            (MANAGED_ANNOTATIONS_ANNOTATION, "test"),
            (NAME_ANNOTATION, "test-serviceaccount"),
            (NAMESPACE_ANNOTATION, "test"),
            (UID_ANNOTATION, ""),
            (KIND_ANNOTATION, "/v1, Kind=ServiceAccount"),
        ]))
    );
    assert_eq!(
        host.metadata.labels,
        Some(string_map(&[
            (NAMESPACE_LABEL, "test"),
            (MARKER_LABEL, VCLUSTER_NAME),
        ]))
    );
    assert_eq!(host.automount_service_account_token, Some(false));
    assert_eq!(host.secrets, None);
    assert_eq!(host.image_pull_secrets, None);
}

#[tokio::test]
async fn test_service_account_overrides_survive_updates() {
    let vsa = virtual_service_account();
    let h = harness(vec![vsa.clone()]);
    h.syncer().sync_to_host(&h.context(), &vsa).await.unwrap();

    // Someone on the host adds an annotation and re-enables token mounting
    let mut host = only_object(&h.host_store);
    host.metadata
        .annotations
        .as_mut()
        .unwrap()
        .insert("host.example.com/injected".to_string(), "yes".to_string());
    host.automount_service_account_token = Some(true);
    h.host_store.insert(host);

    // The tenant swaps its annotation and asks for token mounting
    let mut updated = vsa.clone();
    updated.metadata.annotations = Some(string_map(&[("other", "value")]));
    updated.automount_service_account_token = Some(true);
    h.virtual_store.insert(updated.clone());

    let host = only_object(&h.host_store);
    let result = assert_ok!(h.syncer().sync(&h.context(), &host, &updated).await);
    assert_eq!(result, SyncResult::Updated);

    let host = only_object(&h.host_store);
    let annotations = host.metadata.annotations.unwrap();
    assert_eq!(annotations.get("other").map(String::as_str), Some("value"));
    assert!(!annotations.contains_key("test"));
    assert_eq!(
        annotations.get("host.example.com/injected").map(String::as_str),
        Some("yes")
    );
    assert_eq!(
        annotations.get(MANAGED_ANNOTATIONS_ANNOTATION).map(String::as_str),
        Some("other")
    );
    assert_eq!(host.automount_service_account_token, Some(false));
    assert_eq!(host.secrets, None);
}
