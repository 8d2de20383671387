//! Kubernetes Events surfacing persistent sync failures to tenants

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::PostParams;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::warn;

/// Component name events are reported under
pub const REPORTING_COMPONENT: &str = "vcluster-syncer";

/// Build a `Warning` event about `object`
pub fn warning_event<K>(object: &K, reason: &str, message: &str) -> Event
where
    K: Resource<DynamicType = ()>,
{
    let now = Time(Utc::now());
    let name = object.name_any();

    Event {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}.", name)),
            namespace: object.namespace(),
            ..Default::default()
        },
        involved_object: ObjectReference {
            api_version: Some(K::api_version(&()).into_owned()),
            kind: Some(K::kind(&()).into_owned()),
            name: Some(name),
            namespace: object.namespace(),
            uid: object.uid(),
            resource_version: object.resource_version(),
            ..Default::default()
        },
        type_: Some("Warning".to_string()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        count: Some(1),
        first_timestamp: Some(now.clone()),
        last_timestamp: Some(now),
        source: Some(EventSource {
            component: Some(REPORTING_COMPONENT.to_string()),
            ..Default::default()
        }),
        reporting_component: Some(REPORTING_COMPONENT.to_string()),
        ..Default::default()
    }
}

/// Publish a `Warning` event on a virtual object. Failures are logged and
/// otherwise ignored.
pub async fn publish_warning<K>(client: Client, object: &K, reason: &str, message: &str)
where
    K: Resource<DynamicType = ()>,
{
    let namespace = object.namespace().unwrap_or_default();
    let events: Api<Event> = Api::namespaced(client, &namespace);
    let event = warning_event(object, reason, message);

    if let Err(e) = events.create(&PostParams::default(), &event).await {
        warn!(
            object = %format!("{}/{}", namespace, object.name_any()),
            reason,
            error = %e,
            "Failed to publish event"
        );
    }
}

/// Last warning reason published per object.
///
/// A persistent failure is requeued over and over; it is only reported again
/// once its reason changes or the object synced successfully in between.
/// Entries not refreshed within `stale_after` belong to objects that are gone
/// and are dropped.
pub struct WarningLedger {
    reasons: Mutex<HashMap<String, (String, Instant)>>,
    stale_after: Duration,
}

impl WarningLedger {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            reasons: Mutex::new(HashMap::new()),
            stale_after,
        }
    }

    /// Record `reason` for `key`; true if it differs from the last one published
    pub fn should_publish(&self, key: &str, reason: &str) -> bool {
        self.should_publish_at(key, reason, Instant::now())
    }

    fn should_publish_at(&self, key: &str, reason: &str, now: Instant) -> bool {
        let mut reasons = self.reasons.lock().unwrap_or_else(PoisonError::into_inner);
        reasons.retain(|_, (_, seen)| now.saturating_duration_since(*seen) < self.stale_after);

        let changed = reasons
            .get(key)
            .map_or(true, |(previous, _)| previous != reason);
        reasons.insert(key.to_string(), (reason.to_string(), now));
        changed
    }

    pub fn clear(&self, key: &str) {
        self.reasons
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn len(&self) -> usize {
        self.reasons.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
