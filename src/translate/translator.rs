//! Deterministic virtual -> host identity derivation and ownership stamping

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::GroupVersionKind;
use kube::Resource;
use sha2::{Digest, Sha256};

use super::keys::{
    EXCLUDED_ANNOTATIONS, KIND_ANNOTATION, MANAGED_ANNOTATIONS_ANNOTATION,
    MANAGED_LABELS_ANNOTATION, MARKER_LABEL, NAMESPACE_ANNOTATION, NAMESPACE_LABEL,
    NAME_ANNOTATION, OWNERSHIP_ANNOTATIONS, OWNERSHIP_LABELS, UID_ANNOTATION,
};
use crate::{Error, Result};

/// Maximum length of a DNS-1123 label, the tightest name constraint in Kubernetes
pub const MAX_NAME_LENGTH: usize = 63;

/// Length kept from an over-long name before the hash suffix is appended
const HASHED_PREFIX_LENGTH: usize = 52;

/// Maximum length of a DNS-1123 subdomain
const MAX_IDENTITY_LENGTH: usize = 253;

/// How virtual namespaces are laid out on the host cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NamespaceMode {
    /// Every virtual namespace is folded into one host namespace
    SingleNamespace { target_namespace: String },
    /// Every virtual namespace gets its own derived host namespace
    MultiNamespace,
}

/// Ownership record decoded from a host object's annotations and labels
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipRecord {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub kind: String,
    pub marker: Option<String>,
}

/// Immutable translation configuration for one virtual cluster instance.
///
/// Built once at startup and shared by reference; there is no global default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Translator {
    name: String,
    mode: NamespaceMode,
}

impl Translator {
    /// Create a translator for the virtual cluster `name`
    pub fn new(name: impl Into<String>, mode: NamespaceMode) -> Result<Self> {
        let name = name.into();
        if !is_dns1123_label(&name) {
            return Err(Error::ConfigError(format!(
                "virtual cluster name '{}' must be a DNS-1123 label",
                name
            )));
        }

        if let NamespaceMode::SingleNamespace { target_namespace } = &mode {
            if !is_dns1123_label(target_namespace) {
                return Err(Error::ConfigError(format!(
                    "target namespace '{}' must be a DNS-1123 label",
                    target_namespace
                )));
            }
        }

        Ok(Self { name, mode })
    }

    /// Translator folding all virtual namespaces into `target_namespace`
    pub fn single_namespace(name: impl Into<String>, target_namespace: impl Into<String>) -> Result<Self> {
        Self::new(
            name,
            NamespaceMode::SingleNamespace {
                target_namespace: target_namespace.into(),
            },
        )
    }

    /// Translator mapping each virtual namespace to its own host namespace
    pub fn multi_namespace(name: impl Into<String>) -> Result<Self> {
        Self::new(name, NamespaceMode::MultiNamespace)
    }

    /// Name of the virtual cluster instance, also the cluster-marker label value
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> &NamespaceMode {
        &self.mode
    }

    /// Host namespace all synced objects live in, if there is exactly one
    pub fn host_namespace_scope(&self) -> Option<&str> {
        match &self.mode {
            NamespaceMode::SingleNamespace { target_namespace } => Some(target_namespace),
            NamespaceMode::MultiNamespace => None,
        }
    }

    /// Derive the host name of the virtual object `name` in `namespace`.
    ///
    /// In single-namespace mode the readable form `name-x-namespace-x-vcluster`
    /// is used when it fits and can be split back unambiguously; otherwise the
    /// readable prefix is shortened and suffixed with a hash of the exact
    /// (namespace, name) pair, so distinct pairs never share a host name.
    pub fn host_name(&self, name: &str, namespace: &str) -> Result<String> {
        validate_segment("name", name)?;
        validate_segment("namespace", namespace)?;

        match &self.mode {
            NamespaceMode::MultiNamespace => Ok(name.to_string()),
            NamespaceMode::SingleNamespace { .. } => {
                let readable = format!("{}-x-{}-x-{}", name, namespace, self.name);
                if readable.len() <= MAX_NAME_LENGTH && splits_unambiguously(name, namespace) {
                    return Ok(readable);
                }

                let prefix: String = readable.chars().take(HASHED_PREFIX_LENGTH).collect();
                let prefix = prefix.trim_end_matches(|c: char| matches!(c, '-' | '.' | '_'));
                let digest = short_hash(&format!("{}/{}/{}", namespace, name, self.name), 10);
                Ok(format!("{}-{}", prefix, digest))
            }
        }
    }

    /// Derive the host namespace for the virtual `namespace`
    pub fn host_namespace(&self, namespace: &str) -> Result<String> {
        validate_segment("namespace", namespace)?;

        match &self.mode {
            NamespaceMode::SingleNamespace { target_namespace } => Ok(target_namespace.clone()),
            NamespaceMode::MultiNamespace => {
                let digest = short_hash(&format!("{}/{}", namespace, self.name), 8);
                Ok(safe_concat_name(&["vcluster", namespace, &digest]))
            }
        }
    }

    /// Host namespaces this syncer creates, i.e. derived ones in
    /// multi-namespace mode. The single target namespace is provisioned by
    /// whoever deploys the syncer.
    pub fn owns_host_namespaces(&self) -> bool {
        matches!(self.mode, NamespaceMode::MultiNamespace)
    }

    /// Labels for a host namespace created for the virtual `namespace`
    pub fn host_namespace_labels(&self, namespace: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (MARKER_LABEL.to_string(), self.name.clone()),
            (NAMESPACE_LABEL.to_string(), namespace.to_string()),
        ])
    }

    /// Fresh host metadata for a virtual object: identity plus ownership record.
    ///
    /// Server-populated fields (uid, resourceVersion, owner references,
    /// finalizers, timestamps) are never carried over.
    pub fn host_metadata(
        &self,
        virtual_meta: &ObjectMeta,
        gvk: &GroupVersionKind,
        host_name: &str,
        host_namespace: &str,
    ) -> ObjectMeta {
        let mut meta = ObjectMeta {
            name: Some(host_name.to_string()),
            namespace: Some(host_namespace.to_string()),
            ..Default::default()
        };
        self.apply_ownership_metadata(&mut meta, virtual_meta, gvk);
        meta
    }

    /// Stamp the ownership record onto `host_meta` and merge pass-through
    /// annotations and labels from `virtual_meta`.
    ///
    /// Keys previously copied from the virtual side (as recorded in the
    /// managed-keys annotations) are replaced wholesale; keys injected on the
    /// host by anyone else are kept. Syncer-owned keys always win.
    pub fn apply_ownership_metadata(
        &self,
        host_meta: &mut ObjectMeta,
        virtual_meta: &ObjectMeta,
        gvk: &GroupVersionKind,
    ) {
        let previous_annotations = managed_keys(host_meta, MANAGED_ANNOTATIONS_ANNOTATION);
        let previous_labels = managed_keys(host_meta, MANAGED_LABELS_ANNOTATION);

        let (mut annotations, copied_annotations) = merge_managed(
            host_meta.annotations.as_ref(),
            virtual_meta.annotations.as_ref(),
            &previous_annotations,
            OWNERSHIP_ANNOTATIONS,
            EXCLUDED_ANNOTATIONS,
        );
        let (mut labels, copied_labels) = merge_managed(
            host_meta.labels.as_ref(),
            virtual_meta.labels.as_ref(),
            &previous_labels,
            OWNERSHIP_LABELS,
            &[],
        );

        if !copied_annotations.is_empty() {
            annotations.insert(
                MANAGED_ANNOTATIONS_ANNOTATION.to_string(),
                copied_annotations.join("\n"),
            );
        }
        if !copied_labels.is_empty() {
            annotations.insert(
                MANAGED_LABELS_ANNOTATION.to_string(),
                copied_labels.join("\n"),
            );
        }

        let virtual_namespace = virtual_meta.namespace.clone().unwrap_or_default();
        annotations.insert(
            NAME_ANNOTATION.to_string(),
            virtual_meta.name.clone().unwrap_or_default(),
        );
        annotations.insert(NAMESPACE_ANNOTATION.to_string(), virtual_namespace.clone());
        annotations.insert(
            UID_ANNOTATION.to_string(),
            virtual_meta.uid.clone().unwrap_or_default(),
        );
        annotations.insert(KIND_ANNOTATION.to_string(), gvk_string(gvk));

        labels.insert(NAMESPACE_LABEL.to_string(), virtual_namespace);
        labels.insert(MARKER_LABEL.to_string(), self.name.clone());

        host_meta.annotations = Some(annotations);
        host_meta.labels = Some(labels);
    }

    /// Whether the host object carries this virtual cluster's marker label
    pub fn is_managed_by(&self, host_meta: &ObjectMeta) -> bool {
        host_meta
            .labels
            .as_ref()
            .and_then(|labels| labels.get(MARKER_LABEL))
            .is_some_and(|marker| marker == &self.name)
    }

    /// Decode the ownership record of a host object, if it carries a complete one
    pub fn ownership_record(&self, host_meta: &ObjectMeta) -> Option<OwnershipRecord> {
        let annotations = host_meta.annotations.as_ref()?;
        let non_empty = |key: &str| {
            annotations
                .get(key)
                .filter(|value| !value.is_empty())
                .cloned()
        };

        Some(OwnershipRecord {
            name: non_empty(NAME_ANNOTATION)?,
            namespace: non_empty(NAMESPACE_ANNOTATION)?,
            kind: non_empty(KIND_ANNOTATION)?,
            uid: annotations.get(UID_ANNOTATION).cloned().unwrap_or_default(),
            marker: host_meta
                .labels
                .as_ref()
                .and_then(|labels| labels.get(MARKER_LABEL))
                .cloned(),
        })
    }
}

/// Render a GroupVersionKind the way the origin-kind annotation stores it
pub fn gvk_string(gvk: &GroupVersionKind) -> String {
    format!("{}/{}, Kind={}", gvk.group, gvk.version, gvk.kind)
}

/// GroupVersionKind of a statically typed resource
pub fn gvk_of<K: Resource<DynamicType = ()>>() -> GroupVersionKind {
    GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()))
}

/// Join `parts` with `-`, shortening the result to a valid label length.
///
/// Over-long joins keep the first 52 characters followed by `-` and the first
/// 10 hex characters of the SHA-256 of the full join.
pub fn safe_concat_name(parts: &[&str]) -> String {
    let full = parts.join("-");
    if full.len() <= MAX_NAME_LENGTH {
        return full;
    }

    let prefix: String = full.chars().take(HASHED_PREFIX_LENGTH).collect();
    format!("{}-{}", prefix, short_hash(&full, 10)).replace(".-", "-")
}

fn short_hash(input: &str, len: usize) -> String {
    let digest = format!("{:x}", Sha256::digest(input.as_bytes()));
    digest[..len].to_string()
}

/// `name-x-namespace` can only be split at one place when neither side can
/// contribute to an extra `-x-` occurrence.
fn splits_unambiguously(name: &str, namespace: &str) -> bool {
    !name.contains("-x-")
        && !name.ends_with("-x")
        && !namespace.contains("-x-")
        && !namespace.starts_with("x-")
}

fn validate_segment(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::TranslationError(format!("{} must not be empty", what)));
    }

    if value.len() > MAX_IDENTITY_LENGTH {
        return Err(Error::TranslationError(format!(
            "{} '{}' exceeds {} characters",
            what, value, MAX_IDENTITY_LENGTH
        )));
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
    {
        return Err(Error::TranslationError(format!(
            "{} '{}' contains characters that cannot appear in a host name",
            what, value
        )));
    }

    Ok(())
}

fn is_dns1123_label(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_NAME_LENGTH
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-')
}

fn managed_keys(meta: &ObjectMeta, annotation: &str) -> Vec<String> {
    meta.annotations
        .as_ref()
        .and_then(|annotations| annotations.get(annotation))
        .map(|value| {
            value
                .split('\n')
                .filter(|key| !key.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Merge virtual entries over host entries. Returns the merged map and the
/// sorted keys that were copied from the virtual side.
fn merge_managed(
    host: Option<&BTreeMap<String, String>>,
    virtual_entries: Option<&BTreeMap<String, String>>,
    previously_managed: &[String],
    reserved: &[&str],
    excluded: &[&str],
) -> (BTreeMap<String, String>, Vec<String>) {
    let mut merged = host.cloned().unwrap_or_default();
    for key in previously_managed {
        merged.remove(key);
    }
    merged.retain(|key, _| !reserved.contains(&key.as_str()));

    let mut copied = Vec::new();
    if let Some(entries) = virtual_entries {
        for (key, value) in entries {
            if reserved.contains(&key.as_str()) || excluded.contains(&key.as_str()) {
                continue;
            }
            merged.insert(key.clone(), value.clone());
            copied.push(key.clone());
        }
    }

    (merged, copied)
}
