//! Ownership annotation and label keys stamped onto host objects.
//!
//! Other tooling and the reverse mappers read these keys back, so the strings
//! must never change.

// ============================================================================
// Ownership Annotations
// ============================================================================

/// Name of the virtual object a host object was produced from
pub const NAME_ANNOTATION: &str = "vcluster.loft.sh/object-name";

/// Namespace of the virtual object a host object was produced from
pub const NAMESPACE_ANNOTATION: &str = "vcluster.loft.sh/object-namespace";

/// UID of the virtual object (empty until the virtual object has one)
pub const UID_ANNOTATION: &str = "vcluster.loft.sh/object-uid";

/// Fully-qualified kind of the virtual object, e.g. `policy/v1, Kind=PodDisruptionBudget`
pub const KIND_ANNOTATION: &str = "vcluster.loft.sh/object-kind";

/// Newline separated annotation keys that were copied from the virtual object
pub const MANAGED_ANNOTATIONS_ANNOTATION: &str = "vcluster.loft.sh/managed-annotations";

/// Newline separated label keys that were copied from the virtual object
pub const MANAGED_LABELS_ANNOTATION: &str = "vcluster.loft.sh/managed-labels";

// ============================================================================
// Marker Labels
// ============================================================================

/// Virtual namespace of the object, lets host selectors scope to one virtual namespace
pub const NAMESPACE_LABEL: &str = "vcluster.loft.sh/namespace";

/// Virtual cluster instance owning the host object
pub const MARKER_LABEL: &str = "vcluster.loft.sh/managed-by";

// ============================================================================
// Pass-through exclusions
// ============================================================================

/// Annotations never copied from the virtual object
pub const EXCLUDED_ANNOTATIONS: &[&str] = &["kubectl.kubernetes.io/last-applied-configuration"];

/// Annotation keys owned by the syncer. Values from the virtual side never override them.
pub const OWNERSHIP_ANNOTATIONS: &[&str] = &[
    NAME_ANNOTATION,
    NAMESPACE_ANNOTATION,
    UID_ANNOTATION,
    KIND_ANNOTATION,
    MANAGED_ANNOTATIONS_ANNOTATION,
    MANAGED_LABELS_ANNOTATION,
];

/// Label keys owned by the syncer
pub const OWNERSHIP_LABELS: &[&str] = &[NAMESPACE_LABEL, MARKER_LABEL];
