//! Error types for the vcluster syncer

use thiserror::Error;

/// Result type for the syncer
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the syncer
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error (rate limiting, connectivity, server errors)
    #[error("Kubernetes API error: {0}")]
    KubeError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A virtual identity cannot be translated into a valid host identity
    #[error("Translation error: {0}")]
    TranslationError(String),

    /// The derived host identity is occupied by an object this syncer does not own
    #[error("Identity collision on {kind} {host}: {reason}")]
    IdentityCollision {
        kind: String,
        host: String,
        reason: String,
    },

    /// Write carried a stale resourceVersion
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Create raced with another writer
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Object vanished between read and write
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create targeted a host namespace that does not exist
    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Whether the pass should be recomputed from a fresh read
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::Conflict(_) | Error::AlreadyExists(_) | Error::NotFound(_)
        )
    }

    /// Whether the error may go away on its own and is worth a backoff requeue.
    ///
    /// Translation and collision errors only clear once someone changes the
    /// objects involved, so they are surfaced instead of hammered.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Error::TranslationError(_) | Error::IdentityCollision { .. } | Error::ConfigError(_)
        )
    }

    /// Short machine-readable reason, used for metrics labels and event reasons
    pub fn reason(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "KubeError",
            Error::ConfigError(_) => "ConfigError",
            Error::TranslationError(_) => "SyncTranslationError",
            Error::IdentityCollision { .. } => "SyncIdentityCollision",
            Error::Conflict(_) => "Conflict",
            Error::AlreadyExists(_) => "AlreadyExists",
            Error::NotFound(_) => "NotFound",
            Error::NamespaceNotFound(_) => "NamespaceNotFound",
            Error::SerializationError(_) => "SerializationError",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_retried_within_a_pass() {
        assert!(Error::Conflict("stale".into()).is_conflict());
        assert!(Error::AlreadyExists("raced".into()).is_conflict());
        assert!(!Error::KubeError("503".into()).is_conflict());
    }

    #[test]
    fn missing_namespace_backs_off_instead_of_retrying() {
        let err = Error::NamespaceNotFound("create vcluster-default-1a2b3c4d/web".into());
        assert!(!err.is_conflict());
        assert!(err.is_transient());
        assert_eq!(err.reason(), "NamespaceNotFound");
    }

    #[test]
    fn persistent_errors_are_not_transient() {
        let collision = Error::IdentityCollision {
            kind: "policy/v1, Kind=PodDisruptionBudget".into(),
            host: "test/foo".into(),
            reason: "not managed".into(),
        };
        assert!(!collision.is_transient());
        assert_eq!(collision.reason(), "SyncIdentityCollision");
        assert!(collision.to_string().contains("test/foo"));

        assert!(!Error::TranslationError("empty name".into()).is_transient());
        assert!(Error::KubeError("too many requests".into()).is_transient());
    }
}
