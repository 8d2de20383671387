//! Concrete synchronizers, one per supported resource kind

pub mod configmaps;
pub mod poddisruptionbudgets;
pub mod secrets;
pub mod serviceaccounts;

pub use configmaps::ConfigMapSyncer;
pub use poddisruptionbudgets::PodDisruptionBudgetSyncer;
pub use secrets::SecretSyncer;
pub use serviceaccounts::ServiceAccountSyncer;
