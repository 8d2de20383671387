//! vcluster syncer
//!
//! Keeps objects created inside a virtual Kubernetes cluster in sync with
//! translated copies on the host cluster that actually runs them. Every host
//! object carries an ownership record pointing back at its virtual origin, so
//! the engine can always tell which host objects are its own.

pub mod config;
pub mod controllers;
pub mod error;
pub mod mappings;
pub mod metrics;
pub mod reconcilers;
pub mod resources;
pub mod retry;
pub mod store;
pub mod syncer;
pub mod translate;

pub use error::{Error, Result};
