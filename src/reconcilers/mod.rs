//! Reconciliation drivers

pub mod sync;

pub use sync::{Reconciler, SweepReport};
