//! Prometheus metrics for the vcluster syncer
//!
//! Counters and gauges for sync passes, plus the HTTP endpoint serving them
//! alongside health and readiness probes.

pub mod prometheus;

pub use prometheus::*;
