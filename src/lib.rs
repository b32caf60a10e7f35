//! Proxyprobe - HTTP latency prober
//!
//! Measures end-to-end request latency against a fixed target URL, either
//! directly or through a rotating pool of authenticated HTTP proxies.
//!
//! ## Features
//!
//! - Timed GET probes with monotonic, sub-millisecond latency
//! - Deterministic round-robin rotation through an ordered proxy pool
//! - Strictly sequential scheduling (never more than one probe in flight)
//! - Raw or JSON response capture
//! - Immediate shutdown on interrupt

pub mod config;
pub mod error;
pub mod models;
pub mod output;
pub mod probe;
pub mod scheduler;

pub use config::Config;
pub use error::{ProxyProbeError, Result};
pub use probe::Prober;
pub use scheduler::{RunOutcome, RunSummary, Schedule, Scheduler};
