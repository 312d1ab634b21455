//! Test execution across API levels.
//!
//! The [`Harness`] ties the other layers together: it computes the instrumentation rules and
//! shadow registry of each test, leases a pooled sandbox per selected API level, and reports
//! one [`TestOutcome`] per level.

mod config;
mod runner;

pub use config::{HarnessConfig, DEFAULT_API_LEVELS};
pub use runner::{Harness, TestOutcome};
