//! Instrumentation rules and per-test overrides.
//!
//! [`InstrumentationConfiguration`] decides which types are intercepted at all; it is part of
//! the sandbox pool key. [`TestConfig`] carries what a single test adds on top: local shadows,
//! the API levels to run at, and extra inclusion or exclusion rules.

mod config;
mod overrides;

pub use config::{InstrumentationBuilder, InstrumentationConfiguration, DEFAULT_EXCLUDED_PACKAGES};
pub use overrides::{ApiSelector, ShadowKey, TestConfig};
