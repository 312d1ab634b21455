//! # shadowbox Prelude
//!
//! The types most code needs to declare a type universe, write shadows, and run tests in
//! sandboxes.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all shadowbox operations
pub use crate::Error;

/// The result type used throughout shadowbox
pub use crate::Result;

// ================================================================================================
// Type Universe and Values
// ================================================================================================

pub use crate::types::{
    ApiLevel, Call, MethodDescriptor, MethodModifiers, Receiver, TypeDescriptor, TypeUniverse,
};
pub use crate::value::{ObjectRef, Primitive, Value, ValueKind};

// ================================================================================================
// Shadows
// ================================================================================================

pub use crate::shadow::{
    ProviderTier, ShadowConfig, ShadowProvider, ShadowRegistry, ShadowType, StaticShadowProvider,
};

// ================================================================================================
// Dispatch and Proxies
// ================================================================================================

pub use crate::dispatch::{CallRequest, DispatchDecision, FailReason};
pub use crate::proxy::CallThroughProxy;

// ================================================================================================
// Sandboxes and Harness
// ================================================================================================

pub use crate::harness::{Harness, HarnessConfig, TestOutcome};
pub use crate::instrumentation::{ApiSelector, InstrumentationConfiguration, TestConfig};
pub use crate::sandbox::{ExecutionContext, PoolConfig, Sandbox, SandboxKey, SandboxState};

// ================================================================================================
// Metrics
// ================================================================================================

pub use crate::metrics::{NoopReporter, PerfReporter, RecordingReporter};
