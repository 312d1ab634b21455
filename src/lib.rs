// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # shadowbox
//!
//! An engine for running code against substitute implementations of the types it calls.
//! Tests declare *shadows*, stand-ins bound to real framework types, and `shadowbox` routes
//! every intercepted call either to the shadow, through to the original implementation, or to
//! a typed no-op, all inside isolated, pooled sandboxes that are reset between tests.
//!
//! ## Features
//!
//! - **Shadow registry** - Tiered, additive registration from providers and per-test overrides,
//!   validated when it is built rather than on first call
//! - **Dispatch** - Hierarchy-aware shadow lookup, overload resolution with exact and loose
//!   signature matching, and a decision cache invalidated precisely on registry swaps
//! - **Call-through proxies** - Synthesized bridges that reach the original implementation of
//!   a shadowed type, with proxiability checked up front
//! - **Sandboxes** - Copy-on-write statics, generation-tagged heaps, shadow resetters and leak
//!   detection after every task
//! - **Pooling** - One sandbox per instrumentation rules and API level, reused serially,
//!   bounded with LRU eviction
//! - **Multi-level runs** - A harness that runs each test once per selected API level
//!
//! ## Quick Start
//!
//! ```rust
//! use shadowbox::prelude::*;
//! use std::sync::Arc;
//!
//! let universe = TypeUniverse::builder()
//!     .add(
//!         TypeDescriptor::new("app.Clock")
//!             .method(
//!                 MethodDescriptor::new("now")
//!                     .static_method()
//!                     .returns(ValueKind::I64)
//!                     .body(|_, _| Ok(Value::I64(1_700_000_000))),
//!             ),
//!     )
//!     .build()?;
//!
//! let frozen = Arc::new(
//!     ShadowType::new("test.FrozenClock", "app.Clock").method(
//!         MethodDescriptor::new("now")
//!             .static_method()
//!             .returns(ValueKind::I64)
//!             .body(|_, _| Ok(Value::I64(0))),
//!     ),
//! );
//!
//! fn now(ctx: &ExecutionContext<'_>) -> shadowbox::Result<Value> {
//!     ctx.call_static("app.Clock", "now", &[])
//! }
//!
//! let harness = Harness::new(Arc::new(universe), HarnessConfig::single(30))?;
//! let shadowed = harness.run(&TestConfig::new().with_shadow(&frozen), now)?;
//! assert_eq!(shadowed[0].result, Ok(Value::I64(0)));
//!
//! let real = harness.run(&TestConfig::new(), now)?;
//! assert_eq!(real[0].result, Ok(Value::I64(1_700_000_000)));
//! # Ok::<(), shadowbox::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`types`] and [`value`] - The intercepted type universe and the values calls carry
//! - [`shadow`] - Shadow types, bindings, providers and the immutable registry
//! - [`dispatch`] - Per-sandbox call resolution and its decision cache
//! - [`proxy`] - Call-through bridges to original implementations
//! - [`instrumentation`] - Which types are intercepted, and per-test overrides
//! - [`sandbox`] - Isolated execution, reset, and the sandbox pool
//! - [`harness`] - Running tests across API levels
//! - [`metrics`] - Timed lifecycle events
//!
//! ## Logging
//!
//! The crate emits [`tracing`](https://docs.rs/tracing) events: `trace` for individual
//! dispatch decisions, `debug` for lifecycle transitions and registry swaps, `warn` for
//! poisoned sandboxes. No subscriber is installed by the library.

#[macro_use]
pub(crate) mod error;

/// Shared fixtures used by the unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use shadowbox::prelude::*;
///
/// let config = HarnessConfig::single(30);
/// assert!(config.validate().is_ok());
/// ```
pub mod prelude;

pub mod dispatch;
pub mod harness;
pub mod instrumentation;
pub mod metrics;
pub mod proxy;
pub mod sandbox;
pub mod shadow;
pub mod types;
pub mod value;

/// `shadowbox` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `shadowbox` Error type
///
/// Every failure surfaces as a single error attributable to the test run it occurred in.
pub use error::Error;

pub use dispatch::{
    CallRequest, CallSite, DispatchDecision, DispatchStats, Dispatcher, FailReason, MethodHandle,
};
pub use harness::{Harness, HarnessConfig, TestOutcome, DEFAULT_API_LEVELS};
pub use instrumentation::{
    ApiSelector, InstrumentationBuilder, InstrumentationConfiguration, ShadowKey, TestConfig,
    DEFAULT_EXCLUDED_PACKAGES,
};
pub use metrics::{
    NoopReporter, PerfEvent, PerfEventKind, PerfReporter, RecordingReporter,
};
pub use proxy::{CallThroughProxy, ProxyFactory};
pub use sandbox::{
    ExecutionContext, LeakCheck, Namespace, PoolConfig, PoolStats, PristineNamespaceCheck,
    Sandbox, SandboxKey, SandboxLease, SandboxPool, SandboxState,
};
pub use shadow::{
    ProviderTier, Resetter, ShadowConfig, ShadowLookup, ShadowProvider, ShadowRegistry,
    ShadowRegistryBuilder, ShadowType, StaticShadowProvider,
};
pub use types::{
    ApiLevel, Call, FieldDecl, MethodBody, MethodDescriptor, MethodModifiers, MethodRef,
    Receiver, TypeDescriptor, TypeFlags, TypeHierarchy, TypeUniverse, TypeUniverseBuilder,
};
pub use value::{ObjectRef, Primitive, Value, ValueKind};
