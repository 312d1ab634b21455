//! Isolated execution environments.
//!
//! A [`Sandbox`] gives each test its own copy of every static of the intercepted types, its
//! own object heap and its own dispatcher, so shadow bindings and state installed for one test
//! never reach another. Sandboxes are expensive to build and cheap to reset; the
//! [`SandboxPool`] keeps them keyed by instrumentation rules and API level for reuse.
//!
//! # Key Components
//!
//! - [`Sandbox`] - Lifecycle, task execution and reset
//! - [`Namespace`] - Copy-on-write statics, shadow state and generation-tagged heap
//! - [`ExecutionContext`] - What a task or shadow body sees while running
//! - [`SandboxPool`] / [`SandboxLease`] - Keyed, bounded reuse
//! - [`LeakCheck`] - Post-reset isolation checks
//!
//! # Reset
//!
//! After every task the sandbox runs the resetters of all installed shadows, restores the
//! statics template and advances the heap generation, then runs the leak checks. A failed
//! resetter or a reported leak poisons the sandbox: it is destroyed and never pooled again.

mod context;
mod leak;
mod lifecycle;
mod namespace;
mod pool;
mod state;

pub use context::ExecutionContext;
pub use leak::{LeakCheck, PristineNamespaceCheck};
pub use lifecycle::{Sandbox, SandboxKey};
pub use namespace::Namespace;
pub use pool::{PoolConfig, PoolStats, SandboxLease, SandboxPool};
pub use state::SandboxState;
