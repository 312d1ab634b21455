//! Call dispatch: deciding which implementation an intercepted call runs.
//!
//! Every call made through an [`ExecutionContext`](crate::ExecutionContext) is resolved by the
//! sandbox's [`Dispatcher`] into a [`DispatchDecision`]:
//!
//! | Decision | Meaning |
//! |----------|---------|
//! | [`DispatchDecision::RouteToShadow`] | A shadow method matched and runs instead |
//! | [`DispatchDecision::CallThrough`] | The original method runs (through the proxy if shadowed) |
//! | [`DispatchDecision::NoOp`] | The call is stubbed and returns a default value |
//! | [`DispatchDecision::Fail`] | No routing exists; executing it yields an error |
//!
//! Decisions are memoized per [`CallSite`] for the lifetime of the installed registry.

mod decision;
mod dispatcher;
pub(crate) mod resolver;

pub use decision::{CallRequest, CallSite, DispatchDecision, FailReason, MethodHandle};
pub use dispatcher::{DispatchStats, Dispatcher};
