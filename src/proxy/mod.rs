//! Call-through proxies.
//!
//! A shadow that does not override a method, or that explicitly asks for the original, reaches
//! the real implementation through a bridge synthesized per real type. The bridge is the
//! explicit counterpart of a generated subclass: it can only expose methods a subclass could
//! forward to, so abstract, final, private, native and static methods are left out, and final
//! types can not be bridged at all.

mod factory;

pub use factory::{CallThroughProxy, ProxyFactory};
