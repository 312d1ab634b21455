//! Dispatch decisions and the keys they are cached under.
//!
//! - [`DispatchDecision`]: the routing chosen for one call shape
//! - [`FailReason`]: why a call could not be routed
//! - [`MethodHandle`]: a resolved method plus the type that declared it
//! - [`CallSite`]: the cache key (runtime type, method, argument shape, request)
//! - [`CallRequest`]: whether the caller asked for the original implementation

use std::{fmt, sync::Arc};

use strum::Display;

use crate::{
    types::{MethodDescriptor, MethodRef},
    value::{Value, ValueKind},
};

/// Reason a call resolved to [`DispatchDecision::Fail`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum FailReason {
    /// Neither the shadow nor the real type declares a matching method.
    #[strum(serialize = "no such method")]
    NoSuchMethod,
    /// Call-through was required but the method is not exposed by the proxy bridge.
    #[strum(serialize = "method can not be called through")]
    NotProxiable,
    /// The matching original method is abstract or native and has no body.
    #[strum(serialize = "method has no implementation")]
    NoImplementation,
}

/// Whether a call asked for normal dispatch or for the original implementation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CallRequest {
    /// Normal dispatch: shadow first, then the configured fallback.
    #[default]
    Default,
    /// Explicit call-through: skip shadow methods and run the original.
    CallThrough,
}

/// A resolved method together with the type that declared it.
///
/// Handles compare by declaring type and method identity, so the same declaration resolved
/// twice yields equal handles.
#[derive(Clone)]
pub struct MethodHandle {
    owner: Arc<str>,
    method: Arc<MethodDescriptor>,
}

impl MethodHandle {
    pub(crate) fn new(owner: &str, method: &Arc<MethodDescriptor>) -> Self {
        Self {
            owner: Arc::from(owner),
            method: Arc::clone(method),
        }
    }

    /// Returns the id of the declaring type (a real type or a shadow type).
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the method descriptor.
    #[must_use]
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    pub(crate) fn same_declaration(&self, other: &MethodHandle) -> bool {
        self.owner == other.owner
            && self.method.name() == other.method.name()
            && self.method.param_kinds() == other.method.param_kinds()
    }
}

impl PartialEq for MethodHandle {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && Arc::ptr_eq(&self.method, &other.method)
    }
}

impl Eq for MethodHandle {}

impl fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.method.signature())
    }
}

impl fmt::Display for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.method.signature())
    }
}

/// The routing resolved for one call shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchDecision {
    /// Run the shadow method.
    RouteToShadow(MethodHandle),
    /// Run the original method.
    ///
    /// `proxied` is set when the runtime type is shadowed and the original is reached through
    /// the call-through proxy; it is clear for types that are not shadowed at all, which run
    /// their original implementation directly.
    CallThrough {
        /// The original method
        target: MethodHandle,
        /// Whether the call goes through the proxy bridge
        proxied: bool,
    },
    /// Do nothing and return the default value of the given return kind.
    NoOp(ValueKind),
    /// The call can not be routed.
    Fail(FailReason),
}

impl DispatchDecision {
    /// Returns `true` for [`DispatchDecision::RouteToShadow`].
    #[must_use]
    pub fn is_shadowed(&self) -> bool {
        matches!(self, DispatchDecision::RouteToShadow(_))
    }

    /// Returns `true` for [`DispatchDecision::CallThrough`].
    #[must_use]
    pub fn is_call_through(&self) -> bool {
        matches!(self, DispatchDecision::CallThrough { .. })
    }

    /// Returns `true` for [`DispatchDecision::NoOp`].
    #[must_use]
    pub fn is_noop(&self) -> bool {
        matches!(self, DispatchDecision::NoOp(_))
    }

    /// Returns the failure reason for [`DispatchDecision::Fail`].
    #[must_use]
    pub fn fail_reason(&self) -> Option<FailReason> {
        match self {
            DispatchDecision::Fail(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Returns the selected method for shadow and call-through decisions.
    #[must_use]
    pub fn target(&self) -> Option<&MethodHandle> {
        match self {
            DispatchDecision::RouteToShadow(handle)
            | DispatchDecision::CallThrough { target: handle, .. } => Some(handle),
            DispatchDecision::NoOp(_) | DispatchDecision::Fail(_) => None,
        }
    }

    /// Returns the value a [`DispatchDecision::NoOp`] yields.
    #[must_use]
    pub fn noop_value(&self) -> Option<Value> {
        match self {
            DispatchDecision::NoOp(kind) => Some(Value::default_for(kind)),
            _ => None,
        }
    }
}

impl fmt::Display for DispatchDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchDecision::RouteToShadow(handle) => write!(f, "shadow {handle}"),
            DispatchDecision::CallThrough {
                target,
                proxied: true,
            } => write!(f, "call-through {target}"),
            DispatchDecision::CallThrough {
                target,
                proxied: false,
            } => write!(f, "pass-through {target}"),
            DispatchDecision::NoOp(kind) => write!(f, "no-op -> {kind}"),
            DispatchDecision::Fail(reason) => write!(f, "fail ({reason})"),
        }
    }
}

/// Key of the dispatch decision cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallSite {
    /// Runtime type of the receiver (or the type named by a static call)
    pub runtime_type: String,
    /// Method name and argument shape
    pub method: MethodRef,
    /// Whether the call has no instance receiver
    pub is_static: bool,
    /// Normal dispatch or explicit call-through
    pub request: CallRequest,
}

impl CallSite {
    /// Creates an instance call site with normal dispatch.
    #[must_use]
    pub fn instance(runtime_type: impl Into<String>, method: MethodRef) -> Self {
        Self {
            runtime_type: runtime_type.into(),
            method,
            is_static: false,
            request: CallRequest::Default,
        }
    }

    /// Creates a static call site with normal dispatch.
    #[must_use]
    pub fn static_call(runtime_type: impl Into<String>, method: MethodRef) -> Self {
        Self {
            is_static: true,
            ..Self::instance(runtime_type, method)
        }
    }

    /// Returns the same site with the given request.
    #[must_use]
    pub fn with_request(mut self, request: CallRequest) -> Self {
        self.request = request;
        self
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.is_static { "::" } else { "." };
        write!(f, "{}{}{}", self.runtime_type, sep, self.method)?;
        if self.request == CallRequest::CallThrough {
            write!(f, " [original]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_value_is_default() {
        assert_eq!(
            DispatchDecision::NoOp(ValueKind::I32).noop_value(),
            Some(Value::I32(0))
        );
        assert_eq!(
            DispatchDecision::NoOp(ValueKind::Void).noop_value(),
            Some(Value::Void)
        );
        assert_eq!(
            DispatchDecision::Fail(FailReason::NoSuchMethod).noop_value(),
            None
        );
    }

    #[test]
    fn test_fail_reason_display() {
        assert_eq!(FailReason::NotProxiable.to_string(), "method can not be called through");
    }

    #[test]
    fn test_handles_compare_by_declaration() {
        let method = Arc::new(MethodDescriptor::new("draw"));
        let a = MethodHandle::new("com.example.Widget", &method);
        let b = MethodHandle::new("com.example.Widget", &method);
        let other = MethodHandle::new("com.example.Widget", &Arc::new(MethodDescriptor::new("draw")));

        assert_eq!(a, b);
        assert_ne!(a, other);
        assert!(a.same_declaration(&other));
    }

    #[test]
    fn test_call_site_display() {
        let site = CallSite::static_call(
            "com.example.Clock",
            MethodRef::new("currentTimeMillis", vec![]),
        )
        .with_request(CallRequest::CallThrough);
        assert_eq!(
            site.to_string(),
            "com.example.Clock::currentTimeMillis() [original]"
        );
    }
}
