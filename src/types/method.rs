//! Method descriptors, call frames and method references.

use std::{fmt, sync::Arc};

use bitflags::bitflags;

use crate::{
    sandbox::ExecutionContext,
    types::ApiLevel,
    value::{render_params, ObjectRef, Value, ValueKind},
    Error, Result,
};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    /// Method modifier flags
    pub struct MethodModifiers: u32 {
        /// Method is static (no receiver instance)
        const STATIC = 0x0001;
        /// Method can not be overridden
        const FINAL = 0x0002;
        /// Method has no implementation on this type
        const ABSTRACT = 0x0004;
        /// Accessible only by the declaring type
        const PRIVATE = 0x0008;
        /// Method is implemented outside the universe
        const NATIVE = 0x0010;
    }
}

impl MethodModifiers {
    /// Modifiers that exclude a method from a call-through bridge.
    pub const NOT_PROXIABLE: Self = Self::STATIC
        .union(Self::FINAL)
        .union(Self::ABSTRACT)
        .union(Self::PRIVATE)
        .union(Self::NATIVE);
}

/// Type alias for method implementations.
///
/// Bodies receive the execution context of the active sandbox and the call frame. A body
/// signals a thrown exception by returning an error (usually [`Error::Invocation`]); the
/// dispatcher propagates it to the caller unchanged.
pub type MethodBody =
    Arc<dyn for<'c> Fn(&ExecutionContext<'c>, &Call<'_>) -> Result<Value> + Send + Sync>;

/// The receiver of a call: an instance, or a type for static calls.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Receiver {
    /// Instance call on the given object
    Instance(ObjectRef),
    /// Static call on the given type
    Static(String),
}

impl Receiver {
    /// Creates a static receiver for the given type id.
    #[must_use]
    pub fn of_type(type_id: impl Into<String>) -> Self {
        Receiver::Static(type_id.into())
    }

    /// Returns the instance handle for instance receivers.
    #[must_use]
    pub fn instance(&self) -> Option<ObjectRef> {
        match self {
            Receiver::Instance(r) => Some(*r),
            Receiver::Static(_) => None,
        }
    }
}

impl From<ObjectRef> for Receiver {
    fn from(r: ObjectRef) -> Self {
        Receiver::Instance(r)
    }
}

/// A single call frame as seen by a method body.
pub struct Call<'a> {
    /// The receiver of the call
    pub receiver: &'a Receiver,
    /// Runtime type the call was dispatched on
    pub runtime_type: &'a str,
    /// Name of the called method
    pub method: &'a str,
    /// Call arguments (excluding the receiver)
    pub args: &'a [Value],
}

impl Call<'_> {
    /// Returns the receiver instance, failing for static calls.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invocation`] if the call has no instance receiver.
    pub fn this(&self) -> Result<ObjectRef> {
        self.receiver.instance().ok_or_else(|| {
            Error::invocation(self.runtime_type, self.method, "static call has no receiver")
        })
    }

    /// Returns the argument at `index`, failing with an invocation error when absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invocation`] if fewer than `index + 1` arguments were passed.
    pub fn arg(&self, index: usize) -> Result<&Value> {
        self.args.get(index).ok_or_else(|| {
            Error::invocation(
                self.runtime_type,
                self.method,
                format!("missing argument {index}"),
            )
        })
    }
}

/// A method name plus the parameter shape used to select an overload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef {
    /// Method name
    pub name: String,
    /// Argument or declared parameter kinds
    pub params: Vec<ValueKind>,
}

impl MethodRef {
    /// Creates a method reference.
    #[must_use]
    pub fn new(name: impl Into<String>, params: Vec<ValueKind>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, render_params(&self.params))
    }
}

/// Describes one method of a real or shadow type.
///
/// # Examples
///
/// ```rust
/// use shadowbox::{MethodDescriptor, MethodModifiers, Value, ValueKind};
///
/// let method = MethodDescriptor::new("setText")
///     .param(ValueKind::String)
///     .returns(ValueKind::Void)
///     .since(3)
///     .body(|_ctx, _call| Ok(Value::Void));
///
/// assert!(method.is_available_at(21));
/// assert!(!method.is_available_at(2));
/// assert!(method.is_proxiable());
/// ```
#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    params: Vec<ValueKind>,
    returns: ValueKind,
    modifiers: MethodModifiers,
    min_api: Option<ApiLevel>,
    max_api: Option<ApiLevel>,
    body: Option<MethodBody>,
}

impl MethodDescriptor {
    /// Creates a method with no parameters, a void return and no body.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: ValueKind::Void,
            modifiers: MethodModifiers::empty(),
            min_api: None,
            max_api: None,
            body: None,
        }
    }

    /// Appends a parameter.
    #[must_use]
    pub fn param(mut self, kind: ValueKind) -> Self {
        self.params.push(kind);
        self
    }

    /// Replaces the parameter list.
    #[must_use]
    pub fn params(mut self, kinds: Vec<ValueKind>) -> Self {
        self.params = kinds;
        self
    }

    /// Sets the return kind.
    #[must_use]
    pub fn returns(mut self, kind: ValueKind) -> Self {
        self.returns = kind;
        self
    }

    /// Adds modifier flags.
    #[must_use]
    pub fn modifiers(mut self, modifiers: MethodModifiers) -> Self {
        self.modifiers |= modifiers;
        self
    }

    /// Marks the method static.
    #[must_use]
    pub fn static_method(self) -> Self {
        self.modifiers(MethodModifiers::STATIC)
    }

    /// Sets the first API level the method exists in.
    #[must_use]
    pub fn since(mut self, level: ApiLevel) -> Self {
        self.min_api = Some(level);
        self
    }

    /// Sets the last API level the method exists in.
    #[must_use]
    pub fn until(mut self, level: ApiLevel) -> Self {
        self.max_api = Some(level);
        self
    }

    /// Sets the implementation.
    #[must_use]
    pub fn body<F>(mut self, body: F) -> Self
    where
        F: for<'c> Fn(&ExecutionContext<'c>, &Call<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    /// Returns the method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared parameter kinds.
    #[must_use]
    pub fn param_kinds(&self) -> &[ValueKind] {
        &self.params
    }

    /// Returns the declared return kind.
    #[must_use]
    pub fn return_kind(&self) -> &ValueKind {
        &self.returns
    }

    /// Returns the modifier flags.
    #[must_use]
    pub fn flags(&self) -> MethodModifiers {
        self.modifiers
    }

    /// Returns `true` if the method is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(MethodModifiers::STATIC)
    }

    /// Returns the implementation, if any.
    #[must_use]
    pub fn implementation(&self) -> Option<&MethodBody> {
        self.body.as_ref()
    }

    /// Returns `true` if the method exists at the given API level.
    #[must_use]
    pub fn is_available_at(&self, level: ApiLevel) -> bool {
        self.min_api.map_or(true, |min| level >= min) && self.max_api.map_or(true, |max| level <= max)
    }

    /// Returns `true` if the method can be exposed by a call-through bridge.
    ///
    /// Only concrete, overridable, non-private, non-native instance methods with a body
    /// qualify.
    #[must_use]
    pub fn is_proxiable(&self) -> bool {
        !self.modifiers.intersects(MethodModifiers::NOT_PROXIABLE) && self.body.is_some()
    }

    /// Renders the signature as `name(i32, string) -> void`.
    #[must_use]
    pub fn signature(&self) -> String {
        format!(
            "{}{} -> {}",
            self.name,
            render_params(&self.params),
            self.returns
        )
    }

    /// Invokes the body.
    ///
    /// # Errors
    ///
    /// Returns whatever the body returns. A method without a body yields
    /// [`Error::DispatchFailed`] with [`FailReason::NoImplementation`](crate::dispatch::FailReason::NoImplementation).
    pub fn invoke(&self, ctx: &ExecutionContext<'_>, call: &Call<'_>) -> Result<Value> {
        match &self.body {
            Some(body) => body(ctx, call),
            None => Err(Error::DispatchFailed {
                type_id: call.runtime_type.to_string(),
                method: self.signature(),
                reason: crate::dispatch::FailReason::NoImplementation,
            }),
        }
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("signature", &self.signature())
            .field("modifiers", &self.modifiers)
            .field("min_api", &self.min_api)
            .field("max_api", &self.max_api)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_builder() {
        let method = MethodDescriptor::new("measure")
            .param(ValueKind::I32)
            .param(ValueKind::I32)
            .returns(ValueKind::I64);

        assert_eq!(method.name(), "measure");
        assert_eq!(method.param_kinds().len(), 2);
        assert_eq!(method.signature(), "measure(i32, i32) -> i64");
        assert!(!method.is_proxiable());
    }

    #[test]
    fn test_proxiable_requires_body_and_plain_modifiers() {
        let plain = MethodDescriptor::new("draw").body(|_, _| Ok(Value::Void));
        assert!(plain.is_proxiable());

        for flag in [
            MethodModifiers::STATIC,
            MethodModifiers::FINAL,
            MethodModifiers::ABSTRACT,
            MethodModifiers::PRIVATE,
            MethodModifiers::NATIVE,
        ] {
            let flagged = plain.clone().modifiers(flag);
            assert!(!flagged.is_proxiable(), "{flag:?} should not be proxiable");
        }
    }

    #[test]
    fn test_api_window() {
        let method = MethodDescriptor::new("getDisplayCutout").since(28).until(33);
        assert!(!method.is_available_at(27));
        assert!(method.is_available_at(28));
        assert!(method.is_available_at(33));
        assert!(!method.is_available_at(34));
    }

    #[test]
    fn test_method_ref_display() {
        let mref = MethodRef::new("setText", vec![ValueKind::String]);
        assert_eq!(mref.to_string(), "setText(string)");
    }
}
