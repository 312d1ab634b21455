//! The handle through which tasks and shadow bodies reach a sandbox.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    dispatch::{CallRequest, CallSite, DispatchDecision, Dispatcher},
    proxy::ProxyFactory,
    sandbox::Namespace,
    types::{ApiLevel, Receiver, TypeUniverse},
    value::{ObjectRef, Value, ValueKind},
    Error, Result,
};

/// Everything a task can touch inside one sandbox.
///
/// A context is only handed out for the duration of [`Sandbox::execute`](crate::Sandbox::execute)
/// or a reset, and every call made through it is dispatched against the registry installed in
/// that sandbox. Shadow bodies receive the same context, so a shadow calling back into
/// intercepted code is dispatched again.
///
/// # Examples
///
/// ```rust,ignore
/// sandbox.execute(|ctx| {
///     let widget = ctx.new_object("com.example.Widget")?;
///     let size = ctx.call(widget, "size", &[])?;
///     let original = ctx.call_original(widget, "size", &[])?;
///     Ok((size, original))
/// })?;
/// ```
pub struct ExecutionContext<'a> {
    sandbox_id: u64,
    dispatcher: &'a Dispatcher,
    namespace: &'a Namespace,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(sandbox_id: u64, dispatcher: &'a Dispatcher, namespace: &'a Namespace) -> Self {
        Self {
            sandbox_id,
            dispatcher,
            namespace,
        }
    }

    /// Returns the id of the sandbox this context belongs to.
    #[must_use]
    pub fn sandbox_id(&self) -> u64 {
        self.sandbox_id
    }

    /// Returns the API level the sandbox runs at.
    #[must_use]
    pub fn api_level(&self) -> ApiLevel {
        self.dispatcher.api_level()
    }

    /// Returns the type universe.
    #[must_use]
    pub fn universe(&self) -> &TypeUniverse {
        self.dispatcher.universe()
    }

    /// Returns the sandbox's dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        self.dispatcher
    }

    /// Returns the sandbox's namespace.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        self.namespace
    }

    /// Instantiates `type_id` with the declared initial values of its instance fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] for unknown types and [`Error::Invocation`] for
    /// abstract types and interfaces.
    pub fn new_object(&self, type_id: &str) -> Result<ObjectRef> {
        let universe = self.universe();
        if universe.require(type_id)?.is_abstract() {
            return Err(Error::invocation(
                type_id,
                "<init>",
                "abstract types can not be instantiated",
            ));
        }

        let fields: BTreeMap<String, Value> = universe
            .instance_fields(type_id)?
            .into_iter()
            .map(|field| (field.name.clone(), field.initial.clone()))
            .collect();
        Ok(self.namespace.alloc(type_id, fields))
    }

    /// Returns the runtime type of an object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleReference`] for handles created before the last reset and
    /// [`Error::InvalidReference`] for unknown handles.
    pub fn type_of(&self, obj: ObjectRef) -> Result<String> {
        self.namespace.object_type(obj)
    }

    /// Returns the signature-matching kind of a value, resolving object types on the heap.
    ///
    /// # Errors
    ///
    /// As [`type_of`](Self::type_of) for object values.
    pub fn kind_of(&self, value: &Value) -> Result<ValueKind> {
        match value {
            Value::Object(obj) => Ok(ValueKind::Object(self.type_of(*obj)?)),
            other => Ok(other.kind()),
        }
    }

    /// Reads an instance field.
    ///
    /// # Errors
    ///
    /// As [`type_of`](Self::type_of), plus [`Error::FieldNotFound`].
    pub fn get_field(&self, obj: ObjectRef, field: &str) -> Result<Value> {
        self.namespace.get_field(obj, field)
    }

    /// Writes an instance field.
    ///
    /// # Errors
    ///
    /// As [`type_of`](Self::type_of), plus [`Error::FieldNotFound`].
    pub fn set_field(&self, obj: ObjectRef, field: &str, value: impl Into<Value>) -> Result<()> {
        self.namespace.set_field(obj, field, value.into())
    }

    /// Reads a static field of an intercepted type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] or [`Error::FieldNotFound`].
    pub fn get_static(&self, type_id: &str, field: &str) -> Result<Value> {
        self.namespace
            .get_static(type_id, field)
            .ok_or_else(|| self.missing_static(type_id, field))
    }

    /// Writes a static field of an intercepted type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] or [`Error::FieldNotFound`].
    pub fn set_static(&self, type_id: &str, field: &str, value: impl Into<Value>) -> Result<()> {
        if self.namespace.set_static(type_id, field, value.into()) {
            Ok(())
        } else {
            Err(self.missing_static(type_id, field))
        }
    }

    /// Returns a value a shadow stored in this sandbox, if any.
    #[must_use]
    pub fn shadow_static(&self, shadow_id: &str, key: &str) -> Option<Value> {
        self.namespace.shadow_static(shadow_id, key)
    }

    /// Stores a value on behalf of a shadow. Cleared by the next reset.
    pub fn set_shadow_static(&self, shadow_id: &str, key: &str, value: impl Into<Value>) {
        self.namespace.set_shadow_static(shadow_id, key, value.into());
    }

    /// Calls an instance method through the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns resolution errors, [`Error::DispatchFailed`] for `Fail` decisions, and
    /// whatever the selected body returns.
    pub fn call(&self, obj: ObjectRef, method: &str, args: &[Value]) -> Result<Value> {
        self.invoke(&Receiver::Instance(obj), method, args, CallRequest::Default)
    }

    /// Calls a static method through the dispatcher.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call).
    pub fn call_static(&self, type_id: &str, method: &str, args: &[Value]) -> Result<Value> {
        self.invoke(&Receiver::of_type(type_id), method, args, CallRequest::Default)
    }

    /// Calls the original implementation of an instance method, bypassing the shadow.
    ///
    /// Shadow bodies use this to delegate to the real behavior. Types that are not shadowed
    /// run their original method as usual.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call); [`FailReason::NotProxiable`](crate::FailReason::NotProxiable)
    /// if the original can not be reached through a proxy.
    pub fn call_original(&self, obj: ObjectRef, method: &str, args: &[Value]) -> Result<Value> {
        self.invoke(&Receiver::Instance(obj), method, args, CallRequest::CallThrough)
    }

    /// Calls the original implementation of a static method, bypassing the shadow.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call).
    pub fn call_original_static(&self, type_id: &str, method: &str, args: &[Value]) -> Result<Value> {
        self.invoke(
            &Receiver::of_type(type_id),
            method,
            args,
            CallRequest::CallThrough,
        )
    }

    /// Dispatches a call with an explicit receiver and request.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call).
    pub fn invoke(
        &self,
        receiver: &Receiver,
        method: &str,
        args: &[Value],
        request: CallRequest,
    ) -> Result<Value> {
        self.dispatcher.invoke(self, receiver, method, args, request)
    }

    /// Resolves the decision a call would take, without executing it.
    ///
    /// # Errors
    ///
    /// Returns resolution errors; `Fail` decisions are returned, not raised.
    pub fn resolve_call(
        &self,
        receiver: &Receiver,
        method: &str,
        args: &[Value],
    ) -> Result<DispatchDecision> {
        let site = self.call_site(receiver, method, args, CallRequest::Default)?;
        self.dispatcher.resolve(&site)
    }

    /// Builds the call site a call would be resolved at.
    ///
    /// # Errors
    ///
    /// As [`type_of`](Self::type_of), plus [`Error::TypeNotFound`] for static receivers.
    pub fn call_site(
        &self,
        receiver: &Receiver,
        method: &str,
        args: &[Value],
        request: CallRequest,
    ) -> Result<CallSite> {
        self.dispatcher
            .call_site(self, receiver, method, args, request)
    }

    /// Returns the call-through proxy factory for `type_id`.
    ///
    /// # Errors
    ///
    /// As [`Dispatcher::proxy_for`].
    pub fn proxy_for(&self, type_id: &str) -> Result<Arc<ProxyFactory>> {
        self.dispatcher.proxy_for(type_id)
    }

    fn missing_static(&self, type_id: &str, field: &str) -> Error {
        if self.universe().contains(type_id) {
            Error::FieldNotFound {
                type_id: type_id.to_string(),
                field: field.to_string(),
            }
        } else {
            Error::TypeNotFound(type_id.to_string())
        }
    }
}

impl std::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("sandbox_id", &self.sandbox_id)
            .field("api_level", &self.api_level())
            .finish()
    }
}
