//! Call-through bridge synthesis.

use std::{collections::BTreeSet, fmt, sync::Arc};

use tracing::debug;

use crate::{
    dispatch::{resolver::Selector, FailReason, MethodHandle},
    sandbox::ExecutionContext,
    types::{ancestors, ApiLevel, Call, MethodDescriptor, MethodRef, Receiver, TypeUniverse},
    value::{ObjectRef, Value},
    Error, Result,
};

/// A synthesized bridge to the original methods of one real type.
///
/// The bridge holds exactly the instance methods of the type and its ancestors that are
/// concrete, non-final, non-private, non-native and have a body. Where a method is redeclared,
/// only the nearest declaration counts: an overriding final method hides the ancestor's
/// proxiable one.
///
/// Factories are synthesized by [`Dispatcher::proxy_for`](crate::Dispatcher::proxy_for) and
/// cached per dispatcher.
pub struct ProxyFactory {
    real_type: String,
    api_level: ApiLevel,
    groups: Vec<(String, Vec<Arc<MethodDescriptor>>)>,
}

impl ProxyFactory {
    /// Synthesizes the bridge for `type_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] for unknown types and [`Error::Configuration`] for
    /// final types.
    pub(crate) fn synthesize(
        universe: &TypeUniverse,
        type_id: &str,
        api_level: ApiLevel,
    ) -> Result<Self> {
        if universe.require(type_id)?.is_final() {
            return Err(config_error!(
                "Type {} is final and can not be proxied",
                type_id
            ));
        }

        let mut declared = BTreeSet::new();
        let mut groups = Vec::new();
        for current in ancestors(universe, type_id) {
            let Some(desc) = universe.get(current) else {
                break;
            };

            let mut exposed = Vec::new();
            for method in desc.methods() {
                if method.is_static() || !method.is_available_at(api_level) {
                    continue;
                }
                // nearest declaration wins, proxiable or not
                if !declared.insert(MethodRef::new(method.name(), method.param_kinds().to_vec())) {
                    continue;
                }
                if method.is_proxiable() {
                    exposed.push(Arc::clone(method));
                }
            }

            if !exposed.is_empty() {
                groups.push((desc.id().to_string(), exposed));
            }
        }

        let factory = Self {
            real_type: type_id.to_string(),
            api_level,
            groups,
        };
        debug!(
            real_type = type_id,
            methods = factory.len(),
            "synthesized call-through bridge"
        );
        Ok(factory)
    }

    /// Returns the real type this bridge was synthesized for.
    #[must_use]
    pub fn real_type(&self) -> &str {
        &self.real_type
    }

    /// Returns the number of bridged methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, methods)| methods.len()).sum()
    }

    /// Returns `true` if the bridge exposes no methods.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Returns every bridged method, nearest declaring type first.
    #[must_use]
    pub fn methods(&self) -> Vec<MethodHandle> {
        self.groups
            .iter()
            .flat_map(|(owner, methods)| methods.iter().map(move |m| MethodHandle::new(owner, m)))
            .collect()
    }

    /// Returns `true` if the bridge exposes exactly this declaration.
    #[must_use]
    pub fn exposes(&self, handle: &MethodHandle) -> bool {
        self.groups.iter().any(|(owner, methods)| {
            owner == handle.owner()
                && methods
                    .iter()
                    .any(|m| MethodHandle::new(owner, m).same_declaration(handle))
        })
    }

    /// Returns `true` if the bridge exposes a method with this name.
    #[must_use]
    pub fn exposes_name(&self, name: &str) -> bool {
        self.groups
            .iter()
            .any(|(_, methods)| methods.iter().any(|m| m.name() == name))
    }

    /// Binds the bridge to a target instance.
    #[must_use]
    pub fn bind(self: &Arc<Self>, target: ObjectRef) -> CallThroughProxy {
        CallThroughProxy {
            factory: Arc::clone(self),
            target,
        }
    }
}

impl fmt::Debug for ProxyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyFactory")
            .field("real_type", &self.real_type)
            .field("api_level", &self.api_level)
            .field("methods", &self.methods())
            .finish()
    }
}

/// A bridge bound to one target instance.
///
/// Calls made through the proxy run the original bodies directly, bypassing shadow lookup.
///
/// # Examples
///
/// ```rust,ignore
/// let proxy = ctx.proxy_for("android.widget.TextView")?.bind(text_view);
/// let original = proxy.invoke(ctx, "getText", &[])?;
/// ```
#[derive(Clone, Debug)]
pub struct CallThroughProxy {
    factory: Arc<ProxyFactory>,
    target: ObjectRef,
}

impl CallThroughProxy {
    /// Returns the target instance.
    #[must_use]
    pub fn target(&self) -> ObjectRef {
        self.target
    }

    /// Returns the factory this proxy was bound from.
    #[must_use]
    pub fn factory(&self) -> &Arc<ProxyFactory> {
        &self.factory
    }

    /// Invokes the original method selected by name and argument shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DispatchFailed`] with [`FailReason::NotProxiable`] if the bridge
    /// exposes no matching method, [`Error::Invocation`] if the target is not an instance of
    /// the bridged type, and whatever the original body returns.
    pub fn invoke(&self, ctx: &ExecutionContext<'_>, method: &str, args: &[Value]) -> Result<Value> {
        let runtime_type = self.checked_target_type(ctx, method)?;
        let params = args
            .iter()
            .map(|arg| ctx.kind_of(arg))
            .collect::<Result<Vec<_>>>()?;
        let wanted = MethodRef::new(method, params);

        let groups: Vec<_> = self
            .factory
            .groups
            .iter()
            .map(|(owner, methods)| (owner.as_str(), methods.as_slice()))
            .collect();
        let selector = Selector {
            hierarchy: ctx.universe(),
            api_level: self.factory.api_level,
            is_static: false,
            loose: true,
        };

        match selector.select(&groups, &wanted, &runtime_type)? {
            Some(handle) => self.run(ctx, &runtime_type, &handle, args),
            None => Err(Error::DispatchFailed {
                type_id: runtime_type,
                method: wanted.to_string(),
                reason: FailReason::NotProxiable,
            }),
        }
    }

    /// Invokes an already resolved original method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DispatchFailed`] with [`FailReason::NotProxiable`] if the bridge does
    /// not expose `handle`, and whatever the original body returns.
    pub fn invoke_handle(
        &self,
        ctx: &ExecutionContext<'_>,
        handle: &MethodHandle,
        args: &[Value],
    ) -> Result<Value> {
        let runtime_type = self.checked_target_type(ctx, handle.method().name())?;
        if !self.factory.exposes(handle) {
            return Err(Error::DispatchFailed {
                type_id: runtime_type,
                method: handle.method().signature(),
                reason: FailReason::NotProxiable,
            });
        }
        self.run(ctx, &runtime_type, handle, args)
    }

    fn checked_target_type(&self, ctx: &ExecutionContext<'_>, method: &str) -> Result<String> {
        let runtime_type = ctx.type_of(self.target)?;
        if !ctx
            .universe()
            .is_subtype(&runtime_type, &self.factory.real_type)
        {
            return Err(Error::invocation(
                &self.factory.real_type,
                method,
                format!("proxy target {} is a {}", self.target, runtime_type),
            ));
        }
        Ok(runtime_type)
    }

    fn run(
        &self,
        ctx: &ExecutionContext<'_>,
        runtime_type: &str,
        handle: &MethodHandle,
        args: &[Value],
    ) -> Result<Value> {
        let receiver = Receiver::Instance(self.target);
        let call = Call {
            receiver: &receiver,
            runtime_type,
            method: handle.method().name(),
            args,
        };
        handle.method().invoke(ctx, &call)
    }
}
