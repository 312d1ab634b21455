//! The per-sandbox dispatcher.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{
    dispatch::{
        resolver::{original_groups, Selector},
        CallRequest, CallSite, DispatchDecision, FailReason, MethodHandle,
    },
    instrumentation::InstrumentationConfiguration,
    metrics::{measure, PerfEventKind, PerfReporter},
    proxy::ProxyFactory,
    sandbox::ExecutionContext,
    shadow::{ShadowConfig, ShadowRegistry},
    types::{ApiLevel, Call, MethodRef, Receiver, TypeUniverse},
    value::Value,
    Error, Result,
};

/// A cached decision plus every type id its resolution depended on.
#[derive(Debug, Clone)]
struct CachedDecision {
    decision: DispatchDecision,
    consulted: Vec<String>,
}

/// Cache counters of a dispatcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Resolutions answered from the cache
    pub hits: u64,
    /// Resolutions computed and cached
    pub misses: u64,
    /// Cache entries dropped by registry swaps
    pub purged: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    purged: AtomicU64,
}

/// Resolves and executes intercepted calls for one sandbox.
///
/// The dispatcher only ever resolves against the registry currently installed in it.
/// Decisions are memoized per [`CallSite`]; each cache entry remembers the type ids consulted
/// while resolving it, so a registry swap purges exactly the entries that depended on a changed
/// binding. Call-through proxies are synthesized on first use and cached alongside.
///
/// Both caches are concurrent maps with insert-if-absent semantics, so the dispatcher can be
/// shared across threads, although a sandbox runs one task at a time.
///
/// # Resolution
///
/// 1. Types the instrumentation configuration does not cover run their original method.
/// 2. Types without a binding (on themselves or an ancestor) run their original method.
/// 3. The bound shadow is searched for a matching method ([`CallRequest::CallThrough`] skips
///    this step). A match routes to the shadow.
/// 4. Otherwise, with call-through enabled or requested, the original runs through the proxy.
/// 5. Otherwise the call is a no-op returning the default of the real method's return kind.
///
/// A call that matches no method at all fails with [`FailReason::NoSuchMethod`].
pub struct Dispatcher {
    universe: Arc<TypeUniverse>,
    instrumentation: Arc<InstrumentationConfiguration>,
    api_level: ApiLevel,
    registry: RwLock<Arc<ShadowRegistry>>,
    decisions: DashMap<CallSite, CachedDecision>,
    proxies: DashMap<String, Arc<ProxyFactory>>,
    reporter: Arc<dyn PerfReporter>,
    counters: Counters,
}

impl Dispatcher {
    /// Creates a dispatcher with an empty registry.
    ///
    /// # Arguments
    ///
    /// * `universe` - The intercepted types
    /// * `instrumentation` - Which types are subject to interception
    /// * `api_level` - The API level calls are resolved at
    /// * `reporter` - Sink for proxy synthesis timings
    #[must_use]
    pub fn new(
        universe: Arc<TypeUniverse>,
        instrumentation: Arc<InstrumentationConfiguration>,
        api_level: ApiLevel,
        reporter: Arc<dyn PerfReporter>,
    ) -> Self {
        Self {
            universe,
            instrumentation,
            api_level,
            registry: RwLock::new(Arc::new(ShadowRegistry::empty())),
            decisions: DashMap::new(),
            proxies: DashMap::new(),
            reporter,
            counters: Counters::default(),
        }
    }

    /// Returns the API level calls are resolved at.
    #[must_use]
    pub fn api_level(&self) -> ApiLevel {
        self.api_level
    }

    /// Returns the type universe.
    #[must_use]
    pub fn universe(&self) -> &Arc<TypeUniverse> {
        &self.universe
    }

    /// Returns the instrumentation configuration.
    #[must_use]
    pub fn instrumentation(&self) -> &InstrumentationConfiguration {
        &self.instrumentation
    }

    /// Returns the installed registry.
    #[must_use]
    pub fn registry(&self) -> Arc<ShadowRegistry> {
        Arc::clone(&self.registry.read())
    }

    /// Installs `registry` and purges the decisions that depended on changed bindings.
    ///
    /// Returns the invalidated set between the previous and the new registry. Decisions that
    /// never consulted an invalidated type id survive, as do proxies of unaffected types.
    pub fn install(&self, registry: Arc<ShadowRegistry>) -> BTreeSet<String> {
        let invalidated = {
            let mut current = self.registry.write();
            let previous = std::mem::replace(&mut *current, registry);
            current.invalidated_set(&previous)
        };

        if !invalidated.is_empty() {
            let before = self.decisions.len();
            self.decisions.retain(|_, cached| {
                !cached
                    .consulted
                    .iter()
                    .any(|type_id| invalidated.contains(type_id))
            });
            self.proxies
                .retain(|type_id, _| !invalidated.contains(type_id));

            let purged = before.saturating_sub(self.decisions.len()) as u64;
            self.counters.purged.fetch_add(purged, Ordering::Relaxed);
            debug!(
                invalidated = invalidated.len(),
                purged,
                retained = self.decisions.len(),
                "installed shadow registry"
            );
        }

        invalidated
    }

    /// Resolves the decision for a call site, consulting the cache first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DispatchAmbiguity`] if the winning candidate is declared twice, and
    /// [`Error::TypeNotFound`] or [`Error::Configuration`] if the runtime type can not be
    /// resolved or proxied. Errors are never cached.
    pub fn resolve(&self, site: &CallSite) -> Result<DispatchDecision> {
        if let Some(cached) = self.decisions.get(site) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            trace!(site = %site, decision = %cached.decision, "dispatch cache hit");
            return Ok(cached.decision.clone());
        }

        let (decision, consulted) = self.compute(site)?;
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        trace!(site = %site, decision = %decision, "resolved dispatch decision");

        let entry = self
            .decisions
            .entry(site.clone())
            .or_insert(CachedDecision {
                decision,
                consulted,
            });
        Ok(entry.decision.clone())
    }

    /// Returns the cached decision for a call site without resolving.
    #[must_use]
    pub fn cached(&self, site: &CallSite) -> Option<DispatchDecision> {
        self.decisions.get(site).map(|cached| cached.decision.clone())
    }

    /// Returns the number of cached decisions.
    #[must_use]
    pub fn cached_decisions(&self) -> usize {
        self.decisions.len()
    }

    /// Returns the cache counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            purged: self.counters.purged.load(Ordering::Relaxed),
        }
    }

    /// Returns the call-through proxy factory for `type_id`, synthesizing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] for unknown types and [`Error::Configuration`] for
    /// final types, which can not be proxied.
    pub fn proxy_for(&self, type_id: &str) -> Result<Arc<ProxyFactory>> {
        if let Some(factory) = self.proxies.get(type_id) {
            return Ok(Arc::clone(factory.value()));
        }

        let factory = Arc::new(measure(
            self.reporter.as_ref(),
            PerfEventKind::ProxySynthesis,
            type_id,
            || ProxyFactory::synthesize(&self.universe, type_id, self.api_level),
        )?);
        let entry = self.proxies.entry(type_id.to_string()).or_insert(factory);
        Ok(Arc::clone(entry.value()))
    }

    /// Returns the number of cached proxy factories.
    #[must_use]
    pub fn cached_proxies(&self) -> usize {
        self.proxies.len()
    }

    /// Returns `true` if a proxy factory for `type_id` is cached.
    #[must_use]
    pub fn has_proxy(&self, type_id: &str) -> bool {
        self.proxies.contains_key(type_id)
    }

    /// Drops every cached decision and proxy.
    pub fn clear(&self) {
        self.decisions.clear();
        self.proxies.clear();
    }

    /// Builds the call site for a call made through `ctx`.
    pub(crate) fn call_site(
        &self,
        ctx: &ExecutionContext<'_>,
        receiver: &Receiver,
        method: &str,
        args: &[Value],
        request: CallRequest,
    ) -> Result<CallSite> {
        let params = args
            .iter()
            .map(|arg| ctx.kind_of(arg))
            .collect::<Result<Vec<_>>>()?;
        let method = MethodRef::new(method, params);

        let site = match receiver {
            Receiver::Instance(obj) => CallSite::instance(ctx.type_of(*obj)?, method),
            Receiver::Static(type_id) => {
                self.universe.require(type_id)?;
                CallSite::static_call(type_id.clone(), method)
            }
        };
        Ok(site.with_request(request))
    }

    /// Resolves and executes a call.
    ///
    /// # Errors
    ///
    /// Propagates resolution errors, returns [`Error::DispatchFailed`] for `Fail` decisions,
    /// and returns whatever the selected body returns, unchanged.
    pub(crate) fn invoke(
        &self,
        ctx: &ExecutionContext<'_>,
        receiver: &Receiver,
        method: &str,
        args: &[Value],
        request: CallRequest,
    ) -> Result<Value> {
        let site = self.call_site(ctx, receiver, method, args, request)?;
        let decision = self.resolve(&site)?;
        self.execute(ctx, &decision, &site, receiver, args)
    }

    fn execute(
        &self,
        ctx: &ExecutionContext<'_>,
        decision: &DispatchDecision,
        site: &CallSite,
        receiver: &Receiver,
        args: &[Value],
    ) -> Result<Value> {
        let call = Call {
            receiver,
            runtime_type: &site.runtime_type,
            method: &site.method.name,
            args,
        };

        match decision {
            DispatchDecision::RouteToShadow(handle) => handle.method().invoke(ctx, &call),
            DispatchDecision::CallThrough {
                target,
                proxied: true,
            } => {
                let this = call.this()?;
                self.proxy_for(&site.runtime_type)?
                    .bind(this)
                    .invoke_handle(ctx, target, args)
            }
            DispatchDecision::CallThrough {
                target,
                proxied: false,
            } => target.method().invoke(ctx, &call),
            DispatchDecision::NoOp(kind) => Ok(Value::default_for(kind)),
            DispatchDecision::Fail(reason) => Err(Error::DispatchFailed {
                type_id: site.runtime_type.clone(),
                method: site.method.to_string(),
                reason: *reason,
            }),
        }
    }

    fn compute(&self, site: &CallSite) -> Result<(DispatchDecision, Vec<String>)> {
        if !self.instrumentation.should_instrument(&site.runtime_type) {
            let decision = self.pass_through(site)?;
            return Ok((decision, vec![site.runtime_type.clone()]));
        }

        let registry = self.registry();
        let lookup = registry.lookup(&site.runtime_type, self.universe.as_ref(), self.api_level);
        let decision = match lookup.config() {
            Some(config) => self.resolve_shadowed(site, config)?,
            None => self.pass_through(site)?,
        };
        Ok((decision, lookup.into_consulted()))
    }

    fn resolve_shadowed(&self, site: &CallSite, config: &ShadowConfig) -> Result<DispatchDecision> {
        if site.request == CallRequest::Default {
            let groups: Vec<_> = config.method_groups().collect();
            let selector = Selector {
                hierarchy: self.universe.as_ref(),
                api_level: self.api_level,
                is_static: site.is_static,
                loose: config.loose_signature_matching(),
            };
            if let Some(handle) = selector.select(&groups, &site.method, &site.runtime_type)? {
                return Ok(DispatchDecision::RouteToShadow(handle));
            }
        }

        let original = self.resolve_original(site)?;
        if config.call_through_by_default() || site.request == CallRequest::CallThrough {
            return self.call_through(site, original);
        }

        Ok(match original {
            Some(handle) => DispatchDecision::NoOp(handle.method().return_kind().clone()),
            None => DispatchDecision::Fail(FailReason::NoSuchMethod),
        })
    }

    fn call_through(
        &self,
        site: &CallSite,
        original: Option<MethodHandle>,
    ) -> Result<DispatchDecision> {
        let Some(target) = original else {
            return Ok(DispatchDecision::Fail(FailReason::NoSuchMethod));
        };

        if site.is_static {
            return Ok(Self::direct(target));
        }

        if self.universe.require(&site.runtime_type)?.is_final() {
            return Ok(DispatchDecision::Fail(FailReason::NotProxiable));
        }

        let proxy = self.proxy_for(&site.runtime_type)?;
        if proxy.exposes(&target) {
            Ok(DispatchDecision::CallThrough {
                target,
                proxied: true,
            })
        } else {
            Ok(DispatchDecision::Fail(FailReason::NotProxiable))
        }
    }

    fn pass_through(&self, site: &CallSite) -> Result<DispatchDecision> {
        Ok(match self.resolve_original(site)? {
            Some(target) => Self::direct(target),
            None => DispatchDecision::Fail(FailReason::NoSuchMethod),
        })
    }

    fn direct(target: MethodHandle) -> DispatchDecision {
        if target.method().implementation().is_some() {
            DispatchDecision::CallThrough {
                target,
                proxied: false,
            }
        } else {
            DispatchDecision::Fail(FailReason::NoImplementation)
        }
    }

    fn resolve_original(&self, site: &CallSite) -> Result<Option<MethodHandle>> {
        let groups = original_groups(&self.universe, &site.runtime_type);
        Selector {
            hierarchy: self.universe.as_ref(),
            api_level: self.api_level,
            is_static: site.is_static,
            loose: true,
        }
        .select(&groups, &site.method, &site.runtime_type)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("api_level", &self.api_level)
            .field("registry_entries", &self.registry.read().len())
            .field("decisions", &self.decisions.len())
            .field("proxies", &self.proxies.len())
            .finish()
    }
}
