//! The sandbox and its lifecycle.

use std::{
    any::Any,
    collections::BTreeSet,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tracing::{debug, warn};

use crate::{
    dispatch::Dispatcher,
    instrumentation::InstrumentationConfiguration,
    metrics::{measure, PerfEventKind, PerfReporter},
    sandbox::{ExecutionContext, LeakCheck, Namespace, PristineNamespaceCheck, SandboxState},
    shadow::ShadowRegistry,
    types::{ApiLevel, TypeUniverse},
    Error, Result,
};

static NEXT_SANDBOX_ID: AtomicU64 = AtomicU64::new(1);

/// What makes two sandboxes interchangeable: the instrumentation rules and the API level.
///
/// Shadow bindings are deliberately not part of the key; they are swapped per test.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SandboxKey {
    /// Which types are intercepted
    pub instrumentation: InstrumentationConfiguration,
    /// The API level
    pub api_level: ApiLevel,
}

impl SandboxKey {
    /// Creates a key.
    #[must_use]
    pub fn new(instrumentation: InstrumentationConfiguration, api_level: ApiLevel) -> Self {
        Self {
            instrumentation,
            api_level,
        }
    }
}

impl fmt::Display for SandboxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "api {} / {} shadowed types",
            self.api_level,
            self.instrumentation.shadow_type_ids().count()
        )
    }
}

/// An isolated execution environment.
///
/// A sandbox owns a [`Namespace`] (statics, shadow state and heap) and a [`Dispatcher`]
/// bound to its own registry. Tasks run through [`execute`](Self::execute), which resets the
/// namespace afterwards, so a sandbox can be reused for the next test with the same
/// [`SandboxKey`].
///
/// # Lifecycle
///
/// | From | Operation | To |
/// |------|-----------|----|
/// | `Uninitialized` | [`configure`](Self::configure) | `Configured` |
/// | `Configured`, `Idle` | [`install_registry`](Self::install_registry) | `Configured` |
/// | `Configured` | [`execute`](Self::execute) | `Active`, then `Idle` |
/// | `Configured`, `Idle` | [`reset`](Self::reset) | unchanged |
/// | any | [`destroy`](Self::destroy) | `Destroyed` |
///
/// Any other transition fails with [`Error::InvalidState`]. An isolation leak poisons the
/// sandbox and destroys it; every later operation fails with [`Error::SandboxPoisoned`].
///
/// # Examples
///
/// ```rust,ignore
/// let mut sandbox = Sandbox::build(key, universe, Arc::new(NoopReporter))?;
/// sandbox.install_registry(Arc::new(registry))?;
/// let size = sandbox.execute(|ctx| {
///     let widget = ctx.new_object("com.example.Widget")?;
///     ctx.call(widget, "size", &[])
/// })?;
/// ```
pub struct Sandbox {
    id: u64,
    key: SandboxKey,
    state: SandboxState,
    universe: Arc<TypeUniverse>,
    dispatcher: Dispatcher,
    namespace: Namespace,
    reporter: Arc<dyn PerfReporter>,
    leak_checks: Vec<Arc<dyn LeakCheck>>,
    detect_leaks: bool,
    poisoned: bool,
    runs: u64,
}

impl Sandbox {
    /// Creates an uninitialized sandbox.
    ///
    /// # Arguments
    ///
    /// * `key` - Instrumentation rules and API level
    /// * `universe` - The intercepted types
    /// * `reporter` - Sink for lifecycle timings
    #[must_use]
    pub fn new(key: SandboxKey, universe: Arc<TypeUniverse>, reporter: Arc<dyn PerfReporter>) -> Self {
        let id = NEXT_SANDBOX_ID.fetch_add(1, Ordering::Relaxed);
        let dispatcher = Dispatcher::new(
            Arc::clone(&universe),
            Arc::new(key.instrumentation.clone()),
            key.api_level,
            Arc::clone(&reporter),
        );

        Self {
            id,
            key,
            state: SandboxState::Uninitialized,
            universe,
            dispatcher,
            namespace: Namespace::new(),
            reporter,
            leak_checks: vec![Arc::new(PristineNamespaceCheck)],
            detect_leaks: true,
            poisoned: false,
            runs: 0,
        }
    }

    /// Creates and configures a sandbox in one step.
    ///
    /// # Errors
    ///
    /// As [`configure`](Self::configure).
    pub fn build(
        key: SandboxKey,
        universe: Arc<TypeUniverse>,
        reporter: Arc<dyn PerfReporter>,
    ) -> Result<Self> {
        let mut sandbox = Self::new(key, universe, reporter);
        sandbox.configure()?;
        Ok(sandbox)
    }

    /// Enables or disables post-reset leak checks. Enabled by default.
    #[must_use]
    pub fn with_leak_detection(mut self, enabled: bool) -> Self {
        self.detect_leaks = enabled;
        self
    }

    /// Adds a leak check that runs after every reset.
    #[must_use]
    pub fn with_leak_check(mut self, check: Arc<dyn LeakCheck>) -> Self {
        self.leak_checks.push(check);
        self
    }

    /// Loads the namespace template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the sandbox is `Uninitialized`.
    pub fn configure(&mut self) -> Result<()> {
        self.ensure_usable("configure")?;
        if self.state != SandboxState::Uninitialized {
            return Err(self.invalid("configure"));
        }

        let universe = Arc::clone(&self.universe);
        let namespace = &mut self.namespace;
        let loaded = measure(
            self.reporter.as_ref(),
            PerfEventKind::SandboxBuild,
            self.id,
            || namespace.load(&universe),
        );

        self.state = SandboxState::Configured;
        debug!(sandbox = self.id, api_level = self.key.api_level, loaded, "configured sandbox");
        Ok(())
    }

    /// Installs a shadow registry, replacing the previous one.
    ///
    /// Returns the invalidated set; only dispatch decisions that depended on those types are
    /// purged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SandboxPoisoned`] for poisoned sandboxes and [`Error::InvalidState`]
    /// unless the sandbox is `Configured` or `Idle`.
    pub fn install_registry(&mut self, registry: Arc<ShadowRegistry>) -> Result<BTreeSet<String>> {
        self.ensure_usable("install_registry")?;
        if !self.state.accepts_registry() {
            return Err(self.invalid("install_registry"));
        }

        let dispatcher = &self.dispatcher;
        let invalidated = measure(
            self.reporter.as_ref(),
            PerfEventKind::RegistrySwap,
            self.id,
            || dispatcher.install(registry),
        );

        self.state = SandboxState::Configured;
        debug!(
            sandbox = self.id,
            invalidated = invalidated.len(),
            "swapped shadow registry"
        );
        Ok(invalidated)
    }

    /// Runs a task in the sandbox and resets the sandbox afterwards.
    ///
    /// The reset happens whether the task succeeds, fails or panics. A panic is reported as
    /// [`Error::TaskPanicked`]. If the reset detects a leak the sandbox is poisoned and
    /// destroyed; the task's own error, if any, is still the one returned.
    ///
    /// # Errors
    ///
    /// Returns the task's error, [`Error::TaskPanicked`], [`Error::IsolationLeak`],
    /// [`Error::SandboxPoisoned`], or [`Error::InvalidState`] unless the sandbox is
    /// `Configured`.
    pub fn execute<T, F>(&mut self, task: F) -> Result<T>
    where
        F: FnOnce(&ExecutionContext<'_>) -> Result<T>,
    {
        self.ensure_usable("execute")?;
        if !self.state.accepts_task() {
            return Err(self.invalid("execute"));
        }

        self.state = SandboxState::Active;
        self.runs += 1;
        debug!(sandbox = self.id, run = self.runs, "executing task");

        let outcome = {
            let ctx = self.context();
            panic::catch_unwind(AssertUnwindSafe(|| task(&ctx)))
                .unwrap_or_else(|payload| Err(Error::TaskPanicked(panic_message(payload.as_ref()))))
        };

        match self.reset_namespace() {
            Ok(()) => {
                self.state = SandboxState::Idle;
                outcome
            }
            Err(leak) => {
                self.poison(&leak);
                outcome.and(Err(leak))
            }
        }
    }

    /// Resets the sandbox outside of [`execute`](Self::execute).
    ///
    /// Runs the resetters of every installed shadow, restores the namespace template and
    /// runs the leak checks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IsolationLeak`] (and poisons the sandbox) if a resetter fails or a
    /// leak check reports a leak; [`Error::InvalidState`] unless `Configured` or `Idle`.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_usable("reset")?;
        if !self.state.accepts_registry() {
            return Err(self.invalid("reset"));
        }

        let result = self.reset_namespace();
        if let Err(leak) = &result {
            self.poison(leak);
        }
        result
    }

    /// Releases every resource held by the sandbox. Idempotent.
    pub fn destroy(&mut self) {
        if self.state == SandboxState::Destroyed {
            return;
        }

        self.dispatcher.clear();
        self.namespace.clear();
        self.state = SandboxState::Destroyed;
        debug!(sandbox = self.id, runs = self.runs, "destroyed sandbox");
    }

    /// Returns the sandbox id, unique within the process.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the pool key.
    #[must_use]
    pub fn key(&self) -> &SandboxKey {
        &self.key
    }

    /// Returns the API level.
    #[must_use]
    pub fn api_level(&self) -> ApiLevel {
        self.key.api_level
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> SandboxState {
        self.state
    }

    /// Returns `true` if a leak poisoned the sandbox.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Returns the number of tasks executed.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Returns the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Returns the installed registry.
    #[must_use]
    pub fn registry(&self) -> Arc<ShadowRegistry> {
        self.dispatcher.registry()
    }

    pub(crate) fn context(&self) -> ExecutionContext<'_> {
        ExecutionContext::new(self.id, &self.dispatcher, &self.namespace)
    }

    fn reset_namespace(&self) -> Result<()> {
        let failures = measure(self.reporter.as_ref(), PerfEventKind::SandboxReset, self.id, || {
            let mut failures = Vec::new();

            let registry = self.dispatcher.registry();
            {
                let ctx = self.context();
                for shadow in registry.shadows() {
                    let Some(resetter) = shadow.reset_hook() else {
                        continue;
                    };
                    if let Err(e) = resetter(&ctx) {
                        failures.push(format!("resetter of {} failed: {}", shadow.id(), e));
                    }
                }
            }

            self.namespace.reset();

            if self.detect_leaks {
                for check in &self.leak_checks {
                    if let Some(details) = check.check(&self.namespace) {
                        failures.push(format!("{}: {}", check.name(), details));
                    }
                }
            }
            failures
        });

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::IsolationLeak {
                sandbox: self.id,
                details: failures.join("; "),
            })
        }
    }

    fn poison(&mut self, cause: &Error) {
        warn!(sandbox = self.id, error = %cause, "poisoning sandbox");
        self.poisoned = true;
        self.destroy();
    }

    fn ensure_usable(&self, operation: &'static str) -> Result<()> {
        if self.poisoned {
            return Err(Error::SandboxPoisoned(self.id));
        }
        if self.state == SandboxState::Destroyed {
            return Err(self.invalid(operation));
        }
        Ok(())
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            state: self.state,
            operation,
        }
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.id)
            .field("api_level", &self.key.api_level)
            .field("state", &self.state)
            .field("poisoned", &self.poisoned)
            .field("runs", &self.runs)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
