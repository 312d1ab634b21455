//! Running tests across API levels.

use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    harness::HarnessConfig,
    instrumentation::{InstrumentationConfiguration, ShadowKey, TestConfig},
    metrics::{measure, NoopReporter, PerfEventKind, PerfReporter},
    sandbox::{ExecutionContext, LeakCheck, Sandbox, SandboxKey, SandboxLease, SandboxPool},
    shadow::{ShadowProvider, ShadowRegistry},
    types::{ApiLevel, TypeUniverse},
    Result,
};

/// The result of running a test at one API level.
#[derive(Debug)]
pub struct TestOutcome<T> {
    /// The level the run executed at
    pub api_level: ApiLevel,
    /// The sandbox the run executed in, `None` if no sandbox could be leased
    pub sandbox_id: Option<u64>,
    /// What the task returned, or why the run failed
    pub result: Result<T>,
}

impl<T> TestOutcome<T> {
    /// Returns `true` if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Drives tests through pooled sandboxes.
///
/// For every selected API level the harness computes the instrumentation rules of the test,
/// gets or builds the registry for its shadows, leases the sandbox for that key, installs the
/// registry, executes the task and returns the sandbox to the pool. Each level produces its
/// own [`TestOutcome`]; a failure at one level never affects another.
///
/// Registries are cached by the ordered local shadows of a test, compared by instance, so tests
/// that declare the same shadows share one registry. Sandboxes are shared by tests whose instrumentation
/// rules coincide; swapping the registry only purges the dispatch decisions that depended on
/// the changed bindings.
///
/// # Examples
///
/// ```rust,ignore
/// let harness = Harness::new(universe, HarnessConfig::default())?
///     .with_provider(Arc::new(framework_shadows));
///
/// let test = TestConfig::new()
///     .with_shadow(&shadow_clock)
///     .with_api(ApiSelector::All);
/// for outcome in harness.run(&test, |ctx| ctx.call_static("app.Clock", "now", &[]))? {
///     println!("api {}: {:?}", outcome.api_level, outcome.result);
/// }
/// ```
pub struct Harness {
    universe: Arc<TypeUniverse>,
    config: HarnessConfig,
    providers: Vec<Arc<dyn ShadowProvider>>,
    pool: SandboxPool,
    registries: DashMap<ShadowKey, Arc<ShadowRegistry>>,
    reporter: Arc<dyn PerfReporter>,
    leak_checks: Vec<Arc<dyn LeakCheck>>,
}

impl Harness {
    /// Creates a harness without providers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](crate::Error::Configuration) if `config` does not
    /// validate.
    pub fn new(universe: Arc<TypeUniverse>, config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            universe,
            pool: SandboxPool::new(config.pool),
            config,
            providers: Vec::new(),
            registries: DashMap::new(),
            reporter: Arc::new(NoopReporter),
            leak_checks: Vec::new(),
        })
    }

    /// Adds a shadow provider.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn ShadowProvider>) -> Self {
        self.providers.push(provider);
        self.registries.clear();
        self
    }

    /// Sets the perf reporter handed to every sandbox.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn PerfReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Adds a leak check installed in every sandbox the harness builds.
    #[must_use]
    pub fn with_leak_check(mut self, check: Arc<dyn LeakCheck>) -> Self {
        self.leak_checks.push(check);
        self
    }

    /// Returns the harness configuration.
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Returns the type universe.
    #[must_use]
    pub fn universe(&self) -> &Arc<TypeUniverse> {
        &self.universe
    }

    /// Returns the sandbox pool.
    #[must_use]
    pub fn pool(&self) -> &SandboxPool {
        &self.pool
    }

    /// Returns the number of cached registries.
    #[must_use]
    pub fn cached_registries(&self) -> usize {
        self.registries.len()
    }

    /// Runs `task` once per API level selected by `test`.
    ///
    /// # Errors
    ///
    /// Fails as a whole only if the API selection or the registry is invalid; every other
    /// failure is reported in the outcome of the level it occurred at.
    pub fn run<T, F>(&self, test: &TestConfig, task: F) -> Result<Vec<TestOutcome<T>>>
    where
        F: Fn(&ExecutionContext<'_>) -> Result<T>,
    {
        let levels = test
            .api()
            .select(&self.config.supported_api_levels, self.config.default_api_level)?;
        let registry = self.registry_for(test)?;
        let instrumentation = self.instrumentation_for(test);

        Ok(levels
            .into_iter()
            .map(|level| {
                let key = SandboxKey::new(instrumentation.clone(), level);
                self.run_at(&key, &registry, &task)
            })
            .collect())
    }

    /// Builds sandboxes for `levels` in parallel so later runs find them pooled.
    ///
    /// Sandboxes are built with the base instrumentation rules, the ones a test without local
    /// shadows or overrides uses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](crate::Error::Configuration) for unsupported levels and
    /// the first build failure otherwise.
    pub fn prewarm(&self, levels: &[ApiLevel]) -> Result<usize> {
        if let Some(level) = levels
            .iter()
            .find(|level| !self.config.supported_api_levels.contains(level))
        {
            return Err(config_error!("Can not prewarm unsupported API level {}", level));
        }

        let instrumentation = self.instrumentation_for(&TestConfig::new());
        levels.par_iter().try_for_each(|&level| {
            let key = SandboxKey::new(instrumentation.clone(), level);
            self.lease(&key).map(drop)
        })?;

        debug!(levels = levels.len(), pooled = self.pool.len(), "prewarmed sandboxes");
        Ok(levels.len())
    }

    /// Computes the instrumentation rules a test runs under.
    ///
    /// The base rules are extended with every provider binding, the test's extra inclusions
    /// and exclusions, and the real types of its local shadows when the rules would not
    /// intercept them anyway. Local shadows are not bound in the result, so tests that only
    /// differ in which intercepted types they shadow share sandboxes.
    #[must_use]
    pub fn instrumentation_for(&self, test: &TestConfig) -> InstrumentationConfiguration {
        let mut builder = self.config.instrumentation.to_builder();
        for provider in &self.providers {
            for config in provider.configs() {
                builder = builder.bind_shadow(config.shadow_type_id(), config.real_type_id());
            }
        }
        for type_id in test.included_types() {
            builder = builder.include_type(type_id.as_str());
        }
        for package in test.excluded_packages() {
            builder = builder.exclude_package(package);
        }

        let base = builder.clone().build();
        for shadow in test.shadows() {
            if !base.should_instrument(shadow.implements()) {
                builder = builder.include_type(shadow.implements());
            }
        }
        builder.build()
    }

    /// Returns the registry for a test's local shadows, building and caching it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](crate::Error::Configuration) if the combined
    /// configurations are invalid.
    pub fn registry_for(&self, test: &TestConfig) -> Result<Arc<ShadowRegistry>> {
        let key = test.shadow_key();
        if let Some(registry) = self.registries.get(&key) {
            return Ok(Arc::clone(registry.value()));
        }

        let registry = measure(
            self.reporter.as_ref(),
            PerfEventKind::RegistryBuild,
            &key,
            || {
                let mut builder = ShadowRegistry::builder();
                for provider in &self.providers {
                    builder.add_provider(provider.as_ref());
                }
                for shadow in test.shadows() {
                    builder.add_shadow(shadow);
                }
                builder.build(&self.universe)
            },
        )?;

        let entry = self.registries.entry(key).or_insert(Arc::new(registry));
        Ok(Arc::clone(entry.value()))
    }

    fn run_at<T, F>(&self, key: &SandboxKey, registry: &Arc<ShadowRegistry>, task: &F) -> TestOutcome<T>
    where
        F: Fn(&ExecutionContext<'_>) -> Result<T>,
    {
        let mut sandbox_id = None;
        let result = self.lease(key).and_then(|mut lease| {
            sandbox_id = Some(lease.id());
            lease.install_registry(Arc::clone(registry))?;
            lease.execute(|ctx| task(ctx))
        });

        if let Err(e) = &result {
            if e.poisons_sandbox() {
                warn!(api_level = key.api_level, sandbox = ?sandbox_id, error = %e, "test run poisoned its sandbox");
            }
        }

        TestOutcome {
            api_level: key.api_level,
            sandbox_id,
            result,
        }
    }

    fn lease(&self, key: &SandboxKey) -> Result<SandboxLease<'_>> {
        self.pool.acquire(key, || {
            let sandbox = Sandbox::new(
                key.clone(),
                Arc::clone(&self.universe),
                Arc::clone(&self.reporter),
            )
            .with_leak_detection(self.config.detect_leaks);

            let mut sandbox = self
                .leak_checks
                .iter()
                .fold(sandbox, |sandbox, check| sandbox.with_leak_check(Arc::clone(check)));
            sandbox.configure()?;
            Ok(sandbox)
        })
    }
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("types", &self.universe.len())
            .field("providers", &self.providers.len())
            .field("registries", &self.registries.len())
            .field("pool", &self.pool)
            .finish()
    }
}
