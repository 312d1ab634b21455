//! Keyed reuse of sandboxes.
//!
//! Building a sandbox loads a namespace template for the whole type universe, so sandboxes are
//! pooled under their [`SandboxKey`] and handed out as exclusive [`SandboxLease`]s.
//!
//! # Concurrency
//!
//! At most one sandbox exists per key. A caller that asks for a key while its sandbox is
//! being built or is leased waits on a condition variable until the lease is returned; two
//! concurrent requests for the same key therefore never build twice. Requests for different
//! keys proceed in parallel, and builds run without holding the pool lock.
//!
//! # Eviction
//!
//! When the number of pooled sandboxes exceeds [`PoolConfig::max_sandboxes`], idle sandboxes
//! are destroyed in least-recently-used order. Leased or building sandboxes are never evicted,
//! so the pool can exceed its bound while they are in use.

use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::{
    sandbox::{Sandbox, SandboxKey},
    Result,
};

/// Pool sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on pooled sandboxes before idle ones are evicted
    pub max_sandboxes: usize,
}

impl PoolConfig {
    /// Creates a configuration with the given bound.
    #[must_use]
    pub fn new(max_sandboxes: usize) -> Self {
        Self { max_sandboxes }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_sandboxes: 8 }
    }
}

/// Pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Sandboxes built
    pub built: u64,
    /// Leases served by an idle sandbox
    pub reused: u64,
    /// Idle sandboxes destroyed to stay within the bound
    pub evicted: u64,
    /// Sandboxes dropped because they were poisoned or destroyed
    pub discarded: u64,
    /// Times a caller waited for a key in use
    pub waits: u64,
}

enum Slot {
    Building,
    Leased,
    Idle { sandbox: Box<Sandbox>, last_used: u64 },
}

enum Action {
    Build,
    Reuse,
    Wait,
}

#[derive(Default)]
struct PoolState {
    slots: HashMap<SandboxKey, Slot>,
    tick: u64,
    stats: PoolStats,
}

/// Keyed pool of sandboxes.
///
/// # Examples
///
/// ```rust,ignore
/// let pool = SandboxPool::new(PoolConfig::new(4));
/// let mut lease = pool.acquire(&key, || Sandbox::build(key.clone(), universe, reporter))?;
/// lease.install_registry(registry)?;
/// lease.execute(|ctx| ctx.call_static("com.example.Clock", "currentTimeMillis", &[]))?;
/// drop(lease); // back to the pool
/// ```
pub struct SandboxPool {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl SandboxPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState::default()),
            available: Condvar::new(),
        }
    }

    /// Returns the pool configuration.
    #[must_use]
    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Leases the sandbox for `key`, building it with `build` if none exists.
    ///
    /// Blocks while the sandbox for `key` is leased or being built by another caller.
    ///
    /// # Errors
    ///
    /// Returns whatever `build` returns. A failed build leaves no trace in the pool.
    pub fn acquire<F>(&self, key: &SandboxKey, build: F) -> Result<SandboxLease<'_>>
    where
        F: FnOnce() -> Result<Sandbox>,
    {
        {
            let mut state = self.state.lock();
            loop {
                let action = match state.slots.get(key) {
                    None => Action::Build,
                    Some(Slot::Idle { .. }) => Action::Reuse,
                    Some(Slot::Building | Slot::Leased) => Action::Wait,
                };

                match action {
                    Action::Build => {
                        state.slots.insert(key.clone(), Slot::Building);
                        break;
                    }
                    Action::Reuse => {
                        if let Some(Slot::Idle { sandbox, .. }) =
                            state.slots.insert(key.clone(), Slot::Leased)
                        {
                            state.stats.reused += 1;
                            trace!(sandbox = sandbox.id(), key = %key, "reusing pooled sandbox");
                            return Ok(SandboxLease::new(self, key.clone(), sandbox));
                        }
                    }
                    Action::Wait => {
                        state.stats.waits += 1;
                        self.available.wait(&mut state);
                    }
                }
            }
        }

        let mut guard = BuildGuard {
            pool: self,
            key,
            armed: true,
        };
        let sandbox = build()?;
        guard.armed = false;

        let mut state = self.state.lock();
        state.slots.insert(key.clone(), Slot::Leased);
        state.stats.built += 1;
        debug!(sandbox = sandbox.id(), key = %key, "built sandbox");
        self.evict(&mut state);
        Ok(SandboxLease::new(self, key.clone(), Box::new(sandbox)))
    }

    /// Returns the number of pooled sandboxes, leased or idle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Returns `true` if the pool holds no sandbox.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().slots.is_empty()
    }

    /// Returns the number of idle sandboxes.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.state
            .lock()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Idle { .. }))
            .count()
    }

    /// Returns `true` if a sandbox for `key` is pooled.
    #[must_use]
    pub fn contains(&self, key: &SandboxKey) -> bool {
        self.state.lock().slots.contains_key(key)
    }

    /// Returns the pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.state.lock().stats
    }

    /// Destroys every idle sandbox. Leased sandboxes are unaffected.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.slots.retain(|_, slot| match slot {
            Slot::Idle { sandbox, .. } => {
                sandbox.destroy();
                false
            }
            _ => true,
        });
    }

    fn release(&self, key: &SandboxKey, mut sandbox: Box<Sandbox>) {
        // A lease dropped without a task may still have touched the namespace.
        if sandbox.state().accepts_registry() && !sandbox.namespace().is_pristine() {
            debug!(sandbox = sandbox.id(), "resetting sandbox released in a modified state");
            if let Err(e) = sandbox.reset() {
                debug!(sandbox = sandbox.id(), error = %e, "reset on release failed");
            }
        }

        let mut state = self.state.lock();
        if sandbox.is_poisoned() || !sandbox.state().accepts_registry() {
            sandbox.destroy();
            state.slots.remove(key);
            state.stats.discarded += 1;
            debug!(
                sandbox = sandbox.id(),
                poisoned = sandbox.is_poisoned(),
                "discarded sandbox"
            );
        } else {
            state.tick += 1;
            let last_used = state.tick;
            state
                .slots
                .insert(key.clone(), Slot::Idle { sandbox, last_used });
            self.evict(&mut state);
        }
        drop(state);
        self.available.notify_all();
    }

    fn abandon(&self, key: &SandboxKey) {
        self.state.lock().slots.remove(key);
        self.available.notify_all();
    }

    fn evict(&self, state: &mut PoolState) {
        while state.slots.len() > self.config.max_sandboxes {
            let oldest = state
                .slots
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Idle { last_used, .. } => Some((*last_used, key)),
                    _ => None,
                })
                .min_by_key(|(last_used, _)| *last_used)
                .map(|(_, key)| key.clone());

            let Some(key) = oldest else {
                break;
            };
            if let Some(Slot::Idle { mut sandbox, .. }) = state.slots.remove(&key) {
                sandbox.destroy();
                state.stats.evicted += 1;
                debug!(sandbox = sandbox.id(), key = %key, "evicted idle sandbox");
            }
        }
    }
}

impl std::fmt::Debug for SandboxPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SandboxPool")
            .field("config", &self.config)
            .field("sandboxes", &state.slots.len())
            .field("stats", &state.stats)
            .finish()
    }
}

struct BuildGuard<'p> {
    pool: &'p SandboxPool,
    key: &'p SandboxKey,
    armed: bool,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.abandon(self.key);
        }
    }
}

/// Exclusive use of a pooled sandbox. Returned to the pool on drop.
///
/// A sandbox that is poisoned or destroyed when the lease drops is discarded instead of
/// pooled. One returned with a modified namespace is reset first, and discarded if the reset
/// reports a leak.
pub struct SandboxLease<'p> {
    pool: &'p SandboxPool,
    key: SandboxKey,
    // Always `Some` until `drop` hands the sandbox back.
    sandbox: Option<Box<Sandbox>>,
}

impl<'p> SandboxLease<'p> {
    fn new(pool: &'p SandboxPool, key: SandboxKey, sandbox: Box<Sandbox>) -> Self {
        Self {
            pool,
            key,
            sandbox: Some(sandbox),
        }
    }

    /// Returns the key the sandbox is pooled under.
    #[must_use]
    pub fn key(&self) -> &SandboxKey {
        &self.key
    }
}

impl Deref for SandboxLease<'_> {
    type Target = Sandbox;

    fn deref(&self) -> &Sandbox {
        match &self.sandbox {
            Some(sandbox) => &**sandbox,
            None => unreachable!("sandbox lease used after release"),
        }
    }
}

impl DerefMut for SandboxLease<'_> {
    fn deref_mut(&mut self) -> &mut Sandbox {
        match &mut self.sandbox {
            Some(sandbox) => &mut **sandbox,
            None => unreachable!("sandbox lease used after release"),
        }
    }
}

impl Drop for SandboxLease<'_> {
    fn drop(&mut self) {
        if let Some(sandbox) = self.sandbox.take() {
            self.pool.release(&self.key, sandbox);
        }
    }
}

impl std::fmt::Debug for SandboxLease<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxLease")
            .field("key", &self.key)
            .field("sandbox", &self.sandbox)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use super::*;
    use crate::{
        metrics::NoopReporter,
        sandbox::SandboxState,
        shadow::ShadowRegistry,
        test::{widget_key, widget_universe},
        value::Value,
        Error,
    };

    fn builder(key: &SandboxKey) -> impl FnOnce() -> Result<Sandbox> + '_ {
        move || Sandbox::build(key.clone(), Arc::new(widget_universe()), Arc::new(NoopReporter))
    }

    #[test]
    fn test_reuse_after_release() {
        let pool = SandboxPool::new(PoolConfig::default());
        let key = widget_key(30);

        let first = {
            let mut lease = pool.acquire(&key, builder(&key)).unwrap();
            lease.execute(|_| Ok(())).unwrap();
            lease.id()
        };
        assert_eq!(pool.idle(), 1);

        let lease = pool.acquire(&key, builder(&key)).unwrap();
        assert_eq!(lease.id(), first);
        assert_eq!(lease.state(), SandboxState::Idle);
        assert_eq!(pool.stats().built, 1);
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn test_release_without_task_restores_initial_state() {
        let pool = SandboxPool::new(PoolConfig::default());
        let key = widget_key(30);

        let first = {
            let lease = pool.acquire(&key, builder(&key)).unwrap();
            lease
                .namespace()
                .set_static("com.example.Clock", "now", Value::I64(77));
            lease.id()
        };

        let mut lease = pool.acquire(&key, builder(&key)).unwrap();
        assert_eq!(lease.id(), first);
        assert!(lease.namespace().is_pristine());
        let now = lease
            .execute(|ctx| ctx.get_static("com.example.Clock", "now"))
            .unwrap();
        assert_eq!(now, Value::I64(1_000));
    }

    #[test]
    fn test_distinct_keys_get_distinct_sandboxes() {
        let pool = SandboxPool::new(PoolConfig::default());
        let (a, b) = (widget_key(28), widget_key(30));

        let lease_a = pool.acquire(&a, builder(&a)).unwrap();
        let lease_b = pool.acquire(&b, builder(&b)).unwrap();
        assert_ne!(lease_a.id(), lease_b.id());
        assert_eq!(lease_b.api_level(), 30);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_failed_build_leaves_no_slot() {
        let pool = SandboxPool::new(PoolConfig::default());
        let key = widget_key(30);

        let result = pool.acquire(&key, || Err(Error::TypeNotFound("x".to_string())));
        assert!(result.is_err());
        assert!(!pool.contains(&key));

        assert!(pool.acquire(&key, builder(&key)).is_ok());
    }

    #[test]
    fn test_poisoned_sandbox_is_discarded() {
        let pool = SandboxPool::new(PoolConfig::default());
        let key = widget_key(30);
        let broken = Arc::new(
            crate::shadow::ShadowType::new("test.BrokenClock", "com.example.Clock")
                .resetter(|_| Err(Error::invocation("test.BrokenClock", "reset", "refused"))),
        );
        let registry = Arc::new(
            ShadowRegistry::builder()
                .add_shadow(&broken)
                .build(&widget_universe())
                .unwrap(),
        );

        {
            let mut lease = pool.acquire(&key, builder(&key)).unwrap();
            lease.install_registry(registry).unwrap();
            assert!(lease.execute(|_| Ok(())).is_err());
        }
        assert!(pool.is_empty());
        assert_eq!(pool.stats().discarded, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let pool = SandboxPool::new(PoolConfig::new(2));
        let keys = [widget_key(21), widget_key(28), widget_key(30)];

        for key in &keys {
            let mut lease = pool.acquire(key, builder(key)).unwrap();
            lease.execute(|_| Ok(())).unwrap();
        }

        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(&keys[0]), "least recently used is evicted");
        assert!(pool.contains(&keys[1]));
        assert!(pool.contains(&keys[2]));
        assert_eq!(pool.stats().evicted, 1);
    }

    #[test]
    fn test_leased_sandboxes_are_not_evicted() {
        let pool = SandboxPool::new(PoolConfig::new(1));
        let (a, b) = (widget_key(28), widget_key(30));

        let lease_a = pool.acquire(&a, builder(&a)).unwrap();
        let lease_b = pool.acquire(&b, builder(&b)).unwrap();
        assert_eq!(pool.len(), 2);
        drop(lease_a);
        drop(lease_b);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_concurrent_acquire_builds_once() {
        let pool = Arc::new(SandboxPool::new(PoolConfig::default()));
        let key = widget_key(30);
        let builds = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let key = key.clone();
                let builds = Arc::clone(&builds);
                thread::spawn(move || {
                    let mut lease = pool
                        .acquire(&key, || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(10));
                            Sandbox::build(
                                key.clone(),
                                Arc::new(widget_universe()),
                                Arc::new(NoopReporter),
                            )
                        })
                        .unwrap();
                    if lease.state() == SandboxState::Idle {
                        lease
                            .install_registry(Arc::new(ShadowRegistry::empty()))
                            .unwrap();
                    }
                    lease.execute(|_| Ok(())).unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(pool.len(), 1);
    }
}
