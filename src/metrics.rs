//! Timed performance events.
//!
//! The engine emits a [`PerfEvent`] for every expensive operation to an injected
//! [`PerfReporter`]. The engine has no opinion on format or transport; [`NoopReporter`]
//! discards events and [`RecordingReporter`] keeps them in memory.
//!
//! | Event | Emitted when |
//! |-------|--------------|
//! | `sandbox-build` | A sandbox loads its namespace template |
//! | `registry-swap` | A registry is installed into a sandbox |
//! | `sandbox-reset` | A sandbox is reset after a task |
//! | `registry-build` | A harness builds a registry for a test configuration |
//! | `proxy-synthesis` | A dispatcher synthesizes a call-through bridge |

use std::{
    fmt,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use strum::{Display, EnumIter, IntoStaticStr};

/// Kind of a timed event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum PerfEventKind {
    /// Sandbox construction
    SandboxBuild,
    /// Registry installation
    RegistrySwap,
    /// Sandbox reset
    SandboxReset,
    /// Registry construction
    RegistryBuild,
    /// Proxy bridge synthesis
    ProxySynthesis,
}

/// One timed event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PerfEvent {
    /// What was timed
    pub kind: PerfEventKind,
    /// What it was timed for (sandbox id, type id, ...)
    pub subject: String,
    /// Wall-clock duration
    pub duration: Duration,
}

impl PerfEvent {
    /// Returns the event name, e.g. `sandbox-build`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind.into()
    }
}

impl fmt::Display for PerfEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {:?}", self.kind, self.subject, self.duration)
    }
}

/// Sink for timed events.
pub trait PerfReporter: Send + Sync {
    /// Records one event.
    fn record(&self, event: &PerfEvent);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopReporter;

impl PerfReporter for NoopReporter {
    fn record(&self, _event: &PerfEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<PerfEvent>>,
}

impl RecordingReporter {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<PerfEvent> {
        self.events.lock().clone()
    }

    /// Returns the number of recorded events of `kind`.
    #[must_use]
    pub fn count(&self, kind: PerfEventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    /// Returns the total time recorded for `kind`.
    #[must_use]
    pub fn total(&self, kind: PerfEventKind) -> Duration {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.duration)
            .sum()
    }

    /// Drops every recorded event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl PerfReporter for RecordingReporter {
    fn record(&self, event: &PerfEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Times `f` and reports the duration, whether or not `f` succeeds.
///
/// # Arguments
///
/// * `reporter` - Where the event goes
/// * `kind` - The event kind
/// * `subject` - What the event is about
/// * `f` - The operation to time
pub fn measure<T>(
    reporter: &dyn PerfReporter,
    kind: PerfEventKind,
    subject: impl fmt::Display,
    f: impl FnOnce() -> T,
) -> T {
    let start = Instant::now();
    let result = f();
    reporter.record(&PerfEvent {
        kind,
        subject: subject.to_string(),
        duration: start.elapsed(),
    });
    result
}
