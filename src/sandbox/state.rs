use strum::Display;

/// Lifecycle state of a [`Sandbox`](crate::Sandbox).
///
/// ```text
/// Uninitialized -> Configured -> Active -> Idle -> Configured -> ...
///        \              \          \        \
///         +--------------+----------+--------+--> Destroyed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum SandboxState {
    /// Created, namespace not loaded yet
    Uninitialized,
    /// Namespace loaded and a registry installed; ready to execute
    Configured,
    /// Executing a task
    Active,
    /// Task finished and state reset; eligible for reuse
    Idle,
    /// Resources released; terminal
    Destroyed,
}

impl SandboxState {
    /// Returns `true` if a registry may be installed in this state.
    #[must_use]
    pub fn accepts_registry(self) -> bool {
        matches!(self, SandboxState::Configured | SandboxState::Idle)
    }

    /// Returns `true` if a task may be executed in this state.
    #[must_use]
    pub fn accepts_task(self) -> bool {
        self == SandboxState::Configured
    }
}
