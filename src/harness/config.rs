//! Harness-wide settings.

use crate::{
    instrumentation::InstrumentationConfiguration, sandbox::PoolConfig, types::ApiLevel, Result,
};

/// API levels a default harness supports.
pub const DEFAULT_API_LEVELS: &[ApiLevel] = &[21, 23, 26, 28, 29, 30, 31, 33, 34];

/// Configuration shared by every test a [`Harness`](crate::Harness) runs.
///
/// # Default Settings
///
/// - **Supported levels**: [`DEFAULT_API_LEVELS`]
/// - **Default level**: the highest supported level
/// - **Pool bound**: 8 sandboxes
/// - **Leak detection**: enabled
/// - **Instrumentation**: default runtime packages excluded, everything else intercepted
///
/// # Presets
///
/// - [`single()`](Self::single) - One API level, for suites that never vary it
/// - [`exhaustive()`](Self::exhaustive) - Pool large enough to keep every level warm
///
/// # Example
///
/// ```rust
/// use shadowbox::{HarnessConfig, PoolConfig};
///
/// let config = HarnessConfig {
///     detect_leaks: false,
///     ..HarnessConfig::single(30)
/// };
/// assert_eq!(config.default_api_level, 30);
///
/// let config = HarnessConfig::default().with_pool(PoolConfig::new(2));
/// assert_eq!(config.pool.max_sandboxes, 2);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct HarnessConfig {
    /// Levels tests may select; kept ascending.
    pub supported_api_levels: Vec<ApiLevel>,

    /// Level used by tests that do not select one.
    pub default_api_level: ApiLevel,

    /// Sandbox pool sizing.
    pub pool: PoolConfig,

    /// Whether sandboxes run leak checks after every reset.
    ///
    /// Resetter failures are reported either way.
    pub detect_leaks: bool,

    /// Instrumentation rules every test starts from.
    ///
    /// Shadow real types and per-test inclusions are layered on top per test.
    pub instrumentation: InstrumentationConfiguration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            supported_api_levels: DEFAULT_API_LEVELS.to_vec(),
            default_api_level: 34,
            pool: PoolConfig::default(),
            detect_leaks: true,
            instrumentation: InstrumentationConfiguration::builder()
                .with_default_exclusions()
                .build(),
        }
    }
}

impl HarnessConfig {
    /// Creates a configuration supporting exactly one API level.
    #[must_use]
    pub fn single(level: ApiLevel) -> Self {
        Self {
            supported_api_levels: vec![level],
            default_api_level: level,
            ..Default::default()
        }
    }

    /// Creates a configuration whose pool keeps one sandbox per supported level warm.
    #[must_use]
    pub fn exhaustive() -> Self {
        Self {
            pool: PoolConfig::new(DEFAULT_API_LEVELS.len() * 2),
            ..Default::default()
        }
    }

    /// Sets the supported levels. The highest becomes the default.
    #[must_use]
    pub fn with_api_levels(mut self, levels: &[ApiLevel]) -> Self {
        self.supported_api_levels = levels.to_vec();
        self.supported_api_levels.sort_unstable();
        self.supported_api_levels.dedup();
        if let Some(&highest) = self.supported_api_levels.last() {
            self.default_api_level = highest;
        }
        self
    }

    /// Sets the default level.
    #[must_use]
    pub fn with_default_api_level(mut self, level: ApiLevel) -> Self {
        self.default_api_level = level;
        self
    }

    /// Sets the pool configuration.
    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Enables or disables leak checks.
    #[must_use]
    pub fn with_leak_detection(mut self, enabled: bool) -> Self {
        self.detect_leaks = enabled;
        self
    }

    /// Sets the base instrumentation rules.
    #[must_use]
    pub fn with_instrumentation(mut self, instrumentation: InstrumentationConfiguration) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    /// Checks the configuration for contradictions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](crate::Error::Configuration) if no level is supported,
    /// the default level is not supported, or the pool bound is zero.
    pub fn validate(&self) -> Result<()> {
        if self.supported_api_levels.is_empty() {
            return Err(config_error!("No API level is supported"));
        }
        if !self.supported_api_levels.contains(&self.default_api_level) {
            return Err(config_error!(
                "Default API level {} is not among the supported levels {:?}",
                self.default_api_level,
                self.supported_api_levels
            ));
        }
        if self.pool.max_sandboxes == 0 {
            return Err(config_error!("Sandbox pool bound must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        HarnessConfig::default().validate().unwrap();
        HarnessConfig::single(28).validate().unwrap();
        HarnessConfig::exhaustive().validate().unwrap();
    }

    #[test]
    fn test_with_api_levels_sorts_and_moves_default() {
        let config = HarnessConfig::default().with_api_levels(&[30, 21, 30, 28]);
        assert_eq!(config.supported_api_levels, vec![21, 28, 30]);
        assert_eq!(config.default_api_level, 30);
    }

    #[test]
    fn test_validate_rejects_contradictions() {
        assert!(HarnessConfig::single(28)
            .with_default_api_level(30)
            .validate()
            .is_err());
        assert!(HarnessConfig::default()
            .with_pool(PoolConfig::new(0))
            .validate()
            .is_err());
        assert!(HarnessConfig::default()
            .with_api_levels(&[])
            .validate()
            .is_err());
    }
}
