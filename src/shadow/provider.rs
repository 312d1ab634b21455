//! Shadow provider discovery.

use std::sync::Arc;

use strum::Display;

use crate::shadow::{ShadowConfig, ShadowType};

/// Installation tier of a provider. Base configs are installed before custom ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderTier {
    /// Always loaded, shipped with the framework
    Base,
    /// Supplied by test authors
    Custom,
}

/// Enumerates shadow configurations for registry construction.
pub trait ShadowProvider: Send + Sync {
    /// Provider name, used in log output.
    fn name(&self) -> &str;

    /// Installation tier.
    fn tier(&self) -> ProviderTier {
        ProviderTier::Base
    }

    /// The configurations this provider contributes, in installation order.
    fn configs(&self) -> Vec<ShadowConfig>;
}

/// A provider backed by a fixed list of configurations.
///
/// # Examples
///
/// ```rust
/// use shadowbox::{ProviderTier, ShadowProvider, ShadowType, StaticShadowProvider};
/// use std::sync::Arc;
///
/// let provider = StaticShadowProvider::custom("app-shadows")
///     .with_shadow(&Arc::new(ShadowType::new("app.ShadowClock", "app.Clock")));
///
/// assert_eq!(provider.tier(), ProviderTier::Custom);
/// assert_eq!(provider.configs().len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct StaticShadowProvider {
    name: String,
    tier: ProviderTier,
    configs: Vec<ShadowConfig>,
}

impl StaticShadowProvider {
    /// Creates an empty base-tier provider.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tier: ProviderTier::Base,
            configs: Vec::new(),
        }
    }

    /// Creates an empty custom-tier provider.
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self {
            tier: ProviderTier::Custom,
            ..Self::new(name)
        }
    }

    /// Adds a shadow bound by its own metadata.
    #[must_use]
    pub fn with_shadow(self, shadow: &Arc<ShadowType>) -> Self {
        self.with_config(ShadowConfig::from_shadow(shadow))
    }

    /// Adds an explicit configuration.
    #[must_use]
    pub fn with_config(mut self, config: ShadowConfig) -> Self {
        self.configs.push(config);
        self
    }
}

impl ShadowProvider for StaticShadowProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> ProviderTier {
        self.tier
    }

    fn configs(&self) -> Vec<ShadowConfig> {
        self.configs.clone()
    }
}
