//! Immutable shadow registries and their builder.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use tracing::{debug, warn};

use crate::{
    shadow::{ProviderTier, ShadowConfig, ShadowProvider, ShadowType},
    types::{ancestors, ApiLevel, TypeHierarchy, TypeUniverse},
    Result,
};

/// Result of a hierarchy lookup.
#[derive(Debug)]
pub struct ShadowLookup<'r> {
    config: Option<&'r ShadowConfig>,
    consulted: Vec<String>,
}

impl<'r> ShadowLookup<'r> {
    /// The binding found, or `None` if no type in the chain is shadowed at this level.
    #[must_use]
    pub fn config(&self) -> Option<&'r ShadowConfig> {
        self.config
    }

    /// Every type id the walk visited, nearest first, ending at the bound type if one matched.
    #[must_use]
    pub fn consulted(&self) -> &[String] {
        &self.consulted
    }

    pub(crate) fn into_consulted(self) -> Vec<String> {
        self.consulted
    }
}

/// Immutable mapping from real type id to [`ShadowConfig`].
///
/// Registries are built once per effective configuration and shared through `Arc` by every
/// sandbox that uses that configuration.
///
/// # Examples
///
/// ```rust
/// use shadowbox::{ShadowRegistry, ShadowType, TypeDescriptor, TypeUniverse};
/// use std::sync::Arc;
///
/// let universe = TypeUniverse::builder()
///     .add(TypeDescriptor::new("app.Clock"))
///     .add(TypeDescriptor::new("app.Widget"))
///     .build()?;
///
/// let clock = Arc::new(ShadowType::new("test.ShadowClock", "app.Clock"));
/// let widget = Arc::new(ShadowType::new("test.FakeWidget", "app.Widget"));
///
/// let first = ShadowRegistry::builder().add_shadow(&widget).build(&universe)?;
/// let second = ShadowRegistry::builder()
///     .add_shadow(&widget)
///     .add_shadow(&clock)
///     .build(&universe)?;
///
/// let changed = first.invalidated_set(&second);
/// assert_eq!(changed.into_iter().collect::<Vec<_>>(), vec!["app.Clock".to_string()]);
/// # Ok::<(), shadowbox::Error>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShadowRegistry {
    configs: BTreeMap<String, ShadowConfig>,
}

impl ShadowRegistry {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ShadowRegistryBuilder {
        ShadowRegistryBuilder::default()
    }

    /// Creates a registry with no entries.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Exact key lookup. `None` means "no substitution for this type".
    #[must_use]
    pub fn get(&self, real_type_id: &str) -> Option<&ShadowConfig> {
        self.configs.get(real_type_id)
    }

    /// Returns `true` if an entry exists for exactly this type.
    #[must_use]
    pub fn contains(&self, real_type_id: &str) -> bool {
        self.configs.contains_key(real_type_id)
    }

    /// Finds the binding for `type_id` or its nearest shadowed ancestor at `api_level`.
    ///
    /// The type itself is checked first, then each ancestor in turn. Entries whose API window
    /// excludes `api_level` are skipped and the walk continues upward.
    ///
    /// # Arguments
    ///
    /// * `type_id` - The runtime type of the call
    /// * `hierarchy` - Parent links to walk
    /// * `api_level` - The API level the sandbox runs at
    #[must_use]
    pub fn lookup(
        &self,
        type_id: &str,
        hierarchy: &dyn TypeHierarchy,
        api_level: ApiLevel,
    ) -> ShadowLookup<'_> {
        let mut consulted = Vec::new();
        for current in ancestors(hierarchy, type_id) {
            consulted.push(current.to_string());
            if let Some(config) = self.configs.get(current).filter(|c| c.admits(api_level)) {
                return ShadowLookup {
                    config: Some(config),
                    consulted,
                };
            }
        }

        ShadowLookup {
            config: None,
            consulted,
        }
    }

    /// Returns the keys whose binding differs between `self` and `previous`.
    ///
    /// A key is included if it is present in only one registry, or present in both with
    /// unequal configs. The result is symmetric and empty for identical registries.
    #[must_use]
    pub fn invalidated_set(&self, previous: &ShadowRegistry) -> BTreeSet<String> {
        let mut changed = BTreeSet::new();
        for (key, config) in &self.configs {
            if previous.configs.get(key) != Some(config) {
                changed.insert(key.clone());
            }
        }
        for key in previous.configs.keys() {
            if !self.configs.contains_key(key) {
                changed.insert(key.clone());
            }
        }
        changed
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Returns `true` if the registry has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Iterates over all entries ordered by real type id.
    pub fn iter(&self) -> impl Iterator<Item = &ShadowConfig> {
        self.configs.values()
    }

    /// Returns every distinct shadow reachable from the registry, parents included.
    ///
    /// Ordered by first appearance; used to run resetters.
    #[must_use]
    pub fn shadows(&self) -> Vec<Arc<ShadowType>> {
        let mut seen = BTreeSet::new();
        let mut shadows = Vec::new();
        for config in self.configs.values() {
            let mut current = Some(config.shadow());
            while let Some(shadow) = current {
                if seen.insert(shadow.id().to_string()) {
                    shadows.push(Arc::clone(shadow));
                }
                current = shadow.parent();
            }
        }
        shadows
    }
}

/// Additive staging area for a [`ShadowRegistry`].
///
/// Entries are staged in three tiers: base providers, custom providers, then local overrides.
/// Building flattens the tiers in that order so that, for identical keys, later additions
/// always win. The builder is single-writer.
#[derive(Debug, Default)]
pub struct ShadowRegistryBuilder {
    base: Vec<ShadowConfig>,
    custom: Vec<ShadowConfig>,
    local: Vec<ShadowConfig>,
}

impl ShadowRegistryBuilder {
    /// Stages every configuration of `provider` in the provider's tier.
    pub fn add_provider(&mut self, provider: &dyn ShadowProvider) -> &mut Self {
        let configs = provider.configs();
        debug!(
            provider = provider.name(),
            tier = %provider.tier(),
            configs = configs.len(),
            "staging shadow provider"
        );
        for config in configs {
            self.add_tiered(provider.tier(), config);
        }
        self
    }

    /// Stages a configuration in a provider tier.
    pub fn add_tiered(&mut self, tier: ProviderTier, config: ShadowConfig) -> &mut Self {
        match tier {
            ProviderTier::Base => self.base.push(config),
            ProviderTier::Custom => self.custom.push(config),
        }
        self
    }

    /// Stages a local override.
    pub fn add_config(&mut self, config: ShadowConfig) -> &mut Self {
        self.local.push(config);
        self
    }

    /// Stages a local override bound by the shadow's own metadata.
    pub fn add_shadow(&mut self, shadow: &Arc<ShadowType>) -> &mut Self {
        self.add_config(ShadowConfig::from_shadow(shadow))
    }

    /// Returns the number of staged entries across all tiers.
    #[must_use]
    pub fn staged(&self) -> usize {
        self.base.len() + self.custom.len() + self.local.len()
    }

    /// Flattens the tiers and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if an entry has an empty API window, or
    /// requests call-through for a type that is unknown or final and therefore can not be
    /// proxied.
    pub fn build(&self, universe: &TypeUniverse) -> Result<ShadowRegistry> {
        let mut configs = BTreeMap::new();
        for config in self.base.iter().chain(&self.custom).chain(&self.local) {
            configs.insert(config.real_type_id().to_string(), config.clone());
        }

        for config in configs.values() {
            if let (Some(min), Some(max)) = (config.min_api_level(), config.max_api_level()) {
                if min > max {
                    return Err(config_error!(
                        "Shadow {} for {} has an empty API window ({} > {})",
                        config.shadow_type_id(),
                        config.real_type_id(),
                        min,
                        max
                    ));
                }
            }

            match universe.get(config.real_type_id()) {
                None if config.call_through_by_default() => {
                    return Err(config_error!(
                        "Shadow {} requests call-through for unknown type {}",
                        config.shadow_type_id(),
                        config.real_type_id()
                    ));
                }
                None => warn!(
                    shadow = config.shadow_type_id(),
                    real_type = config.real_type_id(),
                    "shadow bound to a type outside the universe"
                ),
                Some(desc) if desc.is_final() && config.call_through_by_default() => {
                    return Err(config_error!(
                        "Shadow {} requests call-through for final type {}, which can not be proxied",
                        config.shadow_type_id(),
                        config.real_type_id()
                    ));
                }
                Some(_) => {}
            }
        }

        debug!(
            staged = self.staged(),
            entries = configs.len(),
            "built shadow registry"
        );
        Ok(ShadowRegistry { configs })
    }
}
