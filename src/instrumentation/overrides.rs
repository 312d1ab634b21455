//! Per-test overrides: extra shadows, API selection, extra instrumentation rules.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::{
    shadow::ShadowType,
    types::ApiLevel,
    Result,
};

/// Which API levels a test runs at.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ApiSelector {
    /// The harness's default level
    #[default]
    Default,
    /// Every supported level
    All,
    /// Exactly these levels
    Exact(Vec<ApiLevel>),
    /// Every supported level within the inclusive range
    Range {
        /// Lowest level, unbounded if `None`
        min: Option<ApiLevel>,
        /// Highest level, unbounded if `None`
        max: Option<ApiLevel>,
    },
}

impl ApiSelector {
    /// Resolves the selector against the supported levels.
    ///
    /// The result is ascending and free of duplicates.
    ///
    /// # Arguments
    ///
    /// * `supported` - Levels the harness can run at
    /// * `default` - The harness's default level
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if an exact level is not supported or the
    /// selection is empty.
    pub fn select(&self, supported: &[ApiLevel], default: ApiLevel) -> Result<Vec<ApiLevel>> {
        let mut levels: Vec<ApiLevel> = match self {
            ApiSelector::Default => vec![default],
            ApiSelector::All => supported.to_vec(),
            ApiSelector::Exact(wanted) => {
                if let Some(level) = wanted.iter().find(|level| !supported.contains(level)) {
                    return Err(config_error!(
                        "API level {} is not supported (supported: {:?})",
                        level,
                        supported
                    ));
                }
                wanted.clone()
            }
            ApiSelector::Range { min, max } => supported
                .iter()
                .copied()
                .filter(|level| min.map_or(true, |min| *level >= min))
                .filter(|level| max.map_or(true, |max| *level <= max))
                .collect(),
        };

        levels.sort_unstable();
        levels.dedup();
        if levels.is_empty() {
            return Err(config_error!(
                "API selection {:?} matches none of {:?}",
                self,
                supported
            ));
        }
        Ok(levels)
    }
}

/// Overrides declared by a test class or test method.
///
/// # Examples
///
/// ```rust
/// use shadowbox::{ApiSelector, ShadowType, TestConfig};
/// use std::sync::Arc;
///
/// let class_level = TestConfig::new()
///     .with_shadow(&Arc::new(ShadowType::new("test.ShadowClock", "app.Clock")))
///     .with_api(ApiSelector::All);
/// let method_level = TestConfig::new().with_api(ApiSelector::Exact(vec![28]));
///
/// let merged = TestConfig::merge(&class_level, &method_level);
/// assert_eq!(merged.api(), &ApiSelector::Exact(vec![28]));
/// assert_eq!(merged.shadows().len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct TestConfig {
    shadows: Vec<Arc<ShadowType>>,
    api: ApiSelector,
    include_types: Vec<String>,
    exclude_packages: Vec<String>,
}

impl TestConfig {
    /// Creates an empty override set running at the default level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a local shadow.
    #[must_use]
    pub fn with_shadow(mut self, shadow: &Arc<ShadowType>) -> Self {
        self.shadows.push(Arc::clone(shadow));
        self
    }

    /// Sets the API selection.
    #[must_use]
    pub fn with_api(mut self, api: ApiSelector) -> Self {
        self.api = api;
        self
    }

    /// Intercepts an additional type.
    #[must_use]
    pub fn with_included_type(mut self, type_id: impl Into<String>) -> Self {
        self.include_types.push(type_id.into());
        self
    }

    /// Excludes an additional package.
    #[must_use]
    pub fn with_excluded_package(mut self, package: impl Into<String>) -> Self {
        self.exclude_packages.push(package.into());
        self
    }

    /// Returns the local shadows in declaration order.
    #[must_use]
    pub fn shadows(&self) -> &[Arc<ShadowType>] {
        &self.shadows
    }

    /// Returns the API selection.
    #[must_use]
    pub fn api(&self) -> &ApiSelector {
        &self.api
    }

    /// Returns the additionally included types.
    #[must_use]
    pub fn included_types(&self) -> &[String] {
        &self.include_types
    }

    /// Returns the additionally excluded packages.
    #[must_use]
    pub fn excluded_packages(&self) -> &[String] {
        &self.exclude_packages
    }

    /// Combines class-level and method-level overrides.
    ///
    /// The inner API selection wins unless it is [`ApiSelector::Default`]. Shadows and
    /// instrumentation rules accumulate, outer first, so an inner shadow for the same real
    /// type overrides the outer one.
    #[must_use]
    pub fn merge(outer: &TestConfig, inner: &TestConfig) -> TestConfig {
        let api = match inner.api {
            ApiSelector::Default => outer.api.clone(),
            _ => inner.api.clone(),
        };

        TestConfig {
            shadows: outer.shadows.iter().chain(&inner.shadows).cloned().collect(),
            api,
            include_types: outer
                .include_types
                .iter()
                .chain(&inner.include_types)
                .cloned()
                .collect(),
            exclude_packages: outer
                .exclude_packages
                .iter()
                .chain(&inner.exclude_packages)
                .cloned()
                .collect(),
        }
    }

    /// Returns the ordered local shadows as a registry cache key.
    #[must_use]
    pub fn shadow_key(&self) -> ShadowKey {
        ShadowKey(self.shadows.clone())
    }
}

/// Identity of a test's local shadows, in declaration order.
///
/// Shadows compare by instance, not by id: two tests declaring different shadows under the
/// same id get different keys. The key holds the shadows alive, so an instance address is
/// never reused while a key refers to it.
#[derive(Clone, Debug, Default)]
pub struct ShadowKey(Vec<Arc<ShadowType>>);

impl ShadowKey {
    /// Returns the shadow ids in declaration order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.0.iter().map(|shadow| shadow.id()).collect()
    }
}

impl PartialEq for ShadowKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(&other.0).all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

impl Eq for ShadowKey {}

impl Hash for ShadowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for shadow in &self.0 {
            std::ptr::hash(Arc::as_ptr(shadow), state);
        }
    }
}

impl fmt::Display for ShadowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.ids().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    const SUPPORTED: &[ApiLevel] = &[21, 28, 30, 33];

    #[test]
    fn test_default_selects_default_level() {
        assert_eq!(ApiSelector::Default.select(SUPPORTED, 33).unwrap(), vec![33]);
    }

    #[test]
    fn test_all_and_range() {
        assert_eq!(ApiSelector::All.select(SUPPORTED, 33).unwrap(), SUPPORTED.to_vec());
        let range = ApiSelector::Range {
            min: Some(28),
            max: Some(30),
        };
        assert_eq!(range.select(SUPPORTED, 33).unwrap(), vec![28, 30]);
        let open = ApiSelector::Range {
            min: Some(30),
            max: None,
        };
        assert_eq!(open.select(SUPPORTED, 33).unwrap(), vec![30, 33]);
    }

    #[test]
    fn test_exact_rejects_unsupported_level() {
        let result = ApiSelector::Exact(vec![28, 29]).select(SUPPORTED, 33);
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_empty_range_rejected() {
        let range = ApiSelector::Range {
            min: Some(34),
            max: None,
        };
        assert!(range.select(SUPPORTED, 33).is_err());
    }

    #[test]
    fn test_merge_keeps_outer_api_when_inner_default() {
        let outer = TestConfig::new().with_api(ApiSelector::All);
        let inner = TestConfig::new().with_included_type("java.lang.Thread");
        let merged = TestConfig::merge(&outer, &inner);
        assert_eq!(merged.api(), &ApiSelector::All);
        assert_eq!(merged.included_types(), &["java.lang.Thread".to_string()]);
    }

    #[test]
    fn test_merge_accumulates_shadows_outer_first() {
        let a = Arc::new(ShadowType::new("test.A", "app.X"));
        let b = Arc::new(ShadowType::new("test.B", "app.X"));
        let merged = TestConfig::merge(&TestConfig::new().with_shadow(&a), &TestConfig::new().with_shadow(&b));
        assert_eq!(merged.shadow_key().ids(), vec!["test.A", "test.B"]);
    }

    #[test]
    fn test_shadow_key_compares_instances() {
        let a = Arc::new(ShadowType::new("test.ShadowClock", "app.Clock"));
        let b = Arc::new(ShadowType::new("test.ShadowClock", "app.Clock"));

        let with_a = TestConfig::new().with_shadow(&a);
        assert_eq!(with_a.shadow_key(), TestConfig::new().with_shadow(&a).shadow_key());
        assert_ne!(with_a.shadow_key(), TestConfig::new().with_shadow(&b).shadow_key());
        assert_eq!(with_a.shadow_key().to_string(), "[test.ShadowClock]");
        assert_eq!(TestConfig::new().shadow_key(), ShadowKey::default());
    }
}
