//! Inclusion and exclusion rules for interception.

use std::collections::{BTreeMap, BTreeSet};

use crate::shadow::ShadowType;

/// Runtime packages that are never intercepted when default exclusions are applied.
pub const DEFAULT_EXCLUDED_PACKAGES: &[&str] = &["java", "javax", "kotlin", "sun", "jdk"];

/// Declarative rules selecting which types are subject to interception.
///
/// The configuration is immutable and hashable; together with the API level it forms the key
/// under which sandboxes are pooled.
///
/// # Decision Order
///
/// [`should_instrument`](Self::should_instrument) answers, first match wins:
///
/// 1. Explicitly included type, or the real type of an installed shadow: **yes**
/// 2. Explicitly excluded type: **no**
/// 3. Type in an excluded package: **no**
/// 4. Instrumented packages listed and the type is in none of them: **no**
/// 5. Otherwise: **yes**
///
/// Package rules match on dot boundaries: `android.view` covers `android.view.View` and
/// `android.view.animation.Animation` but not `android.viewpager.Pager`.
///
/// # Examples
///
/// ```rust
/// use shadowbox::InstrumentationConfiguration;
///
/// let config = InstrumentationConfiguration::builder()
///     .with_default_exclusions()
///     .exclude_package("com.example.internal")
///     .include_type("java.lang.Thread")
///     .build();
///
/// assert!(config.should_instrument("android.view.View"));
/// assert!(config.should_instrument("java.lang.Thread"));
/// assert!(!config.should_instrument("java.lang.String"));
/// assert!(!config.should_instrument("com.example.internal.Cache"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct InstrumentationConfiguration {
    instrumented_packages: BTreeSet<String>,
    excluded_packages: BTreeSet<String>,
    included_types: BTreeSet<String>,
    excluded_types: BTreeSet<String>,
    shadow_types: BTreeMap<String, String>,
}

impl InstrumentationConfiguration {
    /// Creates a builder with no rules.
    #[must_use]
    pub fn builder() -> InstrumentationBuilder {
        InstrumentationBuilder::default()
    }

    /// Returns a builder pre-populated with this configuration's rules.
    #[must_use]
    pub fn to_builder(&self) -> InstrumentationBuilder {
        InstrumentationBuilder {
            config: self.clone(),
        }
    }

    /// Decides whether calls on `type_id` are intercepted.
    #[must_use]
    pub fn should_instrument(&self, type_id: &str) -> bool {
        if self.included_types.contains(type_id) || self.is_shadowed(type_id) {
            return true;
        }
        if self.excluded_types.contains(type_id) {
            return false;
        }
        if self
            .excluded_packages
            .iter()
            .any(|package| in_package(type_id, package))
        {
            return false;
        }
        if !self.instrumented_packages.is_empty() {
            return self
                .instrumented_packages
                .iter()
                .any(|package| in_package(type_id, package));
        }
        true
    }

    /// Returns `true` if an installed shadow binds to `type_id`.
    #[must_use]
    pub fn is_shadowed(&self, type_id: &str) -> bool {
        self.shadow_types.values().any(|real| real == type_id)
    }

    /// Returns the installed shadow type ids.
    pub fn shadow_type_ids(&self) -> impl Iterator<Item = &str> {
        self.shadow_types.keys().map(String::as_str)
    }

    /// Returns the excluded packages.
    pub fn excluded_packages(&self) -> impl Iterator<Item = &str> {
        self.excluded_packages.iter().map(String::as_str)
    }

    /// Returns the instrumented packages. Empty means "every package not excluded".
    pub fn instrumented_packages(&self) -> impl Iterator<Item = &str> {
        self.instrumented_packages.iter().map(String::as_str)
    }
}

/// Builder for [`InstrumentationConfiguration`].
#[derive(Clone, Debug, Default)]
pub struct InstrumentationBuilder {
    config: InstrumentationConfiguration,
}

impl InstrumentationBuilder {
    /// Excludes every type in `package` (and its sub-packages).
    #[must_use]
    pub fn exclude_package(mut self, package: impl AsRef<str>) -> Self {
        self.config
            .excluded_packages
            .insert(normalize_package(package.as_ref()));
        self
    }

    /// Restricts interception to the listed packages (and their sub-packages).
    #[must_use]
    pub fn instrument_package(mut self, package: impl AsRef<str>) -> Self {
        self.config
            .instrumented_packages
            .insert(normalize_package(package.as_ref()));
        self
    }

    /// Intercepts `type_id` regardless of package rules.
    #[must_use]
    pub fn include_type(mut self, type_id: impl Into<String>) -> Self {
        self.config.included_types.insert(type_id.into());
        self
    }

    /// Never intercepts `type_id` unless explicitly included or shadowed.
    #[must_use]
    pub fn exclude_type(mut self, type_id: impl Into<String>) -> Self {
        self.config.excluded_types.insert(type_id.into());
        self
    }

    /// Installs a shadow type; its real type is always intercepted.
    #[must_use]
    pub fn add_shadow_type(self, shadow: &ShadowType) -> Self {
        self.bind_shadow(shadow.id(), shadow.implements())
    }

    /// Installs a shadow binding whose real type differs from the shadow's own metadata.
    #[must_use]
    pub fn bind_shadow(mut self, shadow_id: impl Into<String>, real_type_id: impl Into<String>) -> Self {
        self.config
            .shadow_types
            .insert(shadow_id.into(), real_type_id.into());
        self
    }

    /// Excludes the runtime packages listed in [`DEFAULT_EXCLUDED_PACKAGES`].
    #[must_use]
    pub fn with_default_exclusions(self) -> Self {
        DEFAULT_EXCLUDED_PACKAGES
            .iter()
            .fold(self, |builder, package| builder.exclude_package(package))
    }

    /// Produces the configuration.
    #[must_use]
    pub fn build(self) -> InstrumentationConfiguration {
        self.config
    }
}

fn normalize_package(package: &str) -> String {
    package.trim_end_matches('.').to_string()
}

fn in_package(type_id: &str, package: &str) -> bool {
    type_id
        .strip_prefix(package)
        .is_some_and(|rest| rest.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_matching_on_dot_boundaries() {
        assert!(in_package("android.view.View", "android.view"));
        assert!(in_package("android.view.animation.Animation", "android.view"));
        assert!(!in_package("android.viewpager.Pager", "android.view"));
        assert!(!in_package("android.view", "android.view"));
    }

    #[test]
    fn test_trailing_dot_is_normalized() {
        let config = InstrumentationConfiguration::builder()
            .exclude_package("java.")
            .build();
        assert!(!config.should_instrument("java.lang.Object"));
        assert!(config.should_instrument("javax2.Thing"));
    }

    #[test]
    fn test_explicit_include_beats_excluded_package() {
        let config = InstrumentationConfiguration::builder()
            .with_default_exclusions()
            .include_type("java.lang.Thread")
            .build();
        assert!(config.should_instrument("java.lang.Thread"));
        assert!(!config.should_instrument("java.lang.Object"));
    }

    #[test]
    fn test_shadowed_type_always_instrumented() {
        let shadow = ShadowType::new("test.ShadowSystem", "java.lang.System");
        let config = InstrumentationConfiguration::builder()
            .with_default_exclusions()
            .exclude_type("java.lang.System")
            .add_shadow_type(&shadow)
            .build();
        assert!(config.should_instrument("java.lang.System"));
        assert_eq!(config.shadow_type_ids().collect::<Vec<_>>(), vec!["test.ShadowSystem"]);
    }

    #[test]
    fn test_instrumented_packages_restrict() {
        let config = InstrumentationConfiguration::builder()
            .instrument_package("android")
            .exclude_type("android.os.Looper")
            .build();
        assert!(config.should_instrument("android.widget.Button"));
        assert!(!config.should_instrument("com.example.Widget"));
        assert!(!config.should_instrument("android.os.Looper"));
    }

    #[test]
    fn test_equal_rules_are_equal_keys() {
        let a = InstrumentationConfiguration::builder()
            .exclude_package("a")
            .exclude_package("b")
            .build();
        let b = InstrumentationConfiguration::builder()
            .exclude_package("b")
            .exclude_package("a")
            .build();
        assert_eq!(a, b);
    }
}
