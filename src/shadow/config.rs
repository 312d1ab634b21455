//! Per-type shadow configuration entries.

use std::sync::Arc;

use crate::{
    shadow::ShadowType,
    types::{ApiLevel, MethodDescriptor},
};

/// One registry entry: a real type bound to a shadow, with its dispatch policy.
///
/// Built from the shadow's own metadata with [`ShadowConfig::from_shadow`], or bound to an
/// explicit real type with [`ShadowConfig::new`]. Policy flags start out as the shadow's
/// defaults and may be adjusted with the `with_*` methods before the entry is handed to a
/// registry builder; the entry is never mutated afterwards.
///
/// Two entries are equal when they bind the same real type to the same shadow instance with the
/// same flags and API window. This is the comparison used for invalidated sets, so replacing a
/// shadow with a different one that happens to share its id still invalidates the type.
#[derive(Clone, Debug)]
pub struct ShadowConfig {
    real_type_id: String,
    shadow: Arc<ShadowType>,
    call_through_by_default: bool,
    inherit_implementation_methods: bool,
    loose_signature_matching: bool,
    min_api_level: Option<ApiLevel>,
    max_api_level: Option<ApiLevel>,
}

impl ShadowConfig {
    /// Binds `shadow` to an explicit real type, taking policy defaults from the shadow.
    #[must_use]
    pub fn new(real_type_id: impl Into<String>, shadow: &Arc<ShadowType>) -> Self {
        let (min_api_level, max_api_level) = shadow.api_window();
        Self {
            real_type_id: real_type_id.into(),
            shadow: Arc::clone(shadow),
            call_through_by_default: shadow.is_call_through_by_default(),
            inherit_implementation_methods: shadow.inherits_implementation_methods(),
            loose_signature_matching: shadow.has_loose_signatures(),
            min_api_level,
            max_api_level,
        }
    }

    /// Derives the entry entirely from the shadow's metadata.
    #[must_use]
    pub fn from_shadow(shadow: &Arc<ShadowType>) -> Self {
        Self::new(shadow.implements(), shadow)
    }

    /// Overrides the call-through policy.
    #[must_use]
    pub fn with_call_through_by_default(mut self, enabled: bool) -> Self {
        self.call_through_by_default = enabled;
        self
    }

    /// Overrides the inheritance policy.
    #[must_use]
    pub fn with_inherit_implementation_methods(mut self, enabled: bool) -> Self {
        self.inherit_implementation_methods = enabled;
        self
    }

    /// Overrides the loose matching policy.
    #[must_use]
    pub fn with_loose_signature_matching(mut self, enabled: bool) -> Self {
        self.loose_signature_matching = enabled;
        self
    }

    /// Overrides the API window.
    #[must_use]
    pub fn with_api_window(mut self, min: Option<ApiLevel>, max: Option<ApiLevel>) -> Self {
        self.min_api_level = min;
        self.max_api_level = max;
        self
    }

    /// Returns the real type id.
    #[must_use]
    pub fn real_type_id(&self) -> &str {
        &self.real_type_id
    }

    /// Returns the shadow type id.
    #[must_use]
    pub fn shadow_type_id(&self) -> &str {
        self.shadow.id()
    }

    /// Returns the bound shadow.
    #[must_use]
    pub fn shadow(&self) -> &Arc<ShadowType> {
        &self.shadow
    }

    /// Returns `true` if unshadowed calls fall through to the original.
    #[must_use]
    pub fn call_through_by_default(&self) -> bool {
        self.call_through_by_default
    }

    /// Returns `true` if parent shadow methods are searched.
    #[must_use]
    pub fn inherit_implementation_methods(&self) -> bool {
        self.inherit_implementation_methods
    }

    /// Returns `true` if assignment-compatible signatures may match.
    #[must_use]
    pub fn loose_signature_matching(&self) -> bool {
        self.loose_signature_matching
    }

    /// Returns the minimum API level, if bounded.
    #[must_use]
    pub fn min_api_level(&self) -> Option<ApiLevel> {
        self.min_api_level
    }

    /// Returns the maximum API level, if bounded.
    #[must_use]
    pub fn max_api_level(&self) -> Option<ApiLevel> {
        self.max_api_level
    }

    /// Returns `true` if the entry applies at `level`.
    #[must_use]
    pub fn admits(&self, level: ApiLevel) -> bool {
        self.min_api_level.map_or(true, |min| level >= min)
            && self.max_api_level.map_or(true, |max| level <= max)
    }

    /// Returns the shadow method groups searched for this entry, own shadow first.
    ///
    /// Parent shadows are included only when implementation methods are inherited.
    pub(crate) fn method_groups(
        &self,
    ) -> impl Iterator<Item = (&str, &[Arc<MethodDescriptor>])> {
        let depth = if self.inherit_implementation_methods {
            usize::MAX
        } else {
            1
        };
        self.shadow
            .chain()
            .take(depth)
            .map(|shadow| (shadow.id(), shadow.methods()))
    }
}

impl PartialEq for ShadowConfig {
    fn eq(&self, other: &Self) -> bool {
        self.real_type_id == other.real_type_id
            && Arc::ptr_eq(&self.shadow, &other.shadow)
            && self.call_through_by_default == other.call_through_by_default
            && self.inherit_implementation_methods == other.inherit_implementation_methods
            && self.loose_signature_matching == other.loose_signature_matching
            && self.min_api_level == other.min_api_level
            && self.max_api_level == other.max_api_level
    }
}

impl Eq for ShadowConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_shadow_takes_metadata_defaults() {
        let shadow = Arc::new(
            ShadowType::new("test.ShadowClock", "com.example.Clock")
                .call_through_by_default(true)
                .loose_signatures(true)
                .since(21),
        );
        let config = ShadowConfig::from_shadow(&shadow);

        assert_eq!(config.real_type_id(), "com.example.Clock");
        assert_eq!(config.shadow_type_id(), "test.ShadowClock");
        assert!(config.call_through_by_default());
        assert!(config.loose_signature_matching());
        assert!(!config.inherit_implementation_methods());
        assert!(!config.admits(19));
        assert!(config.admits(34));
    }

    #[test]
    fn test_equality_tracks_shadow_instance() {
        let a = Arc::new(ShadowType::new("test.ShadowClock", "com.example.Clock"));
        let b = Arc::new(ShadowType::new("test.ShadowClock", "com.example.Clock"));
        assert_eq!(ShadowConfig::from_shadow(&a), ShadowConfig::from_shadow(&a));
        assert_ne!(
            ShadowConfig::from_shadow(&a),
            ShadowConfig::from_shadow(&b),
            "same id, different shadow"
        );
        assert_ne!(
            ShadowConfig::from_shadow(&a),
            ShadowConfig::from_shadow(&a).with_call_through_by_default(true)
        );
    }

    #[test]
    fn test_method_groups_respect_inheritance() {
        let parent = Arc::new(ShadowType::new("test.ShadowView", "android.view.View"));
        let child = Arc::new(
            ShadowType::new("test.ShadowTextView", "android.widget.TextView").extends(&parent),
        );

        let plain = ShadowConfig::from_shadow(&child);
        assert_eq!(plain.method_groups().count(), 1);

        let inheriting = plain.with_inherit_implementation_methods(true);
        let ids: Vec<&str> = inheriting.method_groups().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["test.ShadowTextView", "test.ShadowView"]);
    }
}
