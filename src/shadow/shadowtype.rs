//! Shadow type metadata.

use std::{fmt, sync::Arc};

use crate::{
    sandbox::ExecutionContext,
    types::{ApiLevel, MethodDescriptor},
    Result,
};

/// Type alias for shadow resetters.
///
/// A resetter runs at every sandbox reset, before the namespace is restored, and may inspect
/// or release state held by the shadow. Returning an error marks the reset as failed, which
/// poisons the sandbox.
pub type Resetter = Arc<dyn for<'c> Fn(&ExecutionContext<'c>) -> Result<()> + Send + Sync>;

/// A substitute implementation bound to a real type.
///
/// The shadow carries the metadata that decides its default policy: which real type it
/// implements, whether unshadowed calls fall through to the original, whether methods from
/// the parent shadow are inherited, and whether loose signature matching applies.
///
/// # Examples
///
/// ```rust
/// use shadowbox::{MethodDescriptor, ShadowType, Value, ValueKind};
/// use std::sync::Arc;
///
/// let shadow_view = Arc::new(ShadowType::new("test.ShadowView", "android.view.View"));
/// let shadow_text = ShadowType::new("test.ShadowTextView", "android.widget.TextView")
///     .extends(&shadow_view)
///     .inherit_implementation_methods(true)
///     .method(
///         MethodDescriptor::new("getText")
///             .returns(ValueKind::String)
///             .body(|_, _| Ok(Value::string("shadowed"))),
///     );
///
/// assert_eq!(shadow_text.implements(), "android.widget.TextView");
/// assert_eq!(shadow_text.chain().count(), 2);
/// ```
#[derive(Clone)]
pub struct ShadowType {
    id: String,
    implements: String,
    parent: Option<Arc<ShadowType>>,
    call_through_by_default: bool,
    inherit_implementation_methods: bool,
    loose_signatures: bool,
    min_api: Option<ApiLevel>,
    max_api: Option<ApiLevel>,
    methods: Vec<Arc<MethodDescriptor>>,
    resetter: Option<Resetter>,
}

impl ShadowType {
    /// Creates a shadow with no methods and every policy flag off.
    ///
    /// # Arguments
    ///
    /// * `id` - The shadow type id
    /// * `implements` - The real type id this shadow binds to
    #[must_use]
    pub fn new(id: impl Into<String>, implements: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            implements: implements.into(),
            parent: None,
            call_through_by_default: false,
            inherit_implementation_methods: false,
            loose_signatures: false,
            min_api: None,
            max_api: None,
            methods: Vec::new(),
            resetter: None,
        }
    }

    /// Sets the parent shadow.
    #[must_use]
    pub fn extends(mut self, parent: &Arc<ShadowType>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    /// Sets whether unshadowed calls run the original implementation.
    #[must_use]
    pub fn call_through_by_default(mut self, enabled: bool) -> Self {
        self.call_through_by_default = enabled;
        self
    }

    /// Sets whether methods of the parent shadow chain are searched too.
    #[must_use]
    pub fn inherit_implementation_methods(mut self, enabled: bool) -> Self {
        self.inherit_implementation_methods = enabled;
        self
    }

    /// Sets whether assignment-compatible signatures may match.
    #[must_use]
    pub fn loose_signatures(mut self, enabled: bool) -> Self {
        self.loose_signatures = enabled;
        self
    }

    /// Sets the first API level this shadow applies to.
    #[must_use]
    pub fn since(mut self, level: ApiLevel) -> Self {
        self.min_api = Some(level);
        self
    }

    /// Sets the last API level this shadow applies to.
    #[must_use]
    pub fn until(mut self, level: ApiLevel) -> Self {
        self.max_api = Some(level);
        self
    }

    /// Declares a shadow method. Declaration order is significant for tie-breaking.
    #[must_use]
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(Arc::new(method));
        self
    }

    /// Sets the resetter.
    #[must_use]
    pub fn resetter<F>(mut self, resetter: F) -> Self
    where
        F: for<'c> Fn(&ExecutionContext<'c>) -> Result<()> + Send + Sync + 'static,
    {
        self.resetter = Some(Arc::new(resetter));
        self
    }

    /// Returns the shadow type id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the real type id this shadow binds to.
    #[must_use]
    pub fn implements(&self) -> &str {
        &self.implements
    }

    /// Returns the parent shadow.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<ShadowType>> {
        self.parent.as_ref()
    }

    /// Returns the default call-through policy.
    #[must_use]
    pub fn is_call_through_by_default(&self) -> bool {
        self.call_through_by_default
    }

    /// Returns the default inheritance policy.
    #[must_use]
    pub fn inherits_implementation_methods(&self) -> bool {
        self.inherit_implementation_methods
    }

    /// Returns the default loose matching policy.
    #[must_use]
    pub fn has_loose_signatures(&self) -> bool {
        self.loose_signatures
    }

    /// Returns the API window as `(min, max)`.
    #[must_use]
    pub fn api_window(&self) -> (Option<ApiLevel>, Option<ApiLevel>) {
        (self.min_api, self.max_api)
    }

    /// Returns the declared shadow methods in declaration order.
    #[must_use]
    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }

    /// Returns the resetter, if any.
    #[must_use]
    pub fn reset_hook(&self) -> Option<&Resetter> {
        self.resetter.as_ref()
    }

    /// Iterates over this shadow followed by its parent shadows.
    pub fn chain(&self) -> impl Iterator<Item = &ShadowType> {
        std::iter::successors(Some(self), |shadow| shadow.parent.as_deref())
    }
}

impl fmt::Debug for ShadowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowType")
            .field("id", &self.id)
            .field("implements", &self.implements)
            .field("parent", &self.parent.as_ref().map(|p| p.id()))
            .field("call_through_by_default", &self.call_through_by_default)
            .field("inherit_implementation_methods", &self.inherit_implementation_methods)
            .field("loose_signatures", &self.loose_signatures)
            .field("methods", &self.methods.len())
            .field("has_resetter", &self.resetter.is_some())
            .finish()
    }
}
