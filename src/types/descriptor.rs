//! Type descriptors for the intercepted API surface.

use std::sync::Arc;

use bitflags::bitflags;

use crate::{types::MethodDescriptor, value::Value};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    /// Type attribute flags
    pub struct TypeFlags: u32 {
        /// Type can not be subclassed (and therefore not proxied)
        const FINAL = 0x0001;
        /// Type can not be instantiated
        const ABSTRACT = 0x0002;
        /// Type is an interface
        const INTERFACE = 0x0004;
    }
}

/// A declared field with its initial value.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDecl {
    /// Field name
    pub name: String,
    /// Value the field holds in a fresh namespace or a freshly created instance
    pub initial: Value,
}

/// Describes one type of the intercepted API surface.
///
/// A descriptor is the explicit stand-in for a loaded class: its parent, its declared static
/// and instance fields (with initial values), and its methods. Descriptors are assembled into a
/// [`crate::TypeUniverse`].
///
/// # Examples
///
/// ```rust
/// use shadowbox::{MethodDescriptor, TypeDescriptor, Value, ValueKind};
///
/// let desc = TypeDescriptor::new("android.widget.TextView")
///     .extends("android.view.View")
///     .field("text", Value::Null)
///     .static_field("sLastId", Value::I32(0))
///     .method(MethodDescriptor::new("getText").returns(ValueKind::String));
///
/// assert_eq!(desc.package(), "android.widget");
/// assert_eq!(desc.parent(), Some("android.view.View"));
/// assert_eq!(desc.methods_named("getText").count(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct TypeDescriptor {
    id: String,
    parent: Option<String>,
    flags: TypeFlags,
    static_fields: Vec<FieldDecl>,
    fields: Vec<FieldDecl>,
    methods: Vec<Arc<MethodDescriptor>>,
}

impl TypeDescriptor {
    /// Creates an empty, non-final type with no parent.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            flags: TypeFlags::empty(),
            static_fields: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Sets the parent type.
    #[must_use]
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Marks the type final.
    #[must_use]
    pub fn final_type(mut self) -> Self {
        self.flags |= TypeFlags::FINAL;
        self
    }

    /// Marks the type abstract.
    #[must_use]
    pub fn abstract_type(mut self) -> Self {
        self.flags |= TypeFlags::ABSTRACT;
        self
    }

    /// Marks the type as an interface.
    #[must_use]
    pub fn interface_type(mut self) -> Self {
        self.flags |= TypeFlags::INTERFACE | TypeFlags::ABSTRACT;
        self
    }

    /// Declares a static field.
    #[must_use]
    pub fn static_field(mut self, name: impl Into<String>, initial: Value) -> Self {
        self.static_fields.push(FieldDecl {
            name: name.into(),
            initial,
        });
        self
    }

    /// Declares an instance field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, initial: Value) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            initial,
        });
        self
    }

    /// Declares a method.
    #[must_use]
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(Arc::new(method));
        self
    }

    /// Returns the fully qualified type id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the parent type id.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Returns the package portion of the id (everything before the last dot).
    #[must_use]
    pub fn package(&self) -> &str {
        self.id.rsplit_once('.').map_or("", |(package, _)| package)
    }

    /// Returns the type flags.
    #[must_use]
    pub fn flags(&self) -> TypeFlags {
        self.flags
    }

    /// Returns `true` if the type is final.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.flags.contains(TypeFlags::FINAL)
    }

    /// Returns `true` if the type can not be instantiated.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.intersects(TypeFlags::ABSTRACT | TypeFlags::INTERFACE)
    }

    /// Returns the declared static fields.
    #[must_use]
    pub fn static_fields(&self) -> &[FieldDecl] {
        &self.static_fields
    }

    /// Returns the declared instance fields.
    #[must_use]
    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    /// Returns the declared methods in declaration order.
    #[must_use]
    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }

    /// Returns the declared methods with the given name, in declaration order.
    pub fn methods_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Arc<MethodDescriptor>> + 'a {
        self.methods.iter().filter(move |m| m.name() == name)
    }
}
