//! The closed set of types subject to interception.

use std::collections::{HashMap, HashSet};

use crate::{
    types::{FieldDecl, TypeDescriptor},
    Error, Result,
};

/// Parent lookup over a set of types.
///
/// Implemented by [`TypeUniverse`]; signature matching and registry lookups only need to walk
/// parent links, so they take this trait instead of the full universe.
pub trait TypeHierarchy {
    /// Returns the parent type id of `type_id`, or `None` for root or unknown types.
    fn parent_of(&self, type_id: &str) -> Option<&str>;
}

/// Iterator over a type and its ancestors, nearest first.
pub struct Ancestors<'a> {
    hierarchy: &'a dyn TypeHierarchy,
    next: Option<&'a str>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.hierarchy.parent_of(current);
        Some(current)
    }
}

/// Returns an iterator over `type_id` followed by each of its ancestors.
///
/// # Arguments
///
/// * `hierarchy` - The hierarchy to walk
/// * `type_id` - The starting type, yielded first
pub fn ancestors<'a>(hierarchy: &'a dyn TypeHierarchy, type_id: &'a str) -> Ancestors<'a> {
    Ancestors {
        hierarchy,
        next: Some(type_id),
    }
}

/// The full set of intercepted types.
///
/// The universe is immutable once built and is shared by every sandbox created from it.
/// Building validates that every parent exists, that no type extends a final type, and that
/// the hierarchy is acyclic, so hierarchy walks always terminate.
///
/// # Examples
///
/// ```rust
/// use shadowbox::{TypeDescriptor, TypeUniverse};
///
/// let universe = TypeUniverse::builder()
///     .add(TypeDescriptor::new("android.view.View"))
///     .add(TypeDescriptor::new("android.widget.TextView").extends("android.view.View"))
///     .build()?;
///
/// assert!(universe.is_subtype("android.widget.TextView", "android.view.View"));
/// assert_eq!(universe.len(), 2);
/// # Ok::<(), shadowbox::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct TypeUniverse {
    types: HashMap<String, TypeDescriptor>,
}

impl TypeUniverse {
    /// Creates a builder for a new universe.
    #[must_use]
    pub fn builder() -> TypeUniverseBuilder {
        TypeUniverseBuilder::default()
    }

    /// Returns the descriptor for `type_id`.
    #[must_use]
    pub fn get(&self, type_id: &str) -> Option<&TypeDescriptor> {
        self.types.get(type_id)
    }

    /// Returns the descriptor for `type_id`, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if the type is not part of the universe.
    pub fn require(&self, type_id: &str) -> Result<&TypeDescriptor> {
        self.types
            .get(type_id)
            .ok_or_else(|| Error::TypeNotFound(type_id.to_string()))
    }

    /// Returns `true` if the universe contains `type_id`.
    #[must_use]
    pub fn contains(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id)
    }

    /// Returns the number of types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if the universe has no types.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterates over all descriptors in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    /// Returns `true` if `type_id` is `ancestor` or derives from it.
    #[must_use]
    pub fn is_subtype(&self, type_id: &str, ancestor: &str) -> bool {
        ancestors(self, type_id).any(|t| t == ancestor)
    }

    /// Collects the instance fields of `type_id` including inherited ones.
    ///
    /// A field redeclared by a subtype shadows the ancestor's declaration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if the type is not part of the universe.
    pub fn instance_fields(&self, type_id: &str) -> Result<Vec<&FieldDecl>> {
        self.require(type_id)?;

        let mut seen = HashSet::new();
        let mut fields = Vec::new();
        for current in ancestors(self, type_id) {
            let Some(desc) = self.types.get(current) else {
                break;
            };
            for field in desc.fields() {
                if seen.insert(field.name.as_str()) {
                    fields.push(field);
                }
            }
        }
        Ok(fields)
    }
}

impl TypeHierarchy for TypeUniverse {
    fn parent_of(&self, type_id: &str) -> Option<&str> {
        self.types.get(type_id).and_then(TypeDescriptor::parent)
    }
}

/// Staging area for a [`TypeUniverse`].
#[derive(Debug, Default)]
pub struct TypeUniverseBuilder {
    types: Vec<TypeDescriptor>,
}

impl TypeUniverseBuilder {
    /// Adds a type descriptor.
    #[must_use]
    pub fn add(mut self, descriptor: TypeDescriptor) -> Self {
        self.types.push(descriptor);
        self
    }

    /// Validates the staged types and produces the universe.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a type id is declared twice, a parent is unknown,
    /// a type extends a final type, or the hierarchy contains a cycle.
    pub fn build(self) -> Result<TypeUniverse> {
        let mut types = HashMap::with_capacity(self.types.len());
        for desc in self.types {
            let id = desc.id().to_string();
            if types.insert(id.clone(), desc).is_some() {
                return Err(config_error!("Type {} is declared more than once", id));
            }
        }

        let universe = TypeUniverse { types };
        for desc in universe.iter() {
            let Some(parent) = desc.parent() else {
                continue;
            };
            let parent_desc = universe.get(parent).ok_or_else(|| {
                config_error!("Type {} extends unknown type {}", desc.id(), parent)
            })?;
            if parent_desc.is_final() {
                return Err(config_error!(
                    "Type {} extends final type {}",
                    desc.id(),
                    parent
                ));
            }

            let mut visited = HashSet::new();
            let mut current = Some(desc.id());
            while let Some(type_id) = current {
                if !visited.insert(type_id) {
                    return Err(config_error!(
                        "Type hierarchy of {} contains a cycle",
                        desc.id()
                    ));
                }
                current = universe.parent_of(type_id);
            }
        }

        Ok(universe)
    }
}
