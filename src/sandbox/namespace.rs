//! Sandbox-private statics, shadow state and object heap.
//!
//! Every mutable piece of state that code under test can reach lives here: static fields of
//! the intercepted types, state kept by shadows, and the instances created during a task.
//!
//! # Copy-on-Write Statics
//!
//! Static fields are held in an `imbl::HashMap`. Loading the namespace builds a template from
//! the declared initial values once; the live map starts as a clone of it. Resetting swaps the
//! template back in, an O(1) operation thanks to structural sharing, no matter how many types
//! were loaded.
//!
//! # Generations
//!
//! The heap carries a generation counter that advances on every reset. Object handles record
//! the generation they were created in, and handles from an older generation are rejected.

use std::collections::{BTreeMap, HashMap};

use imbl::HashMap as ImHashMap;
use parking_lot::RwLock;

use crate::{
    types::TypeUniverse,
    value::{ObjectRef, Value},
    Error, Result,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct StaticKey {
    type_id: String,
    field: String,
}

impl StaticKey {
    fn new(type_id: &str, field: &str) -> Self {
        Self {
            type_id: type_id.to_string(),
            field: field.to_string(),
        }
    }
}

#[derive(Debug)]
struct HeapObject {
    type_id: String,
    fields: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct Heap {
    generation: u64,
    next_id: u64,
    objects: HashMap<u64, HeapObject>,
}

impl Heap {
    fn object(&self, obj: ObjectRef) -> Result<&HeapObject> {
        self.check(obj)?;
        self.objects
            .get(&obj.id)
            .ok_or(Error::InvalidReference(obj.id))
    }

    fn object_mut(&mut self, obj: ObjectRef) -> Result<&mut HeapObject> {
        self.check(obj)?;
        self.objects
            .get_mut(&obj.id)
            .ok_or(Error::InvalidReference(obj.id))
    }

    fn check(&self, obj: ObjectRef) -> Result<()> {
        if obj.generation != self.generation {
            return Err(Error::StaleReference {
                id: obj.id,
                generation: obj.generation,
                current: self.generation,
            });
        }
        Ok(())
    }
}

/// Isolated mutable state of one sandbox.
///
/// Outside the crate the namespace is read-only; it changes only through an
/// [`ExecutionContext`](crate::ExecutionContext) or a reset.
#[derive(Debug, Default)]
pub struct Namespace {
    template: ImHashMap<StaticKey, Value>,
    loaded_types: usize,
    statics: RwLock<ImHashMap<StaticKey, Value>>,
    shadow_statics: RwLock<HashMap<(String, String), Value>>,
    heap: RwLock<Heap>,
}

impl Namespace {
    /// Creates an empty, unloaded namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the declared statics of every type in `universe` as the reset template.
    ///
    /// Returns the number of types loaded.
    pub(crate) fn load(&mut self, universe: &TypeUniverse) -> usize {
        let mut template = ImHashMap::new();
        for desc in universe.iter() {
            for field in desc.static_fields() {
                template.insert(StaticKey::new(desc.id(), &field.name), field.initial.clone());
            }
        }

        self.loaded_types = universe.len();
        *self.statics.get_mut() = template.clone();
        self.template = template;
        self.loaded_types
    }

    /// Returns the number of types the template was built from.
    #[must_use]
    pub fn loaded_types(&self) -> usize {
        self.loaded_types
    }

    /// Returns the current value of a static field, `None` if it is not declared.
    #[must_use]
    pub fn get_static(&self, type_id: &str, field: &str) -> Option<Value> {
        self.statics.read().get(&StaticKey::new(type_id, field)).cloned()
    }

    /// Writes a declared static field. Returns `false` if the field is not declared.
    pub(crate) fn set_static(&self, type_id: &str, field: &str, value: Value) -> bool {
        let key = StaticKey::new(type_id, field);
        let mut statics = self.statics.write();
        match statics.get_mut(&key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Returns a value stored by a shadow.
    #[must_use]
    pub fn shadow_static(&self, shadow_id: &str, key: &str) -> Option<Value> {
        self.shadow_statics
            .read()
            .get(&(shadow_id.to_string(), key.to_string()))
            .cloned()
    }

    /// Stores a value on behalf of a shadow until the next reset.
    pub(crate) fn set_shadow_static(&self, shadow_id: &str, key: &str, value: Value) {
        self.shadow_statics
            .write()
            .insert((shadow_id.to_string(), key.to_string()), value);
    }

    /// Allocates an object in the current generation.
    pub(crate) fn alloc(&self, type_id: &str, fields: BTreeMap<String, Value>) -> ObjectRef {
        let mut heap = self.heap.write();
        heap.next_id += 1;
        let obj = ObjectRef::new(heap.next_id, heap.generation);
        heap.objects.insert(
            obj.id,
            HeapObject {
                type_id: type_id.to_string(),
                fields,
            },
        );
        obj
    }

    /// Returns the runtime type of an object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleReference`] for handles from an earlier generation and
    /// [`Error::InvalidReference`] for unknown handles.
    pub fn object_type(&self, obj: ObjectRef) -> Result<String> {
        Ok(self.heap.read().object(obj)?.type_id.clone())
    }

    /// Reads an instance field.
    ///
    /// # Errors
    ///
    /// As [`object_type`](Self::object_type), plus [`Error::FieldNotFound`].
    pub fn get_field(&self, obj: ObjectRef, field: &str) -> Result<Value> {
        let heap = self.heap.read();
        let object = heap.object(obj)?;
        object
            .fields
            .get(field)
            .cloned()
            .ok_or_else(|| Error::FieldNotFound {
                type_id: object.type_id.clone(),
                field: field.to_string(),
            })
    }

    /// Writes an instance field.
    ///
    /// # Errors
    ///
    /// As [`object_type`](Self::object_type), plus [`Error::FieldNotFound`].
    pub(crate) fn set_field(&self, obj: ObjectRef, field: &str, value: Value) -> Result<()> {
        let mut heap = self.heap.write();
        let object = heap.object_mut(obj)?;
        match object.fields.get_mut(field) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::FieldNotFound {
                type_id: object.type_id.clone(),
                field: field.to_string(),
            }),
        }
    }

    /// Returns the current heap generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.heap.read().generation
    }

    /// Returns the number of live objects.
    #[must_use]
    pub fn live_objects(&self) -> usize {
        self.heap.read().objects.len()
    }

    /// Restores the declared initial state and advances the heap generation.
    pub(crate) fn reset(&self) {
        *self.statics.write() = self.template.clone();
        self.shadow_statics.write().clear();

        let mut heap = self.heap.write();
        heap.generation += 1;
        heap.next_id = 0;
        heap.objects.clear();
    }

    /// Describes every way the namespace differs from its declared initial state.
    ///
    /// Empty right after a successful [`reset`](Self::reset).
    #[must_use]
    pub fn pristine_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        let statics = self.statics.read();
        if !statics.ptr_eq(&self.template) {
            for (key, initial) in &self.template {
                if statics.get(key) != Some(initial) {
                    violations.push(format!(
                        "static {}.{} differs from its initial value",
                        key.type_id, key.field
                    ));
                }
            }
            if statics.len() != self.template.len() {
                violations.push("static field set differs from the template".to_string());
            }
        }

        let shadow_statics = self.shadow_statics.read().len();
        if shadow_statics > 0 {
            violations.push(format!("{shadow_statics} shadow statics survived"));
        }

        let objects = self.live_objects();
        if objects > 0 {
            violations.push(format!("{objects} objects survived"));
        }

        violations
    }

    /// Returns `true` if the namespace is in its declared initial state.
    #[must_use]
    pub fn is_pristine(&self) -> bool {
        self.pristine_violations().is_empty()
    }

    /// Drops all state, including the template.
    pub(crate) fn clear(&mut self) {
        self.template = ImHashMap::new();
        self.loaded_types = 0;
        *self.statics.get_mut() = ImHashMap::new();
        self.shadow_statics.get_mut().clear();
        self.heap.get_mut().objects.clear();
    }
}
