//! Runtime values passed to and returned from intercepted calls.

use std::{fmt, sync::Arc};

use crate::value::{Primitive, ValueKind};

/// Handle to an object living in a sandbox heap.
///
/// Handles carry the heap generation they were created in. After a sandbox reset the
/// generation advances and every older handle is rejected, so an object smuggled out of
/// one test cannot be observed by the next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// Heap-unique object id
    pub id: u64,
    /// Heap generation the object was allocated in
    pub generation: u64,
}

impl ObjectRef {
    /// Creates a handle from its raw parts.
    #[must_use]
    pub const fn new(id: u64, generation: u64) -> Self {
        Self { id, generation }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.id, self.generation)
    }
}

/// A runtime value.
///
/// Values are cheap to clone: strings are reference counted and objects are handles.
///
/// # Examples
///
/// ```rust
/// use shadowbox::{Value, ValueKind};
///
/// assert_eq!(Value::I32(7).kind(), ValueKind::I32);
/// assert_eq!(Value::default_for(&ValueKind::BOOL), Value::Bool(false));
/// assert_eq!(Value::default_for(&ValueKind::String), Value::Null);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// No value (void return)
    Void,
    /// The null reference
    Null,
    /// Boolean
    Bool(bool),
    /// Character
    Char(char),
    /// 8-bit signed integer
    I8(i8),
    /// 16-bit signed integer
    I16(i16),
    /// 32-bit signed integer
    I32(i32),
    /// 64-bit signed integer
    I64(i64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// String reference
    Str(Arc<str>),
    /// Boxed primitive
    Boxed(Box<Value>),
    /// Object reference into the sandbox heap
    Object(ObjectRef),
}

impl Value {
    /// Creates a string value.
    #[must_use]
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Boxes a primitive value.
    #[must_use]
    pub fn boxed(value: Value) -> Self {
        Value::Boxed(Box::new(value))
    }

    /// Returns the type-appropriate default for a declared kind.
    ///
    /// Zero for numeric primitives, `false` for booleans, `'\0'` for characters, [`Value::Void`]
    /// for void and [`Value::Null`] for every reference kind. This is what a stubbed (no-op)
    /// call returns.
    #[must_use]
    pub fn default_for(kind: &ValueKind) -> Self {
        match kind {
            ValueKind::Void => Value::Void,
            ValueKind::Primitive(p) => match p {
                Primitive::Bool => Value::Bool(false),
                Primitive::Char => Value::Char('\0'),
                Primitive::I8 => Value::I8(0),
                Primitive::I16 => Value::I16(0),
                Primitive::I32 => Value::I32(0),
                Primitive::I64 => Value::I64(0),
                Primitive::F32 => Value::F32(0.0),
                Primitive::F64 => Value::F64(0.0),
            },
            ValueKind::Null
            | ValueKind::Boxed(_)
            | ValueKind::String
            | ValueKind::Object(_)
            | ValueKind::Any => Value::Null,
        }
    }

    /// Returns the primitive category of an unboxed primitive value.
    #[must_use]
    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            Value::Bool(_) => Some(Primitive::Bool),
            Value::Char(_) => Some(Primitive::Char),
            Value::I8(_) => Some(Primitive::I8),
            Value::I16(_) => Some(Primitive::I16),
            Value::I32(_) => Some(Primitive::I32),
            Value::I64(_) => Some(Primitive::I64),
            Value::F32(_) => Some(Primitive::F32),
            Value::F64(_) => Some(Primitive::F64),
            _ => None,
        }
    }

    /// Returns the shape of this value without consulting a heap.
    ///
    /// Objects report [`ValueKind::Any`] here because their runtime type lives in the sandbox
    /// heap; use [`ExecutionContext::kind_of`](crate::ExecutionContext::kind_of) to get the
    /// precise object kind. A box around a non-primitive also reports `Any`.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        if let Some(p) = self.primitive() {
            return ValueKind::Primitive(p);
        }

        match self {
            Value::Void => ValueKind::Void,
            Value::Null => ValueKind::Null,
            Value::Str(_) => ValueKind::String,
            Value::Boxed(inner) => inner.primitive().map_or(ValueKind::Any, ValueKind::Boxed),
            _ => ValueKind::Any,
        }
    }

    /// Returns the contained `i32`, if this is one.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the contained `i64`, if this is one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the contained boolean, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the contained string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(&**s),
            _ => None,
        }
    }

    /// Returns the contained object handle, if this is one.
    #[must_use]
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(r) => Some(*r),
            _ => None,
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "'{v}'"),
            Value::I8(v) => write!(f, "{v}i8"),
            Value::I16(v) => write!(f, "{v}i16"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}L"),
            Value::F32(v) => write!(f, "{v}f"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Boxed(inner) => write!(f, "box({inner})"),
            Value::Object(r) => write!(f, "{r}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}
