//! Value shapes and assignment compatibility.
//!
//! [`ValueKind`] is the static shape of a value: what a parameter declares and what an
//! argument looks like at a call site. The conversion rules here decide whether an argument
//! of one kind may be passed to a parameter of another, and at what cost. The cost is used
//! by loose signature matching to prefer the most specific candidate.
//!
//! # Conversion Costs
//!
//! | Conversion | Cost |
//! |------------|------|
//! | Identical kinds | 0 |
//! | Widening primitive (per step along `i8 < i16 < i32 < i64 < f32 < f64`) | 1 per step |
//! | `char` to `i32` and wider | 1 per step from `i32`, plus 1 |
//! | Boxing (`i32` to `Boxed(i32)`) | 1 |
//! | Unboxing, optionally followed by widening | 1 + widening |
//! | `null` to any reference kind | 1 |
//! | Object to ancestor type | 1 per hierarchy level |
//! | Reference to `Any` | 1 (2 for primitives, which box first) |

use std::fmt;

use strum::{Display, EnumIter, IntoStaticStr};

use crate::types::{ancestors, TypeHierarchy};

/// Primitive value categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Primitive {
    /// Boolean
    Bool,
    /// UTF-16 style character
    Char,
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
}

impl Primitive {
    /// Position on the numeric widening ladder, `None` for non-numeric primitives.
    fn numeric_rank(self) -> Option<u32> {
        match self {
            Primitive::I8 => Some(0),
            Primitive::I16 => Some(1),
            Primitive::I32 => Some(2),
            Primitive::I64 => Some(3),
            Primitive::F32 => Some(4),
            Primitive::F64 => Some(5),
            Primitive::Bool | Primitive::Char => None,
        }
    }

    /// Number of widening steps from `self` to `target`, `None` if not a widening.
    ///
    /// `char` joins the numeric ladder at `i32`. `bool` never widens.
    #[must_use]
    pub fn widening_steps(self, target: Primitive) -> Option<u32> {
        if self == target {
            return Some(0);
        }

        let target_rank = target.numeric_rank()?;
        match self {
            Primitive::Char => target_rank.checked_sub(2).map(|steps| steps + 1),
            Primitive::Bool => None,
            _ => {
                let from = self.numeric_rank()?;
                target_rank.checked_sub(from).filter(|steps| *steps > 0)
            }
        }
    }
}

/// The shape of a value as seen by signature matching.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    /// No value (void return)
    Void,
    /// The null reference; only produced by arguments, never declared
    Null,
    /// An unboxed primitive
    Primitive(Primitive),
    /// A boxed primitive
    Boxed(Primitive),
    /// A string reference
    String,
    /// An object reference of the given (fully qualified) type
    Object(String),
    /// Any reference; the root of the reference hierarchy
    Any,
}

impl ValueKind {
    /// Shorthand for `ValueKind::Primitive(Primitive::Bool)`.
    pub const BOOL: ValueKind = ValueKind::Primitive(Primitive::Bool);
    /// Shorthand for `ValueKind::Primitive(Primitive::Char)`.
    pub const CHAR: ValueKind = ValueKind::Primitive(Primitive::Char);
    /// Shorthand for `ValueKind::Primitive(Primitive::I8)`.
    pub const I8: ValueKind = ValueKind::Primitive(Primitive::I8);
    /// Shorthand for `ValueKind::Primitive(Primitive::I16)`.
    pub const I16: ValueKind = ValueKind::Primitive(Primitive::I16);
    /// Shorthand for `ValueKind::Primitive(Primitive::I32)`.
    pub const I32: ValueKind = ValueKind::Primitive(Primitive::I32);
    /// Shorthand for `ValueKind::Primitive(Primitive::I64)`.
    pub const I64: ValueKind = ValueKind::Primitive(Primitive::I64);
    /// Shorthand for `ValueKind::Primitive(Primitive::F32)`.
    pub const F32: ValueKind = ValueKind::Primitive(Primitive::F32);
    /// Shorthand for `ValueKind::Primitive(Primitive::F64)`.
    pub const F64: ValueKind = ValueKind::Primitive(Primitive::F64);

    /// Creates an object kind for the given type id.
    #[must_use]
    pub fn object(type_id: impl Into<String>) -> Self {
        ValueKind::Object(type_id.into())
    }

    /// Returns `true` for kinds that hold references (and can therefore be null).
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            ValueKind::Null
                | ValueKind::Boxed(_)
                | ValueKind::String
                | ValueKind::Object(_)
                | ValueKind::Any
        )
    }

    /// Computes the cost of passing an argument of kind `self` to a parameter of kind `param`.
    ///
    /// Returns `None` if the argument is not assignment-compatible with the parameter.
    /// See the module documentation for the cost table.
    ///
    /// # Arguments
    ///
    /// * `param` - The declared parameter kind
    /// * `hierarchy` - Type hierarchy used for object-to-ancestor conversions
    #[must_use]
    pub fn conversion_cost(&self, param: &ValueKind, hierarchy: &dyn TypeHierarchy) -> Option<u32> {
        if self == param {
            return Some(0);
        }

        match (self, param) {
            (ValueKind::Primitive(from), ValueKind::Primitive(to)) => from.widening_steps(*to),
            (ValueKind::Primitive(from), ValueKind::Boxed(to)) if from == to => Some(1),
            (ValueKind::Boxed(from), ValueKind::Primitive(to)) => {
                from.widening_steps(*to).map(|steps| steps + 1)
            }
            (ValueKind::Null, target) if target.is_reference() => Some(1),
            (ValueKind::Object(from), ValueKind::Object(to)) => ancestors(hierarchy, from)
                .position(|ancestor| ancestor == to.as_str())
                .and_then(|depth| u32::try_from(depth).ok()),
            (ValueKind::Primitive(_), ValueKind::Any) => Some(2),
            (ValueKind::Boxed(_) | ValueKind::String | ValueKind::Object(_), ValueKind::Any) => {
                Some(1)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Void => write!(f, "void"),
            ValueKind::Null => write!(f, "null"),
            ValueKind::Primitive(p) => write!(f, "{p}"),
            ValueKind::Boxed(p) => write!(f, "boxed<{p}>"),
            ValueKind::String => write!(f, "string"),
            ValueKind::Object(t) => write!(f, "{t}"),
            ValueKind::Any => write!(f, "any"),
        }
    }
}

/// Renders a parameter list as `(i32, string)`.
#[must_use]
pub fn render_params(params: &[ValueKind]) -> String {
    let rendered: Vec<String> = params.iter().map(ToString::to_string).collect();
    format!("({})", rendered.join(", "))
}
