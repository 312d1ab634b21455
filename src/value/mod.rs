//! Runtime value representation.
//!
//! Every intercepted call carries its arguments and result as [`Value`]s. The static shape
//! of a value, used by signature matching, is a [`ValueKind`].
//!
//! # Key Components
//!
//! - [`Value`] - A runtime value (primitives, strings, boxes, object handles)
//! - [`ValueKind`] - The shape of a value as declared by a parameter or seen at a call site
//! - [`Primitive`] - Primitive categories and the numeric widening ladder
//! - [`ObjectRef`] - Generation-tagged handle into a sandbox heap

mod kind;
mod values;

pub use kind::{render_params, Primitive, ValueKind};
pub use values::{ObjectRef, Value};
