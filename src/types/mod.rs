//! Explicit description of the intercepted API surface.
//!
//! Interception works on a closed, declared set of types rather than on loaded code. Each
//! [`TypeDescriptor`] lists the fields and methods of one real type; a [`TypeUniverse`] holds
//! them all and answers hierarchy questions. Every call made by code under test names a type
//! and a method from this universe and is routed through the dispatcher of the active sandbox.
//!
//! # Key Components
//!
//! - [`TypeUniverse`] - Validated, immutable set of types
//! - [`TypeDescriptor`] - One type: parent, flags, fields, methods
//! - [`MethodDescriptor`] - One method: signature, modifiers, API window, optional body
//! - [`TypeHierarchy`] / [`ancestors`] - Parent walks used by lookup and signature matching

mod descriptor;
mod method;
mod universe;

pub use descriptor::{FieldDecl, TypeDescriptor, TypeFlags};
pub use method::{Call, MethodBody, MethodDescriptor, MethodModifiers, MethodRef, Receiver};
pub use universe::{ancestors, Ancestors, TypeHierarchy, TypeUniverse, TypeUniverseBuilder};

/// A platform API level.
pub type ApiLevel = u32;
