//! Shadow types and the registry that binds them to real types.
//!
//! A [`ShadowType`] is a substitute implementation for one real type. A [`ShadowConfig`] binds
//! it to a real type id with a dispatch policy, and a [`ShadowRegistry`] is the immutable map
//! of all such bindings in effect for a test. Registries are assembled by a
//! [`ShadowRegistryBuilder`] from [`ShadowProvider`]s and local overrides.
//!
//! # Precedence
//!
//! Base providers are installed first, then custom providers, then local overrides. For an
//! identical real type id the later installation wins.
//!
//! # Invalidated Sets
//!
//! [`ShadowRegistry::invalidated_set`] reports exactly the real type ids whose binding differs
//! between two registries. Swapping registries in a sandbox purges only the dispatch decisions
//! that depended on those ids.

mod config;
mod provider;
mod registry;
mod shadowtype;

pub use config::ShadowConfig;
pub use provider::{ProviderTier, ShadowProvider, StaticShadowProvider};
pub use registry::{ShadowLookup, ShadowRegistry, ShadowRegistryBuilder};
pub use shadowtype::{Resetter, ShadowType};
