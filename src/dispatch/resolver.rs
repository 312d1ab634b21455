//! Candidate selection for shadow and original methods.
//!
//! Candidates come in groups, one per declaring type, searched in order. For shadows the
//! groups are the shadow followed by its parent shadows; for originals they are the runtime
//! type followed by its ancestors.
//!
//! Selection runs in two phases:
//!
//! 1. **Exact**: the first group declaring a method with the same name and identical parameter
//!    kinds wins.
//! 2. **Loose** (when enabled): every same-arity candidate whose parameters accept the
//!    arguments is scored by total conversion cost (see [`ValueKind::conversion_cost`]). The
//!    lowest cost wins; on equal cost the first declared candidate wins, counting the own
//!    group before parent groups.
//!
//! A winner whose signature is declared twice by the same type has no unique resolution and
//! yields [`Error::DispatchAmbiguity`].

use std::sync::Arc;

use crate::{
    dispatch::MethodHandle,
    types::{ancestors, ApiLevel, MethodDescriptor, MethodRef, TypeHierarchy, TypeUniverse},
    value::ValueKind,
    Error, Result,
};

/// Methods declared by one type, in declaration order.
pub(crate) type CandidateGroup<'a> = (&'a str, &'a [Arc<MethodDescriptor>]);

/// Returns the method groups of `type_id` and its ancestors, nearest first.
pub(crate) fn original_groups<'a>(
    universe: &'a TypeUniverse,
    type_id: &'a str,
) -> Vec<CandidateGroup<'a>> {
    ancestors(universe, type_id)
        .filter_map(|current| universe.get(current))
        .map(|desc| (desc.id(), desc.methods()))
        .collect()
}

/// Selection parameters shared by both phases.
pub(crate) struct Selector<'h> {
    pub hierarchy: &'h dyn TypeHierarchy,
    pub api_level: ApiLevel,
    pub is_static: bool,
    pub loose: bool,
}

impl Selector<'_> {
    /// Selects the method `wanted` resolves to among `groups`.
    ///
    /// # Arguments
    ///
    /// * `groups` - Candidate groups in search order
    /// * `wanted` - Method name and argument kinds of the call
    /// * `runtime_type` - Runtime type of the call, for error reporting
    ///
    /// # Errors
    ///
    /// Returns [`Error::DispatchAmbiguity`] if the winning signature is declared twice by the
    /// same type.
    pub fn select(
        &self,
        groups: &[CandidateGroup<'_>],
        wanted: &MethodRef,
        runtime_type: &str,
    ) -> Result<Option<MethodHandle>> {
        for &(owner, methods) in groups {
            if let Some(method) = self
                .candidates(methods, &wanted.name)
                .find(|m| m.param_kinds() == wanted.params.as_slice())
            {
                self.check_unique(owner, methods, method, runtime_type)?;
                return Ok(Some(MethodHandle::new(owner, method)));
            }
        }

        if !self.loose {
            return Ok(None);
        }

        let mut best: Option<(u32, &str, &Arc<MethodDescriptor>, &[Arc<MethodDescriptor>])> = None;
        for &(owner, methods) in groups {
            for method in self.candidates(methods, &wanted.name) {
                let Some(cost) = self.signature_cost(&wanted.params, method.param_kinds()) else {
                    continue;
                };
                if best.as_ref().map_or(true, |(best_cost, ..)| cost < *best_cost) {
                    best = Some((cost, owner, method, methods));
                }
            }
        }

        match best {
            Some((_, owner, method, methods)) => {
                self.check_unique(owner, methods, method, runtime_type)?;
                Ok(Some(MethodHandle::new(owner, method)))
            }
            None => Ok(None),
        }
    }

    fn candidates<'m>(
        &'m self,
        methods: &'m [Arc<MethodDescriptor>],
        name: &'m str,
    ) -> impl Iterator<Item = &'m Arc<MethodDescriptor>> + 'm {
        methods.iter().filter(move |m| {
            m.name() == name && m.is_static() == self.is_static && m.is_available_at(self.api_level)
        })
    }

    fn signature_cost(&self, args: &[ValueKind], params: &[ValueKind]) -> Option<u32> {
        if args.len() != params.len() {
            return None;
        }
        args.iter().zip(params).try_fold(0u32, |total, (arg, param)| {
            arg.conversion_cost(param, self.hierarchy)
                .map(|cost| total + cost)
        })
    }

    fn check_unique(
        &self,
        owner: &str,
        methods: &[Arc<MethodDescriptor>],
        winner: &Arc<MethodDescriptor>,
        runtime_type: &str,
    ) -> Result<()> {
        let duplicates: Vec<String> = self
            .candidates(methods, winner.name())
            .filter(|m| m.param_kinds() == winner.param_kinds())
            .map(|m| format!("{owner}::{}", m.signature()))
            .collect();

        if duplicates.len() > 1 {
            return Err(Error::DispatchAmbiguity {
                type_id: runtime_type.to_string(),
                method: winner.name().to_string(),
                candidates: duplicates,
            });
        }
        Ok(())
    }
}
