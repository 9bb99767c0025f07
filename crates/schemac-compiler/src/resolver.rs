//! # Reference Resolution
//!
//! Turns a reference (`identifier`, `identifier#/pointer`,
//! `identifier#anchor`) into a concrete [`Location`] inside a stored
//! document.
//!
//! ## Walk Semantics
//!
//! The pointer is walked one token at a time. When the current object has
//! no member for the next token but carries a `$ref`, the walk hops through
//! that reference and continues in its target. This is what lets a
//! meta-schema pointer such as
//! `/properties/components/properties/schemas/additionalProperties`
//! pass through `"components": {"$ref": "#/$defs/components"}`.
//!
//! After the last token, an object that is only a reference (a `$ref` or
//! `$dynamicRef` plus annotation keywords) is followed until a concrete
//! schema is reached.
//!
//! ## Cycles
//!
//! A location already on the caller's compile stack, or already visited
//! while following the current alias chain, is returned as is. That is the
//! forward-declared placeholder the compiler uses to close recursive
//! structures such as `{"$ref": "#"}`. Every hop counts against
//! `max_ref_hops`.

use serde_json::Value;
use tracing::trace;

use schemac_core::pointer::step;
use schemac_core::{
    join_reference, CompileError, Fragment, JsonPointer, Limit, Location, Reference, ResourceId,
};

use crate::store::ResourceStore;

/// Members a pure reference object may carry next to its reference.
const REFERENCE_ANNOTATIONS: &[&str] = &["$comment", "title", "description", "summary"];

/// Resolves references against a [`ResourceStore`].
pub struct Resolver<'s> {
    store: &'s ResourceStore,
    max_ref_hops: usize,
}

struct Walk<'a> {
    stack: &'a [Location],
    chain: Vec<Location>,
    hops: usize,
}

impl<'s> Resolver<'s> {
    /// Create a resolver over `store`.
    pub fn new(store: &'s ResourceStore, max_ref_hops: usize) -> Self {
        Self { store, max_ref_hops }
    }

    /// Resolve an absolute reference.
    ///
    /// `stack` holds the locations currently being compiled.
    pub fn resolve(&self, reference: &str, stack: &[Location]) -> Result<Location, CompileError> {
        let mut walk = Walk {
            stack,
            chain: Vec::new(),
            hops: 0,
        };
        self.resolve_absolute(reference, &mut walk)
    }

    /// Resolve `reference` as written at `from`, joining it against the
    /// base URI in effect there.
    ///
    /// Failures to find the target are reported as
    /// [`CompileError::DanglingRef`] located at `from`.
    pub fn resolve_from(
        &self,
        from: &Location,
        reference: &str,
        stack: &[Location],
    ) -> Result<Location, CompileError> {
        let mut walk = Walk {
            stack,
            chain: Vec::new(),
            hops: 0,
        };
        self.follow(from, reference, &mut walk)
    }

    /// Walk `pointer` starting at `base`, hopping through `$ref` where the
    /// document does not contain the next token.
    pub fn resolve_pointer(
        &self,
        base: &Location,
        pointer: &JsonPointer,
        stack: &[Location],
    ) -> Result<Location, CompileError> {
        let mut walk = Walk {
            stack,
            chain: Vec::new(),
            hops: 0,
        };
        let declared = Location::new(base.resource.clone(), base.pointer.concat(pointer));
        let reached = self.walk(base.clone(), pointer, &declared.to_string(), &mut walk)?;
        self.follow_aliases(reached, &mut walk)
    }

    fn resolve_absolute(&self, reference: &str, walk: &mut Walk<'_>) -> Result<Location, CompileError> {
        let parsed = Reference::parse(reference).map_err(|source| CompileError::InvalidReference {
            reference: reference.to_string(),
            source,
        })?;
        let start = self
            .store
            .lookup(&parsed.base)
            .ok_or_else(|| CompileError::ResourceNotFound {
                id: ResourceId::new(parsed.base.as_str()),
            })?;

        let reached = match &parsed.fragment {
            Fragment::Pointer(pointer) => self.walk(start, pointer, reference, walk)?,
            Fragment::Anchor(name) => self
                .store
                .anchor(&parsed.base, name)
                .cloned()
                .ok_or_else(|| CompileError::UnresolvableReference {
                    reference: reference.to_string(),
                    location: start,
                    reason: format!("no anchor named '{name}'"),
                })?,
        };
        self.follow_aliases(reached, walk)
    }

    /// Follow one reference written at `from`.
    fn follow(&self, from: &Location, reference: &str, walk: &mut Walk<'_>) -> Result<Location, CompileError> {
        walk.hops += 1;
        if walk.hops > self.max_ref_hops {
            return Err(CompileError::ResourceLimitExceeded {
                location: from.clone(),
                limit: Limit::RefHops,
                max: self.max_ref_hops,
            });
        }
        let base = self.store.base_uri_at(from);
        let absolute = join_reference(&base, reference);
        trace!(from = %from, reference, absolute = %absolute, "following reference");

        self.resolve_absolute(&absolute, walk).map_err(|err| match err {
            CompileError::ResourceNotFound { id } => CompileError::DanglingRef {
                location: from.clone(),
                reference: reference.to_string(),
                reason: format!("resource '{id}' not found"),
                missing_resource: true,
            },
            CompileError::UnresolvableReference { reason, .. } => CompileError::DanglingRef {
                location: from.clone(),
                reference: reference.to_string(),
                reason,
                missing_resource: false,
            },
            CompileError::InvalidReference { source, .. } => CompileError::DanglingRef {
                location: from.clone(),
                reference: reference.to_string(),
                reason: source.to_string(),
                missing_resource: false,
            },
            other => other,
        })
    }

    fn walk(
        &self,
        start: Location,
        pointer: &JsonPointer,
        reference: &str,
        walk: &mut Walk<'_>,
    ) -> Result<Location, CompileError> {
        let mut current = start;
        for token in pointer.tokens() {
            loop {
                let value = self.value(&current, reference)?;
                if step(value, token).is_some() {
                    current = current.join(token.as_str());
                    break;
                }
                match value.get("$ref").and_then(Value::as_str) {
                    Some(next) => {
                        trace!(at = %current, token = %token, "hopping through $ref during pointer walk");
                        current = self.follow(&current, next, walk)?;
                    }
                    None => {
                        return Err(CompileError::UnresolvableReference {
                            reference: reference.to_string(),
                            location: current,
                            reason: format!("no member '{token}'"),
                        })
                    }
                }
            }
        }
        Ok(current)
    }

    /// Follow pure reference objects until a concrete schema is reached.
    fn follow_aliases(&self, mut current: Location, walk: &mut Walk<'_>) -> Result<Location, CompileError> {
        loop {
            if walk.stack.contains(&current) || walk.chain.contains(&current) {
                return Ok(current);
            }
            let Some(next) = self.store.value_at(&current).and_then(pure_reference) else {
                return Ok(current);
            };
            walk.chain.push(current.clone());
            let next = next.to_string();
            current = self.follow(&current, &next, walk)?;
        }
    }

    fn value(&self, location: &Location, reference: &str) -> Result<&'s Value, CompileError> {
        self.store
            .value_at(location)
            .ok_or_else(|| CompileError::UnresolvableReference {
                reference: reference.to_string(),
                location: location.clone(),
                reason: "location does not exist".to_string(),
            })
    }
}

/// The reference of an object that is nothing but a reference.
fn pure_reference(value: &Value) -> Option<&str> {
    let map = value.as_object()?;
    let mut reference = None;
    for (key, member) in map {
        match key.as_str() {
            "$ref" | "$dynamicRef" if reference.is_none() => reference = Some(member.as_str()?),
            k if REFERENCE_ANNOTATIONS.contains(&k) => {}
            _ => return None,
        }
    }
    reference
}
