//! # Compiled Schemas
//!
//! The compiler caches one [`SchemaNode`] per [`Location`]. A compile
//! request freezes the closure of its target into a [`SchemaGraph`]: an
//! arena of shared nodes plus an index from location to arena slot.
//! Children are referenced by location, so recursive schemas are ordinary
//! back edges in the arena.
//!
//! A [`CompiledSchema`] is a cheap handle (graph + slot). Graphs never
//! change once frozen, so handles are `Send + Sync` and validation needs
//! no locking.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use schemac_core::Location;

use crate::keywords::Keyword;
use crate::output::{ValidationFailure, ValidationMode};
use crate::validator::Validator;
use crate::vocabulary::Extension;

/// The compiled content of a schema location.
#[derive(Debug, Clone)]
pub enum SchemaBody {
    /// `true` accepts everything, `false` nothing.
    Bool(bool),
    /// Keyword constraints, in evaluation order.
    Keywords(Vec<Keyword>),
}

/// One compiled schema location.
#[derive(Debug)]
pub struct SchemaNode {
    pub location: Location,
    pub body: SchemaBody,
    /// Extensions attached at exactly this location, in vocabulary
    /// registration order.
    pub extensions: Vec<Extension>,
}

impl SchemaNode {
    /// Keyword constraints (empty for boolean schemas).
    pub fn keywords(&self) -> &[Keyword] {
        match &self.body {
            SchemaBody::Bool(_) => &[],
            SchemaBody::Keywords(keywords) => keywords,
        }
    }

    /// Child schema locations keyed by keyword path.
    pub fn child_schemas(&self) -> Vec<(String, &Location)> {
        self.keywords().iter().flat_map(Keyword::children).collect()
    }
}

/// A frozen closure of compiled nodes.
#[derive(Debug)]
pub struct SchemaGraph {
    nodes: Vec<Arc<SchemaNode>>,
    index: HashMap<Location, usize>,
}

impl SchemaGraph {
    pub(crate) fn new(nodes: Vec<Arc<SchemaNode>>, index: HashMap<Location, usize>) -> Self {
        Self { nodes, index }
    }

    /// Number of nodes in the closure.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true for an empty graph.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node in arena slot `index`.
    pub fn node(&self, index: usize) -> Option<&Arc<SchemaNode>> {
        self.nodes.get(index)
    }

    /// Arena slot of a location.
    pub fn index_of(&self, location: &Location) -> Option<usize> {
        self.index.get(location).copied()
    }

    pub(crate) fn nodes(&self) -> &[Arc<SchemaNode>] {
        &self.nodes
    }
}

/// Handle to a compiled schema inside a frozen graph.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    graph: Arc<SchemaGraph>,
    node: usize,
    mode: ValidationMode,
}

impl CompiledSchema {
    pub(crate) fn new(graph: Arc<SchemaGraph>, node: usize, mode: ValidationMode) -> Self {
        Self { graph, node, mode }
    }

    /// The node this handle points at.
    pub fn node(&self) -> &SchemaNode {
        &self.graph.nodes[self.node]
    }

    /// Location of the compiled schema.
    pub fn location(&self) -> &Location {
        &self.node().location
    }

    /// Extensions attached at this location. Not inherited from parents.
    pub fn extensions(&self) -> &[Extension] {
        &self.node().extensions
    }

    /// The graph this handle belongs to.
    pub fn graph(&self) -> &Arc<SchemaGraph> {
        &self.graph
    }

    /// Number of nodes in the frozen closure.
    pub fn node_count(&self) -> usize {
        self.graph.len()
    }

    /// The child schema at a keyword path such as `properties/name`.
    pub fn child(&self, keyword_path: &str) -> Option<CompiledSchema> {
        self.node()
            .child_schemas()
            .into_iter()
            .find(|(path, _)| path == keyword_path)
            .and_then(|(_, loc)| self.graph.index_of(loc))
            .map(|index| Self::new(Arc::clone(&self.graph), index, self.mode))
    }

    /// All child schemas, keyed by keyword path.
    pub fn child_schemas(&self) -> Vec<(String, CompiledSchema)> {
        self.node()
            .child_schemas()
            .into_iter()
            .filter_map(|(path, loc)| {
                let index = self.graph.index_of(loc)?;
                Some((path, Self::new(Arc::clone(&self.graph), index, self.mode)))
            })
            .collect()
    }

    /// Whether two handles point at the identical compiled node.
    pub fn ptr_eq(&self, other: &CompiledSchema) -> bool {
        Arc::ptr_eq(&self.graph.nodes[self.node], &other.graph.nodes[other.node])
    }

    /// Validate with the compiler's default mode.
    pub fn validate(&self, instance: &Value) -> Result<(), ValidationFailure> {
        self.validate_with(instance, self.mode)
    }

    /// Validate with an explicit mode.
    pub fn validate_with(&self, instance: &Value, mode: ValidationMode) -> Result<(), ValidationFailure> {
        let errors = Validator::new(&self.graph).validate(self.node, instance);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationFailure::new(errors, mode))
        }
    }

    /// Whether the instance is valid.
    pub fn is_valid(&self, instance: &Value) -> bool {
        Validator::new(&self.graph).validate(self.node, instance).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CompiledSchema>();
        assert_send_sync::<SchemaGraph>();
    }
}
