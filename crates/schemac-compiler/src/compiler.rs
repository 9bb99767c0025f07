//! # Compiler
//!
//! Orchestrates the [`ResourceStore`], the [`Resolver`] and the vocabulary
//! registry to turn a reference into a frozen [`CompiledSchema`].
//!
//! ## Per-Location State Machine
//!
//! ```text
//! Unvisited --> Compiling --> Compiled
//!                   |
//!                   +-------> Failed
//! ```
//!
//! A `Compiling` placeholder is installed before any child is visited, so
//! a reference back to a location in progress terminates and becomes a
//! back edge in the graph. Failures are cached, except those that depend
//! on how the location was reached (resource limits) or that adding a
//! resource can fix (missing resources); those reset to `Unvisited`.
//!
//! ## Error Scoping
//!
//! Only the closure of the requested reference is compiled. `$defs`,
//! `definitions` and unknown keywords are never visited unless something
//! in the closure references them, so an invalid region of a document
//! fails exactly the compiles that reach it.
//!
//! ## Concurrency
//!
//! All mutation happens under one `parking_lot::Mutex`. Two threads
//! compiling the same reference are serialized and the second one gets
//! the graph the first one froze. Compiled graphs are immutable and are
//! validated without locking.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use schemac_core::{CompileError, Dialect, Limit, Location, ResourceId};

use crate::keywords::{self, type_name};
use crate::loader::{self, DocumentFormat, LoadError};
use crate::options::CompilerOptions;
use crate::output::ValidationMode;
use crate::resolver::Resolver;
use crate::schema::{CompiledSchema, SchemaBody, SchemaGraph, SchemaNode};
use crate::store::ResourceStore;
use crate::vocabulary::{
    Applicability, CompileContext, Extension, Vocabulary, VocabularyCompiler, VocabularyRegistry,
};

/// Counters describing the work a compiler has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompileStats {
    /// Schema nodes built.
    pub nodes_compiled: usize,
    /// Requests answered from the node or graph cache.
    pub cache_hits: usize,
    /// Graphs frozen for compile requests.
    pub graphs_frozen: usize,
    /// Failures recorded in the cache.
    pub failures_cached: usize,
}

#[derive(Debug)]
enum Entry {
    Compiling,
    Compiled(Arc<SchemaNode>),
    Failed(CompileError),
}

#[derive(Debug, Default)]
struct CompilerState {
    store: ResourceStore,
    registry: VocabularyRegistry,
    cache: HashMap<Location, Entry>,
    graphs: HashMap<Location, Arc<SchemaGraph>>,
    stats: CompileStats,
}

/// Compiles schema references into validator graphs.
///
/// A `Compiler` is `Send + Sync`; share it through `Arc` to compile from
/// several threads.
#[derive(Debug, Default)]
pub struct Compiler {
    options: CompilerOptions,
    state: Mutex<CompilerState>,
}

impl Compiler {
    /// A compiler with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// A compiler with explicit options.
    pub fn with_options(options: CompilerOptions) -> Self {
        Self {
            options,
            state: Mutex::new(CompilerState::default()),
        }
    }

    /// The options this compiler was built with.
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Store a parsed document under `identifier`. Compiles nothing.
    pub fn add_resource(&self, identifier: &str, document: Value) -> Result<(), CompileError> {
        self.state.lock().store.add(ResourceId::new(identifier), document)
    }

    /// Parse JSON or YAML text and store it under `identifier`.
    pub fn add_resource_text(
        &self,
        identifier: &str,
        text: &str,
        format: DocumentFormat,
    ) -> Result<(), CompileError> {
        let document = loader::parse_document(identifier, text, format)
            .map_err(|e| malformed(identifier, e))?;
        self.add_resource(identifier, document)
    }

    /// Load a file and store it under its path.
    pub fn add_resource_file(&self, path: &Path) -> Result<ResourceId, CompileError> {
        let identifier = path.display().to_string();
        self.add_resource_file_as(path, &identifier)
    }

    /// Load a file and store it under an explicit identifier.
    pub fn add_resource_file_as(&self, path: &Path, identifier: &str) -> Result<ResourceId, CompileError> {
        let document = loader::read_document(path).map_err(|e| malformed(identifier, e))?;
        self.add_resource(identifier, document)?;
        Ok(ResourceId::new(identifier))
    }

    /// Compile a reference (`identifier`, `identifier#/pointer` or
    /// `identifier#anchor`).
    ///
    /// Repeated requests for the same location return the graph frozen by
    /// the first successful request without compiling anything.
    pub fn compile(&self, reference: &str) -> Result<CompiledSchema, CompileError> {
        let mut state = self.state.lock();
        let location = Resolver::new(&state.store, self.options.max_ref_hops).resolve(reference, &[])?;
        debug!(reference, location = %location, "compile requested");
        state.compile_graph(&self.options, location)
    }

    /// Register a custom vocabulary bound to `meta_schema`.
    ///
    /// Each rule's meta-schema fragment is resolved and compiled now, so a
    /// bad fragment pointer fails registration. Registering a name that
    /// already exists replaces that vocabulary. Nodes compiled earlier are
    /// not affected.
    pub fn register_extension<C>(
        &self,
        name: &str,
        meta_schema: &CompiledSchema,
        compiler: C,
        applicability: Applicability,
    ) -> Result<(), CompileError>
    where
        C: VocabularyCompiler + 'static,
    {
        let mut state = self.state.lock();
        let meta = meta_schema.location().clone();

        let mut fragments = Vec::with_capacity(applicability.rules.len());
        for rule in &applicability.rules {
            let declared = Location::new(meta.resource.clone(), meta.pointer.concat(&rule.meta_pointer));
            let target = Resolver::new(&state.store, self.options.max_ref_hops).resolve_pointer(
                &meta,
                &rule.meta_pointer,
                &[],
            )?;
            let compiled = state.compile_graph(&self.options, target)?;
            debug!(
                vocabulary = name,
                pattern = %rule.pattern,
                fragment = %compiled.location(),
                "meta-schema fragment compiled"
            );
            fragments.push((declared, compiled));
        }

        info!(vocabulary = name, meta_schema = %meta, rules = fragments.len(), "vocabulary registered");
        state.registry.register(Vocabulary {
            name: Arc::from(name),
            compiler: Arc::new(compiler),
            applicability,
            fragments,
        });
        Ok(())
    }

    /// Snapshot of the compiler's counters.
    pub fn stats(&self) -> CompileStats {
        self.state.lock().stats
    }

    /// Number of registered vocabularies.
    pub fn vocabulary_count(&self) -> usize {
        self.state.lock().registry.len()
    }
}

fn malformed(identifier: &str, err: LoadError) -> CompileError {
    CompileError::MalformedDocument {
        id: ResourceId::new(identifier),
        reason: err.to_string(),
    }
}

impl CompilerState {
    fn compile_graph(&mut self, opts: &CompilerOptions, location: Location) -> Result<CompiledSchema, CompileError> {
        if let Some(graph) = self.graphs.get(&location) {
            self.stats.cache_hits += 1;
            debug!(location = %location, "graph cache hit");
            return Ok(CompiledSchema::new(Arc::clone(graph), 0, opts.default_mode));
        }

        self.compile_location(opts, &location, &mut Vec::new())?;
        let graph = self.freeze(opts, &location)?;
        if opts.reject_unguarded_cycles {
            check_cycles(&graph)?;
        }

        self.stats.graphs_frozen += 1;
        debug!(location = %location, nodes = graph.len(), "graph frozen");
        self.graphs.insert(location, Arc::clone(&graph));
        Ok(CompiledSchema::new(graph, 0, opts.default_mode))
    }

    fn compile_location(
        &mut self,
        opts: &CompilerOptions,
        location: &Location,
        stack: &mut Vec<Location>,
    ) -> Result<(), CompileError> {
        match self.cache.get(location) {
            Some(Entry::Compiled(_)) => {
                self.stats.cache_hits += 1;
                return Ok(());
            }
            // A back edge to a location in progress.
            Some(Entry::Compiling) => return Ok(()),
            Some(Entry::Failed(err)) => return Err(err.clone()),
            None => {}
        }

        if stack.len() >= opts.max_depth {
            return Err(CompileError::ResourceLimitExceeded {
                location: location.clone(),
                limit: Limit::Depth,
                max: opts.max_depth,
            });
        }
        if self.stats.nodes_compiled >= opts.max_nodes {
            return Err(CompileError::ResourceLimitExceeded {
                location: location.clone(),
                limit: Limit::Nodes,
                max: opts.max_nodes,
            });
        }

        self.cache.insert(location.clone(), Entry::Compiling);
        stack.push(location.clone());
        let result = self.build_node(opts, location, stack);
        stack.pop();

        match result {
            Ok(node) => {
                self.stats.nodes_compiled += 1;
                debug!(location = %location, extensions = node.extensions.len(), "schema node compiled");
                self.cache.insert(location.clone(), Entry::Compiled(Arc::new(node)));
                Ok(())
            }
            Err(err) if err.is_cacheable() => {
                if err.location() == Some(location) {
                    warn!(location = %location, error = %err, "schema location failed to compile");
                }
                self.stats.failures_cached += 1;
                self.cache.insert(location.clone(), Entry::Failed(err.clone()));
                Err(err)
            }
            Err(err) => {
                debug!(location = %location, error = %err, "transient compile failure, not cached");
                self.cache.remove(location);
                Err(err)
            }
        }
    }

    /// Keywords, children, extensions, node.
    fn build_node(
        &mut self,
        opts: &CompilerOptions,
        location: &Location,
        stack: &mut Vec<Location>,
    ) -> Result<SchemaNode, CompileError> {
        let resource = self.store.get(&location.resource)?;
        let document = Arc::clone(&resource.root);
        let dialect = resource.dialect.clone();

        let value = location
            .pointer
            .lookup(&document)
            .ok_or_else(|| CompileError::UnresolvableReference {
                reference: location.to_string(),
                location: location.clone(),
                reason: "location does not exist".to_string(),
            })?;
        let map = match value {
            Value::Bool(b) => {
                return Ok(SchemaNode {
                    location: location.clone(),
                    body: SchemaBody::Bool(*b),
                    extensions: Vec::new(),
                })
            }
            Value::Object(map) => map,
            other => {
                return Err(CompileError::NotASchema {
                    location: location.clone(),
                    found: type_name(other).to_string(),
                })
            }
        };

        let keywords = {
            let resolver = Resolver::new(&self.store, opts.max_ref_hops);
            let active: &[Location] = stack;
            keywords::extract(location, map, &dialect, |reference| {
                resolver.resolve_from(location, reference, active)
            })?
        };

        let children: Vec<Location> = keywords
            .iter()
            .flat_map(|k| k.children().into_iter().map(|(_, loc)| loc.clone()))
            .collect();
        for child in &children {
            self.compile_location(opts, child, stack)?;
        }

        let extensions = self.compile_extensions(location, value, map, &document, &dialect)?;

        Ok(SchemaNode {
            location: location.clone(),
            body: SchemaBody::Keywords(keywords),
            extensions,
        })
    }

    fn compile_extensions(
        &mut self,
        location: &Location,
        value: &Value,
        map: &Map<String, Value>,
        document: &Value,
        dialect: &Dialect,
    ) -> Result<Vec<Extension>, CompileError> {
        let applicable = self.registry.applicable(location, document);
        let mut extensions = Vec::with_capacity(applicable.len());

        for (vocabulary_index, rule_index) in applicable {
            let Some(vocabulary) = self.registry.get(vocabulary_index) else {
                continue;
            };
            let Some((meta_location, fragment)) = vocabulary.fragments.get(rule_index) else {
                continue;
            };

            if let Err(failure) = fragment.validate_with(value, ValidationMode::CollectAll) {
                return Err(CompileError::MetaSchemaViolation {
                    location: location.clone(),
                    vocabulary: vocabulary.name.to_string(),
                    meta_location: meta_location.clone(),
                    violations: failure.violations(),
                });
            }

            let ctx = CompileContext {
                location,
                vocabulary: &vocabulary.name,
                meta_location,
                dialect,
                document,
            };
            match vocabulary.compiler.compile(&ctx, map) {
                Ok(Some(extension)) => {
                    debug!(location = %location, vocabulary = %vocabulary.name, "extension attached");
                    extensions.push(Extension {
                        vocabulary: Arc::clone(&vocabulary.name),
                        value: extension,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(CompileError::ExtensionCompileError {
                        location: location.clone(),
                        vocabulary: vocabulary.name.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }
        Ok(extensions)
    }

    /// Collect the closure of `root` into an arena, compiling any location
    /// not yet compiled and surfacing any cached failure.
    fn freeze(&mut self, opts: &CompilerOptions, root: &Location) -> Result<Arc<SchemaGraph>, CompileError> {
        let mut order = vec![root.clone()];
        let mut index = HashMap::from([(root.clone(), 0)]);
        let mut nodes = Vec::new();

        let mut next = 0;
        while next < order.len() {
            let location = order[next].clone();
            next += 1;
            let node = self.compiled_node(opts, &location)?;
            for (_, child) in node.child_schemas() {
                if !index.contains_key(child) {
                    index.insert(child.clone(), order.len());
                    order.push(child.clone());
                }
            }
            nodes.push(node);
        }
        Ok(Arc::new(SchemaGraph::new(nodes, index)))
    }

    fn compiled_node(&mut self, opts: &CompilerOptions, location: &Location) -> Result<Arc<SchemaNode>, CompileError> {
        if !matches!(self.cache.get(location), Some(Entry::Compiled(_))) {
            self.compile_location(opts, location, &mut Vec::new())?;
        }
        match self.cache.get(location) {
            Some(Entry::Compiled(node)) => Ok(Arc::clone(node)),
            Some(Entry::Failed(err)) => Err(err.clone()),
            _ => Err(CompileError::UnresolvableReference {
                reference: location.to_string(),
                location: location.clone(),
                reason: "location was not compiled".to_string(),
            }),
        }
    }
}

/// Reject cycles made only of in-place applicator edges.
fn check_cycles(graph: &SchemaGraph) -> Result<(), CompileError> {
    const WHITE: u8 = 0;
    const GREY: u8 = 1;
    const BLACK: u8 = 2;

    let nodes = graph.nodes();
    let edges: Vec<Vec<usize>> = nodes
        .iter()
        .map(|node| {
            node.keywords()
                .iter()
                .filter(|k| k.is_in_place())
                .flat_map(|k| k.children())
                .filter_map(|(_, loc)| graph.index_of(loc))
                .collect()
        })
        .collect();

    let mut color = vec![WHITE; nodes.len()];
    for start in 0..nodes.len() {
        if color[start] != WHITE {
            continue;
        }
        color[start] = GREY;
        let mut path: Vec<(usize, usize)> = vec![(start, 0)];
        while let Some(top) = path.last_mut() {
            let (node, edge) = *top;
            if edge >= edges[node].len() {
                color[node] = BLACK;
                path.pop();
                continue;
            }
            top.1 += 1;
            let target = edges[node][edge];
            match color[target] {
                WHITE => {
                    color[target] = GREY;
                    path.push((target, 0));
                }
                GREY => {
                    let from = path.iter().position(|(n, _)| *n == target).unwrap_or(0);
                    let mut cycle: Vec<String> = path[from..]
                        .iter()
                        .map(|(n, _)| nodes[*n].location.to_string())
                        .collect();
                    cycle.push(nodes[target].location.to_string());
                    return Err(CompileError::CyclicSchemaWithoutBase {
                        location: nodes[target].location.clone(),
                        cycle: cycle.join(" -> "),
                    });
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiler_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Compiler>();
    }

    #[test]
    fn compiles_only_the_referenced_closure() {
        let compiler = Compiler::new();
        compiler
            .add_resource(
                "doc.json",
                json!({
                    "$defs": {
                        "good": {"type": "string"},
                        "bad": {"type": "strnig"}
                    }
                }),
            )
            .unwrap();
        let good = compiler.compile("doc.json#/$defs/good").unwrap();
        assert_eq!(good.node_count(), 1);
        // The root never visits $defs.
        assert!(compiler.compile("doc.json").is_ok());
        assert!(matches!(
            compiler.compile("doc.json#/$defs/bad"),
            Err(CompileError::InvalidKeyword { .. })
        ));
    }

    #[test]
    fn failures_are_cached() {
        let compiler = Compiler::new();
        compiler.add_resource("doc.json", json!({"minLength": -1})).unwrap();
        assert!(compiler.compile("doc.json").is_err());
        let stats = compiler.stats();
        assert_eq!(stats.failures_cached, 1);
        assert!(compiler.compile("doc.json").is_err());
        assert_eq!(compiler.stats().failures_cached, 1);
    }

    #[test]
    fn missing_resource_is_retried_after_adding_it() {
        let compiler = Compiler::new();
        compiler
            .add_resource("a.json", json!({"properties": {"b": {"$ref": "b.json"}}}))
            .unwrap();
        match compiler.compile("a.json") {
            Err(CompileError::DanglingRef { missing_resource, .. }) => assert!(missing_resource),
            other => panic!("unexpected {other:?}"),
        }
        compiler.add_resource("b.json", json!({"type": "integer"})).unwrap();
        let schema = compiler.compile("a.json").unwrap();
        assert!(schema.is_valid(&json!({"b": 3})));
        assert!(!schema.is_valid(&json!({"b": "x"})));
    }

    #[test]
    fn non_schema_targets_are_rejected() {
        let compiler = Compiler::new();
        compiler
            .add_resource("doc.json", json!({"$ref": "#/$defs/n", "$defs": {"n": 5}}))
            .unwrap();
        assert!(matches!(
            compiler.compile("doc.json"),
            Err(CompileError::NotASchema { .. })
        ));
    }

    #[test]
    fn strict_mode_rejects_unguarded_cycles() {
        let options = CompilerOptions {
            reject_unguarded_cycles: true,
            ..CompilerOptions::default()
        };
        let compiler = Compiler::with_options(options);
        compiler
            .add_resource(
                "doc.json",
                json!({
                    "$defs": {
                        "loop": {"allOf": [{"$ref": "#/$defs/loop"}], "type": "object"},
                        "tree": {"properties": {"child": {"$ref": "#/$defs/tree"}}}
                    }
                }),
            )
            .unwrap();
        match compiler.compile("doc.json#/$defs/loop") {
            Err(CompileError::CyclicSchemaWithoutBase { cycle, .. }) => {
                assert!(cycle.contains("doc.json#/$defs/loop -> "));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(compiler.compile("doc.json#/$defs/tree").is_ok());
    }

    #[test]
    fn depth_limit_is_not_cached() {
        let options = CompilerOptions {
            max_depth: 2,
            ..CompilerOptions::default()
        };
        let compiler = Compiler::with_options(options);
        compiler
            .add_resource(
                "doc.json",
                json!({"properties": {"a": {"properties": {"b": {"properties": {"c": {}}}}}}}),
            )
            .unwrap();
        assert!(matches!(
            compiler.compile("doc.json"),
            Err(CompileError::ResourceLimitExceeded { limit: Limit::Depth, .. })
        ));
        assert_eq!(compiler.stats().failures_cached, 0);
        // A shallower entry point succeeds.
        assert!(compiler.compile("doc.json#/properties/a/properties/b").is_ok());
    }

    #[test]
    fn node_limit() {
        let options = CompilerOptions {
            max_nodes: 2,
            ..CompilerOptions::default()
        };
        let compiler = Compiler::with_options(options);
        compiler
            .add_resource("doc.json", json!({"allOf": [{}, {}, {}]}))
            .unwrap();
        assert!(matches!(
            compiler.compile("doc.json"),
            Err(CompileError::ResourceLimitExceeded { limit: Limit::Nodes, .. })
        ));
    }

    #[test]
    fn text_resources_are_parsed() {
        let compiler = Compiler::new();
        compiler
            .add_resource_text("doc.yaml", "type: string\nminLength: 2\n", DocumentFormat::Yaml)
            .unwrap();
        let schema = compiler.compile("doc.yaml").unwrap();
        assert!(schema.is_valid(&json!("ab")));
        assert!(!schema.is_valid(&json!("a")));
        assert!(matches!(
            compiler.add_resource_text("bad.json", "{", DocumentFormat::Json),
            Err(CompileError::MalformedDocument { .. })
        ));
    }
}
