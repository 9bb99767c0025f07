//! # Resource Store
//!
//! Holds every parsed document a [`Compiler`](crate::Compiler) knows about,
//! keyed by the identifier it was registered under. Adding a resource
//! compiles nothing; it only records the document and indexes the
//! positions that references can name:
//!
//! - every `$id` declared in the document (root or embedded) becomes an
//!   alias from its absolute base URI to a [`Location`] in this resource;
//! - every `$anchor`, `$dynamicAnchor` and draft-07 style `$id: "#name"`
//!   becomes a named anchor under the base URI in effect where it appears.
//!
//! ## Design
//!
//! Documents are immutable once stored and held behind `Arc` so the
//! compiler can read a document while mutating its own cache. Values of
//! `enum`, `const`, `default`, `examples` and `example` are data, not
//! schemas, and are never indexed. Objects whose keys are property or
//! definition names (`properties`, `$defs`, ...) are descended through
//! without reading their keys as keywords.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use schemac_core::{join_reference, strip_fragment, CompileError, Dialect, JsonPointer, Location, ResourceId};

/// Keywords whose values are instance data.
const DATA_KEYWORDS: &[&str] = &["enum", "const", "default", "examples", "example"];

/// Keywords whose values are maps from names to schemas.
const NAME_MAP_KEYWORDS: &[&str] = &[
    "properties",
    "patternProperties",
    "$defs",
    "definitions",
    "dependentSchemas",
    "dependencies",
];

/// A stored document.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Identifier the document was registered under.
    pub id: ResourceId,
    /// The parsed document.
    pub root: Arc<Value>,
    /// Dialect detected from the root.
    pub dialect: Dialect,
}

/// Parsed documents plus their `$id` and anchor indexes.
#[derive(Debug, Default)]
pub struct ResourceStore {
    resources: HashMap<ResourceId, Resource>,
    /// Absolute base URI -> position declaring it.
    aliases: HashMap<String, Location>,
    /// (base URI, anchor name) -> position declaring it.
    anchors: HashMap<(String, String), Location>,
}

/// Index entries collected from one document before it is committed.
#[derive(Default)]
struct Index {
    aliases: Vec<(String, Location)>,
    anchors: Vec<((String, String), Location)>,
    /// Base URI established at the document root.
    root_base: String,
}

impl ResourceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document under `id` and index its identifiers.
    ///
    /// # Errors
    ///
    /// - [`CompileError::DuplicateResource`] if `id` or any `$id` the
    ///   document declares is already known.
    /// - [`CompileError::MalformedDocument`] if the identifier carries a
    ///   fragment, the root is neither an object nor a boolean, or an
    ///   `$id`/`$anchor` value is not a valid string.
    pub fn add(&mut self, id: ResourceId, root: Value) -> Result<(), CompileError> {
        if id.as_str().contains('#') {
            return Err(CompileError::MalformedDocument {
                id,
                reason: "resource identifier must not carry a fragment".to_string(),
            });
        }
        if !matches!(root, Value::Object(_) | Value::Bool(_)) {
            return Err(CompileError::MalformedDocument {
                id,
                reason: "document root must be an object or a boolean".to_string(),
            });
        }
        if self.resources.contains_key(&id) || self.aliases.contains_key(id.as_str()) {
            return Err(CompileError::DuplicateResource { id });
        }

        let mut index = Index {
            root_base: id.as_str().to_string(),
            ..Index::default()
        };
        index_document(&id, &root, &mut index)?;

        for (alias, _) in &index.aliases {
            if self.aliases.contains_key(alias) || self.resources.contains_key(&ResourceId::new(alias.as_str())) {
                return Err(CompileError::DuplicateResource {
                    id: ResourceId::new(alias.as_str()),
                });
            }
        }

        let dialect = Dialect::detect(&root);
        debug!(
            resource = %id,
            dialect = %dialect,
            aliases = index.aliases.len(),
            anchors = index.anchors.len(),
            "resource added"
        );
        self.aliases.extend(index.aliases);
        self.anchors.extend(index.anchors);
        self.resources.insert(
            id.clone(),
            Resource {
                id,
                root: Arc::new(root),
                dialect,
            },
        );
        Ok(())
    }

    /// Fetch a stored resource by identifier or root `$id` alias.
    pub fn get(&self, id: &ResourceId) -> Result<&Resource, CompileError> {
        if let Some(resource) = self.resources.get(id) {
            return Ok(resource);
        }
        match self.aliases.get(id.as_str()) {
            Some(loc) if loc.pointer.is_root() => self
                .resources
                .get(&loc.resource)
                .ok_or_else(|| CompileError::ResourceNotFound { id: id.clone() }),
            _ => Err(CompileError::ResourceNotFound { id: id.clone() }),
        }
    }

    /// Whether a resource is registered under exactly this identifier.
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Map an absolute base URI (no fragment) to the position it names.
    pub fn lookup(&self, uri: &str) -> Option<Location> {
        let id = ResourceId::new(uri);
        if self.resources.contains_key(&id) {
            return Some(Location::root(id));
        }
        self.aliases.get(id.as_str()).cloned()
    }

    /// Find a named anchor declared under `base`.
    pub fn anchor(&self, base: &str, name: &str) -> Option<&Location> {
        self.anchors.get(&(base.to_string(), name.to_string()))
    }

    /// The raw value at a location.
    pub fn value_at(&self, location: &Location) -> Option<&Value> {
        let resource = self.resources.get(&location.resource)?;
        location.pointer.lookup(&resource.root)
    }

    /// The base URI in effect at a location: the resource identifier
    /// joined with every enclosing `$id`.
    pub fn base_uri_at(&self, location: &Location) -> String {
        let mut base = location.resource.as_str().to_string();
        let Some(resource) = self.resources.get(&location.resource) else {
            return base;
        };

        let mut current: &Value = &resource.root;
        let mut in_name_map = false;
        let mut tokens = location.pointer.tokens().iter();
        loop {
            if !in_name_map {
                if let Some(id) = schema_id(current) {
                    base = strip_fragment(&join_reference(&base, id)).to_string();
                }
            }
            let Some(token) = tokens.next() else {
                break;
            };
            if DATA_KEYWORDS.contains(&token.as_str()) && !in_name_map {
                break;
            }
            let entering_name_map = !in_name_map && current.is_object() && NAME_MAP_KEYWORDS.contains(&token.as_str());
            match schemac_core::pointer::step(current, token) {
                Some(next) => current = next,
                None => break,
            }
            in_name_map = entering_name_map;
        }
        base
    }
}

/// The `$id` of a schema object when it names a new base (not `#anchor`).
fn schema_id(value: &Value) -> Option<&str> {
    value.as_object().and_then(declared_id)
}

fn declared_id(map: &Map<String, Value>) -> Option<&str> {
    let id = map.get("$id")?.as_str()?;
    let id = id.strip_suffix('#').unwrap_or(id);
    if id.is_empty() || id.starts_with('#') {
        None
    } else {
        Some(id)
    }
}

fn malformed(id: &ResourceId, pointer: &JsonPointer, reason: impl std::fmt::Display) -> CompileError {
    CompileError::MalformedDocument {
        id: id.clone(),
        reason: format!("{reason} at '{pointer}'"),
    }
}

/// One value waiting to be indexed.
struct Pending<'v> {
    value: &'v Value,
    base: String,
    pointer: JsonPointer,
    in_name_map: bool,
}

/// Index a whole document. Iterative, so nesting depth is not limited by
/// the call stack.
fn index_document(id: &ResourceId, root: &Value, index: &mut Index) -> Result<(), CompileError> {
    let mut pending = vec![Pending {
        value: root,
        base: id.as_str().to_string(),
        pointer: JsonPointer::root(),
        in_name_map: false,
    }];

    while let Some(item) = pending.pop() {
        match item.value {
            Value::Object(map) if item.in_name_map => {
                for (key, child) in map.iter().rev() {
                    pending.push(Pending {
                        value: child,
                        base: item.base.clone(),
                        pointer: item.pointer.join(key.as_str()),
                        in_name_map: false,
                    });
                }
            }
            Value::Object(map) => {
                let base = index_schema(id, map, &item.base, &item.pointer, index)?;
                for (key, child) in map.iter().rev() {
                    if DATA_KEYWORDS.contains(&key.as_str()) {
                        continue;
                    }
                    pending.push(Pending {
                        value: child,
                        base: base.clone(),
                        pointer: item.pointer.join(key.as_str()),
                        in_name_map: NAME_MAP_KEYWORDS.contains(&key.as_str()),
                    });
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate().rev() {
                    pending.push(Pending {
                        value: child,
                        base: item.base.clone(),
                        pointer: item.pointer.join(i.to_string()),
                        in_name_map: false,
                    });
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Record the identifiers one schema object declares and return the base
/// URI in effect for its members.
fn index_schema(
    id: &ResourceId,
    map: &Map<String, Value>,
    base: &str,
    pointer: &JsonPointer,
    index: &mut Index,
) -> Result<String, CompileError> {
    let here = Location::new(id.clone(), pointer.clone());
    let mut base = base.to_string();

    if let Some(raw) = map.get("$id") {
        let text = raw
            .as_str()
            .ok_or_else(|| malformed(id, pointer, "$id must be a string"))?;
        if let Some(name) = text.strip_prefix('#').filter(|n| !n.is_empty()) {
            add_anchor(id, &base, name, &here, index)?;
        } else if let Some(declared) = declared_id(map) {
            let joined = strip_fragment(&join_reference(&base, declared)).to_string();
            if joined != id.as_str() {
                if index.aliases.iter().any(|(a, _)| a == &joined) {
                    return Err(malformed(id, pointer, format!("duplicate $id '{joined}'")));
                }
                index.aliases.push((joined.clone(), here.clone()));
            }
            if pointer.is_root() {
                index.root_base = joined.clone();
            }
            base = joined;
        }
    }

    for keyword in ["$anchor", "$dynamicAnchor"] {
        if let Some(raw) = map.get(keyword) {
            let name = raw
                .as_str()
                .ok_or_else(|| malformed(id, pointer, format!("{keyword} must be a string")))?;
            if !is_valid_anchor(name) {
                return Err(malformed(id, pointer, format!("invalid {keyword} name '{name}'")));
            }
            add_anchor(id, &base, name, &here, index)?;
        }
    }
    Ok(base)
}

fn add_anchor(
    id: &ResourceId,
    base: &str,
    name: &str,
    here: &Location,
    index: &mut Index,
) -> Result<(), CompileError> {
    let mut bases = vec![base.to_string()];
    // Anchors in the root scope are also reachable through the registered
    // identifier when the root declares a different `$id`.
    if base == index.root_base && base != id.as_str() {
        bases.push(id.as_str().to_string());
    }
    for base in bases {
        let key = (base, name.to_string());
        match index.anchors.iter().find(|(k, _)| k == &key) {
            // `$anchor` and `$dynamicAnchor` may name the same object.
            Some((_, existing)) if existing == here => continue,
            Some(_) => return Err(malformed(id, &here.pointer, format!("duplicate anchor '{name}'"))),
            None => index.anchors.push((key, here.clone())),
        }
    }
    Ok(())
}

/// Anchor names follow the XML NCName-like grammar `[A-Za-z_][-A-Za-z0-9._]*`.
fn is_valid_anchor(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
}
