//! # Resource Identity and Locations
//!
//! Newtypes for the two identifiers every part of the compiler agrees on:
//!
//! - [`ResourceId`] — the identifier a document was registered under
//!   (`valid-spec.json`, `https://spec.openapis.org/oas/3.1/schema/2022-10-07`).
//! - [`Location`] — a `(resource, pointer)` pair. Its equality is the
//!   compile cache key, so it is only ever built from canonical parts.
//!
//! The module also splits reference strings (`id#fragment`) and joins
//! relative references against a base. Absolute URIs are joined per
//! RFC 3986 through the `url` crate; identifiers that are not URLs
//! (plain file names, relative paths) are joined path-wise against the
//! directory part of the base.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::pointer::{JsonPointer, PointerError};

/// Identifier of a stored resource, without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(String);

impl ResourceId {
    /// Build an identifier, dropping a trailing empty fragment (`id#`).
    pub fn new(id: impl Into<String>) -> Self {
        let mut id = id.into();
        if id.ends_with('#') {
            id.pop();
        }
        Self(id)
    }

    /// Access the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A resolved position inside a stored resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// The resource the position belongs to.
    pub resource: ResourceId,
    /// Canonical pointer from the resource root.
    pub pointer: JsonPointer,
}

impl Location {
    /// Build a location from parts.
    pub fn new(resource: ResourceId, pointer: JsonPointer) -> Self {
        Self { resource, pointer }
    }

    /// The root location of a resource.
    pub fn root(resource: ResourceId) -> Self {
        Self::new(resource, JsonPointer::root())
    }

    /// Location of a child position one token down.
    pub fn join(&self, token: impl Into<String>) -> Self {
        Self::new(self.resource.clone(), self.pointer.join(token))
    }

    /// Location of a child position several tokens down.
    pub fn join_all<I, S>(&self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pointer = self.pointer.clone();
        for token in tokens {
            pointer.push(token);
        }
        Self::new(self.resource.clone(), pointer)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.resource, self.pointer)
    }
}

/// The fragment part of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// `#/a/b` or an empty fragment.
    Pointer(JsonPointer),
    /// `#name` — a plain-name anchor.
    Anchor(String),
}

/// A reference split into its base and fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Absolute (joined) base identifier, without fragment.
    pub base: String,
    /// Parsed fragment.
    pub fragment: Fragment,
}

impl Reference {
    /// Split `id#fragment` into base and fragment.
    ///
    /// # Errors
    ///
    /// Returns a [`PointerError`] if a pointer fragment is malformed.
    pub fn parse(reference: &str) -> Result<Self, PointerError> {
        let (base, fragment) = match reference.split_once('#') {
            Some((base, fragment)) => (base, fragment),
            None => (reference, ""),
        };
        let fragment = if fragment.is_empty() || fragment.starts_with('/') || fragment.starts_with('%') {
            Fragment::Pointer(JsonPointer::from_fragment(fragment)?)
        } else {
            Fragment::Anchor(fragment.to_string())
        };
        Ok(Self {
            base: base.to_string(),
            fragment,
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fragment {
            Fragment::Pointer(p) if p.is_root() => f.write_str(&self.base),
            Fragment::Pointer(p) => write!(f, "{}#{}", self.base, p),
            Fragment::Anchor(a) => write!(f, "{}#{}", self.base, a),
        }
    }
}

/// Join a (possibly relative) reference against a base identifier.
///
/// The result keeps the reference's fragment, if any.
pub fn join_reference(base: &str, reference: &str) -> String {
    if reference.is_empty() {
        return strip_fragment(base).to_string();
    }
    if reference.starts_with('#') {
        return format!("{}{}", strip_fragment(base), reference);
    }
    if Url::parse(reference).is_ok() {
        return reference.to_string();
    }
    if let Ok(base_url) = Url::parse(base) {
        if let Ok(joined) = base_url.join(reference) {
            return joined.to_string();
        }
    }
    join_path(strip_fragment(base), reference)
}

/// Drop the fragment from a reference.
pub fn strip_fragment(reference: &str) -> &str {
    match reference.find('#') {
        Some(i) => &reference[..i],
        None => reference,
    }
}

/// Path-wise join for identifiers that are not URLs.
fn join_path(base: &str, reference: &str) -> String {
    let (path, fragment) = match reference.split_once('#') {
        Some((p, f)) => (p, Some(f)),
        None => (reference, None),
    };

    let mut segments: Vec<&str> = if path.starts_with('/') {
        Vec::new()
    } else {
        match base.rfind('/') {
            Some(i) => base[..i].split('/').collect(),
            None => Vec::new(),
        }
    };
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), None | Some(&"..")) {
                    segments.push("..");
                } else {
                    segments.pop();
                }
            }
            s => segments.push(s),
        }
    }

    let mut joined = segments.join("/");
    if path.starts_with('/') {
        joined.insert(0, '/');
    }
    if let Some(fragment) = fragment {
        joined.push('#');
        joined.push_str(fragment);
    }
    joined
}
