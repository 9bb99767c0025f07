//! # JSON Pointer — RFC 6901 Paths
//!
//! `JsonPointer` is the canonical form of every position inside a stored
//! document. Compiled nodes are cached by `(resource, pointer)`, so two
//! spellings of the same position must produce the same pointer value.
//!
//! ## Canonical Form
//!
//! The pointer is held as its list of *unescaped* reference tokens. The
//! escaped string form (`~0` for `~`, `~1` for `/`) is produced only by
//! `Display`. Parsing rejects dangling `~` escapes, so there is exactly one
//! token list for every accepted string.
//!
//! URI fragments (`#/components/schemas/Foo`) are additionally
//! percent-decoded by [`JsonPointer::from_fragment`] before unescaping.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error parsing a JSON pointer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PointerError {
    /// A non-empty pointer must start with `/`.
    #[error("JSON pointer '{0}' must be empty or start with '/'")]
    MissingLeadingSlash(String),

    /// `~` must be followed by `0` or `1`.
    #[error("JSON pointer '{pointer}' has an invalid escape at byte {offset}")]
    InvalidEscape {
        /// The pointer text.
        pointer: String,
        /// Byte offset of the offending `~`.
        offset: usize,
    },

    /// A `%XX` sequence in a URI fragment is malformed or not UTF-8.
    #[error("URI fragment '{0}' has invalid percent-encoding")]
    InvalidPercentEncoding(String),
}

/// A parsed, canonical JSON pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JsonPointer(Vec<String>);

impl JsonPointer {
    /// The empty pointer, addressing the whole document.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse an RFC 6901 pointer string.
    ///
    /// # Errors
    ///
    /// Returns [`PointerError`] when the text does not start with `/`
    /// (and is not empty) or contains an escape other than `~0`/`~1`.
    pub fn parse(text: &str) -> Result<Self, PointerError> {
        if text.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = text.strip_prefix('/') else {
            return Err(PointerError::MissingLeadingSlash(text.to_string()));
        };

        let mut tokens = Vec::new();
        let mut offset = 1;
        for raw in rest.split('/') {
            tokens.push(unescape_token(raw, text, offset)?);
            offset += raw.len() + 1;
        }
        Ok(Self(tokens))
    }

    /// Parse the fragment part of a URI reference (without the `#`).
    ///
    /// The fragment is percent-decoded first, then parsed as a pointer.
    pub fn from_fragment(fragment: &str) -> Result<Self, PointerError> {
        let decoded = percent_decode(fragment)?;
        Self::parse(&decoded)
    }

    /// Build a pointer from already-unescaped tokens.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tokens.into_iter().map(Into::into).collect())
    }

    /// The unescaped reference tokens.
    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    /// Returns true for the document-root pointer.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of reference tokens.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the pointer has no tokens.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last token, if any.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Pointer to the parent position. The root is its own parent.
    pub fn parent(&self) -> Self {
        let mut tokens = self.0.clone();
        tokens.pop();
        Self(tokens)
    }

    /// A new pointer with one more token appended.
    pub fn join(&self, token: impl Into<String>) -> Self {
        let mut tokens = self.0.clone();
        tokens.push(token.into());
        Self(tokens)
    }

    /// A new pointer with every token of `other` appended.
    pub fn concat(&self, other: &JsonPointer) -> Self {
        let mut tokens = self.0.clone();
        tokens.extend(other.0.iter().cloned());
        Self(tokens)
    }

    /// Append a token in place.
    pub fn push(&mut self, token: impl Into<String>) {
        self.0.push(token.into());
    }

    /// Remove and return the last token.
    pub fn pop(&mut self) -> Option<String> {
        self.0.pop()
    }

    /// Returns true if `self` is `prefix` or lies below it.
    pub fn starts_with(&self, prefix: &JsonPointer) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Look the pointer up in a JSON value.
    ///
    /// Array tokens must be canonical indices: digits only, no leading
    /// zero (other than `0` itself). `-` never resolves.
    pub fn lookup<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.0
            .iter()
            .try_fold(value, |current, token| step(current, token))
    }
}

/// Take one pointer step from `value` along `token`.
pub fn step<'v>(value: &'v Value, token: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(token),
        Value::Array(items) => array_index(token).and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Parse a canonical array index token.
pub fn array_index(token: &str) -> Option<usize> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if token.len() > 1 && token.starts_with('0') {
        return None;
    }
    token.parse().ok()
}

/// Escape one reference token per RFC 6901.
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn unescape_token(raw: &str, pointer: &str, base_offset: usize) -> Result<String, PointerError> {
    if !raw.contains('~') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices();
    while let Some((i, c)) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some((_, '0')) => out.push('~'),
            Some((_, '1')) => out.push('/'),
            _ => {
                return Err(PointerError::InvalidEscape {
                    pointer: pointer.to_string(),
                    offset: base_offset + i,
                })
            }
        }
    }
    Ok(out)
}

fn percent_decode(fragment: &str) -> Result<String, PointerError> {
    if !fragment.contains('%') {
        return Ok(fragment.to_string());
    }
    let invalid = || PointerError::InvalidPercentEncoding(fragment.to_string());
    let bytes = fragment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3).ok_or_else(invalid)?;
            let hex = std::str::from_utf8(hex).map_err(|_| invalid())?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| invalid())?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| invalid())
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.0 {
            write!(f, "/{}", escape_token(token))?;
        }
        Ok(())
    }
}

impl std::str::FromStr for JsonPointer {
    type Err = PointerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_unescapes_tokens() {
        let p = JsonPointer::parse("/a~1b/m~0n/0").unwrap();
        assert_eq!(p.tokens(), &["a/b", "m~n", "0"]);
        assert_eq!(p.to_string(), "/a~1b/m~0n/0");
    }

    #[test]
    fn empty_pointer_is_root() {
        let p = JsonPointer::parse("").unwrap();
        assert!(p.is_root());
        assert_eq!(p.to_string(), "");
    }

    #[test]
    fn trailing_slash_is_an_empty_token() {
        let p = JsonPointer::parse("/a/").unwrap();
        assert_eq!(p.tokens(), &["a", ""]);
    }

    #[test]
    fn rejects_missing_slash() {
        assert!(matches!(
            JsonPointer::parse("a/b"),
            Err(PointerError::MissingLeadingSlash(_))
        ));
    }

    #[test]
    fn rejects_bad_escape() {
        let err = JsonPointer::parse("/a~2").unwrap_err();
        assert_eq!(
            err,
            PointerError::InvalidEscape {
                pointer: "/a~2".into(),
                offset: 2
            }
        );
        assert!(JsonPointer::parse("/trailing~").is_err());
    }

    #[test]
    fn fragment_is_percent_decoded() {
        let p = JsonPointer::from_fragment("/%24defs/a%20b").unwrap();
        assert_eq!(p.tokens(), &["$defs", "a b"]);
        assert!(JsonPointer::from_fragment("/%zz").is_err());
        assert!(JsonPointer::from_fragment("/%2").is_err());
    }

    #[test]
    fn lookup_follows_objects_and_arrays() {
        let doc = json!({"a": [{"b": 1}, {"c/d": 2}], "": {"x": 3}});
        let p = JsonPointer::parse("/a/1/c~1d").unwrap();
        assert_eq!(p.lookup(&doc), Some(&json!(2)));
        assert_eq!(JsonPointer::parse("//x").unwrap().lookup(&doc), Some(&json!(3)));
        assert_eq!(JsonPointer::parse("/a/01").unwrap().lookup(&doc), None);
        assert_eq!(JsonPointer::parse("/a/-").unwrap().lookup(&doc), None);
        assert_eq!(JsonPointer::parse("/missing").unwrap().lookup(&doc), None);
    }

    #[test]
    fn parent_join_and_prefix() {
        let p = JsonPointer::parse("/components/schemas/Foo").unwrap();
        assert_eq!(p.parent().to_string(), "/components/schemas");
        assert_eq!(p.join("properties").to_string(), "/components/schemas/Foo/properties");
        assert!(p.starts_with(&JsonPointer::parse("/components").unwrap()));
        assert!(!p.starts_with(&JsonPointer::parse("/paths").unwrap()));
        assert_eq!(JsonPointer::root().parent(), JsonPointer::root());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Any token list survives display-then-parse unchanged.
            #[test]
            fn display_is_canonical(tokens in prop::collection::vec("[a-z~/0-9 ]{0,8}", 0..6)) {
                let p = JsonPointer::from_tokens(tokens.clone());
                let reparsed = JsonPointer::parse(&p.to_string()).unwrap();
                prop_assert_eq!(reparsed.tokens(), tokens.as_slice());
            }

            /// Escaped tokens never contain a bare '/'.
            #[test]
            fn escaped_token_has_no_slash(token in ".{0,16}") {
                prop_assert!(!escape_token(&token).contains('/'));
            }
        }
    }
}
