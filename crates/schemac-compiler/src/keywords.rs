//! # Keyword Extraction
//!
//! Turns the raw JSON object at a schema location into the list of
//! [`Keyword`] constraints the validator evaluates. Extraction is also the
//! built-in dialect check: an ill-formed keyword value fails with
//! [`CompileError::InvalidKeyword`] located at the schema.
//!
//! Subschemas are never inlined. Each applicator records the [`Location`]
//! of its child (or, for `$ref`, the resolved target), and the compiler
//! compiles those locations through the shared cache. `$defs`,
//! `definitions` and unknown keywords produce no children, so they are
//! only compiled when something references them.

use std::collections::HashSet;

use regex::Regex;
use serde_json::{Map, Value};

use schemac_core::pointer::escape_token;
use schemac_core::{CompileError, Dialect, Location};

/// JSON instance types named by the `type` keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Null,
    Boolean,
    Object,
    Array,
    Number,
    Integer,
    String,
}

impl JsonType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "null" => Self::Null,
            "boolean" => Self::Boolean,
            "object" => Self::Object,
            "array" => Self::Array,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "string" => Self::String,
            _ => return None,
        })
    }

    /// The keyword spelling of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::String => "string",
        }
    }

    /// Whether `value` is an instance of this type.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Null, Value::Null)
            | (Self::Boolean, Value::Bool(_))
            | (Self::Object, Value::Object(_))
            | (Self::Array, Value::Array(_))
            | (Self::Number, Value::Number(_))
            | (Self::String, Value::String(_)) => true,
            (Self::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        }
    }
}

/// Name of a JSON value's type, for messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A compiled keyword constraint.
#[derive(Debug, Clone)]
pub enum Keyword {
    Type(Vec<JsonType>),
    Enum(Vec<Value>),
    Const(Value),
    MultipleOf(f64),
    Maximum(f64),
    ExclusiveMaximum(f64),
    Minimum(f64),
    ExclusiveMinimum(f64),
    MaxLength(u64),
    MinLength(u64),
    Pattern(Regex),
    MaxItems(u64),
    MinItems(u64),
    UniqueItems,
    MaxProperties(u64),
    MinProperties(u64),
    Required(Vec<String>),
    DependentRequired(Vec<(String, Vec<String>)>),
    Properties(Vec<(String, Location)>),
    PatternProperties(Vec<(Regex, Location)>),
    AdditionalProperties {
        schema: Location,
        known: Vec<String>,
        patterns: Vec<Regex>,
    },
    PropertyNames(Location),
    DependentSchemas(Vec<(String, Location)>),
    PrefixItems(Vec<Location>),
    /// `items` (or `additionalItems`) applied from index `start` on.
    Items {
        schema: Location,
        start: usize,
    },
    Contains {
        schema: Location,
        min: u64,
        max: Option<u64>,
    },
    AllOf(Vec<Location>),
    AnyOf(Vec<Location>),
    OneOf(Vec<Location>),
    Not(Location),
    Conditional {
        condition: Location,
        then: Option<Location>,
        otherwise: Option<Location>,
    },
    Ref(Location),
    DynamicRef(Location),
    UnevaluatedProperties(Location),
    UnevaluatedItems(Location),
}

impl Keyword {
    /// The keyword name as written in a schema.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Type(_) => "type",
            Self::Enum(_) => "enum",
            Self::Const(_) => "const",
            Self::MultipleOf(_) => "multipleOf",
            Self::Maximum(_) => "maximum",
            Self::ExclusiveMaximum(_) => "exclusiveMaximum",
            Self::Minimum(_) => "minimum",
            Self::ExclusiveMinimum(_) => "exclusiveMinimum",
            Self::MaxLength(_) => "maxLength",
            Self::MinLength(_) => "minLength",
            Self::Pattern(_) => "pattern",
            Self::MaxItems(_) => "maxItems",
            Self::MinItems(_) => "minItems",
            Self::UniqueItems => "uniqueItems",
            Self::MaxProperties(_) => "maxProperties",
            Self::MinProperties(_) => "minProperties",
            Self::Required(_) => "required",
            Self::DependentRequired(_) => "dependentRequired",
            Self::Properties(_) => "properties",
            Self::PatternProperties(_) => "patternProperties",
            Self::AdditionalProperties { .. } => "additionalProperties",
            Self::PropertyNames(_) => "propertyNames",
            Self::DependentSchemas(_) => "dependentSchemas",
            Self::PrefixItems(_) => "prefixItems",
            Self::Items { .. } => "items",
            Self::Contains { .. } => "contains",
            Self::AllOf(_) => "allOf",
            Self::AnyOf(_) => "anyOf",
            Self::OneOf(_) => "oneOf",
            Self::Not(_) => "not",
            Self::Conditional { .. } => "if",
            Self::Ref(_) => "$ref",
            Self::DynamicRef(_) => "$dynamicRef",
            Self::UnevaluatedProperties(_) => "unevaluatedProperties",
            Self::UnevaluatedItems(_) => "unevaluatedItems",
        }
    }

    /// Child schema locations with their keyword paths
    /// (`properties/name`, `allOf/0`, `$ref`, ...).
    pub fn children(&self) -> Vec<(String, &Location)> {
        let name = self.name();
        match self {
            Self::Properties(entries) | Self::DependentSchemas(entries) => entries
                .iter()
                .map(|(key, loc)| (format!("{name}/{}", escape_token(key)), loc))
                .collect(),
            Self::PatternProperties(entries) => entries
                .iter()
                .map(|(re, loc)| (format!("{name}/{}", escape_token(re.as_str())), loc))
                .collect(),
            Self::PrefixItems(locs) | Self::AllOf(locs) | Self::AnyOf(locs) | Self::OneOf(locs) => locs
                .iter()
                .enumerate()
                .map(|(i, loc)| (format!("{name}/{i}"), loc))
                .collect(),
            Self::AdditionalProperties { schema, .. }
            | Self::Items { schema, .. }
            | Self::Contains { schema, .. } => vec![(name.to_string(), schema)],
            Self::PropertyNames(loc)
            | Self::Not(loc)
            | Self::Ref(loc)
            | Self::DynamicRef(loc)
            | Self::UnevaluatedProperties(loc)
            | Self::UnevaluatedItems(loc) => vec![(name.to_string(), loc)],
            Self::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let mut out = vec![("if".to_string(), condition)];
                if let Some(then) = then {
                    out.push(("then".to_string(), then));
                }
                if let Some(otherwise) = otherwise {
                    out.push(("else".to_string(), otherwise));
                }
                out
            }
            _ => Vec::new(),
        }
    }

    /// Whether the keyword applies its children to the same instance
    /// (as opposed to descending into a property or item).
    pub fn is_in_place(&self) -> bool {
        matches!(
            self,
            Self::AllOf(_)
                | Self::AnyOf(_)
                | Self::OneOf(_)
                | Self::Not(_)
                | Self::Conditional { .. }
                | Self::Ref(_)
                | Self::DynamicRef(_)
                | Self::DependentSchemas(_)
        )
    }
}

/// Extract the keywords of one schema object.
///
/// `resolve_ref` turns a `$ref`/`$dynamicRef` value into the target
/// location; the compiler supplies it so resolution shares the compile
/// stack.
pub(crate) fn extract<F>(
    location: &Location,
    schema: &Map<String, Value>,
    dialect: &Dialect,
    mut resolve_ref: F,
) -> Result<Vec<Keyword>, CompileError>
where
    F: FnMut(&str) -> Result<Location, CompileError>,
{
    let mut parser = Parser {
        location,
        schema,
        keywords: Vec::new(),
    };

    if let Some(reference) = schema.get("$ref") {
        let reference = parser.string("$ref", reference)?;
        let target = resolve_ref(reference)?;
        parser.keywords.push(Keyword::Ref(target));
        if dialect.ref_overrides_siblings() {
            return Ok(parser.keywords);
        }
    }
    if let Some(reference) = schema.get("$dynamicRef") {
        let reference = parser.string("$dynamicRef", reference)?;
        let target = resolve_ref(reference)?;
        parser.keywords.push(Keyword::DynamicRef(target));
    }

    parser.assertions(dialect)?;
    parser.object_applicators(dialect)?;
    parser.array_applicators()?;
    parser.logic_applicators()?;

    // Unevaluated keywords must run after every sibling has produced its
    // annotations.
    if let Some(value) = schema.get("unevaluatedProperties") {
        let loc = parser.subschema("unevaluatedProperties", value)?;
        parser.keywords.push(Keyword::UnevaluatedProperties(loc));
    }
    if let Some(value) = schema.get("unevaluatedItems") {
        let loc = parser.subschema("unevaluatedItems", value)?;
        parser.keywords.push(Keyword::UnevaluatedItems(loc));
    }

    Ok(parser.keywords)
}

struct Parser<'a> {
    location: &'a Location,
    schema: &'a Map<String, Value>,
    keywords: Vec<Keyword>,
}

impl<'a> Parser<'a> {
    fn invalid(&self, keyword: &str, reason: impl Into<String>) -> CompileError {
        CompileError::InvalidKeyword {
            location: self.location.clone(),
            keyword: keyword.to_string(),
            reason: reason.into(),
        }
    }

    fn string<'v>(&self, keyword: &str, value: &'v Value) -> Result<&'v str, CompileError> {
        value
            .as_str()
            .ok_or_else(|| self.invalid(keyword, format!("expected a string, found {}", type_name(value))))
    }

    fn number(&self, keyword: &str, value: &Value) -> Result<f64, CompileError> {
        value
            .as_f64()
            .ok_or_else(|| self.invalid(keyword, format!("expected a number, found {}", type_name(value))))
    }

    fn count(&self, keyword: &str, value: &Value) -> Result<u64, CompileError> {
        if let Some(n) = value.as_u64() {
            return Ok(n);
        }
        match value.as_f64() {
            Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(f as u64),
            _ => Err(self.invalid(keyword, "expected a non-negative integer")),
        }
    }

    fn regex(&self, keyword: &str, pattern: &str) -> Result<Regex, CompileError> {
        Regex::new(pattern).map_err(|e| self.invalid(keyword, format!("invalid regular expression: {e}")))
    }

    fn string_array(&self, keyword: &str, value: &Value) -> Result<Vec<String>, CompileError> {
        let items = value
            .as_array()
            .ok_or_else(|| self.invalid(keyword, format!("expected an array of strings, found {}", type_name(value))))?;
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let s = self.string(keyword, item)?;
            if !seen.insert(s) {
                return Err(self.invalid(keyword, format!("duplicate entry \"{s}\"")));
            }
            out.push(s.to_string());
        }
        Ok(out)
    }

    /// Location of a direct subschema, checking it is a schema.
    fn subschema(&self, keyword: &str, value: &Value) -> Result<Location, CompileError> {
        self.check_schema(keyword, value)?;
        Ok(self.location.join(keyword))
    }

    fn check_schema(&self, keyword: &str, value: &Value) -> Result<(), CompileError> {
        match value {
            Value::Object(_) | Value::Bool(_) => Ok(()),
            other => Err(self.invalid(
                keyword,
                format!("expected a schema (object or boolean), found {}", type_name(other)),
            )),
        }
    }

    fn schema_map(&self, keyword: &str, value: &Value) -> Result<Vec<(String, Location)>, CompileError> {
        let map = value
            .as_object()
            .ok_or_else(|| self.invalid(keyword, format!("expected an object, found {}", type_name(value))))?;
        map.iter()
            .map(|(key, child)| {
                self.check_schema(keyword, child)?;
                Ok((key.clone(), self.location.join_all([keyword, key.as_str()])))
            })
            .collect()
    }

    fn schema_array(&self, keyword: &str, value: &Value) -> Result<Vec<Location>, CompileError> {
        let items = value
            .as_array()
            .ok_or_else(|| self.invalid(keyword, format!("expected an array of schemas, found {}", type_name(value))))?;
        if items.is_empty() {
            return Err(self.invalid(keyword, "array must not be empty"));
        }
        items
            .iter()
            .enumerate()
            .map(|(i, child)| {
                self.check_schema(keyword, child)?;
                Ok(self.location.join_all([keyword.to_string(), i.to_string()]))
            })
            .collect()
    }

    fn assertions(&mut self, dialect: &Dialect) -> Result<(), CompileError> {
        let schema = self.schema;

        if let Some(value) = schema.get("type") {
            let names: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            if names.is_empty() {
                return Err(self.invalid("type", "type array must not be empty"));
            }
            let mut types = Vec::with_capacity(names.len());
            for name in names {
                let name = self.string("type", name)?;
                let ty = JsonType::parse(name)
                    .ok_or_else(|| self.invalid("type", format!("unknown type \"{name}\"")))?;
                if types.contains(&ty) {
                    return Err(self.invalid("type", format!("duplicate type \"{name}\"")));
                }
                types.push(ty);
            }
            self.keywords.push(Keyword::Type(types));
        }

        if let Some(value) = schema.get("enum") {
            let items = value
                .as_array()
                .ok_or_else(|| self.invalid("enum", format!("expected an array, found {}", type_name(value))))?;
            self.keywords.push(Keyword::Enum(items.clone()));
        }
        if let Some(value) = schema.get("const") {
            self.keywords.push(Keyword::Const(value.clone()));
        }

        if let Some(value) = schema.get("multipleOf") {
            let n = self.number("multipleOf", value)?;
            if n <= 0.0 {
                return Err(self.invalid("multipleOf", "must be strictly greater than 0"));
            }
            self.keywords.push(Keyword::MultipleOf(n));
        }

        let boolean_bounds = dialect.boolean_exclusive_bounds();
        if let Some(value) = schema.get("maximum") {
            let n = self.number("maximum", value)?;
            let exclusive = boolean_bounds && schema.get("exclusiveMaximum") == Some(&Value::Bool(true));
            self.keywords.push(if exclusive {
                Keyword::ExclusiveMaximum(n)
            } else {
                Keyword::Maximum(n)
            });
        }
        if let Some(value) = schema.get("minimum") {
            let n = self.number("minimum", value)?;
            let exclusive = boolean_bounds && schema.get("exclusiveMinimum") == Some(&Value::Bool(true));
            self.keywords.push(if exclusive {
                Keyword::ExclusiveMinimum(n)
            } else {
                Keyword::Minimum(n)
            });
        }
        for (name, exclusive_max) in [("exclusiveMaximum", true), ("exclusiveMinimum", false)] {
            match schema.get(name) {
                None => {}
                Some(Value::Bool(_)) if boolean_bounds => {}
                Some(value) => {
                    let n = self.number(name, value)?;
                    self.keywords.push(if exclusive_max {
                        Keyword::ExclusiveMaximum(n)
                    } else {
                        Keyword::ExclusiveMinimum(n)
                    });
                }
            }
        }

        for name in ["maxLength", "minLength", "maxItems", "minItems", "maxProperties", "minProperties"] {
            let Some(value) = schema.get(name) else {
                continue;
            };
            let n = self.count(name, value)?;
            self.keywords.push(match name {
                "maxLength" => Keyword::MaxLength(n),
                "minLength" => Keyword::MinLength(n),
                "maxItems" => Keyword::MaxItems(n),
                "minItems" => Keyword::MinItems(n),
                "maxProperties" => Keyword::MaxProperties(n),
                _ => Keyword::MinProperties(n),
            });
        }

        if let Some(value) = schema.get("pattern") {
            let pattern = self.string("pattern", value)?;
            let re = self.regex("pattern", pattern)?;
            self.keywords.push(Keyword::Pattern(re));
        }

        match schema.get("uniqueItems") {
            None | Some(Value::Bool(false)) => {}
            Some(Value::Bool(true)) => self.keywords.push(Keyword::UniqueItems),
            Some(other) => {
                return Err(self.invalid(
                    "uniqueItems",
                    format!("expected a boolean, found {}", type_name(other)),
                ))
            }
        }

        if let Some(value) = schema.get("required") {
            let names = self.string_array("required", value)?;
            self.keywords.push(Keyword::Required(names));
        }

        let mut dependent_required = Vec::new();
        if let Some(value) = schema.get("dependentRequired") {
            let map = value.as_object().ok_or_else(|| {
                self.invalid("dependentRequired", format!("expected an object, found {}", type_name(value)))
            })?;
            for (key, names) in map {
                dependent_required.push((key.clone(), self.string_array("dependentRequired", names)?));
            }
        }
        if let Some(Value::Object(map)) = schema.get("dependencies") {
            for (key, value) in map {
                if value.is_array() {
                    dependent_required.push((key.clone(), self.string_array("dependencies", value)?));
                }
            }
        }
        if !dependent_required.is_empty() {
            self.keywords.push(Keyword::DependentRequired(dependent_required));
        }

        Ok(())
    }

    fn object_applicators(&mut self, _dialect: &Dialect) -> Result<(), CompileError> {
        let schema = self.schema;

        let mut known = Vec::new();
        if let Some(value) = schema.get("properties") {
            let entries = self.schema_map("properties", value)?;
            known = entries.iter().map(|(k, _)| k.clone()).collect();
            self.keywords.push(Keyword::Properties(entries));
        }

        let mut patterns = Vec::new();
        if let Some(value) = schema.get("patternProperties") {
            let entries = self.schema_map("patternProperties", value)?;
            let mut compiled = Vec::with_capacity(entries.len());
            for (pattern, loc) in entries {
                let re = self.regex("patternProperties", &pattern)?;
                patterns.push(re.clone());
                compiled.push((re, loc));
            }
            self.keywords.push(Keyword::PatternProperties(compiled));
        }

        if let Some(value) = schema.get("additionalProperties") {
            let loc = self.subschema("additionalProperties", value)?;
            self.keywords.push(Keyword::AdditionalProperties {
                schema: loc,
                known,
                patterns,
            });
        }

        if let Some(value) = schema.get("propertyNames") {
            let loc = self.subschema("propertyNames", value)?;
            self.keywords.push(Keyword::PropertyNames(loc));
        }

        let mut dependent = Vec::new();
        if let Some(value) = schema.get("dependentSchemas") {
            dependent.extend(self.schema_map("dependentSchemas", value)?);
        }
        if let Some(Value::Object(map)) = schema.get("dependencies") {
            for (key, value) in map {
                if !value.is_array() {
                    self.check_schema("dependencies", value)?;
                    dependent.push((key.clone(), self.location.join_all(["dependencies", key.as_str()])));
                }
            }
        } else if let Some(other) = schema.get("dependencies") {
            return Err(self.invalid(
                "dependencies",
                format!("expected an object, found {}", type_name(other)),
            ));
        }
        if !dependent.is_empty() {
            self.keywords.push(Keyword::DependentSchemas(dependent));
        }

        Ok(())
    }

    fn array_applicators(&mut self) -> Result<(), CompileError> {
        let schema = self.schema;

        let mut prefix_len = 0;
        if let Some(value) = schema.get("prefixItems") {
            let locs = self.schema_array("prefixItems", value)?;
            prefix_len = locs.len();
            self.keywords.push(Keyword::PrefixItems(locs));
        }

        match schema.get("items") {
            None => {}
            Some(Value::Array(_)) => {
                // Array-form items is the pre-2020-12 spelling of prefixItems.
                let locs = self.schema_array("items", &schema["items"])?;
                let len = locs.len();
                self.keywords.push(Keyword::PrefixItems(locs));
                if let Some(additional) = schema.get("additionalItems") {
                    let loc = self.subschema("additionalItems", additional)?;
                    self.keywords.push(Keyword::Items { schema: loc, start: len });
                }
            }
            Some(value) => {
                let loc = self.subschema("items", value)?;
                self.keywords.push(Keyword::Items {
                    schema: loc,
                    start: prefix_len,
                });
            }
        }

        if let Some(value) = schema.get("contains") {
            let loc = self.subschema("contains", value)?;
            let min = match schema.get("minContains") {
                Some(v) => self.count("minContains", v)?,
                None => 1,
            };
            let max = match schema.get("maxContains") {
                Some(v) => Some(self.count("maxContains", v)?),
                None => None,
            };
            self.keywords.push(Keyword::Contains { schema: loc, min, max });
        }

        Ok(())
    }

    fn logic_applicators(&mut self) -> Result<(), CompileError> {
        let schema = self.schema;

        for name in ["allOf", "anyOf", "oneOf"] {
            let Some(value) = schema.get(name) else {
                continue;
            };
            let locs = self.schema_array(name, value)?;
            self.keywords.push(match name {
                "allOf" => Keyword::AllOf(locs),
                "anyOf" => Keyword::AnyOf(locs),
                _ => Keyword::OneOf(locs),
            });
        }

        if let Some(value) = schema.get("not") {
            let loc = self.subschema("not", value)?;
            self.keywords.push(Keyword::Not(loc));
        }

        if let Some(value) = schema.get("if") {
            let condition = self.subschema("if", value)?;
            let then = schema.get("then").map(|v| self.subschema("then", v)).transpose()?;
            let otherwise = schema.get("else").map(|v| self.subschema("else", v)).transpose()?;
            self.keywords.push(Keyword::Conditional {
                condition,
                then,
                otherwise,
            });
        }

        Ok(())
    }
}
