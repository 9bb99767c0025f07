//! # Instance Validation
//!
//! Walks a frozen [`SchemaGraph`] against an instance value.
//!
//! ## Annotations
//!
//! Every successful evaluation reports the property names and item
//! indices it evaluated. In-place applicators (`allOf`, `$ref`, `if`, ...)
//! merge the annotations of their successful subschemas, so
//! `unevaluatedProperties`/`unevaluatedItems`, which run last, see
//! everything their siblings covered. A failing schema reports no
//! annotations.
//!
//! ## Termination
//!
//! Evaluation keeps the list of `(node, instance)` pairs on the current
//! path. Re-entering a pair already on the path adds no constraint, which
//! is what makes `{"$ref": "#"}` terminate. The instance is identified by
//! address, so the same value reached by a deeper path is a new pair.
//!
//! Every keyword is evaluated in both validation modes; the mode only
//! prunes the report.

use std::collections::HashSet;

use serde_json::{Number, Value};

use schemac_core::{JsonPointer, Location};

use crate::keywords::{type_name, Keyword};
use crate::output::ValidationError;
use crate::schema::{SchemaBody, SchemaGraph, SchemaNode};
use crate::vocabulary::ValidationContext;

#[derive(Default)]
struct Outcome {
    errors: Vec<ValidationError>,
    properties: HashSet<String>,
    items: HashSet<usize>,
}

impl Outcome {
    fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn merge_annotations(&mut self, other: Outcome) {
        self.properties.extend(other.properties);
        self.items.extend(other.items);
    }
}

/// Where the evaluation currently is.
#[derive(Clone, Copy)]
struct Frame<'p> {
    instance_path: &'p JsonPointer,
    keyword_path: &'p JsonPointer,
    location: &'p Location,
}

pub(crate) struct Validator<'g> {
    graph: &'g SchemaGraph,
    active: Vec<(usize, *const Value)>,
}

impl<'g> Validator<'g> {
    pub(crate) fn new(graph: &'g SchemaGraph) -> Self {
        Self {
            graph,
            active: Vec::new(),
        }
    }

    /// Validate `instance` against the node in slot `node`.
    pub(crate) fn validate(&mut self, node: usize, instance: &Value) -> Vec<ValidationError> {
        self.evaluate(node, instance, &JsonPointer::root(), &JsonPointer::root())
            .errors
    }

    fn evaluate(
        &mut self,
        index: usize,
        instance: &Value,
        instance_path: &JsonPointer,
        keyword_path: &JsonPointer,
    ) -> Outcome {
        let key = (index, instance as *const Value);
        if self.active.contains(&key) {
            return Outcome::default();
        }
        let Some(node) = self.graph.node(index).cloned() else {
            return Outcome::default();
        };

        self.active.push(key);
        let frame = Frame {
            instance_path,
            keyword_path,
            location: &node.location,
        };
        let mut outcome = self.evaluate_node(&node, instance, frame);
        self.active.pop();

        if !outcome.is_valid() {
            outcome.properties.clear();
            outcome.items.clear();
        }
        outcome
    }

    fn evaluate_node(&mut self, node: &SchemaNode, instance: &Value, frame: Frame<'_>) -> Outcome {
        let mut outcome = Outcome::default();
        match &node.body {
            SchemaBody::Bool(true) => return outcome,
            SchemaBody::Bool(false) => {
                outcome.errors.push(error(
                    frame,
                    "false",
                    format!("{} is not allowed here", describe(instance)),
                    Vec::new(),
                ));
                return outcome;
            }
            SchemaBody::Keywords(keywords) => {
                for keyword in keywords {
                    self.evaluate_keyword(keyword, instance, frame, &mut outcome);
                }
            }
        }

        for extension in &node.extensions {
            let ctx = ValidationContext {
                instance_path: frame.instance_path,
                location: frame.location,
            };
            if let Err(e) = extension.value.validate(&ctx, instance) {
                outcome
                    .errors
                    .push(error(frame, &extension.vocabulary, e.to_string(), Vec::new()));
            }
        }
        outcome
    }

    /// Evaluate a child location against `instance`.
    fn child(
        &mut self,
        location: &Location,
        instance: &Value,
        instance_path: &JsonPointer,
        keyword_path: &JsonPointer,
    ) -> Outcome {
        match self.graph.index_of(location) {
            Some(index) => self.evaluate(index, instance, instance_path, keyword_path),
            None => Outcome {
                errors: vec![ValidationError {
                    instance_path: instance_path.clone(),
                    keyword_path: keyword_path.clone(),
                    schema_location: location.clone(),
                    keyword: String::new(),
                    message: "schema is missing from the compiled graph".to_string(),
                    causes: Vec::new(),
                }],
                ..Outcome::default()
            },
        }
    }

    fn evaluate_keyword(&mut self, keyword: &Keyword, instance: &Value, frame: Frame<'_>, outcome: &mut Outcome) {
        let name = keyword.name();
        let kw_path = frame.keyword_path.join(name);
        let fail = |outcome: &mut Outcome, message: String, causes: Vec<ValidationError>| {
            outcome.errors.push(error(frame, name, message, causes));
        };

        match keyword {
            Keyword::Type(types) => {
                if !types.iter().any(|t| t.matches(instance)) {
                    let expected: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
                    fail(
                        outcome,
                        format!("{} is not of type {}", describe(instance), expected.join(", ")),
                        Vec::new(),
                    );
                }
            }
            Keyword::Enum(values) => {
                if !values.iter().any(|v| json_eq(v, instance)) {
                    fail(
                        outcome,
                        format!("{} is not one of the enumerated values", describe(instance)),
                        Vec::new(),
                    );
                }
            }
            Keyword::Const(value) => {
                if !json_eq(value, instance) {
                    fail(outcome, format!("{} does not equal {value}", describe(instance)), Vec::new());
                }
            }
            Keyword::MultipleOf(divisor) => {
                if let Value::Number(n) = instance {
                    if !is_multiple_of(n, *divisor) {
                        fail(outcome, format!("{n} is not a multiple of {divisor}"), Vec::new());
                    }
                }
            }
            Keyword::Maximum(limit)
            | Keyword::ExclusiveMaximum(limit)
            | Keyword::Minimum(limit)
            | Keyword::ExclusiveMinimum(limit) => {
                if let Some(n) = instance.as_f64() {
                    let (ok, relation) = match keyword {
                        Keyword::Maximum(_) => (n <= *limit, "greater than"),
                        Keyword::ExclusiveMaximum(_) => (n < *limit, "greater than or equal to"),
                        Keyword::Minimum(_) => (n >= *limit, "less than"),
                        _ => (n > *limit, "less than or equal to"),
                    };
                    if !ok {
                        fail(outcome, format!("{instance} is {relation} {limit}"), Vec::new());
                    }
                }
            }
            Keyword::MaxLength(max) | Keyword::MinLength(max) => {
                if let Value::String(s) = instance {
                    let len = s.chars().count() as u64;
                    let is_max = matches!(keyword, Keyword::MaxLength(_));
                    if (is_max && len > *max) || (!is_max && len < *max) {
                        let bound = if is_max { "longer" } else { "shorter" };
                        fail(outcome, format!("{instance} is {bound} than {max} characters"), Vec::new());
                    }
                }
            }
            Keyword::Pattern(re) => {
                if let Value::String(s) = instance {
                    if !re.is_match(s) {
                        fail(outcome, format!("{instance} does not match pattern '{}'", re.as_str()), Vec::new());
                    }
                }
            }
            Keyword::MaxItems(max) | Keyword::MinItems(max) => {
                if let Value::Array(items) = instance {
                    let len = items.len() as u64;
                    let is_max = matches!(keyword, Keyword::MaxItems(_));
                    if (is_max && len > *max) || (!is_max && len < *max) {
                        let bound = if is_max { "more" } else { "fewer" };
                        fail(outcome, format!("array has {bound} than {max} items"), Vec::new());
                    }
                }
            }
            Keyword::UniqueItems => {
                if let Value::Array(items) = instance {
                    let duplicate = items
                        .iter()
                        .enumerate()
                        .find_map(|(i, a)| items[i + 1..].iter().position(|b| json_eq(a, b)).map(|j| (i, i + 1 + j)));
                    if let Some((i, j)) = duplicate {
                        fail(outcome, format!("items at {i} and {j} are equal"), Vec::new());
                    }
                }
            }
            Keyword::MaxProperties(max) | Keyword::MinProperties(max) => {
                if let Value::Object(map) = instance {
                    let len = map.len() as u64;
                    let is_max = matches!(keyword, Keyword::MaxProperties(_));
                    if (is_max && len > *max) || (!is_max && len < *max) {
                        let bound = if is_max { "more" } else { "fewer" };
                        fail(outcome, format!("object has {bound} than {max} properties"), Vec::new());
                    }
                }
            }
            Keyword::Required(names) => {
                if let Value::Object(map) = instance {
                    for name in names.iter().filter(|n| !map.contains_key(n.as_str())) {
                        fail(outcome, format!("\"{name}\" is a required property"), Vec::new());
                    }
                }
            }
            Keyword::DependentRequired(entries) => {
                if let Value::Object(map) = instance {
                    for (trigger, names) in entries.iter().filter(|(k, _)| map.contains_key(k.as_str())) {
                        for name in names.iter().filter(|n| !map.contains_key(n.as_str())) {
                            fail(
                                outcome,
                                format!("\"{name}\" is required when \"{trigger}\" is present"),
                                Vec::new(),
                            );
                        }
                    }
                }
            }
            Keyword::Properties(entries) => {
                if let Value::Object(map) = instance {
                    let mut causes = Vec::new();
                    for (name, location) in entries {
                        if let Some(value) = map.get(name) {
                            let result = self.child(
                                location,
                                value,
                                &frame.instance_path.join(name.as_str()),
                                &kw_path.join(name.as_str()),
                            );
                            causes.extend(result.errors);
                            outcome.properties.insert(name.clone());
                        }
                    }
                    if !causes.is_empty() {
                        fail(outcome, "some properties do not match their schemas".to_string(), causes);
                    }
                }
            }
            Keyword::PatternProperties(entries) => {
                if let Value::Object(map) = instance {
                    let mut causes = Vec::new();
                    for (re, location) in entries {
                        for (name, value) in map.iter().filter(|(k, _)| re.is_match(k)) {
                            let result = self.child(
                                location,
                                value,
                                &frame.instance_path.join(name.as_str()),
                                &kw_path.join(re.as_str()),
                            );
                            causes.extend(result.errors);
                            outcome.properties.insert(name.clone());
                        }
                    }
                    if !causes.is_empty() {
                        fail(outcome, "some properties do not match their pattern schemas".to_string(), causes);
                    }
                }
            }
            Keyword::AdditionalProperties {
                schema,
                known,
                patterns,
            } => {
                if let Value::Object(map) = instance {
                    let mut causes = Vec::new();
                    let additional = map
                        .iter()
                        .filter(|(k, _)| !known.contains(k) && !patterns.iter().any(|re| re.is_match(k)));
                    for (name, value) in additional {
                        let result = self.child(schema, value, &frame.instance_path.join(name.as_str()), &kw_path);
                        causes.extend(result.errors);
                        outcome.properties.insert(name.clone());
                    }
                    if !causes.is_empty() {
                        fail(outcome, "additional properties do not match the schema".to_string(), causes);
                    }
                }
            }
            Keyword::PropertyNames(schema) => {
                if let Value::Object(map) = instance {
                    let mut causes = Vec::new();
                    for name in map.keys() {
                        let key = Value::String(name.clone());
                        let result = self.child(schema, &key, &frame.instance_path.join(name.as_str()), &kw_path);
                        causes.extend(result.errors);
                    }
                    if !causes.is_empty() {
                        fail(outcome, "some property names do not match the schema".to_string(), causes);
                    }
                }
            }
            Keyword::DependentSchemas(entries) => {
                if let Value::Object(map) = instance {
                    let mut causes = Vec::new();
                    for (trigger, location) in entries.iter().filter(|(k, _)| map.contains_key(k.as_str())) {
                        let result = self.child(location, instance, frame.instance_path, &kw_path.join(trigger.as_str()));
                        if result.is_valid() {
                            outcome.merge_annotations(result);
                        } else {
                            causes.extend(result.errors);
                        }
                    }
                    if !causes.is_empty() {
                        fail(outcome, "dependent schemas do not match".to_string(), causes);
                    }
                }
            }
            Keyword::PrefixItems(locations) => {
                if let Value::Array(items) = instance {
                    let mut causes = Vec::new();
                    for (i, (location, value)) in locations.iter().zip(items).enumerate() {
                        let result = self.child(
                            location,
                            value,
                            &frame.instance_path.join(i.to_string()),
                            &kw_path.join(i.to_string()),
                        );
                        causes.extend(result.errors);
                        outcome.items.insert(i);
                    }
                    if !causes.is_empty() {
                        fail(outcome, "some items do not match their schemas".to_string(), causes);
                    }
                }
            }
            Keyword::Items { schema, start } => {
                if let Value::Array(items) = instance {
                    let mut causes = Vec::new();
                    for (i, value) in items.iter().enumerate().skip(*start) {
                        let result = self.child(schema, value, &frame.instance_path.join(i.to_string()), &kw_path);
                        causes.extend(result.errors);
                        outcome.items.insert(i);
                    }
                    if !causes.is_empty() {
                        fail(outcome, "some items do not match the schema".to_string(), causes);
                    }
                }
            }
            Keyword::Contains { schema, min, max } => {
                if let Value::Array(items) = instance {
                    let mut matched = 0u64;
                    for (i, value) in items.iter().enumerate() {
                        let result = self.child(schema, value, &frame.instance_path.join(i.to_string()), &kw_path);
                        if result.is_valid() {
                            matched += 1;
                            outcome.items.insert(i);
                        }
                    }
                    if matched < *min {
                        fail(
                            outcome,
                            format!("array contains {matched} matching item(s), fewer than {min}"),
                            Vec::new(),
                        );
                    }
                    if let Some(max) = max {
                        if matched > *max {
                            fail(
                                outcome,
                                format!("array contains {matched} matching item(s), more than {max}"),
                                Vec::new(),
                            );
                        }
                    }
                }
            }
            Keyword::AllOf(locations) => {
                let mut causes = Vec::new();
                for (i, location) in locations.iter().enumerate() {
                    let result = self.child(location, instance, frame.instance_path, &kw_path.join(i.to_string()));
                    if result.is_valid() {
                        outcome.merge_annotations(result);
                    } else {
                        causes.extend(result.errors);
                    }
                }
                if !causes.is_empty() {
                    fail(outcome, "value does not match all subschemas".to_string(), causes);
                }
            }
            Keyword::AnyOf(locations) | Keyword::OneOf(locations) => {
                let mut causes = Vec::new();
                let mut valid = Vec::new();
                for (i, location) in locations.iter().enumerate() {
                    let result = self.child(location, instance, frame.instance_path, &kw_path.join(i.to_string()));
                    if result.is_valid() {
                        valid.push(i);
                        outcome.merge_annotations(result);
                    } else {
                        causes.extend(result.errors);
                    }
                }
                if matches!(keyword, Keyword::AnyOf(_)) {
                    if valid.is_empty() {
                        fail(outcome, "value does not match any subschema".to_string(), causes);
                    }
                } else if valid.is_empty() {
                    fail(outcome, "value does not match exactly one subschema".to_string(), causes);
                } else if valid.len() > 1 {
                    fail(
                        outcome,
                        format!("value matches more than one subschema (indexes {valid:?})"),
                        Vec::new(),
                    );
                }
            }
            Keyword::Not(location) => {
                let result = self.child(location, instance, frame.instance_path, &kw_path);
                if result.is_valid() {
                    fail(outcome, format!("{} must not match the schema", describe(instance)), Vec::new());
                }
            }
            Keyword::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let test = self.child(condition, instance, frame.instance_path, &frame.keyword_path.join("if"));
                let (branch, branch_name) = if test.is_valid() {
                    outcome.merge_annotations(test);
                    (then.as_ref(), "then")
                } else {
                    (otherwise.as_ref(), "else")
                };
                if let Some(location) = branch {
                    let result = self.child(location, instance, frame.instance_path, &frame.keyword_path.join(branch_name));
                    if result.is_valid() {
                        outcome.merge_annotations(result);
                    } else {
                        outcome.errors.push(error(
                            frame,
                            branch_name,
                            format!("value does not match the '{branch_name}' schema"),
                            result.errors,
                        ));
                    }
                }
            }
            Keyword::Ref(location) | Keyword::DynamicRef(location) => {
                let result = self.child(location, instance, frame.instance_path, &kw_path);
                if result.is_valid() {
                    outcome.merge_annotations(result);
                } else {
                    fail(outcome, format!("value does not match the schema at {location}"), result.errors);
                }
            }
            Keyword::UnevaluatedProperties(schema) => {
                if let Value::Object(map) = instance {
                    let mut causes = Vec::new();
                    let mut evaluated = Vec::new();
                    for (name, value) in map.iter().filter(|(k, _)| !outcome.properties.contains(*k)) {
                        let result = self.child(schema, value, &frame.instance_path.join(name.as_str()), &kw_path);
                        causes.extend(result.errors);
                        evaluated.push(name.clone());
                    }
                    outcome.properties.extend(evaluated);
                    if !causes.is_empty() {
                        fail(outcome, "unevaluated properties do not match the schema".to_string(), causes);
                    }
                }
            }
            Keyword::UnevaluatedItems(schema) => {
                if let Value::Array(items) = instance {
                    let mut causes = Vec::new();
                    let mut evaluated = Vec::new();
                    for (i, value) in items.iter().enumerate().filter(|(i, _)| !outcome.items.contains(i)) {
                        let result = self.child(schema, value, &frame.instance_path.join(i.to_string()), &kw_path);
                        causes.extend(result.errors);
                        evaluated.push(i);
                    }
                    outcome.items.extend(evaluated);
                    if !causes.is_empty() {
                        fail(outcome, "unevaluated items do not match the schema".to_string(), causes);
                    }
                }
            }
        }
    }
}

fn error(frame: Frame<'_>, keyword: &str, message: String, causes: Vec<ValidationError>) -> ValidationError {
    ValidationError {
        instance_path: frame.instance_path.clone(),
        keyword_path: frame.keyword_path.join(keyword),
        schema_location: frame.location.clone(),
        keyword: keyword.to_string(),
        message,
        causes,
    }
}

/// Short rendering of an instance for messages.
fn describe(value: &Value) -> String {
    match value {
        Value::Object(_) => "object".to_string(),
        Value::Array(_) => "array".to_string(),
        other => {
            let text = other.to_string();
            if text.chars().count() > 40 {
                format!("{} value", type_name(other))
            } else {
                text
            }
        }
    }
}

/// JSON equality where `1` and `1.0` are the same number.
pub(crate) fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_eq(x, y),
        (Value::Array(x), Value::Array(y)) => x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_eq(a, b)),
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| json_eq(v, w)))
        }
        _ => a == b,
    }
}

fn number_eq(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn is_multiple_of(n: &Number, divisor: f64) -> bool {
    if divisor.fract() == 0.0 && divisor <= i64::MAX as f64 {
        if let Some(i) = n.as_i64() {
            return i % (divisor as i64) == 0;
        }
    }
    let Some(value) = n.as_f64() else {
        return false;
    };
    let quotient = value / divisor;
    if !quotient.is_finite() {
        return false;
    }
    (quotient - quotient.round()).abs() <= f64::EPSILON * quotient.abs().max(1.0) * 4.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_by_value() {
        assert!(json_eq(&json!(1), &json!(1.0)));
        assert!(json_eq(&json!([1, {"a": 2.0}]), &json!([1.0, {"a": 2}])));
        assert!(!json_eq(&json!(1), &json!("1")));
        assert!(!json_eq(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn multiple_of_handles_integers_and_decimals() {
        let n = |v: Value| match v {
            Value::Number(n) => n,
            _ => unreachable!(),
        };
        assert!(is_multiple_of(&n(json!(10)), 5.0));
        assert!(!is_multiple_of(&n(json!(7)), 5.0));
        assert!(is_multiple_of(&n(json!(0.3)), 0.1));
        assert!(!is_multiple_of(&n(json!(0.35)), 0.1));
    }

    #[test]
    fn long_values_are_abbreviated() {
        assert_eq!(describe(&json!("short")), "\"short\"");
        assert_eq!(describe(&json!("x".repeat(60))), "string value");
        assert_eq!(describe(&json!({"a": 1})), "object");
    }
}
