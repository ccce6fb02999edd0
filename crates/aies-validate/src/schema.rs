//! Structural checker for a JSON-Schema subset.
//!
//! The schema document is compiled once into a [`Node`] tree; checking an
//! instance walks both trees together and collects every issue instead of
//! stopping at the first one.
//!
//! Supported keywords: `type`, `properties`, `required`,
//! `additionalProperties` (bool or schema), `propertyNames`, `items`,
//! `minItems`, `maxItems`, `enum`, `const`, `minimum`, `maximum`,
//! `exclusiveMinimum`, `exclusiveMaximum`, `minLength`, `maxLength`,
//! `pattern`, `format` (`date-time`). Annotation keywords are ignored.
//! Composition keywords are rejected at compile time so a schema relying on
//! them never silently passes everything.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{FieldIssue, Result, SchemaError};

const BUILTIN_SCHEMA: &str = include_str!("../schema/schedule.schema.json");

const ANNOTATIONS: &[&str] = &[
    "$schema",
    "$id",
    "$comment",
    "title",
    "description",
    "default",
    "examples",
    "deprecated",
    "readOnly",
    "writeOnly",
];

const UNSUPPORTED: &[&str] = &[
    "$ref",
    "$defs",
    "definitions",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "if",
    "then",
    "else",
    "patternProperties",
    "dependentRequired",
    "dependentSchemas",
    "prefixItems",
    "contains",
    "uniqueItems",
    "multipleOf",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl JsonType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "object" => Some(JsonType::Object),
            "array" => Some(JsonType::Array),
            "string" => Some(JsonType::String),
            "number" => Some(JsonType::Number),
            "integer" => Some(JsonType::Integer),
            "boolean" => Some(JsonType::Boolean),
            "null" => Some(JsonType::Null),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::Boolean => "boolean",
            JsonType::Null => "null",
        }
    }

    fn matches(self, v: &Value) -> bool {
        match self {
            JsonType::Object => v.is_object(),
            JsonType::Array => v.is_array(),
            JsonType::String => v.is_string(),
            JsonType::Number => v.is_number(),
            JsonType::Integer => {
                v.is_i64() || v.is_u64() || v.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            JsonType::Boolean => v.is_boolean(),
            JsonType::Null => v.is_null(),
        }
    }
}

fn type_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    DateTime,
}

#[derive(Debug, Clone)]
enum Additional {
    Allowed,
    Forbidden,
    Schema(Box<Node>),
}

#[derive(Debug, Clone)]
struct Node {
    types: Option<Vec<JsonType>>,
    properties: BTreeMap<String, Node>,
    required: Vec<String>,
    additional: Additional,
    property_names: Option<Box<Node>>,
    items: Option<Box<Node>>,
    min_items: Option<usize>,
    max_items: Option<usize>,
    enum_values: Option<Vec<Value>>,
    const_value: Option<Value>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    exclusive_minimum: Option<f64>,
    exclusive_maximum: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
    format: Option<Format>,
}

impl Node {
    fn permissive() -> Self {
        Self {
            types: None,
            properties: BTreeMap::new(),
            required: Vec::new(),
            additional: Additional::Allowed,
            property_names: None,
            items: None,
            min_items: None,
            max_items: None,
            enum_values: None,
            const_value: None,
            minimum: None,
            maximum: None,
            exclusive_minimum: None,
            exclusive_maximum: None,
            min_length: None,
            max_length: None,
            pattern: None,
            format: None,
        }
    }
}

/// A compiled structural schema.
#[derive(Debug, Clone)]
pub struct Schema {
    root: Node,
}

impl Schema {
    /// The schema shipped with this crate.
    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN_SCHEMA)
    }

    /// Read and compile a schema file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self {
            root: compile(value, "#")?,
        })
    }

    /// Check `instance` and return every issue found (empty when it conforms).
    pub fn check(&self, instance: &Value) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        check_node(&self.root, instance, "$", &mut issues);
        issues
    }
}

// --- compilation -----------------------------------------------------------

fn invalid(path: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidKeyword {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn compile(value: &Value, path: &str) -> Result<Node> {
    let obj = match value {
        // `true` accepts anything; `false` is modelled as "no type matches".
        Value::Bool(true) => return Ok(Node::permissive()),
        Value::Bool(false) => {
            let mut n = Node::permissive();
            n.types = Some(Vec::new());
            return Ok(n);
        }
        Value::Object(obj) => obj,
        other => return Err(invalid(path, format!("expected object, got {}", type_of(other)))),
    };

    let mut node = Node::permissive();
    for (key, kw) in obj {
        let kpath = format!("{path}/{key}");
        match key.as_str() {
            "type" => node.types = Some(compile_types(kw, &kpath)?),
            "properties" => node.properties = compile_properties(kw, &kpath)?,
            "required" => node.required = compile_string_list(kw, &kpath)?,
            "additionalProperties" => {
                node.additional = match kw {
                    Value::Bool(true) => Additional::Allowed,
                    Value::Bool(false) => Additional::Forbidden,
                    other => Additional::Schema(Box::new(compile(other, &kpath)?)),
                }
            }
            "propertyNames" => node.property_names = Some(Box::new(compile(kw, &kpath)?)),
            "items" => node.items = Some(Box::new(compile(kw, &kpath)?)),
            "minItems" => node.min_items = Some(as_count(kw, &kpath)?),
            "maxItems" => node.max_items = Some(as_count(kw, &kpath)?),
            "minLength" => node.min_length = Some(as_count(kw, &kpath)?),
            "maxLength" => node.max_length = Some(as_count(kw, &kpath)?),
            "minimum" => node.minimum = Some(as_number(kw, &kpath)?),
            "maximum" => node.maximum = Some(as_number(kw, &kpath)?),
            "exclusiveMinimum" => node.exclusive_minimum = Some(as_number(kw, &kpath)?),
            "exclusiveMaximum" => node.exclusive_maximum = Some(as_number(kw, &kpath)?),
            "enum" => match kw {
                Value::Array(values) if !values.is_empty() => {
                    node.enum_values = Some(values.clone())
                }
                _ => return Err(invalid(&kpath, "enum must be a non-empty array")),
            },
            "const" => node.const_value = Some(kw.clone()),
            "pattern" => {
                let src = kw
                    .as_str()
                    .ok_or_else(|| invalid(&kpath, "pattern must be a string"))?;
                let re = Regex::new(src).map_err(|e| invalid(&kpath, e.to_string()))?;
                node.pattern = Some(re);
            }
            "format" => match kw.as_str() {
                Some("date-time") => node.format = Some(Format::DateTime),
                // unknown formats are annotations only
                Some(_) => {}
                None => return Err(invalid(&kpath, "format must be a string")),
            },
            k if ANNOTATIONS.contains(&k) => {}
            k if UNSUPPORTED.contains(&k) => {
                return Err(SchemaError::Unsupported {
                    path: path.to_string(),
                    keyword: k.to_string(),
                })
            }
            // Vendor extensions and unknown keywords do not constrain.
            _ => {}
        }
    }
    Ok(node)
}

fn compile_types(kw: &Value, path: &str) -> Result<Vec<JsonType>> {
    let parse_one = |v: &Value| {
        v.as_str()
            .and_then(JsonType::parse)
            .ok_or_else(|| invalid(path, format!("unknown type {v}")))
    };
    match kw {
        Value::String(_) => Ok(vec![parse_one(kw)?]),
        Value::Array(list) if !list.is_empty() => list.iter().map(parse_one).collect(),
        _ => Err(invalid(path, "type must be a string or non-empty array")),
    }
}

fn compile_properties(kw: &Value, path: &str) -> Result<BTreeMap<String, Node>> {
    let obj = kw
        .as_object()
        .ok_or_else(|| invalid(path, "properties must be an object"))?;
    obj.iter()
        .map(|(name, sub)| Ok((name.clone(), compile(sub, &format!("{path}/{name}"))?)))
        .collect()
}

fn compile_string_list(kw: &Value, path: &str) -> Result<Vec<String>> {
    let list = kw
        .as_array()
        .ok_or_else(|| invalid(path, "expected an array of strings"))?;
    list.iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(path, "expected an array of strings"))
        })
        .collect()
}

fn as_count(kw: &Value, path: &str) -> Result<usize> {
    kw.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| invalid(path, "expected a non-negative integer"))
}

fn as_number(kw: &Value, path: &str) -> Result<f64> {
    kw.as_f64()
        .ok_or_else(|| invalid(path, "expected a number"))
}

// --- checking --------------------------------------------------------------

fn child_path(path: &str, key: &str) -> String {
    format!("{path}.{key}")
}

fn check_node(node: &Node, v: &Value, path: &str, out: &mut Vec<FieldIssue>) {
    if let Some(types) = &node.types {
        if !types.iter().any(|t| t.matches(v)) {
            let expected: Vec<&str> = types.iter().map(|t| t.name()).collect();
            let reason = if expected.is_empty() {
                "no value is allowed here".to_string()
            } else {
                format!("expected {}, got {}", expected.join(" or "), type_of(v))
            };
            out.push(FieldIssue::new(path, reason));
            // Further keywords would only repeat the type mismatch.
            return;
        }
    }

    if let Some(values) = &node.enum_values {
        if !values.contains(v) {
            let allowed: Vec<String> = values.iter().map(|x| x.to_string()).collect();
            out.push(FieldIssue::new(
                path,
                format!("{v} is not one of [{}]", allowed.join(", ")),
            ));
        }
    }
    if let Some(c) = &node.const_value {
        if c != v {
            out.push(FieldIssue::new(path, format!("expected constant {c}")));
        }
    }

    match v {
        Value::Object(obj) => check_object(node, obj, path, out),
        Value::Array(items) => check_array(node, items, path, out),
        Value::String(s) => check_string(node, s, path, out),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                check_number(node, f, path, out);
            }
        }
        Value::Bool(_) | Value::Null => {}
    }
}

fn check_object(node: &Node, obj: &Map<String, Value>, path: &str, out: &mut Vec<FieldIssue>) {
    for name in &node.required {
        if !obj.contains_key(name) {
            out.push(FieldIssue::new(
                child_path(path, name),
                "required property is missing",
            ));
        }
    }

    for (key, value) in obj {
        let kpath = child_path(path, key);

        if let Some(names) = &node.property_names {
            let mut name_issues = Vec::new();
            check_node(names, &Value::String(key.clone()), &kpath, &mut name_issues);
            for issue in name_issues {
                out.push(FieldIssue::new(
                    issue.path,
                    format!("invalid property name: {}", issue.reason),
                ));
            }
        }

        if let Some(sub) = node.properties.get(key) {
            check_node(sub, value, &kpath, out);
            continue;
        }
        match &node.additional {
            Additional::Allowed => {}
            Additional::Forbidden => {
                out.push(FieldIssue::new(kpath, "additional property is not allowed"))
            }
            Additional::Schema(sub) => check_node(sub, value, &kpath, out),
        }
    }
}

fn check_array(node: &Node, items: &[Value], path: &str, out: &mut Vec<FieldIssue>) {
    if let Some(min) = node.min_items {
        if items.len() < min {
            out.push(FieldIssue::new(path, format!("expected at least {min} item(s)")));
        }
    }
    if let Some(max) = node.max_items {
        if items.len() > max {
            out.push(FieldIssue::new(path, format!("expected at most {max} item(s)")));
        }
    }
    if let Some(sub) = &node.items {
        for (i, item) in items.iter().enumerate() {
            check_node(sub, item, &format!("{path}[{i}]"), out);
        }
    }
}

fn check_string(node: &Node, s: &str, path: &str, out: &mut Vec<FieldIssue>) {
    let len = s.chars().count();
    if let Some(min) = node.min_length {
        if len < min {
            out.push(FieldIssue::new(path, format!("shorter than {min} character(s)")));
        }
    }
    if let Some(max) = node.max_length {
        if len > max {
            out.push(FieldIssue::new(path, format!("longer than {max} character(s)")));
        }
    }
    if let Some(re) = &node.pattern {
        if !re.is_match(s) {
            out.push(FieldIssue::new(
                path,
                format!("{s:?} does not match pattern {}", re.as_str()),
            ));
        }
    }
    if node.format == Some(Format::DateTime)
        && chrono::DateTime::parse_from_rfc3339(s).is_err()
    {
        out.push(FieldIssue::new(path, format!("{s:?} is not an RFC 3339 date-time")));
    }
}

fn check_number(node: &Node, f: f64, path: &str, out: &mut Vec<FieldIssue>) {
    if let Some(min) = node.minimum {
        if f < min {
            out.push(FieldIssue::new(path, format!("{f} is less than minimum {min}")));
        }
    }
    if let Some(max) = node.maximum {
        if f > max {
            out.push(FieldIssue::new(path, format!("{f} is greater than maximum {max}")));
        }
    }
    if let Some(min) = node.exclusive_minimum {
        if f <= min {
            out.push(FieldIssue::new(path, format!("{f} must be greater than {min}")));
        }
    }
    if let Some(max) = node.exclusive_maximum {
        if f >= max {
            out.push(FieldIssue::new(path, format!("{f} must be less than {max}")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(issues: &[FieldIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.path.as_str()).collect()
    }

    #[test]
    fn builtin_schema_compiles() {
        Schema::builtin().expect("builtin schema must compile");
    }

    #[test]
    fn builtin_accepts_minimal_document() {
        let schema = Schema::builtin().unwrap();
        let doc = json!({
            "devices": {
                "heater": {
                    "intervals": [{
                        "start": "2025-06-02T00:00:00+02:00",
                        "end": "2025-06-02T01:00:00+02:00",
                        "command": "heat",
                        "power_kw": 2.5
                    }]
                }
            }
        });
        assert!(schema.check(&doc).is_empty());
    }

    #[test]
    fn reports_every_issue_with_paths() {
        let schema = Schema::builtin().unwrap();
        let doc = json!({
            "devices": {
                "Bad-Id": { "intervals": [] },
                "heater": {
                    "intervals": [{
                        "start": "yesterday",
                        "command": "",
                        "power_kw": -1,
                        "source": "robot",
                        "colour": "red"
                    }]
                }
            }
        });
        let issues = schema.check(&doc);
        let p = paths(&issues);
        assert!(p.contains(&"$.devices.Bad-Id"));
        assert!(p.contains(&"$.devices.heater.intervals[0].start"));
        assert!(p.contains(&"$.devices.heater.intervals[0].end"));
        assert!(p.contains(&"$.devices.heater.intervals[0].command"));
        assert!(p.contains(&"$.devices.heater.intervals[0].power_kw"));
        assert!(p.contains(&"$.devices.heater.intervals[0].source"));
        assert!(p.contains(&"$.devices.heater.intervals[0].colour"));
    }

    #[test]
    fn type_mismatch_stops_descent() {
        let schema = Schema::builtin().unwrap();
        let issues = schema.check(&json!({ "devices": [] }));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "$.devices");
        assert!(issues[0].reason.contains("expected object, got array"));
    }

    #[test]
    fn null_numbers_are_allowed() {
        let schema = Schema::builtin().unwrap();
        let doc = json!({
            "devices": { "pump": { "intervals": [{
                "start": "2025-06-02T00:00:00Z",
                "end": "2025-06-02T01:00:00Z",
                "command": "run",
                "power_kw": null,
                "energy_kwh": null
            }]}}
        });
        assert!(schema.check(&doc).is_empty());
    }

    #[test]
    fn composition_keywords_are_rejected() {
        let err = Schema::from_value(&json!({ "anyOf": [{ "type": "string" }] })).unwrap_err();
        assert!(matches!(err, SchemaError::Unsupported { ref keyword, .. } if keyword == "anyOf"));
    }

    #[test]
    fn bad_pattern_is_a_compile_error() {
        let err = Schema::from_value(&json!({ "type": "string", "pattern": "([" })).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidKeyword { .. }));
    }

    #[test]
    fn boolean_schemas() {
        let schema = Schema::from_value(&json!({
            "type": "object",
            "properties": { "any": true, "never": false }
        }))
        .unwrap();
        assert!(schema.check(&json!({ "any": [1, 2] })).is_empty());
        assert_eq!(schema.check(&json!({ "never": 1 })).len(), 1);
    }

    #[test]
    fn numeric_bounds_and_integer_type() {
        let schema = Schema::from_value(&json!({
            "type": "integer", "exclusiveMinimum": 0, "maximum": 10
        }))
        .unwrap();
        assert!(schema.check(&json!(5)).is_empty());
        assert_eq!(schema.check(&json!(0)).len(), 1);
        assert_eq!(schema.check(&json!(11)).len(), 1);
        assert_eq!(schema.check(&json!(2.5)).len(), 1);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        std::fs::write(&path, r#"{"type":"object","required":["devices"]}"#).unwrap();
        let schema = Schema::load(&path).unwrap();
        assert_eq!(schema.check(&json!({})).len(), 1);
    }
}
