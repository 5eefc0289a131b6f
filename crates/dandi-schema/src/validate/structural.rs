//! Structural pass: walk a record against its [`SchemaShape`].

use serde_json::{Map, Value};

use crate::config::LimitsConfig;
use crate::registry::{ObjectShape, SchemaShape, Shape};
use crate::validate::report::{Fault, FaultKind};

pub(crate) fn check(shape: &SchemaShape, record: &Value, missing_ok: bool) -> Vec<Fault> {
    let mut walker = Walker {
        shape,
        missing_ok,
        faults: Vec::new(),
    };
    walker.object(record, &shape.root, "", 0);
    walker.faults
}

struct Walker<'a> {
    shape: &'a SchemaShape,
    missing_ok: bool,
    faults: Vec<Fault>,
}

impl<'a> Walker<'a> {
    fn fork(&self) -> Walker<'a> {
        Walker {
            shape: self.shape,
            missing_ok: self.missing_ok,
            faults: Vec::new(),
        }
    }

    fn push(&mut self, path: &str, kind: FaultKind, message: impl Into<String>) {
        self.faults.push(Fault::error(path, kind, message));
    }

    fn has_errors(&self) -> bool {
        self.faults.iter().any(Fault::is_error)
    }

    fn value(&mut self, value: &Value, shape: &Shape, path: &str, depth: usize) {
        if depth > LimitsConfig::MAX_NESTING_DEPTH {
            self.push(
                path,
                FaultKind::Depth,
                format!(
                    "nesting exceeds the limit of {} levels",
                    LimitsConfig::MAX_NESTING_DEPTH
                ),
            );
            return;
        }

        match shape {
            Shape::Any => {}
            Shape::String {
                pattern,
                max_length,
                format,
            } => {
                let Some(s) = self.expect_str(value, path) else {
                    return;
                };
                if let Some(max) = max_length {
                    let len = s.chars().count();
                    if len > *max {
                        self.push(
                            path,
                            FaultKind::Length,
                            format!("is {} characters long, at most {} allowed", len, max),
                        );
                    }
                }
                if let Some(pattern) = pattern {
                    if !pattern.is_match(s) {
                        self.push(
                            path,
                            FaultKind::Pattern,
                            format!("{:?} does not match pattern {}", s, pattern.as_str()),
                        );
                    }
                }
                if let Some(format) = format {
                    if !format.accepts(s) {
                        self.push(
                            path,
                            FaultKind::Format,
                            format!("{:?} is not a valid {}", s, format.as_str()),
                        );
                    }
                }
            }
            Shape::Integer { minimum } => {
                if !(value.is_i64() || value.is_u64()) {
                    self.type_fault(value, "integer", path);
                    return;
                }
                if let (Some(min), Some(n)) = (minimum, value.as_i64()) {
                    if n < *min {
                        self.push(path, FaultKind::Range, format!("{} is less than {}", n, min));
                    }
                }
            }
            Shape::Number => {
                if !value.is_number() {
                    self.type_fault(value, "number", path);
                }
            }
            Shape::Boolean => {
                if !value.is_boolean() {
                    self.type_fault(value, "boolean", path);
                }
            }
            Shape::Const { value: expected } => {
                let Some(s) = self.expect_str(value, path) else {
                    return;
                };
                if s != expected {
                    self.push(
                        path,
                        FaultKind::Const,
                        format!("expected {:?}, found {:?}", expected, s),
                    );
                }
            }
            Shape::Enum { values } => {
                let Some(s) = self.expect_str(value, path) else {
                    return;
                };
                if !values.iter().any(|v| v == s) {
                    self.push(
                        path,
                        FaultKind::Enum,
                        format!("{:?} is not one of: {}", s, values.join(", ")),
                    );
                }
            }
            Shape::Array {
                items,
                min_items,
                max_items,
            } => {
                let Some(array) = value.as_array() else {
                    self.type_fault(value, "array", path);
                    return;
                };
                if let Some(min) = min_items {
                    if array.len() < *min {
                        self.push(
                            path,
                            FaultKind::Items,
                            format!("has {} items, at least {} required", array.len(), min),
                        );
                    }
                }
                if let Some(max) = max_items {
                    if array.len() > *max {
                        self.push(
                            path,
                            FaultKind::Items,
                            format!("has {} items, at most {} allowed", array.len(), max),
                        );
                    }
                }
                for (i, item) in array.iter().enumerate() {
                    self.value(item, items, &index_path(path, i), depth + 1);
                }
            }
            Shape::Object(object) => self.object(value, object, path, depth),
            Shape::Map { keys, values } => {
                let Some(map) = value.as_object() else {
                    self.type_fault(value, "object", path);
                    return;
                };
                for (key, item) in map {
                    let item_path = field_path(path, key);
                    if let Some(allowed) = keys {
                        if !allowed.iter().any(|k| k == key) {
                            self.push(
                                &item_path,
                                FaultKind::UnknownKey,
                                format!("{:?} is not one of: {}", key, allowed.join(", ")),
                            );
                            continue;
                        }
                    }
                    self.value(item, values, &item_path, depth + 1);
                }
            }
            Shape::OneOf {
                discriminator,
                variants,
            } => self.one_of(value, discriminator, variants, path, depth),
            Shape::AnyOf { options } => self.any_of(value, options, path, depth),
            Shape::Ref { name } => {
                let schema = self.shape;
                match schema.definition(name) {
                    Some(target) => self.value(value, target, path, depth + 1),
                    None => self.push(
                        path,
                        FaultKind::Reference,
                        format!("schema reference {:?} is not defined", name),
                    ),
                }
            }
        }
    }

    fn object(&mut self, value: &Value, object: &ObjectShape, path: &str, depth: usize) {
        let Some(map) = value.as_object() else {
            self.type_fault(value, "object", path);
            return;
        };

        for field in &object.fields {
            let child = field_path(path, &field.name);
            match map.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        self.missing(&child, &field.name);
                    }
                }
                Some(item) => self.value(item, &field.shape, &child, depth + 1),
            }
        }

        if !object.additional {
            self.unknown_fields(map, object, path);
        }
    }

    fn unknown_fields(&mut self, map: &Map<String, Value>, object: &ObjectShape, path: &str) {
        for key in map.keys() {
            if object.field(key).is_none() {
                self.push(
                    &field_path(path, key),
                    FaultKind::UnknownField,
                    format!("unexpected field {:?}", key),
                );
            }
        }
    }

    fn one_of(
        &mut self,
        value: &Value,
        discriminator: &str,
        variants: &[ObjectShape],
        path: &str,
        depth: usize,
    ) {
        let Some(map) = value.as_object() else {
            self.type_fault(value, "object", path);
            return;
        };
        let tag_path = field_path(path, discriminator);
        let expected: Vec<&str> = variants
            .iter()
            .filter_map(|v| v.const_of(discriminator))
            .collect();

        let tag = match map.get(discriminator) {
            None | Some(Value::Null) => {
                self.push(
                    &tag_path,
                    FaultKind::Discriminator,
                    format!(
                        "missing {:?}; expected one of: {}",
                        discriminator,
                        expected.join(", ")
                    ),
                );
                return;
            }
            Some(tag) => tag,
        };
        let Some(tag) = self.expect_str(tag, &tag_path) else {
            return;
        };
        match variants
            .iter()
            .find(|v| v.const_of(discriminator) == Some(tag))
        {
            Some(variant) => self.object(value, variant, path, depth),
            None => self.push(
                &tag_path,
                FaultKind::Discriminator,
                format!("{:?} is not one of: {}", tag, expected.join(", ")),
            ),
        }
    }

    fn any_of(&mut self, value: &Value, options: &[Shape], path: &str, depth: usize) {
        let mut attempts = Vec::with_capacity(options.len());
        for option in options {
            let mut attempt = self.fork();
            attempt.value(value, option, path, depth);
            if !attempt.has_errors() {
                self.faults.extend(attempt.faults);
                return;
            }
            attempts.push((option, attempt.faults));
        }

        // Report the one option shaped like the value, if there is exactly one.
        let mut compatible = attempts
            .into_iter()
            .filter(|(option, _)| accepts_json_type(option, value));
        match (compatible.next(), compatible.next()) {
            (Some((_, faults)), None) => self.faults.extend(faults),
            _ => {
                let names: Vec<&str> = options.iter().map(Shape::type_name).collect();
                self.push(
                    path,
                    FaultKind::NoMatch,
                    format!(
                        "{} does not match any allowed shape ({})",
                        json_type_name(value),
                        names.join(" | ")
                    ),
                );
            }
        }
    }

    fn missing(&mut self, path: &str, name: &str) {
        let message = format!("missing required field {:?}", name);
        if self.missing_ok {
            self.faults.push(Fault::warning(path, FaultKind::Missing, message));
        } else {
            self.push(path, FaultKind::Missing, message);
        }
    }

    fn expect_str<'v>(&mut self, value: &'v Value, path: &str) -> Option<&'v str> {
        let s = value.as_str();
        if s.is_none() {
            self.type_fault(value, "string", path);
        }
        s
    }

    fn type_fault(&mut self, value: &Value, expected: &str, path: &str) {
        self.push(
            path,
            FaultKind::Type,
            format!("expected {}, found {}", expected, json_type_name(value)),
        );
    }
}

/// Whether the JSON type of `value` is one `shape` could accept.
fn accepts_json_type(shape: &Shape, value: &Value) -> bool {
    match shape {
        Shape::Any | Shape::Ref { .. } => true,
        Shape::String { .. } | Shape::Const { .. } | Shape::Enum { .. } => value.is_string(),
        Shape::Integer { .. } | Shape::Number => value.is_number(),
        Shape::Boolean => value.is_boolean(),
        Shape::Array { .. } => value.is_array(),
        Shape::Object(_) | Shape::Map { .. } | Shape::OneOf { .. } => value.is_object(),
        Shape::AnyOf { options } => options.iter().any(|o| accepts_json_type(o, value)),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn field_path(parent: &str, field: &str) -> String {
    if parent.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", parent, field)
    }
}

pub(crate) fn index_path(parent: &str, index: usize) -> String {
    format!("{}[{}]", parent, index)
}
