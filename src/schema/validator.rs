// src/schema/validator.rs
//! Validator trait and the concrete validators the cache hands out.
//!
//! The cache treats validators as opaque: anything that can accept or
//! reject a JSON value qualifies. Two concrete implementations live
//! here — a permissive fallback for unregistered names, and a minimal
//! object-shape validator for callers that want structural checks
//! without pulling in a schema language.

use crate::error::FieldError;
use serde_json::Value;
use std::collections::BTreeMap;

/// The ability to accept or reject an untyped value.
///
/// Validation reports *all* field-level problems, not just the first,
/// so callers can surface one complete error message per value.
pub trait Validator: Send + Sync + std::fmt::Debug {
    /// The schema name this validator was built for.
    fn name(&self) -> &str;

    /// Validates a value, returning it (possibly normalized) on success.
    fn validate(&self, value: &Value) -> Result<Value, Vec<FieldError>>;
}

/// Fallback validator that accepts any value unchanged.
///
/// Handed out when `load()` is called for an unregistered name, so
/// happy-path read code is not forced into exception handling for
/// optional schemas. The missing registration is still observable via
/// the cache's error map.
#[derive(Debug)]
pub struct PermissiveValidator {
    name: String,
}

impl PermissiveValidator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Validator for PermissiveValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, value: &Value) -> Result<Value, Vec<FieldError>> {
        Ok(value.clone())
    }
}

/// Expected JSON kind for a single field of an [`ObjectSchema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    /// Present with any kind.
    Any,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => true,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Any => "any",
        }
    }
}

/// Declares how one field of an object is checked.
#[derive(Debug, Clone)]
struct FieldRule {
    kind: FieldKind,
    required: bool,
}

/// Minimal structural validator: the value must be a JSON object, every
/// required field must be present, and present fields must match their
/// declared kind. All violations are collected before reporting.
#[derive(Debug)]
pub struct ObjectSchema {
    name: String,
    fields: BTreeMap<String, FieldRule>,
}

impl ObjectSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Adds a required field of the given kind.
    pub fn required(mut self, field: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            field.into(),
            FieldRule {
                kind,
                required: true,
            },
        );
        self
    }

    /// Adds an optional field of the given kind.
    pub fn optional(mut self, field: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            field.into(),
            FieldRule {
                kind,
                required: false,
            },
        );
        self
    }
}

impl Validator for ObjectSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, value: &Value) -> Result<Value, Vec<FieldError>> {
        let Some(object) = value.as_object() else {
            return Err(vec![FieldError::new(
                "$",
                format!("expected object, got {}", json_kind(value)),
            )]);
        };

        let mut problems = Vec::new();
        for (field, rule) in &self.fields {
            match object.get(field) {
                None if rule.required => {
                    problems.push(FieldError::new(field.clone(), "required field missing"));
                }
                None => {}
                Some(present) if !rule.kind.matches(present) => {
                    problems.push(FieldError::new(
                        field.clone(),
                        format!(
                            "expected {}, got {}",
                            rule.kind.describe(),
                            json_kind(present)
                        ),
                    ));
                }
                Some(_) => {}
            }
        }

        if problems.is_empty() {
            Ok(value.clone())
        } else {
            Err(problems)
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
