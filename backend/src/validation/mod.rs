//! Declared field types and JSON Schema validation for configuration records.
//!
//! Records are schema-less; each kind only declares the types of a handful
//! of top-level fields. Before a record is sent, those fields are cast to
//! their declared type and the result is checked against a JSON Schema
//! (Draft 7) generated from the same declaration.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use txedit::models::RecordKind;
//! use txedit::validation::{cast_record, validate_record};
//!
//! let mut record = json!({"name": "Main", "priority": "2"}).as_object().unwrap().clone();
//! let warnings = cast_record(RecordKind::Source, &mut record);
//! assert!(warnings.is_empty());
//! assert_eq!(record["priority"], 2);
//! assert!(validate_record(RecordKind::Source, &record).is_ok());
//! ```

use serde_json::{json, Map, Number, Value};

use crate::models::{Record, RecordKind};
use crate::transform::coerce::{parse_bool_loose, CoercionWarning};

/// Declared type of a top-level field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Str,
    Int,
    Bool,
    /// A string, or a list kept as is.
    Tags,
}

impl FieldType {
    fn schema_type(&self) -> &'static str {
        match self {
            FieldType::Str | FieldType::Tags => "string",
            FieldType::Int => "integer",
            FieldType::Bool => "boolean",
        }
    }

    fn schema(&self) -> Value {
        match self {
            FieldType::Tags => json!({ "type": ["string", "array", "null"] }),
            other => json!({ "type": [other.schema_type(), "null"] }),
        }
    }
}

const STREAM_FIELDS: &[(&str, FieldType)] = &[
    ("name", FieldType::Str),
    ("id", FieldType::Str),
    ("enableThumbnails", FieldType::Bool),
    ("mwedge", FieldType::Str),
];

const SOURCE_FIELDS: &[(&str, FieldType)] = &[
    ("stream", FieldType::Str),
    ("priority", FieldType::Int),
    ("name", FieldType::Str),
    ("id", FieldType::Str),
    ("paused", FieldType::Bool),
    ("active", FieldType::Bool),
    ("etr290Enabled", FieldType::Bool),
    ("stopped", FieldType::Bool),
    ("exhausted", FieldType::Bool),
    ("mwedge", FieldType::Str),
    ("passive", FieldType::Bool),
];

const OUTPUT_FIELDS: &[(&str, FieldType)] = &[
    ("stream", FieldType::Str),
    ("name", FieldType::Str),
    ("id", FieldType::Str),
    ("paused", FieldType::Bool),
    ("active", FieldType::Bool),
    ("stopped", FieldType::Bool),
    ("mwedge", FieldType::Str),
    ("tags", FieldType::Tags),
    ("muteOnError", FieldType::Bool),
    ("muteOnErrorPeriod", FieldType::Int),
];

/// Declared fields of a kind.
pub fn declared_fields(kind: RecordKind) -> &'static [(&'static str, FieldType)] {
    match kind {
        RecordKind::Stream => STREAM_FIELDS,
        RecordKind::Source => SOURCE_FIELDS,
        RecordKind::Output => OUTPUT_FIELDS,
    }
}

fn cast_value(value: &Value, to: FieldType) -> Option<Value> {
    match (to, value) {
        (FieldType::Str, Value::String(_)) => Some(value.clone()),
        (FieldType::Str, Value::Number(n)) => Some(Value::String(n.to_string())),
        (FieldType::Str, Value::Bool(b)) => Some(Value::String(b.to_string())),
        (FieldType::Tags, Value::Array(_)) => Some(value.clone()),
        (FieldType::Tags, _) => cast_value(value, FieldType::Str),

        (FieldType::Int, Value::Number(n)) if n.is_i64() || n.is_u64() => Some(value.clone()),
        (FieldType::Int, Value::Number(n)) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| Value::Number(Number::from(f as i64))),
        (FieldType::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        (FieldType::Int, Value::Bool(b)) => Some(Value::from(*b as i64)),

        (FieldType::Bool, Value::Bool(_)) => Some(value.clone()),
        (FieldType::Bool, Value::String(s)) => parse_bool_loose(s).map(Value::Bool),
        (FieldType::Bool, Value::Number(n)) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },

        _ => None,
    }
}

/// Cast the declared fields present in `record` to their declared type.
///
/// Values that cannot be cast are left unchanged and reported.
pub fn cast_record(kind: RecordKind, record: &mut Record) -> Vec<CoercionWarning> {
    let mut warnings = Vec::new();

    for (field, field_type) in declared_fields(kind) {
        let Some(value) = record.get_mut(*field) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        match cast_value(value, *field_type) {
            Some(cast) => *value = cast,
            None => warnings.push(CoercionWarning {
                column: field.to_string(),
                value: value.to_string(),
                message: format!("cannot cast to {}", field_type.schema_type()),
            }),
        }
    }

    warnings
}

/// JSON Schema (Draft 7) of the declared fields of a kind.
pub fn kind_schema(kind: RecordKind) -> Value {
    let properties: Map<String, Value> = declared_fields(kind)
        .iter()
        .map(|(field, field_type)| {
            (field.to_string(), field_type.schema())
        })
        .collect();

    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": kind.label(),
        "type": "object",
        "properties": properties
    })
}

/// Validate a record against its kind's schema.
pub fn validate_record(kind: RecordKind, record: &Record) -> Result<(), Vec<String>> {
    validate(&kind_schema(kind), &Value::Object(record.clone()))
}

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with the errors if invalid
///
/// # Example
/// ```ignore
/// use serde_json::json;
/// use txedit::validation::validate;
///
/// let schema = json!({
///     "type": "object",
///     "required": ["name"],
///     "properties": {
///         "name": { "type": "string" }
///     }
/// });
///
/// let valid_data = json!({ "name": "test" });
/// assert!(validate(&schema, &valid_data).is_ok());
///
/// let invalid_data = json!({ "age": 42 });
/// assert!(validate(&schema, &invalid_data).is_err());
/// ```
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator =
        jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick check: true when `data` matches `schema`.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}
