//! Generic JSON / NDJSON to CSV conversion.
//!
//! Headers are either explicit field paths or inferred from the first
//! records by dotted flattening. Lists and objects that end up in a cell
//! are written as compact JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::flatten::{flatten_value, render_scalar};
use super::path::FieldPath;
use crate::error::ConvertError;
use crate::models::FlatRow;
use crate::parser::Table;

/// Options for [`convert`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Explicit columns; inferred when `None`.
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    /// Number of records sampled to infer headers.
    pub infer_records: usize,
    /// Output delimiter.
    pub delimiter: char,
    /// Written for missing and null values.
    pub null_placeholder: String,
    /// Force NDJSON reading regardless of file extension.
    pub ndjson: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            fields: None,
            infer_records: 1000,
            delimiter: ',',
            null_placeholder: String::new(),
            ndjson: false,
        }
    }
}

/// Whether a file name denotes NDJSON.
pub fn is_ndjson_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("ndjson") || e.eq_ignore_ascii_case("jsonl"))
        .unwrap_or(false)
}

/// Read records from JSON or NDJSON text.
///
/// JSON may be an array of objects or a single object.
pub fn load_records(content: &str, ndjson: bool) -> Result<Vec<Value>, ConvertError> {
    if ndjson {
        let mut records = Vec::new();
        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value =
                serde_json::from_str(line).map_err(|e| ConvertError::InvalidLine {
                    line: i + 1,
                    message: e.to_string(),
                })?;
            if !value.is_object() {
                return Err(ConvertError::Unsupported(
                    "each NDJSON line must be a JSON object".to_string(),
                ));
            }
            records.push(value);
        }
        return Ok(records);
    }

    let data: Value =
        serde_json::from_str(content).map_err(|e| ConvertError::InvalidJson(e.to_string()))?;
    match data {
        Value::Array(items) => {
            if items.iter().any(|item| !item.is_object()) {
                return Err(ConvertError::Unsupported(
                    "top-level JSON array must contain objects only".to_string(),
                ));
            }
            Ok(items)
        }
        obj @ Value::Object(_) => Ok(vec![obj]),
        _ => Err(ConvertError::Unsupported(
            "provide NDJSON or an array/object of records".to_string(),
        )),
    }
}

/// Convert records into a table. Missing and null cells are left out of
/// the rows; the placeholder is applied when writing.
pub fn convert(records: &[Value], options: &ConvertOptions) -> Result<Table, ConvertError> {
    match &options.fields {
        Some(fields) if !fields.is_empty() => {
            let paths = fields
                .iter()
                .map(|f| FieldPath::parse(f.trim()))
                .collect::<Result<Vec<_>, _>>()?;
            let rows = records
                .iter()
                .map(|record| {
                    paths
                        .iter()
                        .filter_map(|path| {
                            let value = path.resolve(record).filter(|v| !v.is_null())?;
                            Some((path.as_str().to_string(), render_scalar(value)))
                        })
                        .collect::<FlatRow>()
                })
                .collect();
            let headers = paths.iter().map(|p| p.as_str().to_string()).collect();
            Ok(Table::new(headers, rows))
        }
        _ => {
            let mut headers = indexmap::IndexSet::new();
            for record in records.iter().take(options.infer_records.max(1)) {
                headers.extend(flatten_value(record).into_keys());
            }
            let rows = records
                .iter()
                .map(|record| flatten_value(&without_nulls(record)))
                .collect();
            Ok(Table::new(headers.into_iter().collect(), rows))
        }
    }
}

/// Drop null object members, recursively. Lists are left as they are.
fn without_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), without_nulls(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

/// Convert a JSON/NDJSON file into a CSV file. Returns the number of rows.
pub fn convert_file(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
) -> Result<usize, ConvertError> {
    let content = std::fs::read_to_string(input)?;
    let records = load_records(&content, options.ndjson || is_ndjson_path(input))?;
    let table = convert(&records, options)?;

    let file = std::fs::File::create(output)?;
    table.write(
        std::io::BufWriter::new(file),
        options.delimiter,
        &options.null_placeholder,
    )?;
    Ok(table.rows.len())
}
