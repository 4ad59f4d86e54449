//! Nested record to flat row, and back.
//!
//! Two forward projections exist:
//!
//! - [`FlattenMode::Dotted`] - one column per leaf, named by its dotted path
//! - [`FlattenMode::LastKey`] - one column per leaf *name*, first occurrence
//!   wins; compact but lossy, used by combined exports
//!
//! Lists are atomic in both modes: they are written as one compact JSON
//! token and never expanded into further columns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::coerce::{coerce, Coercion, CoercionWarning};
use crate::models::{FlatRow, Record, STATE_KEY};

/// Forward projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlattenMode {
    #[default]
    Dotted,
    LastKey,
}

/// Whether a column belongs to the volatile `state` subtree.
pub fn is_state_rooted(column: &str) -> bool {
    column == STATE_KEY
        || column
            .strip_prefix(STATE_KEY)
            .map_or(false, |rest| rest.starts_with('.'))
}

/// Render a leaf as cell text.
///
/// Booleans as `true`/`false`, null as empty, lists and objects as compact
/// JSON.
pub fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Flatten a record with the given projection.
pub fn flatten_with(record: &Record, mode: FlattenMode) -> FlatRow {
    match mode {
        FlattenMode::Dotted => flatten(record),
        FlattenMode::LastKey => flatten_last_key(record),
    }
}

/// Dotted flatten. A root `state` key is skipped with its subtree.
pub fn flatten(record: &Record) -> FlatRow {
    let mut out = FlatRow::new();
    for (key, value) in record {
        if key == STATE_KEY {
            continue;
        }
        flatten_into(key, value, &mut out);
    }
    out
}

fn flatten_into(path: &str, value: &Value, out: &mut FlatRow) {
    match value {
        Value::Object(children) => {
            for (key, child) in children {
                flatten_into(&format!("{}.{}", path, key), child, out);
            }
        }
        leaf => {
            out.insert(path.to_string(), render_scalar(leaf));
        }
    }
}

/// Flatten a JSON value that may not be an object (generic conversion).
///
/// A non-object root becomes a single `value` column.
pub fn flatten_value(value: &Value) -> FlatRow {
    match value {
        Value::Object(map) => {
            let mut out = FlatRow::new();
            for (key, child) in map {
                flatten_into(key, child, &mut out);
            }
            out
        }
        other => {
            let mut out = FlatRow::new();
            out.insert("value".to_string(), render_scalar(other));
            out
        }
    }
}

/// Last-key flatten.
///
/// At each level the direct scalar children are recorded first, then nested
/// objects are visited; lists are stored under their own key. `state` is
/// skipped at every depth and the first occurrence of a name wins.
pub fn flatten_last_key(record: &Record) -> FlatRow {
    let mut out = FlatRow::new();
    last_key_into(record, &mut out);
    out
}

fn last_key_into(level: &Map<String, Value>, out: &mut FlatRow) {
    for (key, value) in level {
        if key == STATE_KEY || value.is_object() || value.is_array() {
            continue;
        }
        if !out.contains_key(key) {
            out.insert(key.clone(), render_scalar(value));
        }
    }

    for (key, value) in level {
        if key == STATE_KEY {
            continue;
        }
        match value {
            Value::Object(children) => last_key_into(children, out),
            Value::Array(_) if !out.contains_key(key) => {
                out.insert(key.clone(), render_scalar(value));
            }
            _ => {}
        }
    }
}

/// A rebuilt record plus any coercion warnings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unflattened {
    pub record: Record,
    pub warnings: Vec<CoercionWarning>,
}

/// Rebuild a nested record from a dotted flat row.
///
/// Blank cells are omitted, `state` columns ignored, and on collision the
/// last write wins.
pub fn unflatten(row: &FlatRow) -> Unflattened {
    let mut result = Unflattened::default();

    for (column, cell) in row {
        let column = column.trim();
        if column.is_empty() || is_state_rooted(column) {
            continue;
        }

        let value = match coerce(cell) {
            Coercion::Omitted => continue,
            Coercion::Value(v) => v,
            Coercion::Fallback(v, message) => {
                result.warnings.push(CoercionWarning {
                    column: column.to_string(),
                    value: cell.clone(),
                    message,
                });
                v
            }
        };

        insert_path(&mut result.record, column, value);
    }

    result
}

/// Assign `value` at a dotted path, creating intermediate objects.
pub fn insert_path(record: &mut Record, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut level = record;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            level.insert(segment.to_string(), value);
            return;
        }

        let slot = level
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        level = match slot {
            Value::Object(map) => map,
            _ => return,
        };
    }
}

/// Unflatten then flatten again: the canonical shape of an edited row.
pub fn normalize(row: &FlatRow) -> FlatRow {
    flatten(&unflatten(row).record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn row(pairs: &[(&str, &str)]) -> FlatRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_dotted_flatten() {
        let r = record(json!({
            "id": "s1",
            "enableThumbnails": true,
            "options": {"failoverTriggers": {"zeroBitrate": false}, "priority": 2},
            "tags": ["a", "b"],
            "note": null
        }));
        let flat = flatten(&r);

        assert_eq!(flat["id"], "s1");
        assert_eq!(flat["enableThumbnails"], "true");
        assert_eq!(flat["options.failoverTriggers.zeroBitrate"], "false");
        assert_eq!(flat["options.priority"], "2");
        assert_eq!(flat["tags"], r#"["a","b"]"#);
        assert_eq!(flat["note"], "");
    }

    #[test]
    fn test_state_never_emitted() {
        let r = record(json!({
            "id": "s1",
            "state": {"health": {"ok": true}, "bitrate": 1000},
            "stateful": 1
        }));
        let flat = flatten(&r);

        assert!(flat.keys().all(|k| !is_state_rooted(k)));
        assert_eq!(flat["stateful"], "1");
        assert_eq!(flat.len(), 2);
    }

    #[test]
    fn test_is_state_rooted() {
        assert!(is_state_rooted("state"));
        assert!(is_state_rooted("state.health"));
        assert!(!is_state_rooted("stateful"));
        assert!(!is_state_rooted("options.state"));
    }

    #[test]
    fn test_last_key_scalars_first() {
        let r = record(json!({
            "options": {"name": "nested", "priority": 3},
            "name": "top",
            "state": {"priority": 99},
            "tags": [1, 2]
        }));
        let flat = flatten_last_key(&r);

        assert_eq!(flat["name"], "top");
        assert_eq!(flat["priority"], "3");
        assert_eq!(flat["tags"], "[1,2]");
        assert_eq!(flat.keys().collect::<Vec<_>>(), vec!["name", "priority", "tags"]);
    }

    #[test]
    fn test_last_key_first_occurrence_wins() {
        let r = record(json!({
            "a": {"x": 1},
            "b": {"x": 2, "inner": {"state": {"y": 1}, "y": 3}}
        }));
        let flat = flatten_last_key(&r);

        assert_eq!(flat["x"], "1");
        assert_eq!(flat["y"], "3");
    }

    #[test]
    fn test_unflatten_coerces_and_nests() {
        let flat = row(&[
            ("id", "s1"),
            ("enableThumbnails", "TRUE"),
            ("options.priority", "2"),
            ("options.ratio", "0.5"),
            ("tags", r#"["a","b"]"#),
            ("name", ""),
            ("state.health", "bad"),
        ]);
        let result = unflatten(&flat);

        assert!(result.warnings.is_empty());
        assert_eq!(
            Value::Object(result.record),
            json!({
                "id": "s1",
                "enableThumbnails": true,
                "options": {"priority": 2, "ratio": 0.5},
                "tags": ["a", "b"]
            })
        );
    }

    #[test]
    fn test_unflatten_reports_fallback() {
        let result = unflatten(&row(&[("tags", "[broken")]));

        assert_eq!(result.record["tags"], "[broken");
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].column, "tags");
    }

    #[test]
    fn test_unflatten_last_write_wins() {
        let result = unflatten(&row(&[("a", "1"), ("a.b", "2")]));
        assert_eq!(Value::Object(result.record), json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_round_trip() {
        let r = record(json!({
            "id": "s1",
            "name": "News HD",
            "enableThumbnails": false,
            "options": {"failoverMode": "priority", "failoverWaitTime": 5},
            "tags": ["x", 1, true]
        }));
        assert_eq!(unflatten(&flatten(&r)).record, r);
    }

    #[test]
    fn test_normalize() {
        let flat = row(&[("id", " s1 "), ("paused", "False"), ("name", "")]);
        assert_eq!(normalize(&flat), row(&[("id", "s1"), ("paused", "false")]));
    }

    #[test]
    fn test_flatten_value_scalar_root() {
        assert_eq!(flatten_value(&json!(5)), row(&[("value", "5")]));
    }
}
