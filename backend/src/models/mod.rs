//! Domain models for the txedit pipeline.
//!
//! This module contains the core data structures shared by export and import:
//!
//! - [`RecordKind`] - Stream, Source or Output
//! - [`RecordId`] - Assigned identity or the "remote must assign" sentinel
//! - [`ConfigDocument`] - Source-of-truth edge configuration (JSON)
//!
//! Records themselves stay generic JSON objects (`serde_json::Map`); the
//! only fields the pipeline interprets are the reserved keys below.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DocumentError, DocumentResult};

// =============================================================================
// Reserved keys
// =============================================================================

/// Identity of a record.
pub const ID_KEY: &str = "id";
/// Foreign key from a Source/Output to its Stream.
pub const STREAM_KEY: &str = "stream";
/// Enclosing edge scope.
pub const EDGE_KEY: &str = "mwedge";
/// Volatile runtime state, never exported nor imported.
pub const STATE_KEY: &str = "state";
/// Synthetic kind discriminator of combined exports.
pub const OBJECT_TYPE_KEY: &str = "objectType";
/// Display-only join column carrying the parent stream's name.
pub const STREAM_NAME_KEY: &str = "streamName";
/// Human name of a record.
pub const NAME_KEY: &str = "name";
/// Column marking a CSV whose columns are bare leaf names, not paths.
pub const LAYOUT_KEY: &str = "_layout";
/// Value of [`LAYOUT_KEY`] in last-key exports.
pub const LAST_KEY_LAYOUT: &str = "last-key";

/// A record is an opaque JSON object.
pub type Record = Map<String, Value>;

/// Ordered mapping of dotted column path to cell text.
pub type FlatRow = indexmap::IndexMap<String, String>;

// =============================================================================
// Record Kind
// =============================================================================

/// Kind of a configuration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Stream,
    Source,
    Output,
}

impl RecordKind {
    /// All kinds, in export order.
    pub const ALL: [RecordKind; 3] = [RecordKind::Stream, RecordKind::Source, RecordKind::Output];

    /// Section of the configuration document holding records of this kind.
    pub fn section_key(&self) -> &'static str {
        match self {
            RecordKind::Stream => "configuredStreams",
            RecordKind::Source => "configuredSources",
            RecordKind::Output => "configuredOutputs",
        }
    }

    /// Path segment used by the remote API.
    pub fn api_segment(&self) -> &'static str {
        match self {
            RecordKind::Stream => "stream",
            RecordKind::Source => "source",
            RecordKind::Output => "output",
        }
    }

    /// Value written in the `objectType` column.
    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Stream => "Stream",
            RecordKind::Source => "Source",
            RecordKind::Output => "Output",
        }
    }

    /// Sources and Outputs hang off a Stream.
    pub fn has_parent_stream(&self) -> bool {
        !matches!(self, RecordKind::Stream)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    /// Accepts labels, API segments and plural forms, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stream" | "streams" => Ok(RecordKind::Stream),
            "source" | "sources" => Ok(RecordKind::Source),
            "output" | "outputs" => Ok(RecordKind::Output),
            other => Err(format!("unknown record kind '{}'", other)),
        }
    }
}

// =============================================================================
// Record Identity
// =============================================================================

/// Identity of a record.
///
/// `Unassigned` means the remote system must assign one: the `id` key is
/// omitted from creation payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Assigned(String),
    Unassigned,
}

impl RecordId {
    /// Build from a raw cell or JSON value; blank or null is `Unassigned`.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) if !s.trim().is_empty() => RecordId::Assigned(s.trim().to_string()),
            Some(Value::Number(n)) => RecordId::Assigned(n.to_string()),
            _ => RecordId::Unassigned,
        }
    }

    /// Build from a cell of a flat row.
    pub fn from_cell(cell: Option<&str>) -> Self {
        match cell.map(str::trim) {
            Some(s) if !s.is_empty() => RecordId::Assigned(s.to_string()),
            _ => RecordId::Unassigned,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordId::Assigned(s) => Some(s),
            RecordId::Unassigned => None,
        }
    }

    /// Write this identity into a record. `Unassigned` removes the key.
    pub fn apply_to(&self, record: &mut Record) {
        match self {
            RecordId::Assigned(id) => {
                record.insert(ID_KEY.to_string(), Value::String(id.clone()));
            }
            RecordId::Unassigned => {
                record.remove(ID_KEY);
            }
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Assigned(id) => f.pad(id),
            RecordId::Unassigned => f.pad("<new>"),
        }
    }
}

/// Read a string-ish field of a record (numbers are rendered).
pub fn text_field<'a>(record: &'a Record, key: &str) -> Option<std::borrow::Cow<'a, str>> {
    match record.get(key)? {
        Value::String(s) if !s.is_empty() => Some(std::borrow::Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(std::borrow::Cow::Owned(n.to_string())),
        _ => None,
    }
}

// =============================================================================
// Configuration Document
// =============================================================================

/// Source-of-truth configuration of one edge.
///
/// An object with `configuredStreams`, `configuredSources` and
/// `configuredOutputs` arrays. Missing arrays read as empty; unknown
/// top-level keys are kept untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    root: Map<String, Value>,
}

impl ConfigDocument {
    /// Wrap a parsed JSON value.
    pub fn from_value(value: Value) -> DocumentResult<Self> {
        let root = match value {
            Value::Object(map) => map,
            _ => return Err(DocumentError::NotAnObject),
        };

        for kind in RecordKind::ALL {
            match root.get(kind.section_key()) {
                None | Some(Value::Array(_)) | Some(Value::Null) => {}
                Some(_) => return Err(DocumentError::NotAnArray(kind.section_key().to_string())),
            }
        }

        Ok(Self { root })
    }

    pub fn parse(content: &str) -> DocumentResult<Self> {
        Self::from_value(serde_json::from_str(content)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> DocumentResult<Self> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// Load a document from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> DocumentResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Write the document as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> DocumentResult<()> {
        std::fs::write(path.as_ref(), self.to_pretty_string()?)?;
        Ok(())
    }

    pub fn to_pretty_string(&self) -> DocumentResult<String> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    /// Edge name, when the document carries one.
    pub fn edge_name(&self) -> Option<&str> {
        self.root.get(NAME_KEY).and_then(Value::as_str)
    }

    /// Records of a kind; non-object elements are ignored.
    pub fn records(&self, kind: RecordKind) -> Vec<&Record> {
        match self.root.get(kind.section_key()) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
            _ => Vec::new(),
        }
    }

    /// Mutable records of a kind.
    pub fn records_mut(&mut self, kind: RecordKind) -> Vec<&mut Record> {
        match self.root.get_mut(kind.section_key()) {
            Some(Value::Array(items)) => items.iter_mut().filter_map(Value::as_object_mut).collect(),
            _ => Vec::new(),
        }
    }

    /// Find a record of any kind by identity.
    pub fn find_mut(&mut self, id: &str) -> Option<(RecordKind, &mut Record)> {
        for kind in RecordKind::ALL {
            let found = self
                .records(kind)
                .iter()
                .any(|r| text_field(r, ID_KEY).as_deref() == Some(id));
            if found {
                return self
                    .records_mut(kind)
                    .into_iter()
                    .find(|r| text_field(r, ID_KEY).as_deref() == Some(id))
                    .map(|r| (kind, r));
            }
        }
        None
    }

    /// Map of stream id to stream name.
    pub fn stream_names(&self) -> std::collections::HashMap<String, String> {
        self.records(RecordKind::Stream)
            .into_iter()
            .filter_map(|s| {
                let id = text_field(s, ID_KEY)?;
                let name = text_field(s, NAME_KEY).unwrap_or_default();
                Some((id.into_owned(), name.into_owned()))
            })
            .collect()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Stream".parse::<RecordKind>().unwrap(), RecordKind::Stream);
        assert_eq!("sources".parse::<RecordKind>().unwrap(), RecordKind::Source);
        assert_eq!(" OUTPUT ".parse::<RecordKind>().unwrap(), RecordKind::Output);
        assert!("edge".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(RecordKind::Source.section_key(), "configuredSources");
        assert_eq!(RecordKind::Output.api_segment(), "output");
        assert_eq!(RecordKind::Stream.to_string(), "Stream");
        assert!(!RecordKind::Stream.has_parent_stream());
    }

    #[test]
    fn test_record_id_from_value() {
        assert_eq!(
            RecordId::from_value(Some(&json!("abc"))),
            RecordId::Assigned("abc".into())
        );
        assert_eq!(RecordId::from_value(Some(&json!("  "))), RecordId::Unassigned);
        assert_eq!(RecordId::from_value(Some(&Value::Null)), RecordId::Unassigned);
        assert_eq!(RecordId::from_value(None), RecordId::Unassigned);
        assert_eq!(RecordId::from_cell(Some("")), RecordId::Unassigned);
    }

    #[test]
    fn test_unassigned_removes_id_key() {
        let mut record = json!({"id": "", "name": "x"}).as_object().unwrap().clone();
        RecordId::Unassigned.apply_to(&mut record);
        assert!(!record.contains_key("id"));

        RecordId::Assigned("s1".into()).apply_to(&mut record);
        assert_eq!(record["id"], "s1");
    }

    #[test]
    fn test_document_sections() {
        let doc = ConfigDocument::from_value(json!({
            "name": "edge-a",
            "configuredStreams": [{"id": "s1", "name": "One"}, 42],
            "configuredSources": null
        }))
        .unwrap();

        assert_eq!(doc.edge_name(), Some("edge-a"));
        assert_eq!(doc.records(RecordKind::Stream).len(), 1);
        assert!(doc.records(RecordKind::Source).is_empty());
        assert!(doc.records(RecordKind::Output).is_empty());
        assert_eq!(doc.stream_names().get("s1").map(String::as_str), Some("One"));
    }

    #[test]
    fn test_document_rejects_bad_shapes() {
        assert!(matches!(
            ConfigDocument::from_value(json!([1, 2])),
            Err(DocumentError::NotAnObject)
        ));
        assert!(matches!(
            ConfigDocument::from_value(json!({"configuredOutputs": {"id": "o1"}})),
            Err(DocumentError::NotAnArray(section)) if section == "configuredOutputs"
        ));
    }

    #[test]
    fn test_find_mut() {
        let mut doc = ConfigDocument::from_value(json!({
            "configuredOutputs": [{"id": "o1", "name": "Out"}]
        }))
        .unwrap();

        let (kind, record) = doc.find_mut("o1").unwrap();
        assert_eq!(kind, RecordKind::Output);
        record.insert("name".into(), json!("Renamed"));

        assert_eq!(doc.records(RecordKind::Output)[0]["name"], "Renamed");
        assert!(doc.find_mut("missing").is_none());
    }
}
