//! In-memory [`RemoteStore`] for tests.

use std::sync::Mutex;

use serde_json::{json, Value};

use super::RemoteStore;
use crate::error::{RemoteError, RemoteResult};
use crate::models::{text_field, ConfigDocument, Record, RecordKind, ID_KEY};

/// A call received by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Create { kind: RecordKind, edge: String, record: Record },
    Update { kind: RecordKind, edge: String, record: Record },
    EdgeConfig { edge: String },
}

#[derive(Default)]
struct State {
    records: Vec<(RecordKind, String, Record)>,
    calls: Vec<StoreCall>,
    next_id: usize,
    rejected: Vec<String>,
    update_failure: Option<RemoteError>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: RecordKind, edge: &str, record: Value) {
        let record = record.as_object().cloned().unwrap_or_default();
        self.state.lock().unwrap().records.push((kind, edge.to_string(), record));
    }

    /// Make updates of `id` return `Ok(false)`.
    pub fn reject_updates_of(&self, id: &str) {
        self.state.lock().unwrap().rejected.push(id.to_string());
    }

    /// Make every update fail with `error`.
    pub fn fail_updates_with(&self, error: RemoteError) {
        self.state.lock().unwrap().update_failure = Some(error);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Current records of an edge as a configuration document.
    pub fn snapshot(&self, edge: &str) -> ConfigDocument {
        let state = self.state.lock().unwrap();
        let mut root = json!({ "name": edge });
        for kind in RecordKind::ALL {
            let records: Vec<Value> = state
                .records
                .iter()
                .filter(|(k, e, _)| *k == kind && e == edge)
                .map(|(_, _, r)| Value::Object(r.clone()))
                .collect();
            root[kind.section_key()] = Value::Array(records);
        }
        ConfigDocument::from_value(root).unwrap()
    }
}

impl RemoteStore for MemoryStore {
    async fn create(&self, kind: RecordKind, edge: &str, record: &Record) -> RemoteResult<Record> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(StoreCall::Create {
            kind,
            edge: edge.to_string(),
            record: record.clone(),
        });

        state.next_id += 1;
        let mut created = record.clone();
        created.insert(ID_KEY.to_string(), Value::String(format!("{}-{}", kind.api_segment(), state.next_id)));
        state.records.push((kind, edge.to_string(), created.clone()));
        Ok(created)
    }

    async fn update(&self, kind: RecordKind, edge: &str, record: &Record) -> RemoteResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(StoreCall::Update {
            kind,
            edge: edge.to_string(),
            record: record.clone(),
        });

        if let Some(error) = &state.update_failure {
            return Err(error.clone());
        }
        let id = text_field(record, ID_KEY).map(|id| id.into_owned()).unwrap_or_default();
        if state.rejected.contains(&id) {
            return Ok(false);
        }

        let existing = state
            .records
            .iter_mut()
            .find(|(k, e, r)| *k == kind && e == edge && text_field(r, ID_KEY).as_deref() == Some(id.as_str()));
        match existing {
            Some((_, _, stored)) => {
                *stored = record.clone();
                Ok(true)
            }
            None => Err(RemoteError::NotFound(format!("{} {}", kind, id))),
        }
    }

    async fn edge_config(&self, edge: &str) -> RemoteResult<ConfigDocument> {
        self.state.lock().unwrap().calls.push(StoreCall::EdgeConfig {
            edge: edge.to_string(),
        });
        Ok(self.snapshot(edge))
    }
}
