//! REST API types.

use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ServerError;
use crate::parser::ParseResult;
use crate::reconcile::{BatchSummary, PlanEntry, PlanSummary};

/// Response of `POST /api/plan`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub csv_info: CsvMetadata,
    pub summary: PlanSummary,
    pub entries: Vec<PlanEntry>,
}

impl PlanResponse {
    pub fn new(parsed: &ParseResult, entries: Vec<PlanEntry>) -> Self {
        Self {
            csv_info: CsvMetadata::from(parsed),
            summary: PlanSummary::of(&entries),
            entries,
        }
    }
}

/// CSV file metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl From<&ParseResult> for CsvMetadata {
    fn from(parsed: &ParseResult) -> Self {
        Self {
            encoding: parsed.encoding.clone(),
            delimiter: parsed.delimiter.to_string(),
            row_count: parsed.records.len(),
            columns: parsed.headers.clone(),
        }
    }
}

/// Response of `POST /api/import`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportAccepted {
    pub job_id: String,
    pub rows: usize,
}

/// Phase of the current or last import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Idle,
    Running,
    Finished,
    Failed,
}

/// Response of `GET /api/import/status`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub state: JobState,
    pub total: usize,
    pub processed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<BatchSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportStatus {
    pub fn running(job_id: String, total: usize) -> Self {
        Self {
            job_id: Some(job_id),
            state: JobState::Running,
            total,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn finish(&mut self, summary: BatchSummary) {
        self.state = JobState::Finished;
        self.summary = Some(summary);
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: String) {
        self.state = JobState::Failed;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<Value>);

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        let status = match &err {
            ServerError::Reconcile(e) if e.is_fatal() => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(error_response(&err.to_string())))
    }
}
