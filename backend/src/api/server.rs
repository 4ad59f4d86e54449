//! HTTP Server for the txedit API.
//!
//! # API Endpoints
//!
//! | Method | Path                 | Description                                  |
//! |--------|----------------------|----------------------------------------------|
//! | GET    | `/health`            | Health check                                 |
//! | POST   | `/api/export`        | Config JSON to editable CSV                  |
//! | POST   | `/api/plan`          | Edited CSV + baseline to a plan, no writes   |
//! | POST   | `/api/import`        | Start an import batch (202, or 409 if busy)  |
//! | GET    | `/api/import/status` | Progress and summary of the last batch       |
//! | GET    | `/api/logs`          | SSE stream for real-time logs                |

use axum::{
    extract::{Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, ApiError, ImportAccepted, ImportStatus, PlanResponse};
use crate::config::{CoreConfig, ReconciliationConfig};
use crate::error::{ReconciliationError, ServerError};
use crate::models::{ConfigDocument, RecordKind};
use crate::parser::{parse_bytes_auto, ParseResult};
use crate::reconcile::{execute_plan, plan, prepare_parsed, scopes, BaselineIndex, PreparedRow};
use crate::remote::{fetch_baseline, CoreClient};
use crate::transform::{export_combined, export_kind, failover_report, FlattenMode};

/// Set while an import batch runs.
static BATCH_RUNNING: AtomicBool = AtomicBool::new(false);

/// Held by the running batch; releases the slot when dropped.
struct BatchGuard;

impl BatchGuard {
    fn acquire() -> Option<Self> {
        BATCH_RUNNING
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BatchGuard)
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        BATCH_RUNNING.store(false, Ordering::SeqCst);
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// Core connection; imports are refused without it.
    pub core: Option<CoreConfig>,
    pub batch: ReconciliationConfig,
    pub status: Arc<Mutex<ImportStatus>>,
}

impl AppState {
    pub fn new(core: Option<CoreConfig>, batch: ReconciliationConfig) -> Self {
        Self {
            core,
            batch,
            status: Arc::new(Mutex::new(ImportStatus::default())),
        }
    }

    fn with_status<T>(&self, f: impl FnOnce(&mut ImportStatus) -> T) -> T {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut status)
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/export", post(export))
        .route("/api/plan", post(plan_upload))
        .route("/api/import", post(import))
        .route("/api/import/status", get(import_status))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(
    port: u16,
    core: Option<CoreConfig>,
    batch: ReconciliationConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(AppState::new(core, batch));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 txedit server running on http://localhost:{}", port);
    println!("   POST /api/export        - Config JSON to CSV");
    println!("   POST /api/plan          - Plan an edited CSV");
    println!("   POST /api/import        - Start an import batch");
    println!("   GET  /api/import/status - Import progress");
    println!("   GET  /api/logs          - SSE log stream");
    println!("   GET  /health            - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "txedit",
        "version": env!("CARGO_PKG_VERSION"),
        "batchRunning": BATCH_RUNNING.load(Ordering::SeqCst),
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Fields of an upload form.
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<Vec<u8>>,
    baseline: Option<Vec<u8>>,
    kind: Option<String>,
    edge: Option<String>,
    mode: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, Json(error_response(&format!("Multipart error: {}", e))))
    })? {
        let name = field.name().unwrap_or("").to_string();
        let bytes = field.bytes().await.map_err(|e| {
            (StatusCode::BAD_REQUEST, Json(error_response(&format!("Read error: {}", e))))
        })?;

        let text = || {
            Some(String::from_utf8_lossy(&bytes).trim().to_string()).filter(|s| !s.is_empty())
        };
        match name.as_str() {
            "file" => form.file = Some(bytes.to_vec()),
            "baseline" => form.baseline = Some(bytes.to_vec()),
            "kind" => form.kind = text(),
            "edge" => form.edge = text(),
            "mode" => form.mode = text(),
            _ => {}
        }
    }

    Ok(form)
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ServerError::BadRequest(message.into()).into()
}

fn parse_kind(raw: Option<&str>) -> Result<Option<RecordKind>, ApiError> {
    raw.map(|k| k.parse::<RecordKind>().map_err(bad_request))
        .transpose()
}

fn parse_upload(form: &UploadForm) -> Result<ParseResult, ApiError> {
    let bytes = form.file.as_deref().ok_or_else(|| bad_request("No file provided"))?;
    parse_bytes_auto(bytes).map_err(|e| ServerError::from(ReconciliationError::from(e)).into())
}

fn parse_baseline(bytes: &[u8]) -> Result<BaselineIndex, ApiError> {
    let doc = ConfigDocument::from_bytes(bytes)
        .map_err(|e| ApiError::from(ServerError::from(ReconciliationError::from(e))))?;
    Ok(BaselineIndex::from_document(&doc))
}

fn prepare(
    parsed: &ParseResult,
    form: &UploadForm,
    batch: &ReconciliationConfig,
) -> Result<Vec<PreparedRow>, ApiError> {
    let kind = parse_kind(form.kind.as_deref())?;
    let mut config = batch.clone();
    if let Some(edge) = &form.edge {
        config.default_edge = Some(edge.clone());
    }
    prepare_parsed(parsed, kind, &config)
        .map_err(|e| ServerError::from(ReconciliationError::from(e)).into())
}

/// Config JSON to CSV. `kind` is a record kind, `combined` (default) or
/// `report`; `mode` picks the combined projection.
async fn export(
    multipart: Multipart,
) -> Result<([(header::HeaderName, &'static str); 1], String), ApiError> {
    let form = read_form(multipart).await?;
    let bytes = form.file.as_deref().ok_or_else(|| bad_request("No file provided"))?;
    let doc = ConfigDocument::from_bytes(bytes)
        .map_err(|e| bad_request(format!("Invalid configuration document: {}", e)))?;

    let table = match form.kind.as_deref().unwrap_or("combined") {
        "combined" => {
            let mode = match form.mode.as_deref() {
                Some("last-key") => FlattenMode::LastKey,
                _ => FlattenMode::Dotted,
            };
            export_combined(&doc, mode).table
        }
        "report" => failover_report(&doc),
        other => {
            let kind = other.parse::<RecordKind>().map_err(bad_request)?;
            export_kind(&doc, kind)
        }
    };

    let csv = table
        .to_csv_string(',')
        .map_err(|e| ApiError::from(ServerError::Internal(e.to_string())))?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv))
}

/// Plan an edited CSV against an uploaded baseline document.
async fn plan_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PlanResponse>, ApiError> {
    let form = read_form(multipart).await?;
    let parsed = parse_upload(&form)?;
    let baseline_bytes = form
        .baseline
        .as_deref()
        .ok_or_else(|| bad_request("No baseline provided"))?;
    let baseline = parse_baseline(baseline_bytes)?;

    let prepared = prepare(&parsed, &form, &state.batch)?;
    let entries = plan(prepared, &baseline);
    Ok(Json(PlanResponse::new(&parsed, entries)))
}

/// Validate the upload, then run the batch in the background.
async fn import(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ImportAccepted>), ApiError> {
    let guard = BatchGuard::acquire()
        .ok_or_else(|| ApiError::from(ServerError::Conflict("an import batch is already running".to_string())))?;

    let core = state
        .core
        .clone()
        .ok_or_else(|| ApiError::from(ServerError::Internal("no tx core configured (TXCORE_ADDRESSES)".to_string())))?;

    let form = read_form(multipart).await?;
    let parsed = parse_upload(&form)?;
    let prepared = prepare(&parsed, &form, &state.batch)?;
    let baseline = form.baseline.as_deref().map(parse_baseline).transpose()?;

    let job_id = Uuid::new_v4().to_string();
    let rows = prepared.len();
    state.with_status(|status| *status = ImportStatus::running(job_id.clone(), rows));
    log_info(format!("Import {} accepted: {} rows", job_id, rows));

    let task_state = state.clone();
    tokio::spawn(async move {
        let _guard = guard;
        run_import(task_state, core, prepared, baseline).await;
    });

    Ok((StatusCode::ACCEPTED, Json(ImportAccepted { job_id, rows })))
}

async fn run_import(
    state: AppState,
    core: CoreConfig,
    prepared: Vec<PreparedRow>,
    baseline: Option<BaselineIndex>,
) {
    let client = match CoreClient::connect(&core).await {
        Ok(client) => client,
        Err(e) => {
            log_error(format!("Import aborted: {}", e));
            state.with_status(|status| status.fail(e.to_string()));
            return;
        }
    };

    let baseline = match baseline {
        Some(baseline) => baseline,
        None => match fetch_baseline(&client, &scopes(&prepared)).await {
            Ok(baseline) => baseline,
            Err(e) => {
                log_error(format!("Import aborted: {}", e));
                state.with_status(|status| status.fail(e.to_string()));
                return;
            }
        },
    };

    let mut batch = state.batch.clone();
    batch.call_delay_ms = core.call_delay_ms;

    let entries = plan(prepared, &baseline);
    let progress = state.clone();
    let summary = execute_plan(&client, entries, &batch, move |_| {
        progress.with_status(|status| status.processed += 1);
    })
    .await;

    state.with_status(|status| status.finish(summary));
}

async fn import_status(State(state): State<AppState>) -> Json<ImportStatus> {
    Json(state.with_status(|status| status.clone()))
}
