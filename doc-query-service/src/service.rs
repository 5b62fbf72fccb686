use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::{Next, from_fn},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, info, warn};
use uuid::Uuid;

use crate::{
    config::{ConfigError, ServiceConfig, build_engine},
    models::{Decision, FileStatus, RawFile, UploadedFile},
    orchestrator::Orchestrator,
    presenter::{DecisionView, ExportArtifact, raw_json},
    query::SAMPLE_QUERIES,
    state::{Phase, PipelineFailure, Rejection},
    steps::StepView,
    upload::{Acceptance, format_file_size},
};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

type ApiResult<T> = Result<T, ApiError>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message })))
}

fn conflict_error(message: &str) -> ApiError {
    (StatusCode::CONFLICT, Json(json!({ "error": message })))
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn rejection_error(rejection: Rejection) -> ApiError {
    let message = rejection.to_string();
    match rejection {
        Rejection::EmptyQuery => bad_request_error(&message),
        Rejection::UnknownFile(_) => not_found_error(&message),
        Rejection::Busy
        | Rejection::NothingToRetry
        | Rejection::NotUploading(_)
        | Rejection::Stale(_)
        | Rejection::OutOfOrderStep { .. } => conflict_error(&message),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub files: Vec<RawFile>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct FileView {
    #[serde(flatten)]
    pub file: UploadedFile,
    pub size_label: String,
}

impl From<UploadedFile> for FileView {
    fn from(file: UploadedFile) -> Self {
        Self {
            size_label: format_file_size(file.size),
            file,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WorkspaceResponse {
    pub phase: Phase,
    pub step: usize,
    pub generation: u64,
    pub pipeline: Option<StepView>,
    pub files: Vec<FileView>,
    pub query: Option<String>,
    pub failure: Option<PipelineFailure>,
    pub decision: Option<DecisionView>,
}

#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub decision: Decision,
    pub view: DecisionView,
}

/// Build the router from the environment-derived configuration.
pub fn create_app(config: &ServiceConfig) -> Result<Router, ConfigError> {
    let engine = build_engine(&config.engine, &config.timing)?;
    let orchestrator = Orchestrator::new(engine, config.timing);
    info!(
        engine = orchestrator.engine_name(),
        step_delay_ms = config.timing.step_delay.as_millis() as u64,
        stage_timeout_ms = config.timing.stage_timeout.as_millis() as u64,
        "Workspace ready"
    );
    Ok(build_router(AppState { orchestrator }))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/workspace", get(get_workspace))
        .route("/files", post(upload_files))
        .route("/files/{file_id}", delete(remove_file))
        .route("/query", post(submit_query))
        .route("/query/retry", post(retry_query))
        .route("/query/samples", get(sample_queries))
        .route("/pipeline", get(get_pipeline))
        .route("/result", get(get_result))
        .route("/result/raw", get(get_raw_result))
        .route("/result/export", get(export_result))
        .route("/reset", post(reset_workspace))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(correlation_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(app_state)
}

/// Tag every request with a correlation id and run it inside a span carrying it
async fn correlation_id_middleware(mut request: Request<axum::body::Body>, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let header_value = HeaderValue::from_str(&correlation_id).ok();
    if let Some(value) = header_value.clone() {
        request.headers_mut().insert(CORRELATION_HEADER, value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(value) = header_value {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "Document Query Decision Service",
        "version": env!("CARGO_PKG_VERSION"),
        "engine": state.orchestrator.engine_name(),
        "endpoints": {
            "GET /workspace": "Full workspace snapshot",
            "POST /files": "Accept uploaded files",
            "DELETE /files/{file_id}": "Remove a file",
            "POST /query": "Submit a query for analysis",
            "POST /query/retry": "Resubmit the failed query",
            "GET /query/samples": "Sample queries",
            "GET /pipeline": "Processing stages and progress",
            "GET /result": "Decision and its display view",
            "GET /result/raw": "Raw response text",
            "GET /result/export": "Downloadable analysis",
            "POST /reset": "Clear the workspace",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn get_workspace(State(state): State<AppState>) -> Json<WorkspaceResponse> {
    let snapshot = state.orchestrator.snapshot();
    Json(WorkspaceResponse {
        phase: snapshot.phase,
        step: snapshot.step,
        generation: snapshot.generation,
        pipeline: snapshot.step_view(),
        decision: snapshot.result.as_ref().map(DecisionView::from),
        files: snapshot.files.into_iter().map(FileView::from).collect(),
        query: snapshot.query,
        failure: snapshot.failure,
    })
}

async fn upload_files(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> ApiResult<Json<Acceptance>> {
    if request.files.is_empty() {
        return Err(bad_request_error("At least one file is required"));
    }
    Ok(Json(state.orchestrator.upload(request.files)))
}

async fn remove_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<StatusCode> {
    let status = state
        .orchestrator
        .snapshot()
        .file(&file_id)
        .map(|f| f.status);
    state
        .orchestrator
        .remove_file(&file_id)
        .map_err(rejection_error)?;
    info!(file_id = %file_id, cancelled_upload = status == Some(FileStatus::Uploading), "File removed");
    Ok(StatusCode::NO_CONTENT)
}

async fn submit_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let generation = state
        .orchestrator
        .submit_query(&request.text)
        .map_err(|rejection| {
            warn!(%rejection, "Query rejected");
            rejection_error(rejection)
        })?;
    info!(generation, "Query accepted");
    Ok((StatusCode::ACCEPTED, Json(json!({ "generation": generation }))))
}

async fn retry_query(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<Value>)> {
    let generation = state.orchestrator.retry().map_err(rejection_error)?;
    info!(generation, "Query resubmitted");
    Ok((StatusCode::ACCEPTED, Json(json!({ "generation": generation }))))
}

async fn sample_queries() -> Json<Value> {
    Json(json!({ "samples": SAMPLE_QUERIES }))
}

async fn get_pipeline(State(state): State<AppState>) -> Response {
    match state.orchestrator.snapshot().step_view() {
        Some(view) => Json(view).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn current_decision(state: &AppState) -> ApiResult<(Decision, Option<String>)> {
    let snapshot = state.orchestrator.snapshot();
    snapshot
        .result
        .map(|decision| (decision, snapshot.query))
        .ok_or_else(|| not_found_error("No analysis result available"))
}

async fn get_result(State(state): State<AppState>) -> ApiResult<Json<ResultResponse>> {
    let (decision, _) = current_decision(&state)?;
    let view = DecisionView::from(&decision);
    Ok(Json(ResultResponse { decision, view }))
}

async fn get_raw_result(State(state): State<AppState>) -> ApiResult<Response> {
    let (decision, _) = current_decision(&state)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        raw_json(&decision),
    )
        .into_response())
}

async fn export_result(State(state): State<AppState>) -> ApiResult<Response> {
    let (decision, query) = current_decision(&state)?;
    let query = query.unwrap_or_else(|| decision.provenance.query.clone());
    let artifact = ExportArtifact::new(query, &decision);
    let body = artifact
        .to_pretty_json()
        .map_err(|e| internal_error("Failed to build export", &e.to_string()))?;
    let disposition = format!("attachment; filename=\"{}\"", artifact.file_name());

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

async fn reset_workspace(State(state): State<AppState>) -> StatusCode {
    state.orchestrator.reset();
    info!("Workspace reset");
    StatusCode::NO_CONTENT
}
