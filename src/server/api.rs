use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::errors::{DownloadError, RegistryError, SubmitError};
use crate::jobs::{JobId, JobRecord, Orchestrator, StatusService};

/// Upper bound for uploaded voice recordings.
const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

/// File name offered to browsers for the project archive.
pub const ARCHIVE_DOWNLOAD_NAME: &str = "design-forge-project.zip";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub status: StatusService,
}

pub type SharedState = Arc<AppState>;

// ── Request / response payload types ──────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    #[serde(default)]
    pub figma_key: String,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: JobId,
    pub message: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceAccepted {
    pub job_id: JobId,
    pub transcription: String,
    pub status: &'static str,
}

impl JobAccepted {
    fn queued(record: &JobRecord) -> Self {
        Self {
            job_id: record.id,
            message: "Conversion process started",
            status: record.state.as_str(),
        }
    }
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::EmptyInput { .. } => ApiError::BadRequest(e.to_string()),
            SubmitError::Registry(inner) => ApiError::Internal(inner.to_string()),
        }
    }
}

impl From<DownloadError> for ApiError {
    fn from(e: DownloadError) -> Self {
        match e {
            DownloadError::JobNotFound | DownloadError::ArchiveMissing => {
                ApiError::NotFound(e.to_string())
            }
            DownloadError::NotCompleted { .. } => ApiError::BadRequest(e.to_string()),
            DownloadError::Registry(inner) => ApiError::Internal(inner.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

fn job_not_found() -> ApiError {
    ApiError::NotFound("Job not found".to_string())
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/convert", post(convert))
        .route("/api/text-to-angular", post(text_to_angular))
        .route(
            "/api/voice-to-angular",
            post(voice_to_angular).layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES)),
        )
        .route("/api/status/{job_id}", get(job_status))
        .route("/api/download/{job_id}", get(download))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn convert(
    State(state): State<SharedState>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let record = state.orchestrator.submit_design_key(&req.figma_key)?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted::queued(&record))))
}

async fn text_to_angular(
    State(state): State<SharedState>,
    payload: Result<Json<TextRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let record = state.orchestrator.submit_description(&req.description)?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted::queued(&record))))
}

/// Transcribe the uploaded recording, then start a text job seeded with the
/// transcript. Transcription runs inline, so a failure never creates a job.
async fn voice_to_angular(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut audio = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() == Some("audio") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            audio = Some(bytes);
            break;
        }
    }
    let audio = audio
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No audio file provided".to_string()))?;

    info!(bytes = audio.len(), "transcribing voice command");
    let transcription = state.orchestrator.transcribe(&audio).await.map_err(|e| {
        error!("voice transcription failed: {}", e);
        ApiError::Internal(format!("Failed to process voice command: {}", e))
    })?;
    if transcription.is_empty() {
        return Err(ApiError::BadRequest(
            "Could not understand the voice command".to_string(),
        ));
    }

    let record = state.orchestrator.submit_transcript(&transcription)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(VoiceAccepted {
            job_id: record.id,
            transcription,
            status: record.state.as_str(),
        }),
    ))
}

async fn job_status(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: JobId = job_id.parse().map_err(|_| job_not_found())?;
    match state.status.get_status(id) {
        Ok(record) => Ok(Json(record)),
        Err(RegistryError::NotFound { .. }) => Err(job_not_found()),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

async fn download(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: JobId = job_id.parse().map_err(|_| job_not_found())?;
    let path = state.status.archive_for_download(id).await?;
    // The archive can be reclaimed between the lookup and the read.
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ApiError::from(DownloadError::ArchiveMissing),
        _ => ApiError::Internal(format!("Failed to read archive: {}", e)),
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", ARCHIVE_DOWNLOAD_NAME),
            ),
        ],
        bytes,
    ))
}
