use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use moodmate_core::emotion::EmotionCategory;
use moodmate_core::history::HistoryRecord;
use moodmate_core::pipeline::{is_safe_file_name, Interaction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const DEFAULT_HISTORY_LIMIT: usize = 30;
pub const MAX_HISTORY_LIMIT: usize = 200;

const UPLOAD_FIELD: &str = "audio";

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "🧠 MoodMate API is running!",
        "docs": "/docs",
        "endpoints": {
            "process_audio": "POST /api/audio/process",
            "mood_history": "GET /api/audio/history",
        }
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn process_audio(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Interaction>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        tracing::debug!(
            file_name = field.file_name().unwrap_or("-"),
            content_type = field.content_type().unwrap_or("-"),
            "receiving upload"
        );
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("could not read upload: {e}")))?;
        upload = Some(bytes);
        break;
    }

    let upload =
        upload.ok_or_else(|| ApiError::bad_request(format!("missing multipart field `{UPLOAD_FIELD}`")))?;
    let interaction = state.pipeline.process(upload).await?;
    Ok(Json(interaction))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HistorySummary {
    id: i64,
    timestamp: DateTime<Utc>,
    emotion: EmotionCategory,
    confidence: f64,
    response: String,
}

impl From<HistoryRecord> for HistorySummary {
    fn from(r: HistoryRecord) -> Self {
        Self {
            id: r.id,
            timestamp: r.timestamp,
            emotion: r.primary_emotion,
            confidence: r.confidence,
            response: r.ai_response,
        }
    }
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    let entries: Vec<HistorySummary> = state
        .pipeline
        .history()
        .recent(limit)
        .await?
        .into_iter()
        .map(HistorySummary::from)
        .collect();
    Ok(Json(json!({ "entries": entries })))
}

pub async fn history_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<HistoryRecord>, ApiError> {
    state
        .pipeline
        .history()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("entry {id} not found")))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub rating: u8,
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<FeedbackRequest>,
) -> Result<Json<HistoryRecord>, ApiError> {
    let notes = body.notes.filter(|n| !n.trim().is_empty());
    let record = state
        .pipeline
        .history()
        .record_feedback(id, body.rating, notes)
        .await?;
    tracing::info!(id, rating = body.rating, "feedback recorded");
    Ok(Json(record))
}

pub async fn audio_file(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !is_safe_file_name(&name) {
        return Err(ApiError::bad_request("invalid file name"));
    }
    let path = state.pipeline.output_dir().join(&name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "audio/wav")], bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::not_found("file not found"))
        }
        Err(e) => Err(ApiError::new(
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("could not read {}: {e}", path.display()),
        )),
    }
}
