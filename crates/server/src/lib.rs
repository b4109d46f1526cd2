//! HTTP surface for MoodMate.

mod error;
mod routes;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use moodmate_core::pipeline::Pipeline;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use routes::{FeedbackRequest, HistoryQuery, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};

pub struct AppState {
    pub pipeline: Pipeline,
}

/// Settings the router needs beyond the pipeline itself.
#[derive(Clone, Debug)]
pub struct RouterSettings {
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

impl RouterSettings {
    pub fn from_config(cfg: &moodmate_core::config::AppConfig) -> Self {
        Self {
            allowed_origins: cfg.allowed_origins.clone(),
            max_upload_bytes: cfg.max_upload_bytes,
        }
    }
}

pub fn router(pipeline: Pipeline, settings: &RouterSettings) -> Router {
    let outputs = ServeDir::new(pipeline.output_dir());
    let state = Arc::new(AppState { pipeline });

    let api = Router::new()
        .route("/process", post(routes::process_audio))
        .route("/history", get(routes::history))
        .route("/history/{id}", get(routes::history_entry))
        .route("/history/{id}/feedback", post(routes::feedback))
        .route("/file/{name}", get(routes::audio_file));

    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .nest("/api/audio", api)
        .nest_service("/outputs", outputs)
        .with_state(state)
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .layer(cors_layer(&settings.allowed_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}
