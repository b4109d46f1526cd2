use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use moodmate_core::decode::{Decoder, PcmAudio, PcmFormat};
use moodmate_core::emotion::{
    ClassifyError, EmotionDetector, LabelScore, SignalFusion, SpeechEmotionClassifier,
};
use moodmate_core::history::{HistoryStore, SharedHistory};
use moodmate_core::pipeline::{Pipeline, Services};
use moodmate_core::reply::Responder;
use moodmate_core::tts::{TtsAudio, TtsClient, TtsError, TtsRequest};
use moodmate_server::{router, RouterSettings};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "moodmate-test-boundary";

struct SadSpeech;

impl SpeechEmotionClassifier for SadSpeech {
    fn classify_speech(&self, _wav: Bytes) -> BoxFuture<'_, Result<Vec<LabelScore>, ClassifyError>> {
        async {
            Ok(vec![
                LabelScore {
                    label: "sad".into(),
                    score: 0.8,
                },
                LabelScore {
                    label: "neutral".into(),
                    score: 0.1,
                },
            ])
        }
        .boxed()
    }
}

struct SilentTts;

impl TtsClient for SilentTts {
    fn synthesize(&self, _request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
        async {
            Ok(TtsAudio {
                sample_rate_hz: 16_000,
                channels: 1,
                pcm_i16: vec![0; 800],
            })
        }
        .boxed()
    }
}

fn app(output_dir: &Path) -> Router {
    let services = Services {
        decoder: Decoder::default(),
        transcriber: None,
        detector: EmotionDetector::new(SignalFusion::default())
            .with_speech_classifier(Arc::new(SadSpeech)),
        responder: Responder::default(),
        tts: Some(Arc::new(SilentTts)),
        history: SharedHistory::new(HistoryStore::open_in_memory().unwrap()),
        output_dir: output_dir.to_path_buf(),
    };
    let settings = RouterSettings {
        allowed_origins: vec!["http://localhost:5173".into()],
        max_upload_bytes: 1024 * 1024,
    };
    router(Pipeline::new(services), &settings)
}

fn wav_clip() -> Vec<u8> {
    PcmAudio::new(PcmFormat::mono_16khz(), vec![0.0; 8_000])
        .to_wav_bytes()
        .unwrap()
        .to_vec()
}

fn multipart_request(field: &str, payload: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"clip.wav\"\r\nContent-Type: audio/wav\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/audio/process")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn banner_and_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let response = app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let banner = json_body(response).await;
    assert_eq!(banner["endpoints"]["process_audio"], "POST /api/audio/process");

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(json_body(response).await, serde_json::json!({"status": "healthy"}));
}

#[tokio::test]
async fn process_then_browse_history() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let response = app
        .clone()
        .oneshot(multipart_request("audio", &wav_clip()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let interaction = json_body(response).await;
    assert_eq!(interaction["emotion"], "sad");
    assert!(interaction["transcription"].is_null());
    let scores = interaction["emotion_scores"].as_object().unwrap();
    assert_eq!(scores.len(), 7);
    let id = interaction["session_id"].as_i64().unwrap();

    let audio_url = interaction["response_audio_url"].as_str().unwrap().to_owned();
    let response = app.clone().oneshot(get(&audio_url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");

    let response = app.clone().oneshot(get("/api/audio/history")).await.unwrap();
    let history = json_body(response).await;
    let entries = history["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], id);
    assert_eq!(entries[0]["emotion"], "sad");
    assert_eq!(entries[0]["response"], interaction["ai_response"]);
    assert_eq!(entries[0]["confidence"], interaction["confidence"]);

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/audio/history/{id}/feedback"),
            serde_json::json!({"rating": 4, "notes": "helpful"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get(&format!("/api/audio/history/{id}")))
        .await
        .unwrap();
    let record = json_body(response).await;
    assert_eq!(record["user_rating"], 4);
    assert_eq!(record["user_notes"], "helpful");
    assert_eq!(record["confidence"], interaction["confidence"]);
    assert_eq!(record["emotion_scores"], interaction["emotion_scores"]);
}

#[tokio::test]
async fn upload_errors_are_bad_requests() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let response = app
        .clone()
        .oneshot(multipart_request("file", &wav_clip()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"]
        .as_str()
        .unwrap()
        .contains("audio"));

    let response = app
        .oneshot(multipart_request("audio", b""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn feedback_is_validated() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/audio/history/99/feedback",
            serde_json::json!({"rating": 3}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.clone()
        .oneshot(multipart_request("audio", &wav_clip()))
        .await
        .unwrap();
    let response = app
        .oneshot(post_json(
            "/api/audio/history/1/feedback",
            serde_json::json!({"rating": 9}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn audio_files_are_confined_to_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("tts_calm_0000abcd.wav"), b"RIFF").unwrap();
    let app = app(dir.path());

    let response = app
        .clone()
        .oneshot(get("/api/audio/file/tts_calm_0000abcd.wav"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get("/api/audio/file/..%2Fsecrets.db"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(get("/api/audio/file/missing.wav"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(get("/outputs/tts_calm_0000abcd.wav"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn history_limit_is_respected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    for _ in 0..3 {
        app.clone()
            .oneshot(multipart_request("audio", &wav_clip()))
            .await
            .unwrap();
    }

    let response = app
        .oneshot(get("/api/audio/history?limit=2"))
        .await
        .unwrap();
    let history = json_body(response).await;
    let entries = history["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0]["id"].as_i64().unwrap() > entries[1]["id"].as_i64().unwrap());
}
