use anyhow::Context;
use clap::Parser;
use moodmate_core::asr::{OpenAiTranscriber, Transcriber};
use moodmate_core::config::{
    database_path_from_url, parse_fusion_weights, parse_origins, resolve_api_key,
    resolve_optional_string, resolve_string_with_default, ApiKeys, AppConfig, StdEnv, TtsBackend,
    TtsConfig, DEFAULT_DATABASE_URL, DEFAULT_LISTEN_ADDR, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_OUTPUT_DIR, DEFAULT_PIPER_BINARY, ENV_ALLOWED_ORIGINS, ENV_DATABASE_URL,
    ENV_ELEVENLABS_API_KEY, ENV_FUSION_WEIGHTS, ENV_GEMINI_API_KEY, ENV_HF_API_TOKEN,
    ENV_OPENAI_API_KEY, ENV_OUTPUT_DIR, ENV_PIPER_BINARY, ENV_PIPER_MODEL, ENV_TTS_BACKEND,
    ENV_WHISPER_MODEL_PATH,
};
use moodmate_core::decode::Decoder;
use moodmate_core::emotion::{EmotionDetector, HuggingFaceClassifier, SignalFusion};
use moodmate_core::history::{HistoryStore, SharedHistory};
use moodmate_core::pipeline::{Pipeline, Services};
use moodmate_core::reply::{GeminiResponder, Responder};
use moodmate_core::tts::{ElevenLabsTtsClient, FallbackTtsClient, PiperTtsClient, TtsClient};
use moodmate_server::{router, RouterSettings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "moodmate")]
#[command(about = "Voice mood check-ins: emotion detection, empathetic replies and spoken responses")]
struct Args {
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    listen: String,

    #[arg(long)]
    gemini_api_key: Option<String>,

    #[arg(long)]
    hf_api_token: Option<String>,

    #[arg(long)]
    elevenlabs_api_key: Option<String>,

    #[arg(long)]
    openai_api_key: Option<String>,

    /// `sqlite:///path/to/file.db` or a plain path.
    #[arg(long)]
    database_url: Option<String>,

    #[arg(long)]
    output_dir: Option<String>,

    /// `piper` or `elevenlabs`.
    #[arg(long)]
    tts_backend: Option<String>,

    #[arg(long)]
    piper_binary: Option<String>,

    #[arg(long)]
    piper_model: Option<String>,

    #[arg(long)]
    whisper_model: Option<String>,

    /// Comma-separated list of origins allowed by CORS.
    #[arg(long)]
    allowed_origins: Option<String>,

    /// Audio, text and prosody weights, e.g. `0.6,0.3,0.1`.
    #[arg(long)]
    fusion_weights: Option<String>,

    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let cfg = build_config(args, &env)?;

    tracing::info!(
        listen = %cfg.listen_addr,
        database = %cfg.database_path.display(),
        output_dir = %cfg.output_dir.display(),
        tts_backend = ?cfg.tts.backend,
        "config loaded"
    );

    serve(cfg).await
}

async fn serve(cfg: AppConfig) -> anyhow::Result<()> {
    let services = build_services(&cfg).await?;
    let app = router(Pipeline::new(services), &RouterSettings::from_config(&cfg));

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen_addr))?;
    tracing::info!(addr = %cfg.listen_addr, "MoodMate API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
}

async fn build_services(cfg: &AppConfig) -> anyhow::Result<Services> {
    let store = HistoryStore::open(&cfg.database_path)
        .with_context(|| format!("failed to open {}", cfg.database_path.display()))?;
    tokio::fs::create_dir_all(&cfg.output_dir)
        .await
        .with_context(|| format!("failed to create {}", cfg.output_dir.display()))?;

    let mut detector = EmotionDetector::new(SignalFusion::new(cfg.fusion_weights));
    match &cfg.api_keys.huggingface {
        Some(token) => {
            let classifier = Arc::new(HuggingFaceClassifier::new(Some(token.expose().to_string())));
            detector = detector
                .with_speech_classifier(classifier.clone())
                .with_sentiment_classifier(classifier);
        }
        None => tracing::warn!("no Hugging Face token, emotion relies on prosody alone"),
    }

    let responder = match &cfg.api_keys.gemini {
        Some(key) => Responder::new(Some(Arc::new(GeminiResponder::new(key.expose().to_string())))),
        None => {
            tracing::warn!("no Gemini key, replies use canned responses");
            Responder::default()
        }
    };

    let transcriber = build_transcriber(cfg)?;
    let tts = build_tts(cfg);
    let stored_entries = store.count().context("failed to read mood history")?;

    tracing::info!(
        speech_classifier = detector.has_speech_classifier(),
        sentiment_classifier = detector.has_sentiment_classifier(),
        transcriber = transcriber.is_some(),
        reply_generator = responder.is_configured(),
        tts = tts.is_some(),
        stored_entries,
        "services ready"
    );

    Ok(Services {
        decoder: Decoder::default(),
        transcriber,
        detector,
        responder,
        tts,
        history: SharedHistory::new(store),
        output_dir: cfg.output_dir.clone(),
    })
}

fn build_transcriber(cfg: &AppConfig) -> anyhow::Result<Option<Arc<dyn Transcriber>>> {
    if let Some(local) = local_transcriber(cfg)? {
        return Ok(Some(local));
    }
    match &cfg.api_keys.openai {
        Some(key) => Ok(Some(Arc::new(OpenAiTranscriber::new(key.expose().to_string())))),
        None => {
            tracing::warn!("no transcription backend, text sentiment disabled");
            Ok(None)
        }
    }
}

#[cfg(feature = "whisper")]
fn local_transcriber(cfg: &AppConfig) -> anyhow::Result<Option<Arc<dyn Transcriber>>> {
    let Some(model) = &cfg.whisper_model_path else {
        return Ok(None);
    };
    let whisper = moodmate_core::asr::WhisperTranscriber::new(model)?;
    tracing::info!(model = %model, "using local whisper model");
    Ok(Some(Arc::new(whisper)))
}

#[cfg(not(feature = "whisper"))]
fn local_transcriber(cfg: &AppConfig) -> anyhow::Result<Option<Arc<dyn Transcriber>>> {
    if cfg.whisper_model_path.is_some() {
        tracing::warn!("whisper model configured but this build lacks the `whisper` feature");
    }
    Ok(None)
}

fn build_tts(cfg: &AppConfig) -> Option<Arc<dyn TtsClient>> {
    let piper = cfg
        .tts
        .piper_model
        .clone()
        .map(|model| PiperTtsClient::new(cfg.tts.piper_binary.clone(), model));
    let elevenlabs = cfg
        .api_keys
        .elevenlabs
        .as_ref()
        .map(|key| ElevenLabsTtsClient::new(key.expose().to_string()));

    let tts: Option<Arc<dyn TtsClient>> = match (cfg.tts.backend, elevenlabs, piper) {
        (TtsBackend::ElevenLabs, Some(cloud), Some(local)) => {
            Some(Arc::new(FallbackTtsClient::new(cloud, local)))
        }
        (TtsBackend::ElevenLabs, Some(cloud), None) => Some(Arc::new(cloud)),
        (_, _, Some(local)) => Some(Arc::new(local)),
        (TtsBackend::Piper, Some(cloud), None) => {
            tracing::warn!("no piper model configured, using ElevenLabs");
            Some(Arc::new(cloud))
        }
        (_, None, None) => None,
    };
    if tts.is_none() {
        tracing::warn!("no speech synthesis backend, replies are text only");
    }
    tts
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn build_config(args: Args, env: &impl moodmate_core::config::Env) -> anyhow::Result<AppConfig> {
    let api_keys = ApiKeys {
        gemini: resolve_api_key(args.gemini_api_key, ENV_GEMINI_API_KEY, env)?,
        huggingface: resolve_api_key(args.hf_api_token, ENV_HF_API_TOKEN, env)?,
        elevenlabs: resolve_api_key(args.elevenlabs_api_key, ENV_ELEVENLABS_API_KEY, env)?,
        openai: resolve_api_key(args.openai_api_key, ENV_OPENAI_API_KEY, env)?,
    };

    let database_url =
        resolve_string_with_default(args.database_url, ENV_DATABASE_URL, env, DEFAULT_DATABASE_URL);
    let database_path = database_path_from_url(&database_url)?;

    let backend = match resolve_optional_string(args.tts_backend, ENV_TTS_BACKEND, env) {
        Some(raw) => raw.parse::<TtsBackend>()?,
        None => TtsBackend::default(),
    };
    let tts = TtsConfig {
        backend,
        piper_binary: PathBuf::from(resolve_string_with_default(
            args.piper_binary,
            ENV_PIPER_BINARY,
            env,
            DEFAULT_PIPER_BINARY,
        )),
        piper_model: resolve_optional_string(args.piper_model, ENV_PIPER_MODEL, env).map(PathBuf::from),
    };

    let fusion_weights = match resolve_optional_string(args.fusion_weights, ENV_FUSION_WEIGHTS, env) {
        Some(raw) => parse_fusion_weights(&raw)?,
        None => Default::default(),
    };
    let allowed_origins = match resolve_optional_string(args.allowed_origins, ENV_ALLOWED_ORIGINS, env) {
        Some(raw) => parse_origins(&raw),
        None => AppConfig::default().allowed_origins,
    };

    Ok(AppConfig {
        listen_addr: args.listen,
        api_keys,
        database_path,
        output_dir: PathBuf::from(resolve_string_with_default(
            args.output_dir,
            ENV_OUTPUT_DIR,
            env,
            DEFAULT_OUTPUT_DIR,
        )),
        tts,
        whisper_model_path: resolve_optional_string(args.whisper_model, ENV_WHISPER_MODEL_PATH, env),
        allowed_origins,
        fusion_weights,
        max_upload_bytes: args.max_upload_bytes,
    })
}
