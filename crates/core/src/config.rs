use crate::emotion::FusionWeights;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:///./moodmate.db";
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";
pub const DEFAULT_PIPER_BINARY: &str = "piper";
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
    "http://127.0.0.1:3000",
];
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_HF_API_TOKEN: &str = "HF_API_TOKEN";
pub const ENV_ELEVENLABS_API_KEY: &str = "ELEVENLABS_API_KEY";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_OUTPUT_DIR: &str = "MOODMATE_OUTPUT_DIR";
pub const ENV_TTS_BACKEND: &str = "TTS_BACKEND";
pub const ENV_PIPER_BINARY: &str = "PIPER_BINARY";
pub const ENV_PIPER_MODEL: &str = "PIPER_MODEL";
pub const ENV_WHISPER_MODEL_PATH: &str = "WHISPER_MODEL_PATH";
pub const ENV_ALLOWED_ORIGINS: &str = "MOODMATE_ALLOWED_ORIGINS";
pub const ENV_FUSION_WEIGHTS: &str = "MOODMATE_FUSION_WEIGHTS";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKeys {
    pub gemini: Option<ApiKey>,
    pub huggingface: Option<ApiKey>,
    pub elevenlabs: Option<ApiKey>,
    pub openai: Option<ApiKey>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TtsBackend {
    #[default]
    Piper,
    ElevenLabs,
}

impl FromStr for TtsBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "piper" => Ok(Self::Piper),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(ConfigError::InvalidTtsBackend(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TtsConfig {
    pub backend: TtsBackend,
    pub piper_binary: PathBuf,
    /// Without a model the local voice is disabled.
    pub piper_model: Option<PathBuf>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: TtsBackend::default(),
            piper_binary: PathBuf::from(DEFAULT_PIPER_BINARY),
            piper_model: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub listen_addr: String,
    pub api_keys: ApiKeys,
    pub database_path: PathBuf,
    pub output_dir: PathBuf,
    pub tts: TtsConfig,
    pub whisper_model_path: Option<String>,
    pub allowed_origins: Vec<String>,
    pub fusion_weights: FusionWeights,
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_owned(),
            api_keys: ApiKeys::default(),
            database_path: database_path_from_url(DEFAULT_DATABASE_URL).unwrap_or_default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            tts: TtsConfig::default(),
            whisper_model_path: None,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|s| (*s).to_owned()).collect(),
            fusion_weights: FusionWeights::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("unknown tts backend {0:?} (expected piper or elevenlabs)")]
    InvalidTtsBackend(String),
    #[error("invalid fusion weights {0:?}: expected three comma-separated non-negative numbers")]
    InvalidFusionWeights(String),
    #[error("database url {0:?} does not name a sqlite file")]
    InvalidDatabaseUrl(String),
}

/// Accepts `sqlite:///path`, `sqlite://path` or a bare file path.
pub fn database_path_from_url(url: &str) -> Result<PathBuf, ConfigError> {
    let trimmed = url.trim();
    let path = trimmed
        .strip_prefix("sqlite:///")
        .or_else(|| trimmed.strip_prefix("sqlite://"))
        .unwrap_or(trimmed);
    if path.is_empty() || path.contains("://") {
        return Err(ConfigError::InvalidDatabaseUrl(url.to_owned()));
    }
    Ok(PathBuf::from(path))
}

pub fn parse_fusion_weights(raw: &str) -> Result<FusionWeights, ConfigError> {
    let invalid = || ConfigError::InvalidFusionWeights(raw.to_owned());
    let parts = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [audio, text, prosody] => FusionWeights::new(*audio, *text, *prosody).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match cli_value {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => match env.var(env_key) {
            Some(v) => Ok(Some(ApiKey::new(v)?)),
            None => Ok(None),
        },
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
}
