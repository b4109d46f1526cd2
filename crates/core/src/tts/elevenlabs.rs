use crate::tts::{pcm_from_le_bytes, TtsAudio, TtsClient, TtsError, TtsRequest, VoiceParams};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io/v1";
const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";
const OUTPUT_FORMAT: &str = "pcm_16000";
const OUTPUT_SAMPLE_RATE: u32 = 16_000;
const MIN_SPEED: f32 = 0.7;
const MAX_SPEED: f32 = 1.2;

#[derive(Clone)]
pub struct ElevenLabsTtsClient {
    client: Client,
    api_key: String,
    base_url: String,
    model_id: String,
}

impl ElevenLabsTtsClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model_id(mut self, model_id: String) -> Self {
        self.model_id = model_id;
        self
    }

    fn endpoint(&self, voice_id: &str) -> Result<Url, TtsError> {
        let raw = format!("{}/text-to-speech/{}", self.base_url, voice_id);
        Url::parse_with_params(&raw, &[("output_format", OUTPUT_FORMAT)])
            .map_err(|e| TtsError::Other(format!("invalid elevenlabs url {raw}: {e}")))
    }
}

#[derive(Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    speed: f32,
}

pub(crate) fn speed_for(params: &VoiceParams) -> f32 {
    params.relative_rate().clamp(MIN_SPEED, MAX_SPEED)
}

/// ElevenLabs reports exhausted credits as 401 `quota_exceeded`.
fn is_quota_error(status: u16, body: &str) -> bool {
    status == 402 || (status == 401 && body.contains("quota_exceeded"))
}

impl TtsClient for ElevenLabsTtsClient {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
        async move {
            let voice_id = request
                .voice
                .as_ref()
                .map(|v| v.0.as_str())
                .unwrap_or(DEFAULT_VOICE_ID);
            let url = self.endpoint(voice_id)?;

            let body = ElevenLabsRequest {
                text: &request.text,
                model_id: &self.model_id,
                voice_settings: VoiceSettings {
                    stability: 0.5,
                    similarity_boost: 0.75,
                    speed: speed_for(&request.params),
                },
            };

            let response = self
                .client
                .post(url)
                .header("xi-api-key", &self.api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                if is_quota_error(status.as_u16(), &text) {
                    return Err(TtsError::QuotaExhausted);
                }
                return Err(TtsError::Api {
                    status: status.as_u16(),
                    body: text,
                });
            }

            let raw = response.bytes().await?;
            let pcm_i16 = pcm_from_le_bytes(&raw);
            if pcm_i16.is_empty() {
                return Err(TtsError::Other("elevenlabs returned no audio".into()));
            }

            Ok(TtsAudio {
                sample_rate_hz: OUTPUT_SAMPLE_RATE,
                channels: 1,
                pcm_i16,
            })
        }
        .boxed()
    }
}
