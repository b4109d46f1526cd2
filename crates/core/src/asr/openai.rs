use crate::asr::{AsrError, Transcriber, Transcript};
use crate::decode::PcmAudio;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Any OpenAI-compatible `/audio/transcriptions` endpoint.
#[derive(Clone)]
pub struct OpenAiTranscriber {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiTranscriber {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl Transcriber for OpenAiTranscriber {
    fn transcribe(&self, audio: PcmAudio) -> BoxFuture<'_, Result<Transcript, AsrError>> {
        async move {
            let wav = audio.to_wav_bytes()?;
            let file = Part::bytes(wav.to_vec())
                .file_name("clip.wav")
                .mime_str("audio/wav")?;
            let form = Form::new()
                .part("file", file)
                .text("model", self.model.clone())
                .text("language", "en")
                .text("response_format", "json");

            let response = self
                .client
                .post(format!("{}/audio/transcriptions", self.base_url))
                .bearer_auth(&self.api_key)
                .multipart(form)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AsrError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: TranscriptionResponse = response.json().await?;
            Ok(Transcript {
                text: parsed.text,
                audio_duration: audio.duration,
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::PcmFormat;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_multipart_and_reads_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "hello there"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transcriber = OpenAiTranscriber::new("sk-test".into()).with_base_url(server.uri());
        let clip = PcmAudio::new(PcmFormat::mono_16khz(), vec![0.0; 16_000]);
        let transcript = transcriber.transcribe(clip).await.unwrap();
        assert_eq!(transcript.text, "hello there");
        assert_eq!(transcript.audio_duration.as_secs(), 1);
    }

    #[tokio::test]
    async fn api_errors_surface_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad audio"))
            .mount(&server)
            .await;

        let transcriber = OpenAiTranscriber::new("sk-test".into()).with_base_url(server.uri());
        let clip = PcmAudio::new(PcmFormat::mono_16khz(), vec![0.0; 160]);
        let err = transcriber.transcribe(clip).await.unwrap_err();
        assert!(matches!(err, AsrError::Api { status: 400, .. }));
    }
}
