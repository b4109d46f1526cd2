mod openai;
#[cfg(feature = "whisper")]
mod whisper;

use crate::decode::PcmAudio;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub use openai::{OpenAiTranscriber, DEFAULT_OPENAI_BASE_URL, DEFAULT_TRANSCRIPTION_MODEL};
#[cfg(feature = "whisper")]
pub use whisper::WhisperTranscriber;

const LOG_TARGET: &str = "asr";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub audio_duration: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum AsrError {
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transcription service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("audio encoding failed: {0}")]
    Encode(#[from] crate::decode::DecodeError),
}

pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: PcmAudio) -> BoxFuture<'_, Result<Transcript, AsrError>>;
}

/// Transcribes when a backend is configured; failures and blank text both
/// come back as `None`.
pub async fn transcribe_optional(
    transcriber: Option<&Arc<dyn Transcriber>>,
    audio: &PcmAudio,
) -> Option<String> {
    let transcriber = transcriber?;
    match transcriber.transcribe(audio.clone()).await {
        Ok(t) => {
            let text = t.text.trim();
            tracing::debug!(target: LOG_TARGET, chars = text.len(), "transcribed");
            (!text.is_empty()).then(|| text.to_owned())
        }
        Err(e) => {
            tracing::warn!(target: LOG_TARGET, error = %e, "transcription failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::PcmFormat;
    use futures::FutureExt;

    struct Fixed(&'static str);

    impl Transcriber for Fixed {
        fn transcribe(&self, audio: PcmAudio) -> BoxFuture<'_, Result<Transcript, AsrError>> {
            let text = self.0.to_owned();
            async move {
                Ok(Transcript {
                    text,
                    audio_duration: audio.duration,
                })
            }
            .boxed()
        }
    }

    struct Failing;

    impl Transcriber for Failing {
        fn transcribe(&self, _audio: PcmAudio) -> BoxFuture<'_, Result<Transcript, AsrError>> {
            async { Err(AsrError::Model("no model".into())) }.boxed()
        }
    }

    fn clip() -> PcmAudio {
        PcmAudio::new(PcmFormat::mono_16khz(), vec![0.0; 1600])
    }

    #[tokio::test]
    async fn blank_and_failed_transcripts_are_absent() {
        let blank: Arc<dyn Transcriber> = Arc::new(Fixed("   "));
        let failing: Arc<dyn Transcriber> = Arc::new(Failing);
        assert_eq!(transcribe_optional(Some(&blank), &clip()).await, None);
        assert_eq!(transcribe_optional(Some(&failing), &clip()).await, None);
        assert_eq!(transcribe_optional(None, &clip()).await, None);
    }

    #[tokio::test]
    async fn text_is_trimmed() {
        let t: Arc<dyn Transcriber> = Arc::new(Fixed(" I'm tired. "));
        assert_eq!(
            transcribe_optional(Some(&t), &clip()).await.as_deref(),
            Some("I'm tired.")
        );
    }
}
