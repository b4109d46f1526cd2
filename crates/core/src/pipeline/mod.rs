//! One request, end to end: decode, analyse, reply, speak, remember.

use crate::asr::{self, Transcriber};
use crate::decode::{DecodeError, Decoder};
use crate::emotion::{EmotionCategory, EmotionDetector, EmotionScores};
use crate::history::{HistoryError, NewRecord, SharedHistory};
use crate::reply::Responder;
use crate::tts::{voice_params_for, TtsClient, TtsRequest};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

const LOG_TARGET: &str = "pipeline";

/// Route prefix under which synthesized replies are served.
pub const AUDIO_FILE_ROUTE: &str = "/api/audio/file";

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("could not decode upload: {0}")]
    Decode(#[from] DecodeError),

    #[error("could not store interaction: {0}")]
    History(#[from] HistoryError),
}

impl PipelineError {
    /// True when the caller sent something unusable rather than the server failing.
    pub fn is_bad_input(&self) -> bool {
        matches!(self, PipelineError::Decode(_))
    }
}

/// Services built once at startup and shared by every request.
pub struct Services {
    pub decoder: Decoder,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub detector: EmotionDetector,
    pub responder: Responder,
    pub tts: Option<Arc<dyn TtsClient>>,
    pub history: SharedHistory,
    pub output_dir: PathBuf,
}

/// Response body for a processed recording.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Interaction {
    pub session_id: i64,
    pub emotion: EmotionCategory,
    pub confidence: f64,
    pub emotion_scores: EmotionScores,
    pub transcription: Option<String>,
    pub ai_response: String,
    pub response_audio_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Pipeline {
    services: Arc<Services>,
}

impl Pipeline {
    pub fn new(services: Services) -> Self {
        Self {
            services: Arc::new(services),
        }
    }

    pub fn history(&self) -> &SharedHistory {
        &self.services.history
    }

    pub fn output_dir(&self) -> &Path {
        &self.services.output_dir
    }

    pub async fn process(&self, upload: Bytes) -> Result<Interaction, PipelineError> {
        let started = Instant::now();
        let svc = &self.services;

        let audio = svc.decoder.decode(upload).await?;
        tracing::debug!(
            target: LOG_TARGET,
            samples = audio.samples.len(),
            duration_s = audio.duration_secs(),
            "upload decoded"
        );

        let (transcription, detection) = svc
            .detector
            .detect_while_transcribing(
                &audio,
                asr::transcribe_optional(svc.transcriber.as_ref(), &audio),
            )
            .await;
        let emotion = detection.result.primary_emotion;
        let confidence = detection.result.confidence_rounded();
        let scores = detection.result.scores_rounded();

        let reply = svc.responder.reply(emotion, transcription.as_deref()).await;
        let reply_audio = self.synthesize_reply(emotion, &reply).await;

        let stored = svc
            .history
            .insert(NewRecord {
                timestamp: Utc::now(),
                primary_emotion: emotion,
                scores,
                confidence,
                transcription: transcription.clone(),
                audio_duration: audio.duration_secs(),
                reply: reply.clone(),
                reply_audio: reply_audio.clone(),
            })
            .await?;

        tracing::info!(
            target: LOG_TARGET,
            session_id = stored.id,
            %emotion,
            confidence,
            has_transcript = transcription.is_some(),
            has_audio = reply_audio.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "recording processed"
        );

        Ok(Interaction {
            session_id: stored.id,
            emotion,
            confidence,
            emotion_scores: scores,
            transcription,
            ai_response: reply,
            response_audio_url: reply_audio.map(|name| format!("{AUDIO_FILE_ROUTE}/{name}")),
            timestamp: stored.timestamp,
        })
    }

    /// Speaks the reply into the output directory and returns the file name.
    /// Any failure is logged and yields `None`.
    async fn synthesize_reply(&self, emotion: EmotionCategory, text: &str) -> Option<String> {
        let tts = self.services.tts.as_ref()?;
        let params = voice_params_for(emotion);
        let request = TtsRequest {
            text: text.to_owned(),
            voice: None,
            params,
        };

        let mut audio = match tts.synthesize(request).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "speech synthesis failed, storing reply without audio");
                return None;
            }
        };
        audio.apply_gain(params.volume);

        let name = reply_file_name(emotion);
        let path = self.services.output_dir.join(&name);
        let written = async {
            let wav = audio.to_wav_bytes().map_err(|e| e.to_string())?;
            tokio::fs::create_dir_all(&self.services.output_dir)
                .await
                .map_err(|e| e.to_string())?;
            tokio::fs::write(&path, &wav).await.map_err(|e| e.to_string())
        }
        .await;

        match written {
            Ok(()) => Some(name),
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, path = %path.display(), error = %e, "could not write reply audio");
                None
            }
        }
    }
}

pub fn reply_file_name(emotion: EmotionCategory) -> String {
    format!("tts_{}_{:08x}.wav", emotion.as_str(), rand::random::<u32>())
}

/// Accepts bare file names only.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && !name.contains("..")
}
