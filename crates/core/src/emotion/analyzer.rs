use crate::decode::PcmAudio;
use crate::emotion::fusion::{FusionResult, SignalFusion};
use crate::emotion::prosody::{self, ProsodyRule};
use crate::emotion::{signals, EmotionScores};
use crate::features::{AcousticFeatures, FeatureExtractor};
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

const LOG_TARGET: &str = "emotion::detector";

/// Prosody is measured on the opening stretch of a clip only.
pub const MAX_ANALYSIS_SECS: u32 = 30;

#[derive(thiserror::Error, Debug)]
pub enum ClassifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classifier returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid classifier response: {0}")]
    InvalidResponse(String),

    #[error("audio encoding failed: {0}")]
    Encode(String),
}

impl ClassifyError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ClassifyError::Http(e) => e.is_timeout() || e.is_connect(),
            ClassifyError::Api { status, .. } => crate::util::is_http_retryable(*status),
            _ => false,
        }
    }
}

/// One `(label, confidence)` pair from an external classifier.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Sentiment {
    pub label: String,
    pub score: f64,
}

impl Sentiment {
    pub fn is_positive(&self) -> bool {
        self.label.trim().eq_ignore_ascii_case("positive")
    }
}

/// Speech-emotion recognition over an encoded WAV clip.
pub trait SpeechEmotionClassifier: Send + Sync {
    fn classify_speech(&self, wav: Bytes) -> BoxFuture<'_, Result<Vec<LabelScore>, ClassifyError>>;
}

/// Binary text sentiment over a transcript.
pub trait SentimentClassifier: Send + Sync {
    fn classify_sentiment(&self, text: String) -> BoxFuture<'_, Result<Sentiment, ClassifyError>>;
}

/// Everything the detector learned about one submission.
#[derive(Clone, Debug)]
pub struct Detection {
    pub result: FusionResult,
    pub features: AcousticFeatures,
    pub prosody_rule: Option<ProsodyRule>,
    pub audio_scores: Option<EmotionScores>,
    pub text_scores: Option<EmotionScores>,
}

/// Runs the three signal sources for one clip and fuses them.
#[derive(Clone)]
pub struct EmotionDetector {
    speech: Option<Arc<dyn SpeechEmotionClassifier>>,
    sentiment: Option<Arc<dyn SentimentClassifier>>,
    extractor: FeatureExtractor,
    fusion: SignalFusion,
}

impl EmotionDetector {
    pub fn new(fusion: SignalFusion) -> Self {
        Self {
            speech: None,
            sentiment: None,
            extractor: FeatureExtractor::default(),
            fusion,
        }
    }

    pub fn with_speech_classifier(mut self, classifier: Arc<dyn SpeechEmotionClassifier>) -> Self {
        self.speech = Some(classifier);
        self
    }

    pub fn with_sentiment_classifier(mut self, classifier: Arc<dyn SentimentClassifier>) -> Self {
        self.sentiment = Some(classifier);
        self
    }

    pub fn has_speech_classifier(&self) -> bool {
        self.speech.is_some()
    }

    pub fn has_sentiment_classifier(&self) -> bool {
        self.sentiment.is_some()
    }

    pub async fn detect(&self, audio: &PcmAudio, transcription: Option<&str>) -> Detection {
        let text = transcription.map(str::to_owned);
        let (_, detection) = self
            .detect_while_transcribing(audio, std::future::ready(text))
            .await;
        detection
    }

    /// Like [`detect`](Self::detect), but overlaps the transcription with the
    /// speech classifier and feature extraction. Sentiment runs as soon as the
    /// transcript is available.
    pub async fn detect_while_transcribing<F>(
        &self,
        audio: &PcmAudio,
        transcription: F,
    ) -> (Option<String>, Detection)
    where
        F: Future<Output = Option<String>>,
    {
        let text_branch = async {
            let text = transcription
                .await
                .map(|t| t.trim().to_owned())
                .filter(|t| !t.is_empty());
            let scores = self.text_signal(text.as_deref()).await;
            (text, scores)
        };
        let ((text, text_scores), audio_scores, features) = tokio::join!(
            text_branch,
            self.audio_signal(audio),
            self.extract_features(audio),
        );

        let prosody_rule = prosody::matching_rule(&features);
        let prosody_scores = prosody::prosody_scores(&features);
        let result = self
            .fusion
            .fuse(audio_scores.as_ref(), text_scores.as_ref(), &prosody_scores);

        tracing::info!(
            target: LOG_TARGET,
            emotion = %result.primary_emotion,
            confidence = result.confidence,
            audio_signal = audio_scores.is_some(),
            text_signal = text_scores.is_some(),
            prosody_rule = ?prosody_rule,
            "emotion detected"
        );

        let detection = Detection {
            result,
            features,
            prosody_rule,
            audio_scores,
            text_scores,
        };
        (text, detection)
    }

    async fn audio_signal(&self, audio: &PcmAudio) -> Option<EmotionScores> {
        let classifier = self.speech.as_ref()?;
        let wav = match audio.to_wav_bytes() {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "could not encode clip for classifier");
                return None;
            }
        };
        match classifier.classify_speech(wav).await {
            Ok(predictions) if predictions.is_empty() => None,
            Ok(predictions) => {
                tracing::debug!(target: LOG_TARGET, ?predictions, "speech emotion predictions");
                Some(signals::audio_scores(&predictions))
            }
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "speech emotion classifier failed");
                None
            }
        }
    }

    async fn text_signal(&self, transcription: Option<&str>) -> Option<EmotionScores> {
        let text = transcription.map(str::trim).filter(|t| !t.is_empty())?;
        let classifier = self.sentiment.as_ref()?;
        match classifier.classify_sentiment(text.to_owned()).await {
            Ok(sentiment) => Some(signals::text_scores(&sentiment)),
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "sentiment classifier failed");
                None
            }
        }
    }

    async fn extract_features(&self, audio: &PcmAudio) -> AcousticFeatures {
        let extractor = self.extractor.clone();
        let sample_rate = audio.format.sample_rate;
        let samples = analysis_window(&audio.samples, sample_rate).to_vec();
        if samples.len() < audio.samples.len() {
            tracing::debug!(
                target: LOG_TARGET,
                analysed_s = MAX_ANALYSIS_SECS,
                total_s = audio.duration_secs(),
                "long clip, extracting features from its start"
            );
        }
        tokio::task::spawn_blocking(move || extractor.extract(&samples, sample_rate))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(target: LOG_TARGET, error = %e, "feature extraction task failed");
                AcousticFeatures::default()
            })
    }
}

fn analysis_window(samples: &[f32], sample_rate: u32) -> &[f32] {
    let max = sample_rate as usize * MAX_ANALYSIS_SECS as usize;
    &samples[..samples.len().min(max)]
}
