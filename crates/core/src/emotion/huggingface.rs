use crate::emotion::{ClassifyError, LabelScore, Sentiment, SentimentClassifier, SpeechEmotionClassifier};
use crate::util::{retry_with_backoff, RetryConfig};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_SPEECH_MODEL: &str = "ehcalabres/wav2vec2-lg-xlsr-en-speech-emotion-recognition";
pub const DEFAULT_SENTIMENT_MODEL: &str = "distilbert-base-uncased-finetuned-sst-2-english";

/// Longest transcript prefix sent to the sentiment model.
pub const MAX_SENTIMENT_CHARS: usize = 512;

const LOG_TARGET: &str = "emotion::huggingface";

/// Hugging Face Inference API client for both classifier roles.
#[derive(Clone)]
pub struct HuggingFaceClassifier {
    client: Client,
    api_token: Option<String>,
    base_url: String,
    speech_model: String,
    sentiment_model: String,
    retry: RetryConfig,
}

impl HuggingFaceClassifier {
    pub fn new(api_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_token,
            base_url: DEFAULT_BASE_URL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            sentiment_model: DEFAULT_SENTIMENT_MODEL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_models(mut self, speech_model: String, sentiment_model: String) -> Self {
        self.speech_model = speech_model;
        self.sentiment_model = sentiment_model;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/models/{}", self.base_url, model)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Vec<LabelScore>, ClassifyError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: Predictions = response
            .json()
            .await
            .map_err(|e| ClassifyError::InvalidResponse(format!("failed to parse JSON: {e}")))?;
        Ok(parsed.into_flat())
    }
}

#[derive(Serialize)]
struct TextInputs<'a> {
    inputs: &'a str,
}

/// Pipelines answer either `[{..}]` or `[[{..}]]` depending on the task.
#[derive(Deserialize)]
#[serde(untagged)]
enum Predictions {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

impl Predictions {
    fn into_flat(self) -> Vec<LabelScore> {
        match self {
            Predictions::Nested(outer) => outer.into_iter().next().unwrap_or_default(),
            Predictions::Flat(flat) => flat,
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl SpeechEmotionClassifier for HuggingFaceClassifier {
    fn classify_speech(&self, wav: Bytes) -> BoxFuture<'_, Result<Vec<LabelScore>, ClassifyError>> {
        async move {
            let url = self.model_url(&self.speech_model);
            let predictions = retry_with_backoff(
                &self.retry,
                || {
                    let request = self
                        .authorized(self.client.post(&url))
                        .header("Content-Type", "audio/wav")
                        .body(wav.clone());
                    self.send(request)
                },
                ClassifyError::is_retryable,
            )
            .await?;
            tracing::debug!(target: LOG_TARGET, model = %self.speech_model, n = predictions.len(), "speech emotion classified");
            Ok(predictions)
        }
        .boxed()
    }
}

impl SentimentClassifier for HuggingFaceClassifier {
    fn classify_sentiment(&self, text: String) -> BoxFuture<'_, Result<Sentiment, ClassifyError>> {
        async move {
            let url = self.model_url(&self.sentiment_model);
            let inputs = truncate_chars(&text, MAX_SENTIMENT_CHARS);
            let predictions = retry_with_backoff(
                &self.retry,
                || {
                    let request = self
                        .authorized(self.client.post(&url))
                        .json(&TextInputs { inputs });
                    self.send(request)
                },
                ClassifyError::is_retryable,
            )
            .await?;

            let top = predictions
                .into_iter()
                .max_by(|a, b| a.score.total_cmp(&b.score))
                .ok_or_else(|| ClassifyError::InvalidResponse("no sentiment labels in response".into()))?;
            tracing::debug!(target: LOG_TARGET, label = %top.label, score = top.score, "sentiment classified");
            Ok(Sentiment {
                label: top.label,
                score: top.score,
            })
        }
        .boxed()
    }
}
