use crate::tts::{TtsAudio, TtsClient, TtsError, TtsRequest};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// How long a quota error keeps replies on the local voice.
const QUOTA_COOLDOWN: Duration = Duration::from_secs(300);
const LOG_TARGET: &str = "tts::fallback";

/// Speaks replies with the cloud voice and falls back to the local one.
///
/// Any cloud failure sends that reply to the local voice. A quota error also
/// keeps every reply local until [`QUOTA_COOLDOWN`] has passed.
pub struct FallbackTtsClient<C, L> {
    cloud: C,
    local: L,
    local_until: Mutex<Option<Instant>>,
}

impl<C, L> FallbackTtsClient<C, L>
where
    C: TtsClient,
    L: TtsClient,
{
    pub fn new(cloud: C, local: L) -> Self {
        Self {
            cloud,
            local,
            local_until: Mutex::new(None),
        }
    }

    async fn cloud_allowed(&self) -> bool {
        let mut until = self.local_until.lock().await;
        match *until {
            Some(deadline) if Instant::now() < deadline => false,
            Some(_) => {
                tracing::info!(target: LOG_TARGET, "quota cool-down over, trying cloud voice again");
                *until = None;
                true
            }
            None => true,
        }
    }

    async fn speak_locally(&self, request: TtsRequest) -> Result<TtsAudio, TtsError> {
        tracing::debug!(
            target: LOG_TARGET,
            rate_wpm = request.params.speech_rate,
            volume = request.params.volume,
            "speaking reply with local voice"
        );
        self.local.synthesize(request).await
    }
}

impl<C, L> TtsClient for FallbackTtsClient<C, L>
where
    C: TtsClient,
    L: TtsClient,
{
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
        async move {
            if !self.cloud_allowed().await {
                return self.speak_locally(request).await;
            }

            match self.cloud.synthesize(request.clone()).await {
                Ok(audio) => Ok(audio),
                Err(TtsError::QuotaExhausted) => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        cooldown_s = QUOTA_COOLDOWN.as_secs(),
                        "cloud voice quota exhausted, replies stay local"
                    );
                    *self.local_until.lock().await = Some(Instant::now() + QUOTA_COOLDOWN);
                    self.speak_locally(request).await
                }
                Err(e) => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        error = %e,
                        rate_wpm = request.params.speech_rate,
                        "cloud voice failed for this reply"
                    );
                    self.speak_locally(request).await
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionCategory;
    use crate::tts::voice_params_for;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    /// Scripted voice that records what it was asked to say.
    #[derive(Default)]
    struct Voice {
        fail_with: Option<fn() -> TtsError>,
        calls: AtomicUsize,
        seen: StdMutex<Vec<TtsRequest>>,
    }

    impl Voice {
        fn failing(make: fn() -> TtsError) -> Arc<Self> {
            Arc::new(Self {
                fail_with: Some(make),
                ..Self::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TtsClient for Voice {
        fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request);
            let result = match self.fail_with {
                Some(make) => Err(make()),
                None => Ok(TtsAudio {
                    sample_rate_hz: 16_000,
                    channels: 1,
                    pcm_i16: vec![0; 160],
                }),
            };
            async move { result }.boxed()
        }
    }

    fn reply_for(emotion: EmotionCategory) -> TtsRequest {
        TtsRequest {
            text: "I'm here with you.".into(),
            voice: None,
            params: voice_params_for(emotion),
        }
    }

    #[tokio::test]
    async fn cloud_voice_is_preferred() {
        let cloud = Arc::new(Voice::default());
        let local = Arc::new(Voice::default());
        let client = FallbackTtsClient::new(cloud.clone(), local.clone());

        client.synthesize(reply_for(EmotionCategory::Calm)).await.unwrap();
        assert_eq!(cloud.calls(), 1);
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn local_voice_gets_the_same_rate_and_volume() {
        let cloud = Voice::failing(|| TtsError::Other("timeout".into()));
        let local = Arc::new(Voice::default());
        let client = FallbackTtsClient::new(cloud, local.clone());

        let request = reply_for(EmotionCategory::Sad);
        client.synthesize(request.clone()).await.unwrap();
        assert_eq!(local.seen.lock().unwrap().as_slice(), &[request]);
    }

    #[tokio::test]
    async fn transient_failure_does_not_start_cooldown() {
        let cloud = Voice::failing(|| TtsError::Other("timeout".into()));
        let local = Arc::new(Voice::default());
        let client = FallbackTtsClient::new(cloud.clone(), local.clone());

        client.synthesize(reply_for(EmotionCategory::Happy)).await.unwrap();
        client.synthesize(reply_for(EmotionCategory::Happy)).await.unwrap();
        assert_eq!(cloud.calls(), 2);
        assert_eq!(local.calls(), 2);
        assert!(client.local_until.lock().await.is_none());
    }

    #[tokio::test]
    async fn quota_error_keeps_replies_local_during_cooldown() {
        let cloud = Voice::failing(|| TtsError::QuotaExhausted);
        let local = Arc::new(Voice::default());
        let client = FallbackTtsClient::new(cloud.clone(), local.clone());

        client.synthesize(reply_for(EmotionCategory::Angry)).await.unwrap();
        client.synthesize(reply_for(EmotionCategory::Anxious)).await.unwrap();
        assert_eq!(cloud.calls(), 1);
        assert_eq!(local.calls(), 2);
    }

    #[tokio::test]
    async fn cloud_is_retried_after_cooldown() {
        let cloud = Arc::new(Voice::default());
        let local = Arc::new(Voice::default());
        let client = FallbackTtsClient::new(cloud.clone(), local.clone());
        *client.local_until.lock().await = Some(Instant::now() - Duration::from_secs(1));

        client.synthesize(reply_for(EmotionCategory::Neutral)).await.unwrap();
        assert_eq!(cloud.calls(), 1);
        assert_eq!(local.calls(), 0);
        assert!(client.local_until.lock().await.is_none());
    }

    #[tokio::test]
    async fn repeated_quota_error_restarts_cooldown() {
        let cloud = Voice::failing(|| TtsError::QuotaExhausted);
        let local = Arc::new(Voice::default());
        let client = FallbackTtsClient::new(cloud.clone(), local.clone());
        *client.local_until.lock().await = Some(Instant::now() - Duration::from_secs(1));

        client.synthesize(reply_for(EmotionCategory::Surprised)).await.unwrap();
        assert_eq!(cloud.calls(), 1);
        let deadline = client.local_until.lock().await.unwrap();
        assert!(deadline > Instant::now() + QUOTA_COOLDOWN - Duration::from_secs(5));
    }

    #[tokio::test]
    async fn local_failure_is_reported() {
        let cloud = Voice::failing(|| TtsError::QuotaExhausted);
        let local = Voice::failing(|| TtsError::Other("piper missing".into()));
        let client = FallbackTtsClient::new(cloud, local);

        let err = client.synthesize(reply_for(EmotionCategory::Calm)).await.unwrap_err();
        assert!(matches!(err, TtsError::Other(_)));
    }
}
