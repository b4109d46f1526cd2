//! Empathetic reply generation.

mod gemini;
mod tone;

use crate::emotion::EmotionCategory;
use futures::future::BoxFuture;
use std::fmt::Write as _;
use std::sync::Arc;

pub use gemini::{GeminiResponder, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
pub use tone::{tone_for, tone_for_label, ToneDirective};

const LOG_TARGET: &str = "reply";

#[derive(thiserror::Error, Debug)]
pub enum GenerateError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generator returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid generator response: {0}")]
    InvalidResponse(String),

    #[error("generator produced an empty reply")]
    Empty,
}

impl GenerateError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerateError::Http(e) => e.is_timeout() || e.is_connect(),
            GenerateError::Api { status, .. } => crate::util::is_http_retryable(*status),
            _ => false,
        }
    }
}

pub trait ResponseGenerator: Send + Sync {
    /// Produces a reply for a fully built prompt.
    fn generate(&self, prompt: String) -> BoxFuture<'_, Result<String, GenerateError>>;
}

/// Builds the full prompt sent to the language model.
pub fn build_prompt(emotion: EmotionCategory, user_input: Option<&str>) -> String {
    let directive = tone_for(emotion);
    let mut prompt = String::with_capacity(1024);
    prompt.push_str(
        "You are MoodMate, an empathetic AI wellness companion designed for mental health support.\n\n",
    );
    let _ = writeln!(
        prompt,
        "CURRENT EMOTIONAL STATE: {}",
        emotion.as_str().to_uppercase()
    );
    let _ = writeln!(prompt, "Tone: {}", directive.tone);
    let _ = writeln!(prompt, "Focus: {}\n", directive.focus);
    prompt.push_str(
        "GUIDELINES:\n\
         1. Keep responses warm, authentic, and non-judgmental\n\
         2. Acknowledge their emotional state explicitly\n\
         3. Offer practical, actionable suggestions when appropriate\n\
         4. Use positive but realistic language\n\
         5. Keep responses under 150 words\n\
         6. Avoid being preachy or dismissive\n\
         7. If they mention specific concerns, address them directly\n\
         8. End with a supportive closing or gentle question\n\n\
         Remember: You're a companion, not a therapist. Never pretend to diagnose or treat \
         mental health conditions. If they mention crisis/harm, suggest professional resources.\n\n",
    );
    let _ = write!(prompt, "User: {}", user_message(emotion, user_input));
    prompt
}

pub fn user_message(emotion: EmotionCategory, user_input: Option<&str>) -> String {
    match user_input.map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) => text.to_owned(),
        None => format!("I'm feeling {emotion} right now."),
    }
}

pub fn fallback_reply(emotion: EmotionCategory) -> &'static str {
    match emotion {
        EmotionCategory::Happy => "That's wonderful! I'm so glad you're feeling good. Keep cherishing these positive moments! 💫",
        EmotionCategory::Sad => "I hear that you're going through a tough time. It's okay to feel sad sometimes. You're not alone. 💙",
        EmotionCategory::Angry => "I sense your frustration. That's a valid feeling. Let's find a constructive way to channel this energy. ⚡",
        EmotionCategory::Anxious => "I understand anxiety can be overwhelming. Let's take a moment to ground ourselves. Breathe with me. 🌬️",
        EmotionCategory::Calm => "You seem peaceful. That's a beautiful state to be in. Let's reflect on what's working well. ✨",
        EmotionCategory::Neutral => "I'm here to listen and support you. What's on your mind? 🤝",
        EmotionCategory::Surprised => "Something unexpected happened! Tell me more, I'm here to listen. 👂",
    }
}

/// Wraps an optional generator; never fails.
#[derive(Clone, Default)]
pub struct Responder {
    generator: Option<Arc<dyn ResponseGenerator>>,
}

impl Responder {
    pub fn new(generator: Option<Arc<dyn ResponseGenerator>>) -> Self {
        Self { generator }
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn reply(&self, emotion: EmotionCategory, user_input: Option<&str>) -> String {
        let Some(generator) = &self.generator else {
            return fallback_reply(emotion).to_owned();
        };
        match generator.generate(build_prompt(emotion, user_input)).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_owned(),
            Ok(_) => {
                tracing::warn!(target: LOG_TARGET, %emotion, "empty reply, using fallback");
                fallback_reply(emotion).to_owned()
            }
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, %emotion, error = %e, "reply generation failed, using fallback");
                fallback_reply(emotion).to_owned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Mutex;

    struct Echo(Mutex<Vec<String>>);

    impl ResponseGenerator for Echo {
        fn generate(&self, prompt: String) -> BoxFuture<'_, Result<String, GenerateError>> {
            if let Ok(mut seen) = self.0.lock() {
                seen.push(prompt);
            }
            async { Ok("  Sounds like a lot. How are you holding up?  ".to_owned()) }.boxed()
        }
    }

    struct Broken;

    impl ResponseGenerator for Broken {
        fn generate(&self, _prompt: String) -> BoxFuture<'_, Result<String, GenerateError>> {
            async { Err(GenerateError::Api { status: 500, body: "oops".into() }) }.boxed()
        }
    }

    #[test]
    fn prompt_carries_state_tone_and_message() {
        let prompt = build_prompt(EmotionCategory::Sad, Some("I failed my exam"));
        assert!(prompt.contains("CURRENT EMOTIONAL STATE: SAD"));
        assert!(prompt.contains("Tone: warm, validating, and supportive"));
        assert!(prompt.contains("under 150 words"));
        assert!(prompt.ends_with("User: I failed my exam"));
    }

    #[test]
    fn missing_transcript_uses_default_message() {
        assert_eq!(
            user_message(EmotionCategory::Calm, None),
            "I'm feeling calm right now."
        );
        assert_eq!(
            user_message(EmotionCategory::Calm, Some("   ")),
            "I'm feeling calm right now."
        );
    }

    #[tokio::test]
    async fn responder_trims_generated_text() {
        let echo = Arc::new(Echo(Mutex::new(Vec::new())));
        let responder = Responder::new(Some(echo.clone()));
        let reply = responder.reply(EmotionCategory::Anxious, None).await;
        assert_eq!(reply, "Sounds like a lot. How are you holding up?");
        let seen = echo.0.lock().unwrap();
        assert!(seen[0].contains("I'm feeling anxious right now."));
    }

    #[tokio::test]
    async fn failures_fall_back_per_emotion() {
        let responder = Responder::new(Some(Arc::new(Broken)));
        assert_eq!(
            responder.reply(EmotionCategory::Angry, Some("ugh")).await,
            fallback_reply(EmotionCategory::Angry)
        );
        let unconfigured = Responder::default();
        assert_eq!(
            unconfigured.reply(EmotionCategory::Neutral, None).await,
            fallback_reply(EmotionCategory::Neutral)
        );
    }
}
