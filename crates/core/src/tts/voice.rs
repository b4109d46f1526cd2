use crate::emotion::EmotionCategory;
use serde::{Deserialize, Serialize};

/// Speaking rate a synthesizer treats as its natural pace.
pub const BASELINE_RATE_WPM: u32 = 150;

/// Delivery settings for the spoken reply.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct VoiceParams {
    /// Words per minute.
    pub speech_rate: u32,
    /// Linear gain in `0.0..=1.0`.
    pub volume: f32,
}

impl VoiceParams {
    /// Rate relative to [`BASELINE_RATE_WPM`]; `> 1.0` is faster.
    pub fn relative_rate(&self) -> f32 {
        self.speech_rate.max(1) as f32 / BASELINE_RATE_WPM as f32
    }
}

impl Default for VoiceParams {
    fn default() -> Self {
        voice_params_for(EmotionCategory::Neutral)
    }
}

pub fn voice_params_for(emotion: EmotionCategory) -> VoiceParams {
    let (speech_rate, volume) = match emotion {
        EmotionCategory::Happy => (180, 1.0),
        EmotionCategory::Sad => (120, 0.7),
        EmotionCategory::Angry => (200, 1.0),
        EmotionCategory::Anxious => (140, 0.8),
        EmotionCategory::Calm => (120, 0.9),
        EmotionCategory::Neutral => (150, 0.9),
        EmotionCategory::Surprised => (170, 0.95),
    };
    VoiceParams {
        speech_rate,
        volume,
    }
}

pub fn voice_params_for_label(label: &str) -> VoiceParams {
    voice_params_for(EmotionCategory::parse_or_neutral(label))
}
