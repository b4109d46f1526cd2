use crate::emotion::EmotionCategory;
use serde::Serialize;

/// How the reply should sound for a given emotion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ToneDirective {
    pub tone: &'static str,
    pub focus: &'static str,
}

pub fn tone_for(emotion: EmotionCategory) -> ToneDirective {
    let (tone, focus) = match emotion {
        EmotionCategory::Happy => (
            "celebratory and encouraging",
            "celebrate their joy and encourage positive momentum",
        ),
        EmotionCategory::Sad => (
            "warm, validating, and supportive",
            "acknowledge their feelings and offer gentle encouragement",
        ),
        EmotionCategory::Angry => (
            "calm, understanding, and de-escalating",
            "validate frustration and suggest constructive outlets",
        ),
        EmotionCategory::Anxious => (
            "reassuring and grounding",
            "provide calming techniques and perspective",
        ),
        EmotionCategory::Calm => (
            "supportive and thoughtful",
            "maintain positivity and deepen self-reflection",
        ),
        EmotionCategory::Neutral => (
            "friendly and conversational",
            "engage naturally and explore deeper",
        ),
        EmotionCategory::Surprised => (
            "curious and engaging",
            "explore their thoughts and feelings",
        ),
    };
    ToneDirective { tone, focus }
}

/// Free-form label lookup; anything unrecognised gets the neutral tone.
pub fn tone_for_label(label: &str) -> ToneDirective {
    tone_for(EmotionCategory::parse_or_neutral(label))
}
