//! Threshold rules mapping prosodic features to a coarse emotion vector.
//!
//! Every category starts at [`FLOOR`]. Rules are checked in priority order and
//! only the first match applies its boosts. Non-finite features make every
//! comparison false, so they fall through to the floor vector.

use crate::emotion::{EmotionCategory, EmotionScores};
use crate::features::AcousticFeatures;

pub const FLOOR: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProsodyRule {
    /// High pitch with high energy.
    Elevated,
    /// Low pitch with low energy.
    Subdued,
    /// Wide pitch variation with raised energy.
    Agitated,
    /// Steady pitch with moderate energy.
    Steady,
}

impl ProsodyRule {
    pub const PRIORITY: [ProsodyRule; 4] = [
        ProsodyRule::Elevated,
        ProsodyRule::Subdued,
        ProsodyRule::Agitated,
        ProsodyRule::Steady,
    ];

    fn matches(self, f: &AcousticFeatures) -> bool {
        match self {
            ProsodyRule::Elevated => f.pitch_mean > 150.0 && f.energy_mean > 0.1,
            ProsodyRule::Subdued => f.pitch_mean < 100.0 && f.energy_mean < 0.05,
            ProsodyRule::Agitated => f.pitch_std > 50.0 && f.energy_mean > 0.08,
            ProsodyRule::Steady => {
                f.pitch_std < 30.0 && f.energy_mean > 0.05 && f.energy_mean < 0.1
            }
        }
    }

    pub fn boosts(self) -> [(EmotionCategory, f64); 2] {
        match self {
            ProsodyRule::Elevated => [
                (EmotionCategory::Happy, 0.8),
                (EmotionCategory::Surprised, 0.4),
            ],
            ProsodyRule::Subdued => [(EmotionCategory::Sad, 0.7), (EmotionCategory::Calm, 0.3)],
            ProsodyRule::Agitated => [
                (EmotionCategory::Anxious, 0.6),
                (EmotionCategory::Angry, 0.3),
            ],
            ProsodyRule::Steady => [
                (EmotionCategory::Calm, 0.7),
                (EmotionCategory::Neutral, 0.4),
            ],
        }
    }
}

/// First rule, in priority order, whose thresholds the features satisfy.
pub fn matching_rule(features: &AcousticFeatures) -> Option<ProsodyRule> {
    ProsodyRule::PRIORITY
        .into_iter()
        .find(|rule| rule.matches(features))
}

pub fn prosody_scores(features: &AcousticFeatures) -> EmotionScores {
    let mut scores = EmotionScores::filled(FLOOR);
    if let Some(rule) = matching_rule(features) {
        for (category, value) in rule.boosts() {
            scores.set(category, value);
        }
    }
    scores
}
