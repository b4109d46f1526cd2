//! Weighted fusion of the audio, text and prosody emotion signals.
//!
//! Missing signals count as all-zero vectors; they are not dropped from the
//! weighting. The fused vector is normalized to sum to one, except when every
//! input is zero, in which case all mass goes to `neutral`.

use crate::emotion::{round_to, EmotionCategory, EmotionScores};
use serde::{Deserialize, Serialize, Serializer};

pub const PRESENTATION_DECIMALS: i32 = 4;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct FusionWeights {
    pub audio: f64,
    pub text: f64,
    pub prosody: f64,
}

impl FusionWeights {
    pub const AUDIO: f64 = 0.6;
    pub const TEXT: f64 = 0.3;
    pub const PROSODY: f64 = 0.1;

    pub fn new(audio: f64, text: f64, prosody: f64) -> Result<Self, InvalidWeights> {
        let all = [audio, text, prosody];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(InvalidWeights::Negative);
        }
        if all.iter().all(|w| *w == 0.0) {
            return Err(InvalidWeights::AllZero);
        }
        Ok(Self {
            audio,
            text,
            prosody,
        })
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            audio: Self::AUDIO,
            text: Self::TEXT,
            prosody: Self::PROSODY,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidWeights {
    #[error("fusion weights must be finite and >= 0")]
    Negative,
    #[error("at least one fusion weight must be > 0")]
    AllZero,
}

/// Outcome of fusing the three signals.
///
/// Values are kept at full precision; serialization rounds them to
/// [`PRESENTATION_DECIMALS`] digits.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FusionResult {
    pub primary_emotion: EmotionCategory,
    #[serde(serialize_with = "serialize_rounded_f64")]
    pub confidence: f64,
    #[serde(serialize_with = "serialize_rounded_scores")]
    pub scores: EmotionScores,
}

impl FusionResult {
    pub fn confidence_rounded(&self) -> f64 {
        round_to(self.confidence, PRESENTATION_DECIMALS)
    }

    pub fn scores_rounded(&self) -> EmotionScores {
        self.scores.rounded(PRESENTATION_DECIMALS)
    }
}

fn serialize_rounded_f64<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, PRESENTATION_DECIMALS))
}

fn serialize_rounded_scores<S: Serializer>(
    value: &EmotionScores,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    value.rounded(PRESENTATION_DECIMALS).serialize(serializer)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SignalFusion {
    weights: FusionWeights,
}

impl SignalFusion {
    pub fn new(weights: FusionWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    /// Per-category weighted sum, before normalization.
    pub fn weighted_sum(
        &self,
        audio: Option<&EmotionScores>,
        text: Option<&EmotionScores>,
        prosody: &EmotionScores,
    ) -> EmotionScores {
        let zeros = EmotionScores::zeros();
        let audio = audio.unwrap_or(&zeros);
        let text = text.unwrap_or(&zeros);
        let w = self.weights;

        let mut fused = EmotionScores::zeros();
        for category in EmotionCategory::ALL {
            fused.set(
                category,
                w.audio * audio.get(category)
                    + w.text * text.get(category)
                    + w.prosody * prosody.get(category),
            );
        }
        fused
    }

    pub fn fuse(
        &self,
        audio: Option<&EmotionScores>,
        text: Option<&EmotionScores>,
        prosody: &EmotionScores,
    ) -> FusionResult {
        let raw = self.weighted_sum(audio, text, prosody);
        let total = raw.sum();

        let scores = if total > 0.0 {
            let mut normalized = EmotionScores::zeros();
            for (category, value) in raw.iter() {
                normalized.set(category, value / total);
            }
            normalized
        } else {
            EmotionScores::from_pairs([(EmotionCategory::Neutral, 1.0)])
        };

        let (primary_emotion, confidence) = scores.argmax();
        tracing::debug!(
            primary = %primary_emotion,
            confidence,
            total,
            "fused emotion signals"
        );

        FusionResult {
            primary_emotion,
            confidence,
            scores,
        }
    }
}
