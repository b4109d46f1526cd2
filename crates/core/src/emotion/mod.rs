mod analyzer;
pub mod fusion;
pub mod huggingface;
pub mod prosody;
pub mod signals;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub use analyzer::{
    ClassifyError, Detection, EmotionDetector, LabelScore, Sentiment, SentimentClassifier,
    SpeechEmotionClassifier,
};
pub use fusion::{FusionResult, FusionWeights, SignalFusion};
pub use huggingface::HuggingFaceClassifier;
pub use prosody::{prosody_scores, ProsodyRule};

/// The fixed set of emotions every score vector is keyed by.
///
/// Variant order is the canonical order used for tie-breaking.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EmotionCategory {
    Happy,
    Sad,
    Angry,
    Anxious,
    Calm,
    Neutral,
    Surprised,
}

impl EmotionCategory {
    pub const COUNT: usize = 7;

    pub const ALL: [EmotionCategory; Self::COUNT] = [
        EmotionCategory::Happy,
        EmotionCategory::Sad,
        EmotionCategory::Angry,
        EmotionCategory::Anxious,
        EmotionCategory::Calm,
        EmotionCategory::Neutral,
        EmotionCategory::Surprised,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            EmotionCategory::Happy => "happy",
            EmotionCategory::Sad => "sad",
            EmotionCategory::Angry => "angry",
            EmotionCategory::Anxious => "anxious",
            EmotionCategory::Calm => "calm",
            EmotionCategory::Neutral => "neutral",
            EmotionCategory::Surprised => "surprised",
        }
    }

    /// Parses a free-form label, falling back to `Neutral` for anything unknown.
    pub fn parse_or_neutral(label: &str) -> Self {
        label.parse().unwrap_or(EmotionCategory::Neutral)
    }
}

impl fmt::Display for EmotionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown emotion label: {0}")]
pub struct UnknownEmotion(pub String);

impl FromStr for EmotionCategory {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        EmotionCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownEmotion(s.to_owned()))
    }
}

/// A non-negative score per emotion category.
///
/// Backed by a fixed array, so a vector always covers exactly the seven
/// categories. Non-finite and negative inputs are stored as `0.0`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EmotionScores([f64; EmotionCategory::COUNT]);

impl EmotionScores {
    pub const fn zeros() -> Self {
        Self([0.0; EmotionCategory::COUNT])
    }

    pub fn filled(value: f64) -> Self {
        Self([sanitize(value); EmotionCategory::COUNT])
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (EmotionCategory, f64)>,
    {
        let mut scores = Self::zeros();
        for (category, value) in pairs {
            scores.set(category, value);
        }
        scores
    }

    pub fn get(&self, category: EmotionCategory) -> f64 {
        self.0[category.index()]
    }

    pub fn set(&mut self, category: EmotionCategory, value: f64) {
        self.0[category.index()] = sanitize(value);
    }

    /// Raises `category` to `value` if that is larger than what is stored.
    pub fn raise(&mut self, category: EmotionCategory, value: f64) {
        let value = sanitize(value);
        let slot = &mut self.0[category.index()];
        if value > *slot {
            *slot = value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionCategory, f64)> + '_ {
        EmotionCategory::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&v| v == 0.0)
    }

    /// Category with the highest score; ties resolve to the earliest category
    /// in canonical order.
    pub fn argmax(&self) -> (EmotionCategory, f64) {
        let mut best = (EmotionCategory::ALL[0], self.0[0]);
        for (category, value) in self.iter().skip(1) {
            if value > best.1 {
                best = (category, value);
            }
        }
        best
    }

    pub fn rounded(&self, decimals: i32) -> Self {
        let mut out = *self;
        for v in out.0.iter_mut() {
            *v = round_to(*v, decimals);
        }
        out
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl Serialize for EmotionScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(EmotionCategory::COUNT))?;
        for (category, value) in self.iter() {
            map.serialize_entry(category.as_str(), &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EmotionScores {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = HashMap::<String, f64>::deserialize(deserializer)?;
        let mut scores = EmotionScores::zeros();
        for (label, value) in raw {
            let category: EmotionCategory = label.parse().map_err(D::Error::custom)?;
            scores.set(category, value);
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_matches_indices() {
        for (i, c) in EmotionCategory::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
        }
        assert_eq!(EmotionCategory::ALL[0], EmotionCategory::Happy);
        assert_eq!(EmotionCategory::ALL[6], EmotionCategory::Surprised);
    }

    #[test]
    fn parse_is_case_insensitive_and_falls_back() {
        assert_eq!("Anxious".parse::<EmotionCategory>(), Ok(EmotionCategory::Anxious));
        assert!("bored".parse::<EmotionCategory>().is_err());
        assert_eq!(EmotionCategory::parse_or_neutral("bored"), EmotionCategory::Neutral);
    }

    #[test]
    fn scores_reject_negative_and_nan() {
        let mut s = EmotionScores::zeros();
        s.set(EmotionCategory::Sad, -1.0);
        s.set(EmotionCategory::Calm, f64::NAN);
        s.set(EmotionCategory::Happy, f64::INFINITY);
        assert!(s.is_zero());
    }

    #[test]
    fn argmax_prefers_earlier_category_on_tie() {
        let s = EmotionScores::from_pairs([
            (EmotionCategory::Calm, 0.4),
            (EmotionCategory::Angry, 0.4),
        ]);
        assert_eq!(s.argmax(), (EmotionCategory::Angry, 0.4));
    }

    #[test]
    fn serializes_all_seven_labels() {
        let s = EmotionScores::from_pairs([(EmotionCategory::Happy, 0.5)]);
        let json = serde_json::to_value(s).expect("serialize");
        let obj = json.as_object().expect("object");
        assert_eq!(obj.len(), 7);
        assert_eq!(obj["happy"], 0.5);
        assert_eq!(obj["surprised"], 0.0);

        let back: EmotionScores = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, s);
    }
}
