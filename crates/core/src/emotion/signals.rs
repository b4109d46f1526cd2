//! Conversions from classifier outputs into emotion score vectors.

use crate::emotion::{EmotionCategory, EmotionScores, LabelScore, Sentiment};

/// Maps a raw speech-emotion label into the seven-category space.
///
/// The classifier vocabulary is `angry, calm, disgust, fearful, happy,
/// neutral, sad, surprised`; labels outside it land on `neutral`.
pub fn remap_audio_label(label: &str) -> EmotionCategory {
    let label = label.trim().to_ascii_lowercase();
    match label.as_str() {
        "angry" | "disgust" => EmotionCategory::Angry,
        "calm" => EmotionCategory::Calm,
        "fearful" => EmotionCategory::Anxious,
        "happy" => EmotionCategory::Happy,
        "sad" => EmotionCategory::Sad,
        "surprised" => EmotionCategory::Surprised,
        _ => EmotionCategory::Neutral,
    }
}

/// Folds classifier predictions into a score vector. Labels that collapse
/// onto the same category keep the highest confidence, not the sum.
pub fn audio_scores(predictions: &[LabelScore]) -> EmotionScores {
    let mut scores = EmotionScores::zeros();
    for prediction in predictions {
        scores.raise(remap_audio_label(&prediction.label), prediction.score);
    }
    scores
}

pub fn text_scores(sentiment: &Sentiment) -> EmotionScores {
    let s = sentiment.score;
    if sentiment.is_positive() {
        EmotionScores::from_pairs([
            (EmotionCategory::Happy, s),
            (EmotionCategory::Calm, s * 0.3),
        ])
    } else {
        EmotionScores::from_pairs([
            (EmotionCategory::Sad, s),
            (EmotionCategory::Anxious, s * 0.4),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(label: &str, score: f64) -> LabelScore {
        LabelScore {
            label: label.to_owned(),
            score,
        }
    }

    #[test]
    fn collapsing_labels_keep_the_max() {
        let s = audio_scores(&[pred("disgust", 0.9), pred("angry", 0.2)]);
        assert_eq!(s.get(EmotionCategory::Angry), 0.9);

        let s = audio_scores(&[pred("angry", 0.2), pred("disgust", 0.1)]);
        assert_eq!(s.get(EmotionCategory::Angry), 0.2);
    }

    #[test]
    fn full_vocabulary_maps_onto_seven_categories() {
        let preds = [
            pred("angry", 0.1),
            pred("calm", 0.2),
            pred("disgust", 0.05),
            pred("fearful", 0.3),
            pred("happy", 0.4),
            pred("neutral", 0.15),
            pred("sad", 0.25),
            pred("surprised", 0.35),
        ];
        let s = audio_scores(&preds);
        assert_eq!(s.get(EmotionCategory::Angry), 0.1);
        assert_eq!(s.get(EmotionCategory::Calm), 0.2);
        assert_eq!(s.get(EmotionCategory::Anxious), 0.3);
        assert_eq!(s.get(EmotionCategory::Happy), 0.4);
        assert_eq!(s.get(EmotionCategory::Neutral), 0.15);
        assert_eq!(s.get(EmotionCategory::Sad), 0.25);
        assert_eq!(s.get(EmotionCategory::Surprised), 0.35);
    }

    #[test]
    fn unknown_and_uppercase_labels() {
        assert_eq!(remap_audio_label("FEARFUL"), EmotionCategory::Anxious);
        assert_eq!(remap_audio_label("Happy"), EmotionCategory::Happy);
        assert_eq!(remap_audio_label("boredom"), EmotionCategory::Neutral);
        assert_eq!(remap_audio_label("anxious"), EmotionCategory::Neutral);
        assert_eq!(remap_audio_label("SURPRISE"), EmotionCategory::Neutral);
    }

    #[test]
    fn positive_sentiment_maps_to_happy_and_calm() {
        let s = text_scores(&Sentiment {
            label: "POSITIVE".to_owned(),
            score: 0.95,
        });
        assert_eq!(s.get(EmotionCategory::Happy), 0.95);
        assert!((s.get(EmotionCategory::Calm) - 0.285).abs() < 1e-12);
        assert_eq!(s.get(EmotionCategory::Sad), 0.0);
    }

    #[test]
    fn negative_sentiment_maps_to_sad_and_anxious() {
        let s = text_scores(&Sentiment {
            label: "NEGATIVE".to_owned(),
            score: 0.5,
        });
        assert_eq!(s.get(EmotionCategory::Sad), 0.5);
        assert_eq!(s.get(EmotionCategory::Anxious), 0.2);
        assert_eq!(s.get(EmotionCategory::Happy), 0.0);
    }
}
