//! Prosodic and spectral features of a mono speech clip.
//!
//! Each feature is computed on its own and falls back to its own default
//! when that computation fails. A clip that cannot be analysed at all (empty,
//! zero sample rate, non-finite samples) yields [`AcousticFeatures::default`].
//!
//! | field | default |
//! |---|---|
//! | `pitch_mean`, `pitch_std` | 100.0 Hz, 20.0 Hz |
//! | `energy_mean`, `energy_std` | 0.05, 0.02 |
//! | `spectral_centroid` | 0.0 Hz |
//! | `zero_crossing_rate` | 0.0 |
//! | `tempo` | 100.0 BPM |
//! | `mfcc_mean`, `mfcc_std` | all 0.0 |

mod pitch;
mod rhythm;
mod spectral;

use serde::{Deserialize, Serialize};

pub use pitch::yin_track;
pub use spectral::{MelSpectrogram, Spectrogram};

pub const N_MFCC: usize = 13;

pub const DEFAULT_PITCH: (f64, f64) = (100.0, 20.0);
pub const DEFAULT_ENERGY: (f64, f64) = (0.05, 0.02);
pub const DEFAULT_SPECTRAL_CENTROID: f64 = 0.0;
pub const DEFAULT_ZERO_CROSSING_RATE: f64 = 0.0;
pub const DEFAULT_TEMPO_BPM: f64 = 100.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AcousticFeatures {
    pub pitch_mean: f64,
    pub pitch_std: f64,
    pub energy_mean: f64,
    pub energy_std: f64,
    pub spectral_centroid: f64,
    pub zero_crossing_rate: f64,
    pub tempo: f64,
    pub mfcc_mean: [f64; N_MFCC],
    pub mfcc_std: [f64; N_MFCC],
}

impl Default for AcousticFeatures {
    fn default() -> Self {
        Self {
            pitch_mean: DEFAULT_PITCH.0,
            pitch_std: DEFAULT_PITCH.1,
            energy_mean: DEFAULT_ENERGY.0,
            energy_std: DEFAULT_ENERGY.1,
            spectral_centroid: DEFAULT_SPECTRAL_CENTROID,
            zero_crossing_rate: DEFAULT_ZERO_CROSSING_RATE,
            tempo: DEFAULT_TEMPO_BPM,
            mfcc_mean: [0.0; N_MFCC],
            mfcc_std: [0.0; N_MFCC],
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("no samples to analyse")]
    Empty,

    #[error("sample rate must be > 0")]
    ZeroSampleRate,

    #[error("waveform contains non-finite samples")]
    NonFiniteInput,

    #[error("no voiced frames in the {low}-{high} Hz band")]
    NoVoicedFrames { low: f32, high: f32 },

    #[error("{0} produced a non-finite value")]
    NonFinite(&'static str),

    #[error("tempo estimate unavailable: {0}")]
    Tempo(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtractorConfig {
    pub frame_length: usize,
    pub hop_length: usize,
    pub fmin_hz: f32,
    pub fmax_hz: f32,
    pub yin_threshold: f32,
    pub n_mels: usize,
    pub top_db: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            frame_length: 2048,
            hop_length: 512,
            fmin_hz: 50.0,
            fmax_hz: 500.0,
            yin_threshold: 0.1,
            n_mels: 128,
            top_db: 80.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn extract(&self, samples: &[f32], sample_rate: u32) -> AcousticFeatures {
        if let Err(e) = validate(samples, sample_rate) {
            tracing::warn!(error = %e, "audio not analysable, using default features");
            return AcousticFeatures::default();
        }
        let cfg = &self.config;

        let (pitch_mean, pitch_std) = or_default(
            "pitch",
            pitch::pitch_stats(samples, sample_rate, cfg),
            DEFAULT_PITCH,
        );

        let spectrogram = Spectrogram::compute(samples, sample_rate, cfg.frame_length, cfg.hop_length);
        let (energy_mean, energy_std) = or_default(
            "energy",
            spectrogram.as_ref().map_err(Clone::clone).and_then(spectral::energy_stats),
            DEFAULT_ENERGY,
        );
        let spectral_centroid = or_default(
            "spectral_centroid",
            spectrogram
                .as_ref()
                .map_err(Clone::clone)
                .and_then(spectral::spectral_centroid),
            DEFAULT_SPECTRAL_CENTROID,
        );

        let mel = spectrogram
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|s| MelSpectrogram::from_spectrogram(s, cfg.n_mels, cfg.top_db));
        let (mfcc_mean, mfcc_std) = or_default(
            "mfcc",
            mel.as_ref().map_err(Clone::clone).and_then(spectral::mfcc_stats),
            ([0.0; N_MFCC], [0.0; N_MFCC]),
        );
        let tempo = or_default(
            "tempo",
            mel.as_ref()
                .map_err(Clone::clone)
                .and_then(|m| rhythm::estimate_tempo(m, sample_rate, cfg.hop_length)),
            DEFAULT_TEMPO_BPM,
        );

        let zero_crossing_rate = or_default(
            "zero_crossing_rate",
            rhythm::zero_crossing_rate(samples, cfg.frame_length, cfg.hop_length),
            DEFAULT_ZERO_CROSSING_RATE,
        );

        AcousticFeatures {
            pitch_mean,
            pitch_std,
            energy_mean,
            energy_std,
            spectral_centroid,
            zero_crossing_rate,
            tempo,
            mfcc_mean,
            mfcc_std,
        }
    }
}

fn validate(samples: &[f32], sample_rate: u32) -> Result<(), FeatureError> {
    if samples.is_empty() {
        return Err(FeatureError::Empty);
    }
    if sample_rate == 0 {
        return Err(FeatureError::ZeroSampleRate);
    }
    if samples.iter().any(|s| !s.is_finite()) {
        return Err(FeatureError::NonFiniteInput);
    }
    Ok(())
}

fn or_default<T>(feature: &'static str, value: Result<T, FeatureError>, default: T) -> T {
    value.unwrap_or_else(|e| {
        tracing::debug!(feature, error = %e, "feature fell back to default");
        default
    })
}

pub(crate) fn mean_std(values: impl Iterator<Item = f64> + Clone) -> Option<(f64, f64)> {
    let n = values.clone().count();
    if n == 0 {
        return None;
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    Some((mean, var.sqrt()))
}

#[cfg(test)]
pub(crate) mod test_signals {
    use std::f32::consts::PI;

    pub fn sine(freq: f32, amplitude: f32, secs: f32, sample_rate: u32) -> Vec<f32> {
        let n = (secs * sample_rate as f32) as usize;
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    pub fn clicks(bpm: f32, secs: f32, sample_rate: u32) -> Vec<f32> {
        let n = (secs * sample_rate as f32) as usize;
        let period = (60.0 / bpm * sample_rate as f32) as usize;
        let mut out = vec![0.0; n];
        let mut pos = 0;
        while pos < n {
            for (k, slot) in out.iter_mut().skip(pos).take(200).enumerate() {
                // short decaying burst
                *slot = (1.0 - k as f32 / 200.0) * if k % 2 == 0 { 0.8 } else { -0.8 };
            }
            pos += period;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::test_signals::sine;
    use super::*;

    #[test]
    fn empty_clip_gives_full_defaults() {
        let f = FeatureExtractor::default().extract(&[], 16_000);
        assert_eq!(f, AcousticFeatures::default());
    }

    #[test]
    fn non_finite_clip_gives_full_defaults() {
        let f = FeatureExtractor::default().extract(&[0.1, f32::NAN, 0.2], 16_000);
        assert_eq!(f, AcousticFeatures::default());
    }

    #[test]
    fn silence_falls_back_per_feature() {
        let f = FeatureExtractor::default().extract(&vec![0.0; 16_000], 16_000);
        // pitch and tempo have nothing to work with
        assert_eq!((f.pitch_mean, f.pitch_std), DEFAULT_PITCH);
        assert_eq!(f.tempo, DEFAULT_TEMPO_BPM);
        // energy is genuinely zero, not the default
        assert_eq!(f.energy_mean, 0.0);
        assert_eq!(f.zero_crossing_rate, 0.0);
    }

    #[test]
    fn voiced_tone_produces_measured_features() {
        let samples = sine(220.0, 0.5, 1.0, 16_000);
        let f = FeatureExtractor::default().extract(&samples, 16_000);
        assert!((f.pitch_mean - 220.0).abs() < 3.0, "pitch {}", f.pitch_mean);
        assert!(f.pitch_std < 5.0);
        assert!(f.energy_mean > 1.0);
        // edge frames smear the spectrum upwards
        assert!(
            f.spectral_centroid > 150.0 && f.spectral_centroid < 1000.0,
            "centroid {}",
            f.spectral_centroid
        );
        assert!(f.mfcc_mean.iter().any(|&c| c != 0.0));
    }

    #[test]
    fn mean_std_is_population() {
        let (m, s) = mean_std([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter()).unwrap();
        assert_eq!(m, 5.0);
        assert_eq!(s, 2.0);
        assert!(mean_std(std::iter::empty()).is_none());
    }
}
