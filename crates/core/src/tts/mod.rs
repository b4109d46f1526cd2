mod elevenlabs;
mod fallback;
mod piper;
mod voice;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

pub use elevenlabs::ElevenLabsTtsClient;
pub use fallback::FallbackTtsClient;
pub use piper::PiperTtsClient;
pub use voice::{voice_params_for, voice_params_for_label, VoiceParams, BASELINE_RATE_WPM};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceId(pub String);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TtsRequest {
    pub text: String,
    pub voice: Option<VoiceId>,
    pub params: VoiceParams,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TtsAudio {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub pcm_i16: Vec<i16>,
}

impl TtsAudio {
    /// Scales every sample by `volume`, saturating at the i16 range.
    pub fn apply_gain(&mut self, volume: f32) {
        if (volume - 1.0).abs() < f32::EPSILON {
            return;
        }
        let volume = if volume.is_finite() { volume.max(0.0) } else { 1.0 };
        for s in &mut self.pcm_i16 {
            *s = (f32::from(*s) * volume)
                .round()
                .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
        }
    }

    pub fn to_wav_bytes(&self) -> Result<Bytes, TtsError> {
        let spec = hound::WavSpec {
            channels: self.channels.max(1),
            sample_rate: self.sample_rate_hz,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.pcm_i16.len() * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for s in &self.pcm_i16 {
                writer.write_sample(*s)?;
            }
            writer.finalize()?;
        }
        Ok(Bytes::from(cursor.into_inner()))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("tts quota exhausted")]
    QuotaExhausted,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tts service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("wav encoding failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("{0}")]
    Other(String),
}

pub trait TtsClient: Send + Sync {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>>;
}

impl<T: TtsClient + ?Sized> TtsClient for std::sync::Arc<T> {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
        (**self).synthesize(request)
    }
}

pub(crate) fn pcm_from_le_bytes(raw: &[u8]) -> Vec<i16> {
    raw.chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_scales_and_saturates() {
        let mut audio = TtsAudio {
            sample_rate_hz: 16_000,
            channels: 1,
            pcm_i16: vec![1000, -1000, 30_000],
        };
        audio.apply_gain(0.5);
        assert_eq!(audio.pcm_i16, vec![500, -500, 15_000]);

        audio.apply_gain(4.0);
        assert_eq!(audio.pcm_i16, vec![2000, -2000, i16::MAX]);
    }

    #[test]
    fn wav_bytes_have_header_and_samples() {
        let audio = TtsAudio {
            sample_rate_hz: 22_050,
            channels: 1,
            pcm_i16: vec![0; 100],
        };
        let wav = audio.to_wav_bytes().unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(wav.len(), 44 + 200);
    }

    #[test]
    fn pcm_ignores_trailing_odd_byte() {
        assert_eq!(pcm_from_le_bytes(&[1, 0, 255, 255, 7]), vec![1, -1]);
    }
}
