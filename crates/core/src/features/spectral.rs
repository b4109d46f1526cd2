use crate::features::{mean_std, FeatureError, N_MFCC};
use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;
use std::f32::consts::PI;

/// Magnitude STFT of a centered, zero-padded, Hann-windowed signal.
///
/// `frames[t][k]` is the magnitude of bin `k` (0..=n_fft/2) in frame `t`.
#[derive(Clone, Debug)]
pub struct Spectrogram {
    pub frames: Vec<Vec<f32>>,
    pub n_fft: usize,
    pub sample_rate: u32,
}

impl Spectrogram {
    pub fn compute(
        samples: &[f32],
        sample_rate: u32,
        n_fft: usize,
        hop: usize,
    ) -> Result<Self, FeatureError> {
        if samples.is_empty() || n_fft == 0 || hop == 0 {
            return Err(FeatureError::Empty);
        }

        let pad = n_fft / 2;
        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let window: Vec<f32> = (0..n_fft)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n_fft as f32).cos())
            .collect();
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);
        let n_bins = n_fft / 2 + 1;
        let n_frames = 1 + (padded.len() - n_fft) / hop;

        let mut buffer = vec![Complex32::default(); n_fft];
        let mut frames = Vec::with_capacity(n_frames);
        for t in 0..n_frames {
            let start = t * hop;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex32::new(padded[start + i] * window[i], 0.0);
            }
            fft.process(&mut buffer);
            frames.push(buffer.iter().take(n_bins).map(|c| c.norm()).collect());
        }

        Ok(Self {
            frames,
            n_fft,
            sample_rate,
        })
    }

    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn bin_hz(&self, k: usize) -> f32 {
        k as f32 * self.sample_rate as f32 / self.n_fft as f32
    }
}

/// Mean and spread of the per-frame root-sum-of-squares magnitude.
pub(crate) fn energy_stats(spec: &Spectrogram) -> Result<(f64, f64), FeatureError> {
    let per_frame = spec
        .frames
        .iter()
        .map(|frame| frame.iter().map(|m| f64::from(*m).powi(2)).sum::<f64>().sqrt());
    let (mean, std) = mean_std(per_frame).ok_or(FeatureError::Empty)?;
    Ok((finite("energy", mean)?, finite("energy", std)?))
}

pub(crate) fn spectral_centroid(spec: &Spectrogram) -> Result<f64, FeatureError> {
    let per_frame = spec.frames.iter().map(|frame| {
        let (weighted, total) = frame.iter().enumerate().fold((0.0f64, 0.0f64), |acc, (k, m)| {
            let m = f64::from(*m);
            (acc.0 + f64::from(spec.bin_hz(k)) * m, acc.1 + m)
        });
        if total > 0.0 {
            weighted / total
        } else {
            0.0
        }
    });
    let (mean, _) = mean_std(per_frame).ok_or(FeatureError::Empty)?;
    finite("spectral_centroid", mean)
}

/// Mel-band power spectrogram in decibels, clipped to `top_db` below its peak.
#[derive(Clone, Debug)]
pub struct MelSpectrogram {
    pub frames_db: Vec<Vec<f32>>,
    pub n_mels: usize,
}

impl MelSpectrogram {
    pub fn from_spectrogram(
        spec: &Spectrogram,
        n_mels: usize,
        top_db: f32,
    ) -> Result<Self, FeatureError> {
        if spec.frames.is_empty() || n_mels == 0 {
            return Err(FeatureError::Empty);
        }
        let filters = mel_filterbank(spec.sample_rate, spec.n_fft, n_mels);

        let mut frames_db: Vec<Vec<f32>> = spec
            .frames
            .iter()
            .map(|frame| {
                filters
                    .iter()
                    .map(|filter| {
                        let power: f32 = filter
                            .iter()
                            .zip(frame.iter())
                            .map(|(w, m)| w * m * m)
                            .sum();
                        10.0 * power.max(1e-10).log10()
                    })
                    .collect()
            })
            .collect();

        let peak = frames_db
            .iter()
            .flatten()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        if !peak.is_finite() {
            return Err(FeatureError::NonFinite("mel spectrogram"));
        }
        let floor = peak - top_db;
        for v in frames_db.iter_mut().flatten() {
            *v = v.max(floor);
        }

        Ok(Self { frames_db, n_mels })
    }

    pub fn n_frames(&self) -> usize {
        self.frames_db.len()
    }
}

pub(crate) fn mfcc_stats(
    mel: &MelSpectrogram,
) -> Result<([f64; N_MFCC], [f64; N_MFCC]), FeatureError> {
    let coefficients: Vec<[f64; N_MFCC]> = mel.frames_db.iter().map(|f| dct_ii(f)).collect();

    let mut means = [0.0; N_MFCC];
    let mut stds = [0.0; N_MFCC];
    for k in 0..N_MFCC {
        let (m, s) = mean_std(coefficients.iter().map(|c| c[k])).ok_or(FeatureError::Empty)?;
        means[k] = finite("mfcc", m)?;
        stds[k] = finite("mfcc", s)?;
    }
    Ok((means, stds))
}

/// First `N_MFCC` coefficients of the orthonormal DCT-II.
fn dct_ii(input: &[f32]) -> [f64; N_MFCC] {
    let n = input.len() as f64;
    let mut out = [0.0; N_MFCC];
    for (k, slot) in out.iter_mut().enumerate() {
        let sum: f64 = input
            .iter()
            .enumerate()
            .map(|(i, x)| {
                f64::from(*x)
                    * (std::f64::consts::PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos()
            })
            .sum();
        let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        *slot = sum * scale;
    }
    out
}

// Slaney mel scale: linear below 1 kHz, logarithmic above.
const MEL_F_SP: f64 = 200.0 / 3.0;
const MEL_MIN_LOG_HZ: f64 = 1000.0;
const MEL_MIN_LOG_MEL: f64 = MEL_MIN_LOG_HZ / MEL_F_SP;

fn mel_logstep() -> f64 {
    6.4f64.ln() / 27.0
}

fn hz_to_mel(hz: f64) -> f64 {
    if hz < MEL_MIN_LOG_HZ {
        hz / MEL_F_SP
    } else {
        MEL_MIN_LOG_MEL + (hz / MEL_MIN_LOG_HZ).ln() / mel_logstep()
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    if mel < MEL_MIN_LOG_MEL {
        mel * MEL_F_SP
    } else {
        MEL_MIN_LOG_HZ * (mel_logstep() * (mel - MEL_MIN_LOG_MEL)).exp()
    }
}

/// Triangular, area-normalized filters from 0 Hz to Nyquist.
fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let nyquist = f64::from(sample_rate) / 2.0;
    let max_mel = hz_to_mel(nyquist);
    let edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();
    let bin_hz: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * f64::from(sample_rate) / n_fft as f64)
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lower, center, upper) = (edges[m], edges[m + 1], edges[m + 2]);
            let norm = 2.0 / (upper - lower);
            bin_hz
                .iter()
                .map(|&f| {
                    let rising = (f - lower) / (center - lower);
                    let falling = (upper - f) / (upper - center);
                    (rising.min(falling).max(0.0) * norm) as f32
                })
                .collect()
        })
        .collect()
}

fn finite(what: &'static str, value: f64) -> Result<f64, FeatureError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FeatureError::NonFinite(what))
    }
}
