use crate::features::{mean_std, ExtractorConfig, FeatureError};

// mean square below this is treated as silence
const SILENCE_POWER: f64 = 1e-8;

/// Mean and spread of the voiced f0 track, in Hz.
pub(crate) fn pitch_stats(
    samples: &[f32],
    sample_rate: u32,
    cfg: &ExtractorConfig,
) -> Result<(f64, f64), FeatureError> {
    let track = yin_track(samples, sample_rate, cfg);
    let voiced = track.iter().flatten().map(|f| f64::from(*f));
    mean_std(voiced).ok_or(FeatureError::NoVoicedFrames {
        low: cfg.fmin_hz,
        high: cfg.fmax_hz,
    })
}

/// Frame-by-frame YIN f0 estimates. Unvoiced or out-of-band frames are `None`.
pub fn yin_track(samples: &[f32], sample_rate: u32, cfg: &ExtractorConfig) -> Vec<Option<f32>> {
    let frame = cfg.frame_length;
    let hop = cfg.hop_length.max(1);
    if sample_rate == 0 || frame < 4 || samples.len() < frame || cfg.fmax_hz <= 0.0 {
        return Vec::new();
    }

    let sr = sample_rate as f32;
    let tau_min = ((sr / cfg.fmax_hz).floor() as usize).max(2);
    let tau_max = ((sr / cfg.fmin_hz.max(1.0)).ceil() as usize).min(frame / 2 - 1);
    if tau_min >= tau_max {
        return Vec::new();
    }

    let n_frames = 1 + (samples.len() - frame) / hop;
    (0..n_frames)
        .map(|t| {
            let window = &samples[t * hop..t * hop + frame];
            yin_frame(window, tau_min, tau_max, cfg.yin_threshold)
                .map(|tau| sr / tau)
                .filter(|f0| (cfg.fmin_hz..=cfg.fmax_hz).contains(f0))
        })
        .collect()
}

/// Best period (in samples, fractional) for one frame, if any.
fn yin_frame(frame: &[f32], tau_min: usize, tau_max: usize, threshold: f32) -> Option<f32> {
    let power = frame.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>() / frame.len() as f64;
    if power < SILENCE_POWER {
        return None;
    }

    let width = frame.len() - tau_max;
    let mut diff = vec![0.0f64; tau_max + 1];
    for (tau, slot) in diff.iter_mut().enumerate().skip(1) {
        *slot = (0..width)
            .map(|j| {
                let d = f64::from(frame[j]) - f64::from(frame[j + tau]);
                d * d
            })
            .sum();
    }

    // cumulative mean normalized difference
    let mut cmnd = vec![1.0f64; tau_max + 1];
    let mut running = 0.0;
    for tau in 1..=tau_max {
        running += diff[tau];
        cmnd[tau] = if running > 0.0 {
            diff[tau] * tau as f64 / running
        } else {
            1.0
        };
    }

    let threshold = f64::from(threshold);
    let mut tau = tau_min;
    while tau < tau_max {
        if cmnd[tau] < threshold {
            while tau + 1 < tau_max && cmnd[tau + 1] < cmnd[tau] {
                tau += 1;
            }
            return Some(refine(&cmnd, tau));
        }
        tau += 1;
    }
    None
}

fn refine(cmnd: &[f64], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= cmnd.len() {
        return tau as f32;
    }
    let (a, b, c) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() < f64::EPSILON {
        return tau as f32;
    }
    let shift = (0.5 * (a - c) / denom).clamp(-1.0, 1.0);
    (tau as f64 + shift) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_signals::sine;

    #[test]
    fn tracks_a_steady_tone() {
        let cfg = ExtractorConfig::default();
        let track = yin_track(&sine(150.0, 0.5, 1.0, 16_000), 16_000, &cfg);
        assert!(!track.is_empty());
        for f0 in track.iter().flatten() {
            assert!((f0 - 150.0).abs() < 2.0, "f0 {f0}");
        }
        let (mean, std) = pitch_stats(&sine(150.0, 0.5, 1.0, 16_000), 16_000, &cfg).unwrap();
        assert!((mean - 150.0).abs() < 2.0);
        assert!(std < 2.0);
    }

    #[test]
    fn silence_has_no_voiced_frames() {
        let cfg = ExtractorConfig::default();
        assert_eq!(
            pitch_stats(&vec![0.0; 16_000], 16_000, &cfg),
            Err(FeatureError::NoVoicedFrames {
                low: 50.0,
                high: 500.0
            })
        );
    }

    #[test]
    fn clip_shorter_than_a_frame_is_unvoiced() {
        let cfg = ExtractorConfig::default();
        assert!(yin_track(&sine(200.0, 0.5, 0.05, 16_000), 16_000, &cfg).is_empty());
    }
}
