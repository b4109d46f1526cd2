use crate::features::{mean_std, FeatureError, MelSpectrogram};

const MIN_BPM: f64 = 30.0;
const MAX_BPM: f64 = 300.0;
const PRIOR_CENTER_BPM: f64 = 120.0;
const ZERO_EPSILON: f32 = 1e-10;

/// Global tempo from the autocorrelation of the mel onset-strength envelope.
///
/// Candidate periods are weighted by a log-normal prior centered on 120 BPM
/// with a one-octave spread, so half- and double-time peaks lose to the
/// period nearest a typical pace.
pub(crate) fn estimate_tempo(
    mel: &MelSpectrogram,
    sample_rate: u32,
    hop: usize,
) -> Result<f64, FeatureError> {
    if hop == 0 || sample_rate == 0 {
        return Err(FeatureError::Tempo("invalid framing"));
    }
    let envelope = onset_envelope(mel);
    if envelope.iter().all(|v| *v <= 0.0) {
        return Err(FeatureError::Tempo("no onsets"));
    }

    let frame_rate = f64::from(sample_rate) / hop as f64;
    let lag_min = ((60.0 * frame_rate / MAX_BPM).ceil() as usize).max(1);
    let lag_max = ((60.0 * frame_rate / MIN_BPM).floor() as usize).min(envelope.len().saturating_sub(1));
    if lag_min > lag_max {
        return Err(FeatureError::Tempo("clip too short"));
    }

    let mut best: Option<(f64, f64)> = None;
    for lag in lag_min..=lag_max {
        let correlation: f64 = envelope
            .iter()
            .zip(&envelope[lag..])
            .map(|(a, b)| a * b)
            .sum();
        let bpm = 60.0 * frame_rate / lag as f64;
        let prior = (-0.5 * (bpm / PRIOR_CENTER_BPM).log2().powi(2)).exp();
        let weighted = correlation * prior;
        if best.map_or(true, |(_, w)| weighted > w) {
            best = Some((bpm, weighted));
        }
    }

    match best {
        Some((bpm, weight)) if weight > 0.0 && bpm.is_finite() => Ok(bpm),
        _ => Err(FeatureError::Tempo("no periodicity")),
    }
}

/// Mean positive dB change across mel bands, one value per frame.
fn onset_envelope(mel: &MelSpectrogram) -> Vec<f64> {
    let mut envelope = Vec::with_capacity(mel.n_frames());
    envelope.push(0.0);
    for pair in mel.frames_db.windows(2) {
        let rise: f64 = pair[1]
            .iter()
            .zip(&pair[0])
            .map(|(cur, prev)| f64::from((cur - prev).max(0.0)))
            .sum();
        envelope.push(rise / mel.n_mels.max(1) as f64);
    }
    envelope
}

/// Mean fraction of sign changes per centered, edge-padded frame.
pub(crate) fn zero_crossing_rate(
    samples: &[f32],
    frame: usize,
    hop: usize,
) -> Result<f64, FeatureError> {
    if samples.is_empty() || frame == 0 || hop == 0 {
        return Err(FeatureError::Empty);
    }

    let pad = frame / 2;
    let first = samples[0];
    let last = samples[samples.len() - 1];
    let padded: Vec<f32> = std::iter::repeat(first)
        .take(pad)
        .chain(samples.iter().copied())
        .chain(std::iter::repeat(last).take(pad))
        .collect();
    let positive: Vec<bool> = padded
        .iter()
        .map(|x| x.abs() <= ZERO_EPSILON || *x >= 0.0)
        .collect();

    let n_frames = 1 + samples.len() / hop;
    let rates = (0..n_frames).filter_map(|t| {
        let start = t * hop;
        let end = (start + frame).min(positive.len());
        (end > start + 1).then(|| {
            let crossings = positive[start..end].windows(2).filter(|w| w[0] != w[1]).count();
            crossings as f64 / frame as f64
        })
    });
    mean_std(rates).map(|(mean, _)| mean).ok_or(FeatureError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_signals::{clicks, sine};
    use crate::features::Spectrogram;

    fn mel_of(samples: &[f32]) -> MelSpectrogram {
        let spec = Spectrogram::compute(samples, 16_000, 2048, 512).unwrap();
        MelSpectrogram::from_spectrogram(&spec, 128, 80.0).unwrap()
    }

    #[test]
    fn click_track_tempo() {
        // 125 BPM is exactly 15 hops at 16 kHz
        let mel = mel_of(&clicks(125.0, 6.0, 16_000));
        let bpm = estimate_tempo(&mel, 16_000, 512).unwrap();
        assert!((bpm - 125.0).abs() < 5.0, "bpm {bpm}");
    }

    #[test]
    fn silence_has_no_tempo() {
        let mel = mel_of(&vec![0.0; 16_000]);
        assert!(estimate_tempo(&mel, 16_000, 512).is_err());
    }

    #[test]
    fn sine_crossing_rate() {
        // 220 Hz crosses zero 440 times a second
        let zcr = zero_crossing_rate(&sine(220.0, 0.5, 1.0, 16_000), 2048, 512).unwrap();
        assert!((zcr - 440.0 / 16_000.0).abs() < 0.005, "zcr {zcr}");
    }

    #[test]
    fn silence_never_crosses() {
        assert_eq!(zero_crossing_rate(&vec![0.0; 4096], 2048, 512).unwrap(), 0.0);
        assert!(zero_crossing_rate(&[], 2048, 512).is_err());
    }
}
