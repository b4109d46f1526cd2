use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "ffmpeg")]
use ffmpeg_sidecar::{download, paths::ffmpeg_path};

pub const ANALYSIS_SAMPLE_RATE: u32 = 16_000;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    pub const fn mono_16khz() -> Self {
        Self {
            sample_rate: ANALYSIS_SAMPLE_RATE,
            channels: 1,
        }
    }
}

/// A decoded clip as interleaved f32 samples in [-1, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct PcmAudio {
    pub format: PcmFormat,
    pub samples: Vec<f32>,
    pub duration: Duration,
}

impl PcmAudio {
    pub fn new(format: PcmFormat, samples: Vec<f32>) -> Self {
        let duration = duration_from_sample_count(format.sample_rate, format.channels, samples.len());
        Self {
            format,
            samples,
            duration,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Encodes the clip as a 16-bit PCM WAV file.
    pub fn to_wav_bytes(&self) -> Result<Bytes> {
        let spec = hound::WavSpec {
            channels: self.format.channels,
            sample_rate: self.format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for s in &self.samples {
                writer.write_sample(f32_to_i16(*s))?;
            }
            writer.finalize()?;
        }
        Ok(Bytes::from(cursor.into_inner()))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("uploaded audio is empty")]
    Empty,

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("ffmpeg unavailable: {0}")]
    FfmpegUnavailable(String),

    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),

    #[error("invalid pcm output: {0}")]
    InvalidPcm(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Turns an uploaded file into mono 16 kHz PCM.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, upload: Bytes) -> BoxFuture<'_, Result<PcmAudio>>;
}

#[derive(Clone)]
pub struct Decoder {
    inner: Arc<dyn AudioDecoder>,
}

impl Decoder {
    pub fn new(inner: Arc<dyn AudioDecoder>) -> Self {
        Self { inner }
    }

    pub async fn decode(&self, upload: Bytes) -> Result<PcmAudio> {
        self.inner.decode(upload).await
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(Arc::new(UploadDecoder))
    }
}

/// WAV through hound, anything else through ffmpeg when it is compiled in.
#[derive(Clone, Copy, Debug, Default)]
pub struct UploadDecoder;

impl AudioDecoder for UploadDecoder {
    fn decode(&self, upload: Bytes) -> BoxFuture<'_, Result<PcmAudio>> {
        async move {
            if upload.is_empty() {
                return Err(DecodeError::Empty);
            }
            if looks_like_wav(&upload) {
                return tokio::task::spawn_blocking(move || decode_wav(&upload))
                    .await
                    .map_err(|e| DecodeError::InvalidPcm(e.to_string()))?;
            }
            #[cfg(feature = "ffmpeg")]
            {
                FfmpegAudioDecoder.decode(upload).await
            }
            #[cfg(not(feature = "ffmpeg"))]
            {
                Err(DecodeError::UnsupportedFormat(
                    "only WAV is supported without the ffmpeg feature".to_owned(),
                ))
            }
        }
        .boxed()
    }
}

fn looks_like_wav(raw: &[u8]) -> bool {
    raw.len() >= 12 && &raw[0..4] == b"RIFF" && &raw[8..12] == b"WAVE"
}

pub fn decode_wav(raw: &[u8]) -> Result<PcmAudio> {
    let mut reader = hound::WavReader::new(Cursor::new(raw))?;
    let spec = reader.spec();
    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(DecodeError::UnsupportedFormat(format!(
            "channels={} sample_rate={}",
            spec.channels, spec.sample_rate
        )));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let mono = downmix(&interleaved, spec.channels);
    let samples = resample_linear(&mono, spec.sample_rate, ANALYSIS_SAMPLE_RATE);
    Ok(PcmAudio::new(PcmFormat::mono_16khz(), samples))
}

pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let channels = usize::from(channels.max(1));
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

pub fn resample_linear(samples: &[f32], from_hz: u32, to_hz: u32) -> Vec<f32> {
    if from_hz == to_hz || samples.is_empty() || from_hz == 0 || to_hz == 0 {
        return samples.to_vec();
    }
    let ratio = f64::from(from_hz) / f64::from(to_hz);
    let out_len = ((samples.len() as f64) / ratio).round().max(1.0) as usize;
    let last = samples.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * frac
        })
        .collect()
}

#[cfg(feature = "ffmpeg")]
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegAudioDecoder;

#[cfg(feature = "ffmpeg")]
impl FfmpegAudioDecoder {
    async fn ensure_ffmpeg_available(&self) -> Result<()> {
        tokio::task::spawn_blocking(download::auto_download)
            .await
            .map_err(|e| DecodeError::FfmpegUnavailable(e.to_string()))?
            .map_err(|e| DecodeError::FfmpegUnavailable(e.to_string()))
    }

    async fn decode_with_ffmpeg(&self, upload: Bytes) -> Result<Vec<f32>> {
        let mut child = tokio::process::Command::new(ffmpeg_path())
            .args([
                "-hide_banner",
                "-nostdin",
                "-loglevel",
                "error",
                "-i",
                "pipe:0",
                "-vn",
                "-sn",
                "-dn",
                "-ac",
                "1",
                "-ar",
                "16000",
                "-f",
                "f32le",
                "-acodec",
                "pcm_f32le",
                "pipe:1",
            ])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            DecodeError::FfmpegFailed("ffmpeg stdin unavailable (pipe not created)".to_owned())
        })?;
        let mut stdout = child.stdout.take().ok_or_else(|| {
            DecodeError::FfmpegFailed("ffmpeg stdout unavailable (pipe not created)".to_owned())
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            DecodeError::FfmpegFailed("ffmpeg stderr unavailable (pipe not created)".to_owned())
        })?;

        let stdin_task = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            stdin.write_all(&upload).await?;
            stdin.shutdown().await?;
            Ok::<(), std::io::Error>(())
        });
        let stdout_task = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await?;
            Ok::<Vec<u8>, std::io::Error>(buf)
        });
        let stderr_task = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).await?;
            Ok::<Vec<u8>, std::io::Error>(buf)
        });

        let status = child
            .wait()
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        // a broken pipe here just means ffmpeg rejected the input early
        if let Ok(Err(e)) = stdin_task.await {
            tracing::debug!(error = %e, "ffmpeg stdin closed early");
        }
        let stdout_bytes = stdout_task
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;
        let stderr_bytes = stderr_task
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        if !status.success() {
            let stderr_s = String::from_utf8_lossy(&stderr_bytes).trim().to_owned();
            return Err(DecodeError::FfmpegFailed(format!(
                "exit_code={:?} stderr={stderr_s}",
                status.code()
            )));
        }

        parse_f32le_mono(&stdout_bytes)
    }
}

#[cfg(feature = "ffmpeg")]
impl AudioDecoder for FfmpegAudioDecoder {
    fn decode(&self, upload: Bytes) -> BoxFuture<'_, Result<PcmAudio>> {
        async move {
            self.ensure_ffmpeg_available().await?;
            let samples = self.decode_with_ffmpeg(upload).await?;
            if samples.is_empty() {
                return Err(DecodeError::InvalidPcm("ffmpeg produced no samples".to_owned()));
            }
            Ok(PcmAudio::new(PcmFormat::mono_16khz(), samples))
        }
        .boxed()
    }
}

pub fn parse_f32le_mono(raw: &[u8]) -> Result<Vec<f32>> {
    if !raw.len().is_multiple_of(4usize) {
        return Err(DecodeError::InvalidPcm(format!(
            "f32le byte length must be multiple of 4, got {}",
            raw.len()
        )));
    }
    Ok(raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub fn i16_to_f32_pcm(samples: &[i16]) -> Vec<f32> {
    let scale = 1.0f32 / 32768.0f32;
    samples.iter().map(|&s| f32::from(s) * scale).collect()
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}

pub fn duration_from_sample_count(sample_rate_hz: u32, channels: u16, sample_count: usize) -> Duration {
    if sample_rate_hz == 0 || channels == 0 {
        return Duration::from_secs(0);
    }
    let frames = (sample_count / usize::from(channels)) as u128;
    let micros = frames * 1_000_000u128 / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(spec: hound::WavSpec, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn i16_to_f32_basic() {
        let v = i16_to_f32_pcm(&[-32768, -1, 0, 1, 32767]);
        assert!((v[0] + 1.0).abs() < 1e-6);
        assert!((v[2] - 0.0).abs() < 1e-6);
        assert!(v[4] <= 1.0);
        assert!(v[4] > 0.9999);
    }

    #[test]
    fn duration_from_sample_count_mono_16k() {
        let d = duration_from_sample_count(16_000, 1, 16_000);
        assert_eq!(d.as_secs(), 1);
        assert_eq!(duration_from_sample_count(0, 1, 16_000), Duration::ZERO);
    }

    #[test]
    fn parse_f32le_rejects_non_multiple_of_4() {
        let err = parse_f32le_mono(&[0, 1, 2]).unwrap_err();
        assert!(err.to_string().contains("multiple of 4"));
    }

    #[test]
    fn stereo_44k_wav_becomes_mono_16k() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        // one second, left at +half scale and right silent
        let samples: Vec<i16> = (0..44_100).flat_map(|_| [16_384i16, 0]).collect();
        let pcm = decode_wav(&wav_bytes(spec, &samples)).unwrap();

        assert_eq!(pcm.format, PcmFormat::mono_16khz());
        assert_eq!(pcm.samples.len(), 16_000);
        assert!(pcm.samples.iter().all(|s| (s - 0.25).abs() < 1e-3));
        assert!((pcm.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn wav_round_trip_through_encoder() {
        let pcm = PcmAudio::new(PcmFormat::mono_16khz(), vec![0.0, 0.5, -0.5, 1.0]);
        let wav = pcm.to_wav_bytes().unwrap();
        assert!(looks_like_wav(&wav));
        let back = decode_wav(&wav).unwrap();
        for (a, b) in back.samples.iter().zip(&pcm.samples) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn resample_halves_length() {
        let out = resample_linear(&[0.0, 1.0, 2.0, 3.0], 32_000, 16_000);
        assert_eq!(out, vec![0.0, 2.0]);
        assert_eq!(resample_linear(&[1.0], 16_000, 16_000), vec![1.0]);
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let err = Decoder::default().decode(Bytes::new()).await.unwrap_err();
        assert!(matches!(err, DecodeError::Empty));
    }

    #[tokio::test]
    async fn truncated_wav_is_rejected() {
        let err = Decoder::default()
            .decode(Bytes::from_static(b"RIFF\0\0\0\0WAVEfmt "))
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::Wav(_)));
    }
}
