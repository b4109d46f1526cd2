use crate::asr::{AsrError, Transcriber, Transcript};
use crate::decode::{PcmAudio, ANALYSIS_SAMPLE_RATE};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Local whisper.cpp model, English only.
#[derive(Clone)]
pub struct WhisperTranscriber {
    ctx: Arc<WhisperContext>,
    n_threads: i32,
}

impl WhisperTranscriber {
    pub fn new(model_path: &str) -> Result<Self, AsrError> {
        let ctx = WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
            .map_err(|e| AsrError::Model(format!("failed to load {model_path}: {e}")))?;
        let n_threads = std::thread::available_parallelism()
            .map(|n| n.get().min(8) as i32)
            .unwrap_or(4);
        Ok(Self {
            ctx: Arc::new(ctx),
            n_threads,
        })
    }

    fn run(ctx: &WhisperContext, n_threads: i32, samples: &[f32]) -> Result<String, AsrError> {
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_language(Some("en"));
        params.set_translate(false);
        params.set_n_threads(n_threads);

        let mut state = ctx
            .create_state()
            .map_err(|e| AsrError::Model(format!("failed to create state: {e}")))?;
        state
            .full(params, samples)
            .map_err(|e| AsrError::Model(format!("inference failed: {e}")))?;

        let mut text = String::new();
        for i in 0..state.full_n_segments() {
            if let Some(segment) = state.get_segment(i) {
                let piece = segment
                    .to_str_lossy()
                    .map_err(|e| AsrError::Model(format!("segment {i}: {e}")))?;
                text.push_str(piece.trim());
                text.push(' ');
            }
        }
        Ok(text.trim().to_owned())
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: PcmAudio) -> BoxFuture<'_, Result<Transcript, AsrError>> {
        let ctx = self.ctx.clone();
        let n_threads = self.n_threads;
        async move {
            if audio.format.sample_rate != ANALYSIS_SAMPLE_RATE || audio.format.channels != 1 {
                return Err(AsrError::UnsupportedFormat(format!(
                    "whisper needs mono {ANALYSIS_SAMPLE_RATE} Hz, got {} ch @ {} Hz",
                    audio.format.channels, audio.format.sample_rate
                )));
            }
            let audio_duration = audio.duration;
            let text = tokio::task::spawn_blocking(move || Self::run(&ctx, n_threads, &audio.samples))
                .await
                .map_err(|e| AsrError::Model(e.to_string()))??;
            Ok(Transcript {
                text,
                audio_duration,
            })
        }
        .boxed()
    }
}
