pub mod asr;
pub mod config;
pub mod decode;
pub mod emotion;
pub mod features;
pub mod history;
pub mod pipeline;
pub mod reply;
pub mod tts;
pub mod util;
