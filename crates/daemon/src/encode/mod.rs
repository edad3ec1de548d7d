//! Encoder adapter
//!
//! The core treats encoding as an opaque, blocking, non-preemptible call
//! behind the [`Encoder`] trait. [`FfmpegEncoder`] is the production adapter.

pub mod ffmpeg;

pub use ffmpeg::{build_ffmpeg_command, FfmpegEncoder};

use crate::config::PresetConfig;
use std::path::Path;
use thiserror::Error;

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Encoder process exited with non-zero status
    #[error("encoder exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    /// Encoder process was terminated by signal
    #[error("encoder process was terminated by signal")]
    Terminated,

    /// IO error starting or talking to the encoder
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Concrete encoder parameters resolved from a quality preset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeParams {
    /// Constant rate factor
    pub crf: u8,
    /// Speed/quality trade-off preset name
    pub speed: String,
    /// Audio bitrate in kbit/s
    pub audio_bitrate_kbps: u32,
}

impl From<&PresetConfig> for EncodeParams {
    fn from(preset: &PresetConfig) -> Self {
        Self {
            crf: preset.crf,
            speed: preset.speed.clone(),
            audio_bitrate_kbps: preset.audio_bitrate_kbps,
        }
    }
}

/// A synchronous transformation of one input file into one output file.
///
/// Implementations run on the blocking worker pool. On failure the output
/// file may be missing or partially written.
pub trait Encoder: Send + Sync + 'static {
    fn encode(&self, input: &Path, output: &Path, params: &EncodeParams) -> Result<(), EncodeError>;
}
