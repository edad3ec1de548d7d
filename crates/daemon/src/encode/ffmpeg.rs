//! FFmpeg encoder module
//!
//! Builds and runs the ffmpeg command that re-encodes a video to H.264/AAC
//! with the quality settings of the selected preset.

use super::{EncodeError, EncodeParams, Encoder};
use crate::config::EncoderConfig;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Number of trailing stderr lines kept in error messages
const STDERR_TAIL_LINES: usize = 20;

/// Encoder adapter that shells out to ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
    video_codec: String,
    audio_codec: String,
}

impl FfmpegEncoder {
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            binary: config.ffmpeg_path.clone(),
            video_codec: config.video_codec.clone(),
            audio_codec: config.audio_codec.clone(),
        }
    }

    /// Build the ffmpeg command for one encode
    pub fn command(&self, input: &Path, output: &Path, params: &EncodeParams) -> Command {
        build_ffmpeg_command(
            &self.binary,
            &self.video_codec,
            &self.audio_codec,
            input,
            output,
            params,
        )
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new(&EncoderConfig::default())
    }
}

/// Build an ffmpeg command with all required encoding flags
///
/// Creates a Command configured with:
/// - Overwrite of an existing output (`-y`), no stdin interaction
/// - Input and output paths
/// - Video codec with the preset's CRF and speed preset
/// - Audio codec at the preset's bitrate
/// - `+faststart` so the result streams before it is fully downloaded
pub fn build_ffmpeg_command(
    binary: &Path,
    video_codec: &str,
    audio_codec: &str,
    input: &Path,
    output: &Path,
    params: &EncodeParams,
) -> Command {
    let mut cmd = Command::new(binary);

    cmd.arg("-hide_banner").arg("-nostdin").arg("-y");
    cmd.arg("-i").arg(input);

    cmd.arg("-c:v").arg(video_codec);
    cmd.arg("-crf").arg(params.crf.to_string());
    cmd.arg("-preset").arg(&params.speed);

    cmd.arg("-c:a").arg(audio_codec);
    cmd.arg("-b:a").arg(format!("{}k", params.audio_bitrate_kbps));

    cmd.arg("-movflags").arg("+faststart");

    cmd.arg(output);

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());

    cmd
}

/// Keep the last few lines of encoder stderr for error reporting
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

impl Encoder for FfmpegEncoder {
    fn encode(
        &self,
        input: &Path,
        output: &Path,
        params: &EncodeParams,
    ) -> Result<(), EncodeError> {
        let result = self.command(input, output, params).output()?;

        if result.status.success() {
            Ok(())
        } else {
            match result.status.code() {
                Some(code) => Err(EncodeError::Failed {
                    code,
                    stderr: stderr_tail(&result.stderr),
                }),
                None => Err(EncodeError::Terminated),
            }
        }
    }
}
