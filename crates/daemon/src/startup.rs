//! Startup checks module for the video compressor
//!
//! Preflight checks run before any job is accepted:
//! - the configured ffmpeg binary runs and reports a version
//! - it was built with the configured video and audio encoders

use crate::config::{Config, EncoderConfig};
use std::path::Path;
use std::process::{Command, Output};
use thiserror::Error;
use tracing::{info, warn};

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("ffmpeg not available: {0}")]
    FfmpegUnavailable(String),

    #[error("ffmpeg was built without the '{0}' encoder")]
    EncoderMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn run_ffmpeg(binary: &Path, args: &[&str]) -> Result<Output, StartupError> {
    let output = Command::new(binary).args(args).output().map_err(|e| {
        StartupError::FfmpegUnavailable(format!(
            "could not run {}; is ffmpeg installed and in PATH? Error: {}",
            binary.display(),
            e
        ))
    })?;

    if !output.status.success() {
        return Err(StartupError::FfmpegUnavailable(format!(
            "{} {} exited with {}",
            binary.display(),
            args.join(" "),
            output.status
        )));
    }
    Ok(output)
}

/// Extract the major version from `ffmpeg -version` output.
///
/// Release builds print `ffmpeg version 6.1.1 ...`, distro builds often
/// `ffmpeg version n6.1-...`. Snapshot builds (`N-112345-g...`) carry no
/// release number and yield `None`.
pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    let token = version_output
        .lines()
        .find_map(|line| line.trim().strip_prefix("ffmpeg version "))?
        .split_whitespace()
        .next()?;

    let digits: String = token
        .strip_prefix('n')
        .unwrap_or(token)
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();

    digits.parse().ok()
}

/// Check that `binary -version` runs, returning the major version if known.
pub fn check_ffmpeg_available(binary: &Path) -> Result<Option<u32>, StartupError> {
    let output = run_ffmpeg(binary, &["-version"])?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    let major = parse_ffmpeg_version(&stdout);
    match major {
        Some(major) => info!(binary = %binary.display(), major, "ffmpeg found"),
        None => warn!(
            binary = %binary.display(),
            first_line = stdout.lines().next().unwrap_or("(empty)"),
            "ffmpeg found but its version could not be parsed"
        ),
    }
    Ok(major)
}

/// Whether an `ffmpeg -encoders` listing contains `codec`.
///
/// Listing rows look like ` V....D libx264   libx264 H.264 / AVC ...`; the
/// second column is the encoder name.
pub fn has_encoder(encoders_output: &str, codec: &str) -> bool {
    encoders_output.lines().any(|line| {
        let mut columns = line.split_whitespace();
        matches!((columns.next(), columns.next()), (Some(flags), Some(name))
            if flags.len() == 6 && name == codec)
    })
}

/// Check that ffmpeg can encode with the configured codecs
pub fn check_encoders_available(cfg: &EncoderConfig) -> Result<(), StartupError> {
    let output = run_ffmpeg(&cfg.ffmpeg_path, &["-hide_banner", "-encoders"])?;
    let listing = String::from_utf8_lossy(&output.stdout);

    for codec in [&cfg.video_codec, &cfg.audio_codec] {
        if !has_encoder(&listing, codec) {
            return Err(StartupError::EncoderMissing(codec.clone()));
        }
    }
    Ok(())
}

/// Run all startup checks in order
///
/// 1. ffmpeg runs
/// 2. the configured encoders are compiled in
pub fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    check_ffmpeg_available(&cfg.encoder.ffmpeg_path)?;
    check_encoders_available(&cfg.encoder)?;
    Ok(())
}
