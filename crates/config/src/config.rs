//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A value parsed but is outside its allowed range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Upload size limits per user tier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    /// Maximum input size for regular users (default 50 MiB)
    #[serde(default = "default_regular_max_bytes")]
    pub regular_max_bytes: u64,
    /// Maximum input size for premium users (default 2 GiB)
    #[serde(default = "default_premium_max_bytes")]
    pub premium_max_bytes: u64,
}

fn default_regular_max_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_premium_max_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            regular_max_bytes: default_regular_max_bytes(),
            premium_max_bytes: default_premium_max_bytes(),
        }
    }
}

/// Encode worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PoolConfig {
    /// Number of concurrent encode slots (0 = derive from core count)
    #[serde(default)]
    pub encode_workers: u32,
    /// Number of logical cores (auto-detected if None)
    #[serde(default)]
    pub logical_cores: Option<u32>,
}

/// Job lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
    /// Directory holding per-job input and output files
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Upper bound on a job's wall-clock time in seconds (0 = no deadline)
    #[serde(default)]
    pub max_job_duration_secs: u64,
    /// Reporter failures per job before an error is logged
    #[serde(default = "default_report_failure_threshold")]
    pub report_failure_threshold: u32,
    /// Upper bound on one progress report in seconds (0 = no limit)
    #[serde(default = "default_report_timeout_secs")]
    pub report_timeout_secs: u64,
}

fn default_scratch_dir() -> PathBuf {
    env::temp_dir().join("video_compressor")
}

fn default_report_failure_threshold() -> u32 {
    3
}

fn default_report_timeout_secs() -> u64 {
    30
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            max_job_duration_secs: 0,
            report_failure_threshold: default_report_failure_threshold(),
            report_timeout_secs: default_report_timeout_secs(),
        }
    }
}

/// External encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    /// Path or name of the ffmpeg binary
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
        }
    }
}

/// Encoder parameters behind one quality preset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresetConfig {
    /// Constant rate factor (0-51, lower is better quality)
    pub crf: u8,
    /// Encoder speed/quality trade-off (x264 preset name)
    pub speed: String,
    /// Audio bitrate in kbit/s
    #[serde(default = "default_audio_bitrate_kbps")]
    pub audio_bitrate_kbps: u32,
    /// Human-readable summary shown to users
    #[serde(default)]
    pub description: String,
}

fn default_audio_bitrate_kbps() -> u32 {
    128
}

impl PresetConfig {
    fn new(crf: u8, speed: &str, description: &str) -> Self {
        Self {
            crf,
            speed: speed.to_string(),
            audio_bitrate_kbps: default_audio_bitrate_kbps(),
            description: description.to_string(),
        }
    }
}

fn default_low_preset() -> PresetConfig {
    PresetConfig::new(28, "veryfast", "Small file size, lower quality")
}

fn default_medium_preset() -> PresetConfig {
    PresetConfig::new(23, "medium", "Balanced file size and quality")
}

fn default_high_preset() -> PresetConfig {
    PresetConfig::new(18, "slow", "Larger file size, higher quality")
}

/// The fixed low/medium/high preset table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresetTable {
    #[serde(default = "default_low_preset")]
    pub low: PresetConfig,
    #[serde(default = "default_medium_preset")]
    pub medium: PresetConfig,
    #[serde(default = "default_high_preset")]
    pub high: PresetConfig,
}

impl Default for PresetTable {
    fn default() -> Self {
        Self {
            low: default_low_preset(),
            medium: default_medium_preset(),
            high: default_high_preset(),
        }
    }
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_bind")]
    pub bind: String,
}

fn default_metrics_bind() -> String {
    "127.0.0.1:7878".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_metrics_bind(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub presets: PresetTable,
    #[serde(default)]
    pub metrics: MetricsConfig,
}


impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - VC_REGULAR_MAX_BYTES -> limits.regular_max_bytes
    /// - VC_PREMIUM_MAX_BYTES -> limits.premium_max_bytes
    /// - VC_ENCODE_WORKERS -> pool.encode_workers
    /// - VC_SCRATCH_DIR -> jobs.scratch_dir
    /// - VC_MAX_JOB_DURATION_SECS -> jobs.max_job_duration_secs
    /// - VC_FFMPEG_PATH -> encoder.ffmpeg_path
    /// - VC_METRICS_ENABLED -> metrics.enabled
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("VC_REGULAR_MAX_BYTES") {
            if let Ok(bytes) = val.parse::<u64>() {
                self.limits.regular_max_bytes = bytes;
            }
        }

        if let Ok(val) = env::var("VC_PREMIUM_MAX_BYTES") {
            if let Ok(bytes) = val.parse::<u64>() {
                self.limits.premium_max_bytes = bytes;
            }
        }

        if let Ok(val) = env::var("VC_ENCODE_WORKERS") {
            if let Ok(workers) = val.parse::<u32>() {
                self.pool.encode_workers = workers;
            }
        }

        if let Ok(val) = env::var("VC_SCRATCH_DIR") {
            if !val.is_empty() {
                self.jobs.scratch_dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("VC_MAX_JOB_DURATION_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.jobs.max_job_duration_secs = secs;
            }
        }

        if let Ok(val) = env::var("VC_FFMPEG_PATH") {
            if !val.is_empty() {
                self.encoder.ffmpeg_path = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("VC_METRICS_ENABLED") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.metrics.enabled = true,
                "false" | "0" | "no" => self.metrics.enabled = false,
                _ => {} // Invalid value, keep existing
            }
        }
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.regular_max_bytes == 0 || self.limits.premium_max_bytes == 0 {
            return Err(ConfigError::Invalid(
                "size limits must be greater than zero".to_string(),
            ));
        }

        for (name, preset) in [
            ("low", &self.presets.low),
            ("medium", &self.presets.medium),
            ("high", &self.presets.high),
        ] {
            if preset.crf > 51 {
                return Err(ConfigError::Invalid(format!(
                    "presets.{}.crf must be in 0..=51, got {}",
                    name, preset.crf
                )));
            }
            if preset.speed.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "presets.{}.speed must not be empty",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Load configuration from file, apply environment overrides, and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
