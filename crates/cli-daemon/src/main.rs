//! CLI entry point for the video compressor
//!
//! A local front end: the input is a file on disk, results land in a
//! directory and progress goes to the log. Ctrl-C cancels the running job.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use video_compressor::{
    check_encoders_available, check_ffmpeg_available, derive_plan, Config, Daemon, DirectorySink,
    JobIo, JobSnapshot, JobStatus, LocalFileFetcher, ProgressReporter, ReportError, UserId,
    UserTier, VideoRef,
};

/// Compress videos with ffmpeg, one job per user at a time
#[derive(Parser, Debug)]
#[command(name = "video-compressor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (config.toml); defaults apply if it is missing
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Log at debug level (RUST_LOG is used otherwise)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress one local video file
    Compress {
        /// Video file to compress
        input: PathBuf,

        /// Directory receiving compressed_<name>.mp4
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Quality preset: low, medium or high
        #[arg(short, long)]
        quality: Option<String>,

        /// User id the job runs under
        #[arg(long, default_value_t = 0)]
        user: i64,

        /// Apply the premium size limit
        #[arg(long)]
        premium: bool,

        /// Skip the ffmpeg preflight checks
        #[arg(long)]
        skip_checks: bool,
    },

    /// Run the ffmpeg preflight checks and show the effective settings
    Check,
}

/// Reporter that writes pipeline progress to the log
struct LogReporter;

#[async_trait]
impl ProgressReporter for LogReporter {
    async fn on_stage(&self, job: &JobSnapshot, stage: JobStatus) -> Result<(), ReportError> {
        info!(file = %job.video.file_name, preset = %job.preset, "{}", stage_message(stage));
        Ok(())
    }

    async fn on_terminal(
        &self,
        job: &JobSnapshot,
        status: JobStatus,
        detail: Option<&str>,
    ) -> Result<(), ReportError> {
        let detail = detail.unwrap_or_default();
        match status {
            JobStatus::Completed => info!(file = %job.video.file_name, "{}", detail),
            JobStatus::Canceled => warn!(file = %job.video.file_name, "{}", detail),
            _ => error!(file = %job.video.file_name, "compression failed: {}", detail),
        }
        Ok(())
    }
}

fn stage_message(stage: JobStatus) -> &'static str {
    match stage {
        JobStatus::Downloading => "reading input",
        JobStatus::Encoding => "compressing",
        JobStatus::Uploading => "writing result",
        _ => "working",
    }
}

/// Container type guessed from the file extension
fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        _ => "video/mp4",
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Load the config file if present, otherwise defaults; env overrides apply either way
fn load_config(path: &Path) -> Result<Config, Box<dyn Error>> {
    if path.exists() {
        return Ok(Config::load(path)?);
    }
    let mut config = Config::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn compress(
    config: Config,
    input: PathBuf,
    out_dir: PathBuf,
    quality: Option<String>,
    user: UserId,
    premium: bool,
    skip_checks: bool,
) -> Result<ExitCode, Box<dyn Error>> {
    let size = tokio::fs::metadata(&input).await?.len();
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());

    let daemon = if skip_checks {
        warn!("skipping startup checks (--skip-checks enabled)");
        Daemon::new_without_checks(config)?
    } else {
        Daemon::from_config(config)?
    };
    let _metrics_server = daemon.start_metrics_server();

    let coordinator = daemon.coordinator();
    if premium {
        coordinator.set_tier(user, UserTier::Premium);
    }

    let sink = DirectorySink::new(&out_dir);
    let video = VideoRef::new(input.to_string_lossy(), size)
        .with_file_name(file_name)
        .with_mime_type(mime_type_for(&input));
    let destination = sink.destination(&video);
    let io = JobIo::new(
        Arc::new(LocalFileFetcher),
        Arc::new(sink),
        Arc::new(LogReporter),
    );

    let handle = coordinator.submit_for_user(user, video, quality.as_deref(), io)?;
    info!(
        job_id = %handle.job_id,
        preset = %handle.preset,
        mime_type = %mime_type_for(&input),
        "job submitted"
    );

    let wait = handle.wait();
    tokio::pin!(wait);
    let outcome = tokio::select! {
        outcome = &mut wait => outcome?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received, canceling after the current stage");
            if let Err(e) = coordinator.cancel(user) {
                warn!(error = %e, "nothing to cancel");
            }
            wait.await?
        }
    };

    Ok(match outcome.status {
        JobStatus::Completed => {
            println!("{}", destination.display());
            ExitCode::SUCCESS
        }
        JobStatus::Canceled => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    })
}

fn check(config: &Config) -> ExitCode {
    let plan = derive_plan(config);
    println!("ffmpeg:          {}", config.encoder.ffmpeg_path.display());
    println!("codecs:          {} / {}", config.encoder.video_codec, config.encoder.audio_codec);
    println!("encode workers:  {} ({} cores)", plan.encode_workers, plan.total_cores);
    println!("scratch dir:     {}", config.jobs.scratch_dir.display());
    println!(
        "size limits:     regular {} / premium {}",
        video_compressor::format_megabytes(config.limits.regular_max_bytes),
        video_compressor::format_megabytes(config.limits.premium_max_bytes)
    );

    match check_ffmpeg_available(&config.encoder.ffmpeg_path) {
        Ok(Some(major)) => println!("ffmpeg version:  {}", major),
        Ok(None) => println!("ffmpeg version:  unknown"),
        Err(e) => {
            error!(error = %e, "preflight failed");
            return ExitCode::FAILURE;
        }
    }
    if let Err(e) = check_encoders_available(&config.encoder) {
        error!(error = %e, "preflight failed");
        return ExitCode::FAILURE;
    }
    println!("preflight:       ok");
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(config = %cli.config.display(), error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Compress {
            input,
            out_dir,
            quality,
            user,
            premium,
            skip_checks,
        } => {
            let user = UserId(user);
            match compress(config, input, out_dir, quality, user, premium, skip_checks).await {
                Ok(code) => code,
                Err(e) => {
                    error!(error = %e, "compression did not run");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Check => check(&config),
    }
}
