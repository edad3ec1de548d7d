//! Scratch file lifecycle.
//!
//! Every path handed out for a job is remembered until [`ScratchSpace::release`]
//! deletes it. Names embed the job's UUID, so no two jobs share a path, even
//! for the same user submitting the same file twice.

use crate::job::Job;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Longest sanitized file name kept in a scratch path
const MAX_NAME_LEN: usize = 64;

/// What a scratch file is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    /// Downloaded source video
    Input,
    /// Encoder output
    Output,
}

impl FileRole {
    pub fn as_str(self) -> &'static str {
        match self {
            FileRole::Input => "input",
            FileRole::Output => "output",
        }
    }
}

/// A scratch file that could not be deleted
#[derive(Debug, Error)]
#[error("failed to remove {}: {source}", path.display())]
pub struct CleanupWarning {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Outcome of releasing a job's scratch files
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Files that existed and were deleted
    pub removed: Vec<PathBuf>,
    /// Files that existed but could not be deleted
    pub warnings: Vec<CleanupWarning>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Directory of per-job scratch files
#[derive(Debug)]
pub struct ScratchSpace {
    root: PathBuf,
    allocations: Mutex<HashMap<Uuid, Vec<PathBuf>>>,
}

impl ScratchSpace {
    /// Use `root` for scratch files, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            allocations: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for `job`'s file in `role`. Repeated calls return the same path.
    pub fn allocate(&self, job: &Job, role: FileRole) -> PathBuf {
        let name = sanitize_file_name(&job.video.file_name);
        let name = match role {
            FileRole::Input => name,
            FileRole::Output => Path::new(&name)
                .with_extension("mp4")
                .to_string_lossy()
                .into_owned(),
        };
        let path = self.root.join(format!(
            "{}_{}_{}_{}",
            role.as_str(),
            job.user_id,
            job.id.simple(),
            name
        ));

        let mut allocations = self.allocations.lock();
        let paths = allocations.entry(job.id).or_default();
        if !paths.contains(&path) {
            paths.push(path.clone());
        }
        path
    }

    /// Paths currently allocated to a job
    pub fn allocated(&self, job_id: Uuid) -> Vec<PathBuf> {
        self.allocations
            .lock()
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Delete every file allocated to `job`.
    ///
    /// Missing files are skipped. Deletion failures are logged and returned
    /// as warnings, never as errors. Calling this again is a no-op.
    pub fn release(&self, job: &Job) -> CleanupReport {
        let paths = self.allocations.lock().remove(&job.id).unwrap_or_default();
        let mut report = CleanupReport::default();

        for path in paths {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "removed scratch file");
                    report.removed.push(path);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove scratch file");
                    report.warnings.push(CleanupWarning { path, source: e });
                }
            }
        }

        report
    }
}

/// Reduce a user-supplied file name to one safe path component
fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.len() > MAX_NAME_LEN {
        // Keep the tail so the extension survives
        cleaned = cleaned[cleaned.len() - MAX_NAME_LEN..].to_string();
    }
    if cleaned.is_empty() {
        cleaned = "video".to_string();
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{UserId, VideoRef};
    use crate::presets::QualityPreset;
    use tempfile::TempDir;

    fn make_job(user: i64, name: &str) -> Job {
        Job::new(
            UserId(user),
            VideoRef::new("file", 100).with_file_name(name),
            QualityPreset::Low,
        )
    }

    #[test]
    fn test_new_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("nested/scratch");

        let scratch = ScratchSpace::new(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(scratch.root(), root.as_path());
    }

    #[test]
    fn test_allocate_is_scoped_to_job_and_role() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp_dir.path()).unwrap();
        let job = make_job(7, "clip.mov");

        let input = scratch.allocate(&job, FileRole::Input);
        let output = scratch.allocate(&job, FileRole::Output);

        assert!(input.starts_with(temp_dir.path()));
        assert_ne!(input, output);
        let input_name = input.file_name().unwrap().to_string_lossy().into_owned();
        let output_name = output.file_name().unwrap().to_string_lossy().into_owned();
        assert!(input_name.starts_with("input_7_"));
        assert!(input_name.ends_with("clip.mov"));
        assert!(output_name.starts_with("output_7_"));
        assert!(output_name.ends_with("clip.mp4"));

        // Same role again yields the same path and is tracked once
        assert_eq!(scratch.allocate(&job, FileRole::Input), input);
        assert_eq!(scratch.allocated(job.id).len(), 2);
    }

    #[test]
    fn test_same_user_same_file_gets_distinct_paths() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp_dir.path()).unwrap();
        let first = make_job(1, "a.mp4");
        let retry = make_job(1, "a.mp4");

        assert_ne!(
            scratch.allocate(&first, FileRole::Input),
            scratch.allocate(&retry, FileRole::Input)
        );
    }

    #[test]
    fn test_release_deletes_existing_and_skips_missing() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp_dir.path()).unwrap();
        let job = make_job(2, "movie.mkv");

        let input = scratch.allocate(&job, FileRole::Input);
        let output = scratch.allocate(&job, FileRole::Output);
        fs::write(&input, b"source").unwrap();
        // Output never written, as after a failed encode

        let report = scratch.release(&job);
        assert!(report.is_clean());
        assert_eq!(report.removed, vec![input.clone()]);
        assert!(!input.exists());
        assert!(!output.exists());
        assert!(scratch.allocated(job.id).is_empty());

        // Second release is a no-op
        let again = scratch.release(&job);
        assert!(again.removed.is_empty());
        assert!(again.is_clean());
    }

    #[test]
    fn test_release_reports_undeletable_path() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp_dir.path()).unwrap();
        let job = make_job(3, "x.mp4");

        // A directory in place of the file makes remove_file fail
        let input = scratch.allocate(&job, FileRole::Input);
        fs::create_dir(&input).unwrap();

        let report = scratch.release(&job);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].path, input);
        assert!(report.warnings[0].to_string().contains("failed to remove"));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("clip.mp4"), "clip.mp4");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my holiday (1).mov"), "my_holiday__1_.mov");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "video");
        assert_eq!(sanitize_file_name(".."), "video");

        let long = format!("{}.mp4", "a".repeat(200));
        let cleaned = sanitize_file_name(&long);
        assert_eq!(cleaned.len(), MAX_NAME_LEN);
        assert!(cleaned.ends_with(".mp4"));
    }
}
